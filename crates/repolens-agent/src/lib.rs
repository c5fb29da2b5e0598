//! Agent event source boundary.
//!
//! The relay consumes an agent run as an opaque asynchronous stream of
//! typed events. The engine behind that stream — tool execution, model
//! calls, permission policy — is an external collaborator; this crate
//! holds only the interface, the upstream tool-result clipping, and a
//! scripted playback source used by the demo gateway and tests.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use repolens_core::protocol::{AgentEvent, HistoryMessage};
use repolens_core::Result;

pub mod script;

pub use script::ScriptedSource;

/// Upper bound on tool-result text forwarded to clients.
pub const TOOL_RESULT_MAX_CHARS: usize = 500;

/// The event stream for one agent run.
///
/// Sources do not emit [`AgentEvent::Done`]; the gateway adapter
/// terminates the stream.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<AgentEvent>> + Send>>;

/// An asynchronous generator of agent-run events.
#[async_trait]
pub trait AgentEventSource: Send + Sync {
    /// Start one run for the given prompt and prior turn history.
    async fn run(&self, prompt: &str, history: &[HistoryMessage]) -> Result<EventStream>;
}

/// Clip a tool result to the wire limit, marking truncation with `...`.
/// This happens upstream of the reducer, which never truncates.
pub fn clip_tool_result(content: &str) -> String {
    if content.chars().count() > TOOL_RESULT_MAX_CHARS {
        let head: String = content.chars().take(TOOL_RESULT_MAX_CHARS).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}

/// Apply the tool-result clip to an event; all other events pass through.
pub fn clip_event(event: AgentEvent) -> AgentEvent {
    match event {
        AgentEvent::ToolResult { content } => AgentEvent::ToolResult {
            content: clip_tool_result(&content),
        },
        other => other,
    }
}
