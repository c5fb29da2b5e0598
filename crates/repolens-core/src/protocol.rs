//! Streaming relay wire protocol.
//!
//! One agent run is delivered as an ordered sequence of [`AgentEvent`]s
//! over a single long-lived HTTP response. Every event carries a `type`
//! discriminator drawn from a fixed vocabulary; payload fields vary by
//! type, so the whole thing is modeled as an internally tagged union and
//! matched exhaustively at the reducer boundary.

use serde::{Deserialize, Serialize};

/// One event from an agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Internal turn boundary within a single run; the transcript gets a
    /// paragraph break so separate turns don't merge into one paragraph.
    NewTurn,

    /// A fragment of narrative text, appended verbatim.
    Text { content: String },

    /// A new tool invocation begins.
    ToolUse {
        tool: String,
        input: serde_json::Value,
    },

    /// Result for the most recent tool invocation. The content is clipped
    /// upstream by the event source, never by the reducer.
    ToolResult { content: String },

    /// The run finished successfully.
    Result { stats: RunStats },

    /// Recoverable error narration; does not end the run by itself.
    Error { content: String },

    /// Stream terminal marker. Carries no payload and mutates no state.
    Done,
}

/// Final statistics for a successfully completed run.
///
/// Field names are camelCase on the wire (`toolUses`, `durationMs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub tool_uses: u32,
    pub tokens: u64,
    pub duration_ms: u64,
}

/// Body of `POST /api/chat/stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRequest {
    pub prompt: String,
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
}

/// A prior turn reduced to its narrative text. Tool calls and tool
/// results are never replayed into history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}
