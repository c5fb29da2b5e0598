//! Scripted playback source — replays a fixed event sequence.
//!
//! Stands in for the real agent engine in the demo gateway and in
//! integration tests, where a deterministic run matters more than a
//! live model.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;

use repolens_core::protocol::{AgentEvent, HistoryMessage, RunStats};
use repolens_core::Result;

use crate::{AgentEventSource, EventStream};

/// Plays back a fixed script of events, optionally pacing them with a
/// delay so streaming behavior is observable.
pub struct ScriptedSource {
    events: Vec<AgentEvent>,
    delay: Option<Duration>,
}

impl ScriptedSource {
    pub fn new(events: Vec<AgentEvent>) -> Self {
        Self {
            events,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Canned repository-exploration run used by `repolens serve`.
    pub fn demo() -> Self {
        Self::new(vec![
            AgentEvent::Text {
                content: "Let me take a look at the repository.".into(),
            },
            AgentEvent::ToolUse {
                tool: "Read".into(),
                input: json!({"path": "README.md"}),
            },
            AgentEvent::ToolResult {
                content: "# Example project\nA web application built on the usual suspects."
                    .into(),
            },
            AgentEvent::NewTurn,
            AgentEvent::Text {
                content: "This repository is a web application; the README describes \
                          the stack and the entry points live under src/."
                    .into(),
            },
            AgentEvent::Result {
                stats: RunStats {
                    tool_uses: 1,
                    tokens: 164,
                    duration_ms: 900,
                },
            },
        ])
        .with_delay(Duration::from_millis(40))
    }
}

#[async_trait]
impl AgentEventSource for ScriptedSource {
    async fn run(&self, _prompt: &str, _history: &[HistoryMessage]) -> Result<EventStream> {
        let delay = self.delay;
        let stream = futures::stream::iter(self.events.clone()).then(move |event| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Result::<AgentEvent>::Ok(event)
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_playback_preserves_order() {
        let events = vec![
            AgentEvent::Text { content: "a".into() },
            AgentEvent::Text { content: "b".into() },
        ];
        let source = ScriptedSource::new(events.clone());

        let mut stream = source.run("ignored", &[]).await.unwrap();
        let mut seen = Vec::new();
        while let Some(item) = stream.next().await {
            seen.push(item.unwrap());
        }
        assert_eq!(seen, events);
    }

    #[tokio::test]
    async fn test_demo_script_ends_with_result() {
        let source = ScriptedSource::demo();
        let stream = source.run("What does this repo do?", &[]).await.unwrap();
        let events: Vec<AgentEvent> = stream.map(|e| e.unwrap()).collect().await;

        assert!(matches!(events.last(), Some(AgentEvent::Result { .. })));
        assert!(!events.iter().any(|e| matches!(e, AgentEvent::Done)));
    }
}
