//! Transcript reducer — folds the ordered event stream into the
//! in-progress assistant turn.
//!
//! The reducer holds the draft state for exactly one run and is driven
//! synchronously by the decode loop, one event at a time, in arrival
//! order. For every event that changes externally-visible state it emits
//! a [`TurnUpdate`] for the store to apply and persist; every emitted
//! field is a full snapshot, so replaying an update is harmless.

use repolens_core::protocol::AgentEvent;
use repolens_core::types::{ToolCall, TurnPhase, TurnUpdate};

#[derive(Debug, Default)]
pub struct TranscriptReducer {
    text: String,
    tool_calls: Vec<ToolCall>,
    tools_start: Option<usize>,
    completed: Option<TurnPhase>,
}

impl TranscriptReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event onto the draft. Returns `None` when nothing
    /// externally visible changed.
    pub fn apply(&mut self, event: &AgentEvent) -> Option<TurnUpdate> {
        match event {
            AgentEvent::NewTurn => {
                self.text.push_str("\n\n");
                Some(self.text_update())
            }
            AgentEvent::Text { content } => {
                self.text.push_str(content);
                Some(self.text_update())
            }
            AgentEvent::ToolUse { tool, input } => {
                // One-time capture of the narration/answer split point.
                let first = self.tools_start.is_none();
                if first {
                    self.tools_start = Some(self.text.len());
                }
                self.tool_calls.push(ToolCall {
                    tool: tool.clone(),
                    input: input.clone(),
                    result: None,
                });
                Some(TurnUpdate {
                    tool_calls: Some(self.tool_calls.clone()),
                    phase: first.then(|| TurnPhase::Exploring {
                        tools_start: self.text.len(),
                    }),
                    ..Default::default()
                })
            }
            AgentEvent::ToolResult { content } => match self.tool_calls.last_mut() {
                Some(call) => {
                    call.result = Some(content.clone());
                    Some(TurnUpdate {
                        tool_calls: Some(self.tool_calls.clone()),
                        ..Default::default()
                    })
                }
                // A result with no tool call yet is dropped, not a panic.
                None => None,
            },
            AgentEvent::Result { stats } => {
                let phase = TurnPhase::Completed {
                    tools_start: self.tools_start,
                    stats: *stats,
                };
                self.completed = Some(phase.clone());
                Some(TurnUpdate {
                    phase: Some(phase),
                    ..Default::default()
                })
            }
            AgentEvent::Error { content } => {
                // Recoverable narration; the run may keep going.
                self.text.push_str("\n\nError: ");
                self.text.push_str(content);
                Some(self.text_update())
            }
            AgentEvent::Done => None,
        }
    }

    /// Whether a `result` event was observed.
    pub fn is_completed(&self) -> bool {
        self.completed.is_some()
    }

    /// Terminal fold for a run that did not complete. A user-initiated
    /// stop leaves the text untouched; a transport failure appends the
    /// connection-error suffix first.
    pub fn cancel(&mut self, user_initiated: bool) -> TurnUpdate {
        let text = if user_initiated {
            None
        } else {
            self.text.push_str("\n\nConnection error.");
            Some(self.text.clone())
        };
        TurnUpdate {
            text,
            phase: Some(TurnPhase::Cancelled {
                tools_start: self.tools_start,
            }),
            ..Default::default()
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    fn text_update(&self) -> TurnUpdate {
        TurnUpdate {
            text: Some(self.text.clone()),
            ..Default::default()
        }
    }
}
