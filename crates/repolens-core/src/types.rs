//! Conversation model — turns, tool calls, and the assistant-turn state
//! machine assembled by the streaming reducer.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::RunStats;

/// Title a conversation carries until its first user turn arrives.
pub const DEFAULT_TITLE: &str = "New conversation";

/// Derived titles are cut to this many characters before the `...` marker.
const TITLE_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl TurnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// One tool invocation within an assistant turn.
///
/// `result` is set at most once, when the matching result event arrives;
/// only the last element of a turn's tool-call list is ever patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    pub input: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Progress of an assistant turn, as an explicit state machine.
/// `tools_start` and `stats` exist only in the states where they are
/// defined; there is no completed turn without stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TurnPhase {
    /// Streaming, no tool call yet.
    Drafting,
    /// Streaming, at least one tool call. `tools_start` is the byte
    /// offset into `text` when the first tool invocation occurred;
    /// captured once, never updated.
    Exploring { tools_start: usize },
    /// The run finished successfully (a `result` event was observed).
    Completed {
        #[serde(skip_serializing_if = "Option::is_none")]
        tools_start: Option<usize>,
        stats: RunStats,
    },
    /// The run was stopped by the user or lost to a transport failure.
    Cancelled {
        #[serde(skip_serializing_if = "Option::is_none")]
        tools_start: Option<usize>,
    },
}

impl TurnPhase {
    pub fn tools_start(&self) -> Option<usize> {
        match self {
            Self::Drafting => None,
            Self::Exploring { tools_start } => Some(*tools_start),
            Self::Completed { tools_start, .. } | Self::Cancelled { tools_start } => *tools_start,
        }
    }

    /// Whether the turn's run is still in progress.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Drafting | Self::Exploring { .. })
    }

    pub fn stats(&self) -> Option<&RunStats> {
        match self {
            Self::Completed { stats, .. } => Some(stats),
            _ => None,
        }
    }

    pub fn status(&self) -> TurnStatus {
        match self {
            Self::Drafting | Self::Exploring { .. } => TurnStatus::InProgress,
            Self::Completed { .. } => TurnStatus::Completed,
            Self::Cancelled { .. } => TurnStatus::Cancelled,
        }
    }
}

/// Coarse status view of a [`TurnPhase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    InProgress,
    Completed,
    Cancelled,
}

/// One entry in a conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    /// Immutable once created.
    User {
        id: TurnId,
        content: String,
        created_at: DateTime<Utc>,
    },
    /// Mutable while its run is in progress; frozen once the phase
    /// leaves its open states.
    Assistant {
        id: TurnId,
        text: String,
        tool_calls: Vec<ToolCall>,
        phase: TurnPhase,
        created_at: DateTime<Utc>,
    },
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            id: TurnId::new(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Empty assistant turn paired with a user turn. Its timestamp is the
    /// user turn's plus one millisecond, so sorting by `created_at`
    /// reproduces user-then-assistant order after a reload regardless of
    /// physical row order.
    pub fn assistant_placeholder(after: DateTime<Utc>) -> Self {
        Self::Assistant {
            id: TurnId::new(),
            text: String::new(),
            tool_calls: Vec::new(),
            phase: TurnPhase::Drafting,
            created_at: after + Duration::milliseconds(1),
        }
    }

    pub fn id(&self) -> &TurnId {
        match self {
            Self::User { id, .. } | Self::Assistant { id, .. } => id,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::User { created_at, .. } | Self::Assistant { created_at, .. } => *created_at,
        }
    }

    /// Split assistant text at the first-tool-call offset: narration
    /// produced before the agent started exploring vs. the answer after.
    /// Returns the whole text as the pre-tool half when no tool ran.
    /// `None` for user turns.
    pub fn narration_split(&self) -> Option<(&str, &str)> {
        match self {
            Self::User { .. } => None,
            Self::Assistant { text, phase, .. } => match phase.tools_start() {
                Some(at) if at <= text.len() && text.is_char_boundary(at) => {
                    Some((&text[..at], &text[at..]))
                }
                // Offset from a corrupt persisted row: fall back to one half.
                Some(_) => Some((text.as_str(), "")),
                None => Some((text.as_str(), "")),
            },
        }
    }
}

/// Partial update to an assistant turn.
///
/// Every field is a full snapshot (never an increment), so replaying the
/// same update is idempotent — required because transport-level retries
/// can deliver a patch twice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<TurnPhase>,
}

impl TurnUpdate {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.tool_calls.is_none() && self.phase.is_none()
    }

    /// Shallow-merge the set fields into an assistant turn. User turns
    /// are immutable; applying to one is a no-op.
    pub fn apply_to(&self, turn: &mut Turn) {
        if let Turn::Assistant {
            text, tool_calls, phase, ..
        } = turn
        {
            if let Some(new_text) = &self.text {
                *text = new_text.clone();
            }
            if let Some(new_calls) = &self.tool_calls {
                *tool_calls = new_calls.clone();
            }
            if let Some(new_phase) = &self.phase {
                *phase = new_phase.clone();
            }
        }
    }
}

/// An ordered collection of turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: ConversationId) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: DEFAULT_TITLE.to_string(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn turn_mut(&mut self, id: &TurnId) -> Option<&mut Turn> {
        self.turns.iter_mut().find(|t| t.id() == id)
    }

    /// Creation timestamp is the sole ordering key for turns.
    pub fn sort_turns(&mut self) {
        self.turns.sort_by_key(Turn::created_at);
    }

    /// Whether an assistant turn is still streaming. At most one run may
    /// be open per conversation at any time.
    pub fn has_open_run(&self) -> bool {
        self.turns.iter().any(|t| match t {
            Turn::Assistant { phase, .. } => phase.is_open(),
            Turn::User { .. } => false,
        })
    }
}

/// Derive a conversation title from the first user prompt: verbatim up to
/// 50 characters, otherwise the first 50 characters plus `...`.
pub fn derive_title(content: &str) -> String {
    if content.chars().count() > TITLE_MAX_CHARS {
        let head: String = content.chars().take(TITLE_MAX_CHARS).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}
