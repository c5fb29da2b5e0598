//! In-memory conversation state with optimistic mutation.
//!
//! Every mutation lands in memory first and synchronously; the matching
//! durable-storage call is spawned fire-and-forget so the reducer loop
//! never blocks on persistence. Failures are logged and swallowed — the
//! in-memory transcript is authoritative for the session, and the
//! persisted copy becomes authoritative again on reload.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::warn;

use repolens_core::protocol::{HistoryMessage, Role};
use repolens_core::types::{
    derive_title, Conversation, ConversationId, Turn, TurnId, TurnUpdate, DEFAULT_TITLE,
};
use repolens_core::Result;

use crate::backend::StorageBackend;

pub struct ConversationStore {
    backend: Arc<dyn StorageBackend>,
    conversations: Mutex<HashMap<ConversationId, Conversation>>,
}

impl ConversationStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            conversations: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a new conversation and return its id synchronously, so a
    /// first prompt never waits on a storage round-trip. Must be called
    /// from within a Tokio runtime (the durable create is spawned).
    pub fn create_conversation(&self) -> ConversationId {
        let conversation = Conversation::new(ConversationId::new());
        let id = conversation.id.clone();

        crate::lock(&self.conversations).insert(id.clone(), conversation);

        let backend = Arc::clone(&self.backend);
        let created = id.clone();
        spawn_persist(async move {
            backend
                .create_conversation(&created, DEFAULT_TITLE)
                .await
        });

        id
    }

    /// Append a turn. The first user turn of a conversation still carrying
    /// the default title also derives the title.
    pub fn add_turn(&self, conversation_id: &ConversationId, turn: Turn) {
        let mut renamed: Option<String> = None;
        {
            let mut conversations = crate::lock(&self.conversations);
            let conversation = conversations
                .entry(conversation_id.clone())
                .or_insert_with(|| Conversation::new(conversation_id.clone()));

            if let Turn::User { content, .. } = &turn {
                if conversation.title == DEFAULT_TITLE {
                    conversation.title = derive_title(content);
                    renamed = Some(conversation.title.clone());
                }
            }
            conversation.updated_at = Utc::now();
            conversation.turns.push(turn.clone());
        }

        if let Some(title) = renamed {
            let backend = Arc::clone(&self.backend);
            let id = conversation_id.clone();
            spawn_persist(async move { backend.rename_conversation(&id, &title).await });
        }

        let backend = Arc::clone(&self.backend);
        let id = conversation_id.clone();
        spawn_persist(async move { backend.append_turn(&id, &turn).await });
    }

    /// Shallow-merge a partial update into the matching turn.
    pub fn update_turn(&self, conversation_id: &ConversationId, turn_id: &TurnId, update: TurnUpdate) {
        if update.is_empty() {
            return;
        }

        {
            let mut conversations = crate::lock(&self.conversations);
            let Some(conversation) = conversations.get_mut(conversation_id) else {
                warn!(conversation = %conversation_id, "Update for unknown conversation dropped");
                return;
            };
            let Some(turn) = conversation.turn_mut(turn_id) else {
                warn!(turn = %turn_id, "Update for unknown turn dropped");
                return;
            };
            update.apply_to(turn);
            conversation.updated_at = Utc::now();
        }

        let backend = Arc::clone(&self.backend);
        let id = turn_id.clone();
        spawn_persist(async move { backend.patch_turn(&id, &update).await });
    }

    /// Snapshot of one conversation.
    pub fn conversation(&self, id: &ConversationId) -> Option<Conversation> {
        crate::lock(&self.conversations).get(id).cloned()
    }

    pub fn has_open_run(&self, id: &ConversationId) -> bool {
        crate::lock(&self.conversations)
            .get(id)
            .is_some_and(Conversation::has_open_run)
    }

    /// Prior turns reduced to `{role, content}` pairs for a new stream
    /// request, sorted by creation time. Tool calls and tool results are
    /// never replayed; assistant turns with no narrative text are
    /// skipped.
    pub fn history(&self, id: &ConversationId) -> Vec<HistoryMessage> {
        let conversations = crate::lock(&self.conversations);
        let Some(conversation) = conversations.get(id) else {
            return Vec::new();
        };

        let mut turns = conversation.turns.clone();
        turns.sort_by_key(Turn::created_at);

        turns
            .into_iter()
            .filter_map(|turn| match turn {
                Turn::User { content, .. } => Some(HistoryMessage {
                    role: Role::User,
                    content,
                }),
                Turn::Assistant { text, .. } => (!text.is_empty()).then_some(HistoryMessage {
                    role: Role::Assistant,
                    content: text,
                }),
            })
            .collect()
    }

    /// Replace in-memory turns with the backend's rows, sorted by
    /// creation time regardless of physical row order.
    pub async fn hydrate(&self, id: &ConversationId) -> Result<()> {
        let turns = self.backend.load_turns(id).await?;
        let mut conversations = crate::lock(&self.conversations);
        let conversation = conversations
            .entry(id.clone())
            .or_insert_with(|| Conversation::new(id.clone()));
        conversation.turns = turns;
        conversation.sort_turns();
        Ok(())
    }
}

fn spawn_persist<F>(call: F)
where
    F: std::future::Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = call.await {
            warn!(%e, "Durable store call failed; in-memory state retained");
        }
    });
}
