//! Durable-storage collaborator interface.
//!
//! The store treats persistence as best-effort: callers fire these
//! methods asynchronously and swallow (log) failures, so the in-memory
//! transcript stays authoritative for the session.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use repolens_core::types::{ConversationId, Turn, TurnId, TurnUpdate};
use repolens_core::{RepoLensError, Result};

/// Listing row for a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMeta {
    pub id: ConversationId,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

/// Pagination window for conversation listings.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
        }
    }
}

/// One page of a conversation listing, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub items: Vec<ConversationMeta>,
    pub has_more: bool,
}

/// Append/patch contract the store persists through.
///
/// The bundled backends are single-tenant and ignore `user_id`;
/// multi-tenant filtering belongs to the authorization layer above.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn create_conversation(&self, id: &ConversationId, title: &str) -> Result<()>;

    async fn rename_conversation(&self, id: &ConversationId, title: &str) -> Result<()>;

    async fn append_turn(&self, conversation_id: &ConversationId, turn: &Turn) -> Result<()>;

    async fn patch_turn(&self, turn_id: &TurnId, update: &TurnUpdate) -> Result<()>;

    async fn load_turns(&self, conversation_id: &ConversationId) -> Result<Vec<Turn>>;

    async fn list_conversations(&self, user_id: &str, page: Page) -> Result<ListPage>;

    async fn delete_conversation(&self, id: &ConversationId) -> Result<()>;
}

/// In-memory backend for tests and the one-shot CLI mode.
#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<HashMap<ConversationId, StoredConversation>>,
}

struct StoredConversation {
    meta: ConversationMeta,
    turns: Vec<Turn>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn create_conversation(&self, id: &ConversationId, title: &str) -> Result<()> {
        let mut inner = crate::lock(&self.inner);
        inner.insert(
            id.clone(),
            StoredConversation {
                meta: ConversationMeta {
                    id: id.clone(),
                    title: title.to_string(),
                    updated_at: Utc::now(),
                },
                turns: Vec::new(),
            },
        );
        Ok(())
    }

    async fn rename_conversation(&self, id: &ConversationId, title: &str) -> Result<()> {
        let mut inner = crate::lock(&self.inner);
        let stored = inner
            .get_mut(id)
            .ok_or_else(|| RepoLensError::Store(format!("unknown conversation: {id}")))?;
        stored.meta.title = title.to_string();
        stored.meta.updated_at = Utc::now();
        Ok(())
    }

    async fn append_turn(&self, conversation_id: &ConversationId, turn: &Turn) -> Result<()> {
        let mut inner = crate::lock(&self.inner);
        let stored = inner.get_mut(conversation_id).ok_or_else(|| {
            RepoLensError::Store(format!("unknown conversation: {conversation_id}"))
        })?;
        stored.turns.push(turn.clone());
        stored.meta.updated_at = Utc::now();
        Ok(())
    }

    async fn patch_turn(&self, turn_id: &TurnId, update: &TurnUpdate) -> Result<()> {
        let mut inner = crate::lock(&self.inner);
        for stored in inner.values_mut() {
            if let Some(turn) = stored.turns.iter_mut().find(|t| t.id() == turn_id) {
                update.apply_to(turn);
                stored.meta.updated_at = Utc::now();
                return Ok(());
            }
        }
        Err(RepoLensError::Store(format!("unknown turn: {turn_id}")))
    }

    async fn load_turns(&self, conversation_id: &ConversationId) -> Result<Vec<Turn>> {
        let inner = crate::lock(&self.inner);
        Ok(inner
            .get(conversation_id)
            .map(|stored| stored.turns.clone())
            .unwrap_or_default())
    }

    async fn list_conversations(&self, _user_id: &str, page: Page) -> Result<ListPage> {
        let inner = crate::lock(&self.inner);
        let mut metas: Vec<ConversationMeta> =
            inner.values().map(|stored| stored.meta.clone()).collect();
        metas.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let total = metas.len();
        let items: Vec<ConversationMeta> = metas
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect();
        let has_more = page.offset + items.len() < total;
        Ok(ListPage { items, has_more })
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<()> {
        let mut inner = crate::lock(&self.inner);
        inner.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_load() {
        let backend = MemoryBackend::new();
        let id = ConversationId::new();
        backend.create_conversation(&id, "t").await.unwrap();

        let turn = Turn::user("Hello");
        backend.append_turn(&id, &turn).await.unwrap();

        let turns = backend.load_turns(&id).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].id(), turn.id());
    }

    #[tokio::test]
    async fn test_patch_unknown_turn_is_error() {
        let backend = MemoryBackend::new();
        let result = backend
            .patch_turn(&TurnId::new(), &TurnUpdate::default())
            .await;
        assert!(matches!(result, Err(RepoLensError::Store(_))));
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let backend = MemoryBackend::new();
        for i in 0..5 {
            let id = ConversationId::new();
            backend
                .create_conversation(&id, &format!("c{i}"))
                .await
                .unwrap();
        }

        let first = backend
            .list_conversations("local", Page { limit: 3, offset: 0 })
            .await
            .unwrap();
        assert_eq!(first.items.len(), 3);
        assert!(first.has_more);

        let rest = backend
            .list_conversations("local", Page { limit: 3, offset: 3 })
            .await
            .unwrap();
        assert_eq!(rest.items.len(), 2);
        assert!(!rest.has_more);
    }

    #[tokio::test]
    async fn test_delete_conversation() {
        let backend = MemoryBackend::new();
        let id = ConversationId::new();
        backend.create_conversation(&id, "t").await.unwrap();
        backend.delete_conversation(&id).await.unwrap();

        let page = backend
            .list_conversations("local", Page::default())
            .await
            .unwrap();
        assert!(page.items.is_empty());
    }
}
