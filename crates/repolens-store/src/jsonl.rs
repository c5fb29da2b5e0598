//! JSONL-based storage backend — transcripts as append-only JSONL files.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use repolens_core::types::{ConversationId, Turn, TurnId, TurnUpdate};
use repolens_core::{RepoLensError, Result};

use crate::backend::{ConversationMeta, ListPage, Page, StorageBackend};

/// File-based backend using JSONL for transcripts.
///
/// Layout:
/// - `<base>/conversations.json` — array of `ConversationMeta`
/// - `<base>/turns/<conversation-id>.jsonl` — one turn per line
pub struct JsonlBackend {
    base: PathBuf,
}

impl JsonlBackend {
    pub fn new(base: PathBuf) -> Self {
        Self { base }
    }

    fn index_path(&self) -> PathBuf {
        self.base.join("conversations.json")
    }

    fn turns_dir(&self) -> PathBuf {
        self.base.join("turns")
    }

    fn turns_path(&self, id: &ConversationId) -> PathBuf {
        self.turns_dir().join(format!("{id}.jsonl"))
    }

    async fn ensure_dirs(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.base).await?;
        tokio::fs::create_dir_all(self.turns_dir()).await?;
        Ok(())
    }

    async fn load_index(&self) -> Result<Vec<ConversationMeta>> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let metas: Vec<ConversationMeta> = serde_json::from_str(&data)?;
        Ok(metas)
    }

    async fn save_index(&self, metas: &[ConversationMeta]) -> Result<()> {
        self.ensure_dirs().await?;
        let data = serde_json::to_string_pretty(metas)?;
        let path = self.index_path();
        // Atomic write: write to temp then rename
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data.as_bytes()).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn write_turns(&self, id: &ConversationId, turns: &[Turn]) -> Result<()> {
        self.ensure_dirs().await?;
        let mut data = String::new();
        for turn in turns {
            data.push_str(&serde_json::to_string(turn)?);
            data.push('\n');
        }
        let path = self.turns_path(id);
        let tmp = path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, data.as_bytes()).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn touch_index(&self, id: &ConversationId) -> Result<()> {
        let mut metas = self.load_index().await?;
        if let Some(meta) = metas.iter_mut().find(|m| &m.id == id) {
            meta.updated_at = chrono::Utc::now();
            self.save_index(&metas).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for JsonlBackend {
    async fn create_conversation(&self, id: &ConversationId, title: &str) -> Result<()> {
        let mut metas = self.load_index().await?;
        let meta = ConversationMeta {
            id: id.clone(),
            title: title.to_string(),
            updated_at: chrono::Utc::now(),
        };
        if let Some(existing) = metas.iter_mut().find(|m| &m.id == id) {
            *existing = meta;
        } else {
            metas.push(meta);
        }
        self.save_index(&metas).await?;
        debug!(conversation = %id, "Created conversation");
        Ok(())
    }

    async fn rename_conversation(&self, id: &ConversationId, title: &str) -> Result<()> {
        let mut metas = self.load_index().await?;
        let meta = metas
            .iter_mut()
            .find(|m| &m.id == id)
            .ok_or_else(|| RepoLensError::Store(format!("unknown conversation: {id}")))?;
        meta.title = title.to_string();
        meta.updated_at = chrono::Utc::now();
        self.save_index(&metas).await
    }

    async fn append_turn(&self, conversation_id: &ConversationId, turn: &Turn) -> Result<()> {
        self.ensure_dirs().await?;

        let path = self.turns_path(conversation_id);
        let line = serde_json::to_string(turn)?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;

        self.touch_index(conversation_id).await
    }

    async fn patch_turn(&self, turn_id: &TurnId, update: &TurnUpdate) -> Result<()> {
        let metas = self.load_index().await?;
        for meta in &metas {
            let mut turns = self.load_turns(&meta.id).await?;
            let Some(turn) = turns.iter_mut().find(|t| t.id() == turn_id) else {
                continue;
            };
            update.apply_to(turn);
            self.write_turns(&meta.id, &turns).await?;
            self.touch_index(&meta.id).await?;
            return Ok(());
        }
        Err(RepoLensError::Store(format!("unknown turn: {turn_id}")))
    }

    async fn load_turns(&self, conversation_id: &ConversationId) -> Result<Vec<Turn>> {
        let path = self.turns_path(conversation_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let mut turns = Vec::new();
        for line in data.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let turn: Turn = serde_json::from_str(line)
                .map_err(|e| RepoLensError::Store(format!("corrupt turn line: {e}")))?;
            turns.push(turn);
        }
        Ok(turns)
    }

    async fn list_conversations(&self, _user_id: &str, page: Page) -> Result<ListPage> {
        let mut metas = self.load_index().await?;
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
        let mut metas = self.load_index().await?;
        metas.retain(|m| &m.id != id);
        self.save_index(&metas).await?;

        let path = self.turns_path(id);
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
        }

        debug!(conversation = %id, "Deleted conversation");
        Ok(())
    }
}
