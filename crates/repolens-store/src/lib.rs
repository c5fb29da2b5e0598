//! Conversation store — in-memory authoritative state for the active
//! session, synced best-effort to a durable backend.

pub mod backend;
pub mod jsonl;
pub mod store;

pub use backend::{ConversationMeta, ListPage, MemoryBackend, Page, StorageBackend};
pub use jsonl::JsonlBackend;
pub use store::ConversationStore;

pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
