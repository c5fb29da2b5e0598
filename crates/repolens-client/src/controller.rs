//! Run controller — orchestrates one end-to-end submission.
//!
//! States: `idle → submitting → streaming → (completed | cancelled |
//! errored) → idle`. One controller drives one conversation view, so a
//! single active-run handle is enough to enforce the one-open-run
//! invariant. The handle is cleared on every terminal path, whichever
//! branch was taken — a stale handle must never abort a later run.
//!
//! A failed or cancelled run is terminal; there is no automatic retry,
//! and partial text and tool calls accumulated before the failure are
//! preserved.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use repolens_core::protocol::{AgentEvent, StreamRequest};
use repolens_core::sse::FrameDecoder;
use repolens_core::types::{ConversationId, Turn, TurnId, TurnStatus};
use repolens_core::{RepoLensError, Result};
use repolens_store::ConversationStore;

use crate::http::{ByteStream, StreamClient};
use crate::reducer::TranscriptReducer;

pub struct RunController {
    store: Arc<ConversationStore>,
    client: StreamClient,
    /// No event within this window is treated as a transport failure.
    idle_timeout: Option<Duration>,
    active: Mutex<Option<CancellationToken>>,
}

/// Where a finished run ended up.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub conversation_id: ConversationId,
    pub turn_id: TurnId,
    pub status: TurnStatus,
}

/// How the streaming loop exited.
enum StreamEnd {
    Completed,
    Aborted,
    Failed,
}

enum Chunk {
    Data(Bytes),
    End,
    Failed(String),
    Stalled,
}

impl RunController {
    pub fn new(
        store: Arc<ConversationStore>,
        client: StreamClient,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            store,
            client,
            idle_timeout,
            active: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn is_active(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Request a clean stop of the active run. No-op when idle.
    pub fn cancel(&self) {
        if let Some(token) = lock(&self.active).as_ref() {
            token.cancel();
        }
    }

    /// Run one submission to a terminal state.
    pub async fn submit(
        &self,
        conversation_id: Option<ConversationId>,
        input: &str,
    ) -> Result<RunOutcome> {
        let prompt = input.trim().to_string();
        if prompt.is_empty() {
            return Err(RepoLensError::EmptyPrompt);
        }

        let token = CancellationToken::new();
        {
            let mut active = lock(&self.active);
            if active.is_some() {
                return Err(RepoLensError::RunActive);
            }
            *active = Some(token.clone());
        }

        let result = self.run(conversation_id, &prompt, &token).await;

        // Terminal cleanup on every exit path.
        *lock(&self.active) = None;

        result
    }

    async fn run(
        &self,
        conversation_id: Option<ConversationId>,
        prompt: &str,
        token: &CancellationToken,
    ) -> Result<RunOutcome> {
        // submitting: a first prompt must not wait on conversation
        // creation, so the id is allocated synchronously when absent.
        let conversation_id =
            conversation_id.unwrap_or_else(|| self.store.create_conversation());
        if self.store.has_open_run(&conversation_id) {
            return Err(RepoLensError::RunActive);
        }

        // History reflects the conversation before this submission.
        let history = self.store.history(&conversation_id);

        let user = Turn::user(prompt);
        let assistant = Turn::assistant_placeholder(user.created_at());
        let turn_id = assistant.id().clone();
        self.store.add_turn(&conversation_id, user);
        self.store.add_turn(&conversation_id, assistant);

        let request = StreamRequest {
            prompt: prompt.to_string(),
            history,
        };
        let mut reducer = TranscriptReducer::new();

        // streaming
        let end = match self.client.open(&request).await {
            Ok(stream) => {
                self.drive(stream, &mut reducer, &conversation_id, &turn_id, token)
                    .await
            }
            Err(e) => {
                warn!(%e, "Failed to open stream");
                StreamEnd::Failed
            }
        };

        let status = match end {
            StreamEnd::Completed => {
                debug!(conversation = %conversation_id, "Run completed");
                TurnStatus::Completed
            }
            StreamEnd::Aborted => {
                // Clean stop: no error text appended.
                let update = reducer.cancel(true);
                self.store.update_turn(&conversation_id, &turn_id, update);
                TurnStatus::Cancelled
            }
            StreamEnd::Failed => {
                let update = reducer.cancel(false);
                self.store.update_turn(&conversation_id, &turn_id, update);
                TurnStatus::Cancelled
            }
        };

        Ok(RunOutcome {
            conversation_id,
            turn_id,
            status,
        })
    }

    /// The single read loop: awaiting the next chunk is the only
    /// suspension point, so events are applied strictly in arrival order
    /// and the reducer is never entered concurrently.
    async fn drive(
        &self,
        mut stream: ByteStream,
        reducer: &mut TranscriptReducer,
        conversation_id: &ConversationId,
        turn_id: &TurnId,
        token: &CancellationToken,
    ) -> StreamEnd {
        let mut decoder = FrameDecoder::new();

        loop {
            let chunk = tokio::select! {
                () = token.cancelled() => return StreamEnd::Aborted,
                chunk = next_chunk(&mut stream, self.idle_timeout) => chunk,
            };

            match chunk {
                Chunk::Data(bytes) => {
                    for event in decoder.feed(&bytes) {
                        if matches!(event, AgentEvent::Done) {
                            return finish(reducer);
                        }
                        if let Some(update) = reducer.apply(&event) {
                            self.store.update_turn(conversation_id, turn_id, update);
                        }
                    }
                }
                Chunk::End => return finish(reducer),
                Chunk::Failed(reason) => {
                    warn!(%reason, "Stream read failed");
                    return StreamEnd::Failed;
                }
                Chunk::Stalled => {
                    warn!("No stream event within the idle window");
                    return StreamEnd::Failed;
                }
            }
        }
    }
}

/// A stream that ends without a `result` event died early; that is the
/// transport-failure branch, not a clean completion.
fn finish(reducer: &TranscriptReducer) -> StreamEnd {
    if reducer.is_completed() {
        StreamEnd::Completed
    } else {
        warn!("Stream ended without a result event");
        StreamEnd::Failed
    }
}

async fn next_chunk(stream: &mut ByteStream, idle_timeout: Option<Duration>) -> Chunk {
    let next = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
            Ok(item) => item,
            Err(_) => return Chunk::Stalled,
        },
        None => stream.next().await,
    };

    match next {
        Some(Ok(bytes)) => Chunk::Data(bytes),
        Some(Err(e)) => Chunk::Failed(e.to_string()),
        None => Chunk::End,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use repolens_store::MemoryBackend;

    fn controller() -> RunController {
        let store = Arc::new(ConversationStore::new(Arc::new(MemoryBackend::new())));
        RunController::new(store, StreamClient::new("http://127.0.0.1:1"), None)
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let controller = controller();
        assert!(matches!(
            controller.submit(None, "   \n\t ").await,
            Err(RepoLensError::EmptyPrompt)
        ));
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn test_cancel_when_idle_is_noop() {
        let controller = controller();
        controller.cancel();
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn test_unreachable_gateway_yields_cancelled_with_suffix() {
        // Port 1 refuses connections; open() fails, so the run takes the
        // transport-failure branch.
        let controller = controller();
        let outcome = controller.submit(None, "hello").await.unwrap();
        assert_eq!(outcome.status, TurnStatus::Cancelled);

        let conversation = controller
            .store()
            .conversation(&outcome.conversation_id)
            .unwrap();
        match &conversation.turns[1] {
            Turn::Assistant { text, phase, .. } => {
                assert_eq!(text, "\n\nConnection error.");
                assert_eq!(phase.status(), TurnStatus::Cancelled);
            }
            Turn::User { .. } => panic!("expected assistant turn"),
        }

        // The handle is cleared even on the failure path.
        assert!(!controller.is_active());
    }
}
