//! Gateway integration tests — start a real gateway and drive it over HTTP.
//!
//! Run with: `cargo test -p repolens-gateway --test integration`

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use repolens_client::{RunController, StreamClient};
use repolens_core::config::Config;
use repolens_core::protocol::{AgentEvent, RunStats};
use repolens_core::sse::FrameDecoder;
use repolens_core::types::{ConversationId, Turn, TurnPhase, TurnStatus};
use repolens_core::RepoLensError;
use repolens_gateway::{start_gateway, GatewayState};
use repolens_store::{ConversationStore, MemoryBackend, StorageBackend};

use repolens_agent::ScriptedSource;

/// Find an available port.
fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// The canonical one-tool run.
fn spec_script() -> Vec<AgentEvent> {
    vec![
        AgentEvent::Text {
            content: "Let me check.".into(),
        },
        AgentEvent::ToolUse {
            tool: "Read".into(),
            input: json!({"path": "src/app/root.tsx"}),
        },
        AgentEvent::ToolResult {
            content: "export default function App() {}".into(),
        },
        AgentEvent::Text {
            content: " It's a web app.".into(),
        },
        AgentEvent::Result {
            stats: RunStats {
                tool_uses: 1,
                tokens: 120,
                duration_ms: 800,
            },
        },
    ]
}

/// Build a minimal gateway and return its port + backend handle.
async fn start_test_gateway(source: ScriptedSource) -> (u16, Arc<MemoryBackend>) {
    let port = find_free_port();
    let backend = Arc::new(MemoryBackend::new());

    let state = Arc::new(GatewayState::new(
        Arc::new(Config::default()),
        Arc::new(source),
        backend.clone(),
    ));

    tokio::spawn(async move {
        let _ = start_gateway(state, port).await;
    });

    // Wait for the gateway to be ready
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if reqwest::get(format!("http://127.0.0.1:{port}/health"))
            .await
            .is_ok()
        {
            break;
        }
    }

    (port, backend)
}

fn controller_for(port: u16) -> Arc<RunController> {
    let store = Arc::new(ConversationStore::new(Arc::new(MemoryBackend::new())));
    Arc::new(RunController::new(
        store,
        StreamClient::new(format!("http://127.0.0.1:{port}")),
        Some(Duration::from_secs(10)),
    ))
}

#[tokio::test]
async fn test_health_endpoint() {
    let (port, _backend) = start_test_gateway(ScriptedSource::new(spec_script())).await;

    let resp = reqwest::get(format!("http://127.0.0.1:{port}/health"))
        .await
        .expect("Health request failed");

    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_stream_headers_and_frames() {
    let (port, _backend) = start_test_gateway(ScriptedSource::new(spec_script())).await;

    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/api/chat/stream"))
        .json(&json!({"prompt": "What does this do?", "history": []}))
        .send()
        .await
        .unwrap();

    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );
    assert_eq!(
        resp.headers()
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok()),
        Some("no-cache")
    );

    let body = resp.text().await.unwrap();
    assert!(body.starts_with("data: "));
    assert!(body.contains("\"type\":\"tool_use\""));
    assert!(body.ends_with("data: {\"type\":\"done\"}\n\n"));
}

#[tokio::test]
async fn test_tool_result_clipped_on_wire() {
    let script = vec![
        AgentEvent::ToolUse {
            tool: "Read".into(),
            input: json!({"path": "big.txt"}),
        },
        AgentEvent::ToolResult {
            content: "x".repeat(900),
        },
        AgentEvent::Result {
            stats: RunStats {
                tool_uses: 1,
                tokens: 10,
                duration_ms: 5,
            },
        },
    ];
    let (port, _backend) = start_test_gateway(ScriptedSource::new(script)).await;

    let body = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/api/chat/stream"))
        .json(&json!({"prompt": "read the big file"}))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();

    let mut decoder = FrameDecoder::new();
    let events = decoder.feed(&body);
    let clipped = events
        .iter()
        .find_map(|e| match e {
            AgentEvent::ToolResult { content } => Some(content.clone()),
            _ => None,
        })
        .unwrap();

    assert_eq!(clipped.chars().count(), 503);
    assert!(clipped.ends_with("..."));
}

#[tokio::test]
async fn test_end_to_end_run() {
    let (port, _backend) = start_test_gateway(ScriptedSource::new(spec_script())).await;
    let controller = controller_for(port);

    let outcome = controller.submit(None, "What does this do?").await.unwrap();
    assert_eq!(outcome.status, TurnStatus::Completed);

    let conversation = controller
        .store()
        .conversation(&outcome.conversation_id)
        .unwrap();
    assert_eq!(conversation.title, "What does this do?");
    assert_eq!(conversation.turns.len(), 2);

    match &conversation.turns[0] {
        Turn::User { content, .. } => assert_eq!(content, "What does this do?"),
        Turn::Assistant { .. } => panic!("expected user turn first"),
    }

    match &conversation.turns[1] {
        Turn::Assistant {
            text, tool_calls, phase, ..
        } => {
            assert_eq!(text, "Let me check. It's a web app.");
            assert_eq!(tool_calls.len(), 1);
            assert_eq!(tool_calls[0].tool, "Read");
            assert!(tool_calls[0].result.is_some());
            match phase {
                TurnPhase::Completed { tools_start, stats } => {
                    assert_eq!(*tools_start, Some(13));
                    assert_eq!(stats.tool_uses, 1);
                    assert_eq!(stats.tokens, 120);
                    assert_eq!(stats.duration_ms, 800);
                }
                other => panic!("unexpected phase: {other:?}"),
            }
        }
        Turn::User { .. } => panic!("expected assistant turn second"),
    }

    // Terminal state reached, controller back to idle.
    assert!(!controller.is_active());
}

#[tokio::test]
async fn test_cancellation_is_clean() {
    let source = ScriptedSource::new(spec_script()).with_delay(Duration::from_millis(300));
    let (port, _backend) = start_test_gateway(source).await;
    let controller = controller_for(port);

    let task = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.submit(None, "slow question").await })
    };

    // Let the stream open and at least one event land.
    tokio::time::sleep(Duration::from_millis(450)).await;
    assert!(controller.is_active());

    // A second submission is refused while the run is open.
    assert!(matches!(
        controller.submit(None, "another").await,
        Err(RepoLensError::RunActive)
    ));

    controller.cancel();
    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome.status, TurnStatus::Cancelled);

    let conversation = controller
        .store()
        .conversation(&outcome.conversation_id)
        .unwrap();
    match &conversation.turns[1] {
        Turn::Assistant { text, phase, .. } => {
            // Clean stop: partial text preserved, no error suffix.
            assert!(!text.contains("Connection error"));
            assert_eq!(phase.status(), TurnStatus::Cancelled);
        }
        Turn::User { .. } => panic!("expected assistant turn"),
    }
    assert!(!controller.is_active());
}

#[tokio::test]
async fn test_missing_endpoint_fails_run_with_suffix() {
    let (port, _backend) = start_test_gateway(ScriptedSource::new(spec_script())).await;

    let store = Arc::new(ConversationStore::new(Arc::new(MemoryBackend::new())));
    let controller = RunController::new(
        store,
        StreamClient::new(format!("http://127.0.0.1:{port}/wrong-prefix")),
        None,
    );

    let outcome = controller.submit(None, "hello").await.unwrap();
    assert_eq!(outcome.status, TurnStatus::Cancelled);

    let conversation = controller
        .store()
        .conversation(&outcome.conversation_id)
        .unwrap();
    match &conversation.turns[1] {
        Turn::Assistant { text, .. } => assert_eq!(text, "\n\nConnection error."),
        Turn::User { .. } => panic!("expected assistant turn"),
    }
}

#[tokio::test]
async fn test_empty_prompt_is_bad_request() {
    let (port, _backend) = start_test_gateway(ScriptedSource::new(spec_script())).await;

    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/api/chat/stream"))
        .json(&json!({"prompt": "   "}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_conversation_listing_and_deletion() {
    let (port, backend) = start_test_gateway(ScriptedSource::new(spec_script())).await;

    let id = ConversationId::new();
    backend
        .create_conversation(&id, "First question")
        .await
        .unwrap();

    let url = format!("http://127.0.0.1:{port}/api/conversations");
    let listing: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(listing["items"].as_array().unwrap().len(), 1);
    assert_eq!(listing["items"][0]["title"], "First question");
    assert_eq!(listing["hasMore"], serde_json::Value::Bool(false));

    let resp = reqwest::Client::new()
        .delete(format!("{url}/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);

    let listing: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert!(listing["items"].as_array().unwrap().is_empty());
}
