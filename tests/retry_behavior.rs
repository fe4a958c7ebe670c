//! Retry-loop behavior of the backend client against a scripted in-process
//! HTTP stub.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;

use objsearch::{EmbedError, EmbedderClient, FixedRetry, InferencePayload};

/// Scripted backend: a fixed number of 503s, then one final response.
struct Script {
    hits: AtomicUsize,
    failures_before_success: usize,
    final_status: StatusCode,
    body: String,
}

impl Script {
    fn new(failures_before_success: usize, final_status: StatusCode, body: &str) -> Arc<Self> {
        Arc::new(Self {
            hits: AtomicUsize::new(0),
            failures_before_success,
            final_status,
            body: body.to_owned(),
        })
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn scripted(State(script): State<Arc<Script>>) -> (StatusCode, String) {
    let hit = script.hits.fetch_add(1, Ordering::SeqCst);
    if hit < script.failures_before_success {
        (StatusCode::SERVICE_UNAVAILABLE, "model is loading".to_owned())
    } else {
        (script.final_status, script.body.clone())
    }
}

async fn spawn_backend(script: Arc<Script>) -> String {
    let app = Router::new()
        .route("/embed", post(scripted))
        .with_state(script);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/embed")
}

fn fast_retry() -> FixedRetry {
    FixedRetry::default()
        .with_attempts(5)
        .with_backoff(Duration::from_millis(25))
}

#[tokio::test]
async fn recovers_after_transient_unavailability() {
    let script = Script::new(4, StatusCode::OK, r#"{"embeddings": [0.1, 0.2, 0.3]}"#);
    let url = spawn_backend(script.clone()).await;
    let client = EmbedderClient::new(url, "token").with_retry(fast_retry());

    let payload = InferencePayload::text("cat").unwrap();
    let vector = client.embed(&payload).await.unwrap();

    assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    assert_eq!(script.hits(), 5, "four failed sends plus the final success");
}

#[tokio::test]
async fn gives_up_after_the_attempt_budget() {
    let script = Script::new(usize::MAX, StatusCode::OK, "");
    let url = spawn_backend(script.clone()).await;
    let client = EmbedderClient::new(url, "token").with_retry(fast_retry());

    let payload = InferencePayload::text("cat").unwrap();
    let err = client.embed(&payload).await.unwrap_err();

    assert!(matches!(err, EmbedError::RetriesExhausted { attempts: 5 }));
    assert_eq!(script.hits(), 5, "no sixth send after the budget is spent");
}

#[tokio::test]
async fn non_retryable_statuses_fail_on_the_first_send() {
    let script = Script::new(0, StatusCode::NOT_FOUND, "no such model");
    let url = spawn_backend(script.clone()).await;
    let client = EmbedderClient::new(url, "token").with_retry(fast_retry());

    let payload = InferencePayload::text("cat").unwrap();
    let err = client.embed(&payload).await.unwrap_err();

    match err {
        EmbedError::Http { status, reason } => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(reason, "no such model");
        }
        other => panic!("expected Http, got {other:?}"),
    }
    assert_eq!(script.hits(), 1);
}

#[tokio::test]
async fn malformed_success_body_is_a_decode_error() {
    let script = Script::new(0, StatusCode::OK, r#"{"outputs": [0.1]}"#);
    let url = spawn_backend(script.clone()).await;
    let client = EmbedderClient::new(url, "token").with_retry(fast_retry());

    let payload = InferencePayload::text("cat").unwrap();
    let err = client.embed(&payload).await.unwrap_err();

    assert!(matches!(err, EmbedError::Decode(msg) if msg.contains("embeddings")));
    assert_eq!(script.hits(), 1);
}

#[tokio::test]
async fn connection_dropped_mid_body_is_a_transport_error() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        // announce a longer body than is sent, then hang up
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\n\
                  content-type: application/json\r\n\
                  content-length: 1024\r\n\r\n\
                  {\"embeddings\": [0.1",
            )
            .await
            .unwrap();
        socket.shutdown().await.ok();
    });

    let client =
        EmbedderClient::new(format!("http://{addr}/embed"), "token").with_retry(fast_retry());
    let payload = InferencePayload::text("cat").unwrap();
    let err = client.embed(&payload).await.unwrap_err();

    assert!(
        matches!(err, EmbedError::Transport(_)),
        "truncated body should be a transport error, got {err:?}"
    );
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    // Bind then drop a listener so the port is known-closed.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client =
        EmbedderClient::new(format!("http://{addr}/embed"), "token").with_retry(fast_retry());
    let payload = InferencePayload::text("cat").unwrap();
    let err = client.embed(&payload).await.unwrap_err();

    assert!(matches!(err, EmbedError::Transport(_)));
}
