use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower::ServiceExt;

use polyglass_relay::{
    BoxFuture, Engine, EventStream, GlassesSink, SinkError, SourceError, SubscribeRequest,
    TranslationEvent, TranslationSource,
};
use polyglass_server::{AppState, auth, router};

const API_KEY: &str = "test-api-key";

// ── Doubles ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MockSource {
    senders: Mutex<HashMap<String, mpsc::UnboundedSender<TranslationEvent>>>,
}

impl MockSource {
    fn emit(&self, user_id: &str, event: TranslationEvent) {
        self.senders
            .lock()
            .unwrap()
            .get(user_id)
            .expect("no upstream subscription")
            .send(event)
            .unwrap();
    }
}

impl TranslationSource for MockSource {
    fn subscribe<'a>(
        &'a self,
        request: &'a SubscribeRequest,
    ) -> BoxFuture<'a, Result<EventStream, SourceError>> {
        Box::pin(async move {
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders
                .lock()
                .unwrap()
                .insert(request.user_id.clone(), tx);
            Ok(Box::pin(UnboundedReceiverStream::new(rx)) as EventStream)
        })
    }
}

struct NullSink;

impl GlassesSink for NullSink {
    fn show_text_wall<'a>(
        &'a self,
        _user_id: &'a str,
        _text: &'a str,
        _duration: Option<Duration>,
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async { Ok(()) })
    }
}

fn state(production: bool) -> (Arc<MockSource>, AppState) {
    let source = Arc::new(MockSource::default());
    let engine = Engine::builder(source.clone(), Arc::new(NullSink)).build();
    (
        source,
        AppState {
            engine,
            api_key: API_KEY.to_string(),
            package_name: "org.example.captions".to_string(),
            production,
        },
    )
}

fn translation(user_id: &str, translated: &str) -> TranslationEvent {
    TranslationEvent {
        session_id: "sess-1".to_string(),
        user_id: user_id.to_string(),
        original_text: "hello world".to_string(),
        translated_text: translated.to_string(),
        source_locale: "en-US".to_string(),
        target_locale: "fr-FR".to_string(),
        did_translate: true,
        is_final: true,
        received_at: 1_000,
    }
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

// ── Plain routes ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_app_and_status() {
    let (_source, state) = state(true);
    let (status, body) = get(router(state), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["app"], "org.example.captions");
    assert!(body["timestamp"].is_u64());
}

#[tokio::test]
async fn language_settings_requires_token_in_production() {
    let (_source, state) = state(true);
    let (status, _) = get(router(state), "/api/language-settings").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn language_settings_accepts_query_token() {
    let (_source, state) = state(true);
    let token = auth::user_token("alice", API_KEY);
    let (status, body) =
        get(router(state), &format!("/api/language-settings?token={token}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["from"], "en-US");
    assert_eq!(body["to"], "es-ES");
}

#[tokio::test]
async fn language_settings_accepts_bearer_header() {
    let (_source, state) = state(true);
    let token = auth::user_token("alice", API_KEY);
    let response = router(state)
        .oneshot(
            Request::builder()
                .uri("/api/language-settings")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn development_mode_falls_back_to_dev_user() {
    let (_source, state) = state(false);
    let (status, _) = get(router(state), "/api/language-settings").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn webhook_opens_and_stops_sessions() {
    let (_source, state) = state(true);
    let engine = state.engine.clone();
    let app = router(state);

    let open = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"type":"session_request","sessionId":"sess-9","userId":"bob"}"#,
        ))
        .unwrap();
    let response = app.clone().oneshot(open).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.active_users(), vec!["bob".to_string()]);

    let stop = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"type":"stop_request","userId":"bob"}"#))
        .unwrap();
    let response = app.oneshot(stop).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.active_users().is_empty());
}

// ── SSE stream ────────────────────────────────────────────────────────────────

async fn read_until(stream: &mut tokio::net::TcpStream, collected: &mut Vec<u8>, marker: &str) -> String {
    let mut chunk = [0u8; 4096];
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let text = String::from_utf8_lossy(collected).into_owned();
            if text.contains(marker) {
                return text;
            }
            let n = stream.read(&mut chunk).await.expect("socket read failed");
            assert!(n > 0, "stream closed before {marker:?} was seen");
            collected.extend_from_slice(&chunk[..n]);
        }
    })
    .await;
    result.unwrap_or_else(|_| panic!("timed out waiting for {marker:?}"))
}

#[tokio::test]
async fn sse_delivers_connected_replay_and_live_events() {
    let (source, state) = state(true);
    let engine = state.engine.clone();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    engine.open_session("alice", "sess-1", None, None).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    source.emit("alice", translation("alice", "bonjour"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let token = auth::user_token("alice", API_KEY);
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(
            format!(
                "GET /translation-events?token={token} HTTP/1.1\r\n\
                 Host: localhost\r\nAccept: text/event-stream\r\n\r\n"
            )
            .as_bytes(),
        )
        .await
        .unwrap();

    let mut buf = Vec::new();
    let head = read_until(&mut stream, &mut buf, "event: connected").await;
    assert!(head.contains("200 OK"), "{head}");
    assert!(head.contains("text/event-stream"), "{head}");

    // Replay of the pre-subscription entry.
    let replay = read_until(&mut stream, &mut buf, "event: translation").await;
    assert!(replay.contains("bonjour"), "{replay}");

    // Live event after the subscription.
    source.emit("alice", translation("alice", "merci"));
    let live = read_until(&mut stream, &mut buf, "merci").await;
    assert!(live.contains("event: translation"), "{live}");
}

#[tokio::test]
async fn sse_rejects_bad_token_in_production() {
    let (_source, state) = state(true);
    let response = router(state)
        .oneshot(
            Request::builder()
                .uri("/translation-events?token=bogus")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
