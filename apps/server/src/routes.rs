//! HTTP surface: the viewer SSE stream, the language-settings snapshot,
//! the health probe, and the cloud session webhook.

use std::convert::Infallible;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response, sse},
    routing::{get, post},
};
use futures_util::{StreamExt, stream};
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{self, CorsLayer};

use polyglass_relay::{Engine, ViewerEvent};

use crate::auth;

const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub api_key: String,
    pub package_name: String,
    pub production: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/translation-events", get(translation_events))
        .route("/api/language-settings", get(language_settings))
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .layer(
            CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods(cors::Any)
                .allow_headers(cors::Any),
        )
        .with_state(state)
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn authenticate(state: &AppState, headers: &HeaderMap, query: &TokenQuery) -> Option<String> {
    auth::resolve_user(
        auth::extract_token(headers, query.token.as_deref()),
        &state.api_key,
        state.production,
        &state.engine,
    )
}

/// Long-lived viewer stream: `connected`, then the conversation replay,
/// then live events until the client goes away.
async fn translation_events(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(user_id) = authenticate(&state, &headers, &query) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    tracing::info!(user_id = %user_id, "viewer_connected");
    let subscription = state.engine.subscribe(&user_id).await;

    let initial = stream::iter(subscription.initial).map(to_sse);
    let live = ReceiverStream::new(subscription.receiver).map(to_sse);

    sse::Sse::new(initial.chain(live))
        .keep_alive(sse::KeepAlive::new().interval(SSE_KEEP_ALIVE))
        .into_response()
}

fn to_sse(event: ViewerEvent) -> Result<sse::Event, Infallible> {
    Ok(sse::Event::default()
        .event(event.name())
        .data(event.payload().to_string()))
}

async fn language_settings(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(user_id) = authenticate(&state, &headers, &query) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    Json(state.engine.language_settings(&user_id)).into_response()
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    Json(serde_json::json!({
        "status": "healthy",
        "app": state.package_name,
        "timestamp": timestamp,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WebhookRequest {
    #[serde(rename_all = "camelCase")]
    SessionRequest {
        session_id: String,
        user_id: String,
        #[serde(default)]
        device_model: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    StopRequest { user_id: String },
}

/// Session lifecycle notifications from the cloud.
async fn webhook(
    State(state): State<AppState>,
    Json(request): Json<WebhookRequest>,
) -> Json<serde_json::Value> {
    match request {
        WebhookRequest::SessionRequest {
            session_id,
            user_id,
            device_model,
        } => {
            tracing::info!(user_id = %user_id, session_id = %session_id, "session_webhook");
            state
                .engine
                .open_session(&user_id, &session_id, device_model, None)
                .await;
        }
        WebhookRequest::StopRequest { user_id } => {
            tracing::info!(user_id = %user_id, "stop_webhook");
            state.engine.stop_session(&user_id).await;
        }
    }
    Json(serde_json::json!({ "status": "ok" }))
}
