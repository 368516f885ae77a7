pub mod config;
mod page;
mod rate_limit;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Json, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{body::Body, Router};
use folio_core::{ChatInput, Profile};
use folio_observability::AppMetrics;
use folio_relay::{ChatRelay, GeminiClient, RelayError};
use folio_storage::MemoryStore;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub use crate::config::ApiConfig;
use crate::rate_limit::IpRateLimiter;

const MAX_BODY_BYTES: usize = 64 * 1024;
const EMPTY_MESSAGE_ERROR: &str = "Message cannot be empty";
const UPSTREAM_ERROR: &str = "Problem connecting to the AI service. Please try again later.";

pub type Relay = ChatRelay<GeminiClient, MemoryStore>;

#[derive(Clone)]
pub struct ApiState {
    pub relay: Arc<Relay>,
    pub metrics: Arc<AppMetrics>,
    pub limiter: IpRateLimiter,
    pub trust_forwarded_for: bool,
    pub index_html: Arc<str>,
}

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    message: Option<String>,
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessageResponse {
    response: String,
    session_id: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    model: String,
    active_sessions: usize,
    metrics: folio_observability::MetricsSnapshot,
}

enum ApiError {
    BadRequest(&'static str),
    Upstream,
    RateLimited,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Upstream => (StatusCode::INTERNAL_SERVER_ERROR, UPSTREAM_ERROR),
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many messages. Please wait a moment and try again.",
            ),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::EmptyMessage => ApiError::BadRequest(EMPTY_MESSAGE_ERROR),
            RelayError::Upstream(_) | RelayError::Storage(_) => ApiError::Upstream,
        }
    }
}

pub fn build_state(config: &ApiConfig) -> Result<ApiState> {
    let profile = match config.profile_path.as_deref() {
        Some(path) => Profile::from_file(config.profile_owner.clone(), path)
            .context("failed to load profile")?,
        None => Profile::default(),
    };
    let profile = match config.greeting.as_ref() {
        Some(greeting) => profile.with_greeting(greeting.clone()),
        None => profile,
    };

    let metrics = AppMetrics::shared();
    let model = GeminiClient::new(config.gemini.clone())?;
    let index_html: Arc<str> = Arc::from(page::render_index(&profile));
    let relay = Arc::new(ChatRelay::new(
        model,
        Arc::new(MemoryStore::new()),
        Arc::new(profile),
        metrics.clone(),
    ));

    Ok(ApiState {
        relay,
        metrics,
        limiter: IpRateLimiter::new(config.rate_limit_window, config.rate_limit_max),
        trust_forwarded_for: config.trust_forwarded_for,
        index_html,
    })
}

pub fn build_app(config: &ApiConfig) -> Result<Router> {
    Ok(build_router(build_state(config)?))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/static/js/chat.js", get(chat_js))
        .route("/static/css/chat.css", get(chat_css))
        .route("/health", get(health))
        .route("/send_message", post(send_message))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

/// Periodically drops expired chat sessions and idle rate-limit buckets.
pub fn spawn_housekeeping(state: ApiState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match state.relay.purge_expired_sessions().await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "expired chat sessions purged"),
                Err(err) => warn!(error = %err, "session purge failed"),
            }
            state.limiter.prune_idle();
        }
    })
}

async fn index(State(state): State<ApiState>) -> Html<String> {
    Html(state.index_html.to_string())
}

async fn chat_js() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        page::CHAT_JS,
    )
}

async fn chat_css() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], page::CHAT_CSS)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        model: state.relay.model().config().model.clone(),
        active_sessions: state.relay.store().session_count(),
        metrics: state.metrics.snapshot(),
    };
    (StatusCode::OK, Json(payload))
}

async fn send_message(
    State(state): State<ApiState>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "rejected send_message body");
        ApiError::BadRequest("Invalid JSON body")
    })?;
    let message = request
        .message
        .filter(|message| !message.trim().is_empty())
        .ok_or(ApiError::BadRequest(EMPTY_MESSAGE_ERROR))?;

    let reply = state
        .relay
        .handle_message(ChatInput {
            session_id: request.session_id,
            message,
        })
        .await
        .map_err(|err| {
            // Model failures are already logged by the relay with session context.
            if let RelayError::Storage(source) = &err {
                let detail = format!("{:#}", source);
                error!(error = %detail, "chat session storage failed");
            }
            ApiError::from(err)
        })?;

    Ok(Json(SendMessageResponse {
        response: reply.reply_text,
        session_id: reply.session_id,
    }))
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::POST || request.uri().path() != "/send_message" {
        return next.run(request).await;
    }

    let ip = request_ip(&request, state.trust_forwarded_for);
    if !state.limiter.allow(&ip) {
        warn!(client = %ip, "send_message rate limited");
        return ApiError::RateLimited.into_response();
    }

    next.run(request).await
}

/// Rate-limit key: the peer address, or the first `x-forwarded-for` hop when
/// the service runs behind a trusted proxy.
fn request_ip(request: &Request<Body>, trust_forwarded_for: bool) -> String {
    let forwarded = trust_forwarded_for
        .then(|| request.headers().get("x-forwarded-for"))
        .flatten()
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    forwarded
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "local".to_string())
}

async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;

    response.headers_mut().insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static(
            "default-src 'self'; frame-ancestors 'none'; base-uri 'none'; form-action 'self'",
        ),
    );

    response
}
