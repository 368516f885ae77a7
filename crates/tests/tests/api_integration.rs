use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use folio_api::{build_app, ApiConfig};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tower::ServiceExt;

#[derive(Debug, Clone)]
struct RecordedCall {
    path: String,
    api_key: Option<String>,
    body: Value,
}

#[derive(Clone)]
struct FakeGemini {
    replies: Arc<Mutex<Vec<Response>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl FakeGemini {
    fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

fn text_reply(text: &str) -> Response {
    Json(json!({
        "candidates": [
            { "content": { "role": "model", "parts": [{ "text": text }] }, "finishReason": "STOP" }
        ]
    }))
    .into_response()
}

async fn fake_generate(
    State(fake): State<FakeGemini>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    fake.calls.lock().push(RecordedCall {
        path: uri.path().to_string(),
        api_key: headers
            .get("x-goog-api-key")
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string),
        body,
    });
    let mut replies = fake.replies.lock();
    if replies.is_empty() {
        text_reply("default reply")
    } else {
        replies.remove(0)
    }
}

async fn start_fake_gemini(replies: Vec<Response>) -> (SocketAddr, FakeGemini) {
    let fake = FakeGemini {
        replies: Arc::new(Mutex::new(replies)),
        calls: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .fallback(fake_generate)
        .with_state(fake.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, fake)
}

fn config_for(addr: SocketAddr, extra: &[(&str, &str)]) -> ApiConfig {
    let mut vars = HashMap::from([
        ("GEMINI_API_KEY".to_string(), "test-key".to_string()),
        ("GEMINI_MODEL".to_string(), "gemini-test".to_string()),
        ("GEMINI_API_BASE".to_string(), format!("http://{addr}")),
    ]);
    for (key, value) in extra {
        vars.insert(key.to_string(), value.to_string());
    }
    ApiConfig::from_lookup(|key| vars.get(key).cloned()).expect("config should build")
}

fn post_message(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/send_message")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn index_renders_greeting_with_security_headers() {
    let (addr, _) = start_fake_gemini(Vec::new()).await;
    let app = build_app(&config_for(addr, &[("FOLIO_GREETING", "Welcome aboard!")])).unwrap();

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("content-security-policy"));
    assert!(response.headers().contains_key("x-request-id"));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains(r#""Welcome aboard!""#));
    assert!(html.contains("/static/js/chat.js"));
}

#[tokio::test]
async fn chat_script_is_served_as_javascript() {
    let (addr, _) = start_fake_gemini(Vec::new()).await;
    let app = build_app(&config_for(addr, &[])).unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/static/js/chat.js")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "application/javascript; charset=utf-8"
    );
}

#[tokio::test]
async fn health_reports_model_and_metrics() {
    let (addr, _) = start_fake_gemini(Vec::new()).await;
    let app = build_app(&config_for(addr, &[])).unwrap();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model"], "gemini-test");
    assert_eq!(body["metrics"]["requests_total"], 0);
}

#[tokio::test]
async fn send_message_redacts_phone_numbers_both_ways() {
    let (addr, fake) =
        start_fake_gemini(vec![text_reply("You can reach Jordan on +1 555 010 0199.")]).await;
    let app = build_app(&config_for(addr, &[])).unwrap();

    let response = app
        .oneshot(post_message(
            json!({ "message": "Call me at +91 7010711848 please" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["response"], "You can reach Jordan on [redacted phone].");
    assert!(body["session_id"].as_str().is_some());

    let calls = fake.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].path, "/v1beta/models/gemini-test:generateContent");
    assert_eq!(calls[0].api_key.as_deref(), Some("test-key"));
    assert!(calls[0].body["systemInstruction"]["parts"][0]["text"]
        .as_str()
        .unwrap()
        .contains("resume information"));
    assert_eq!(
        calls[0].body["contents"],
        json!([{ "role": "user", "parts": [{ "text": "Call me at [redacted phone] please" }] }])
    );
}

#[tokio::test]
async fn session_id_carries_history_between_requests() {
    let (addr, fake) =
        start_fake_gemini(vec![text_reply("first answer"), text_reply("second answer")]).await;
    let app = build_app(&config_for(addr, &[])).unwrap();

    let first = app
        .clone()
        .oneshot(post_message(json!({ "message": "hello" })))
        .await
        .unwrap();
    let first = json_body(first).await;
    let session_id = first["session_id"].as_str().unwrap().to_string();

    let second = app
        .oneshot(post_message(
            json!({ "message": "tell me more", "session_id": session_id }),
        ))
        .await
        .unwrap();
    let second = json_body(second).await;

    assert_eq!(second["session_id"], session_id.as_str());
    assert_eq!(second["response"], "second answer");
    let calls = fake.calls();
    let contents = calls[1].body["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(contents[1]["parts"][0]["text"], "first answer");
}

#[tokio::test]
async fn empty_or_missing_message_is_a_bad_request() {
    let (addr, fake) = start_fake_gemini(Vec::new()).await;
    let app = build_app(&config_for(addr, &[])).unwrap();

    for payload in [json!({ "message": "   " }), json!({}), json!({ "message": null })] {
        let response = app.clone().oneshot(post_message(payload)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Message cannot be empty");
    }

    let malformed = Request::builder()
        .method("POST")
        .uri("/send_message")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(malformed).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn upstream_failure_returns_generic_error() {
    let failure = (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": { "message": "backend exploded" } })),
    )
        .into_response();
    let (addr, _) = start_fake_gemini(vec![failure]).await;
    let app = build_app(&config_for(addr, &[])).unwrap();

    let response = app
        .oneshot(post_message(json!({ "message": "hello" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(
        body["error"],
        "Problem connecting to the AI service. Please try again later."
    );
}

#[tokio::test]
async fn empty_model_reply_uses_fallback_text() {
    let blocked = Json(json!({ "promptFeedback": { "blockReason": "SAFETY" } })).into_response();
    let (addr, _) = start_fake_gemini(vec![blocked]).await;
    let app = build_app(&config_for(addr, &[])).unwrap();

    let response = app
        .oneshot(post_message(json!({ "message": "hello" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(
        body["response"],
        "Sorry, I couldn't generate a response right now. Please try again."
    );
}

#[tokio::test]
async fn send_message_is_rate_limited_per_client() {
    let (addr, _) = start_fake_gemini(Vec::new()).await;
    let app = build_app(&config_for(addr, &[("FOLIO_RATE_LIMIT_MAX", "1")])).unwrap();

    let first = app
        .clone()
        .oneshot(post_message(json!({ "message": "one" })))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .clone()
        .oneshot(post_message(json!({ "message": "two" })))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key("x-request-id"));
    assert!(second.headers().contains_key("content-security-policy"));
    assert_eq!(second.headers()["x-content-type-options"], "nosniff");

    let health = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
}
