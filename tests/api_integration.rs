use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::{TestServer, WsMessage};
use axum_test::multipart::{MultipartForm, Part};
use serde_json::Value;

use mode_chat::AppState;
use mode_chat::analysis::PreviewAnalyzer;
use mode_chat::config::AppConfig;
use mode_chat::llm::{ImageGenerator, LlmError, MessageRole};
use mode_chat::prompts;
use mode_chat::server::{build_router, build_state};
use mode_chat::session::{InMemorySessionStore, SessionStore};

fn test_config() -> AppConfig {
    AppConfig::load_from_args(["mode-chat"]).expect("default config")
}

fn test_state() -> AppState {
    build_state(Arc::new(test_config()), None)
}

fn server(state: AppState) -> TestServer {
    TestServer::new(build_router(state)).expect("test server")
}

struct FixedImages(Result<String, u16>);

#[async_trait]
impl ImageGenerator for FixedImages {
    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        self.0.clone().map_err(|status| LlmError::Api {
            status,
            message: "upstream said no".to_string(),
        })
    }
}

fn state_with_images(images: FixedImages) -> AppState {
    AppState::new(
        Arc::new(test_config()),
        Arc::new(InMemorySessionStore::new()),
        None,
        Some(Arc::new(images)),
        Arc::new(PreviewAnalyzer::new()),
    )
}

#[tokio::test]
async fn test_health() {
    let server = server(test_state());

    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"], 0);
    assert_eq!(body["provider_configured"], false);
}

#[tokio::test]
async fn test_export_unknown_session_is_404() {
    let server = server(test_state());

    let response = server.get("/api/chat/export/nope").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["detail"], "Session not found");
}

#[tokio::test]
async fn test_export_returns_history_without_system_prompt() {
    let state = test_state();
    state.sessions.ensure("s1", prompts::DEFAULT_MODE);
    state
        .sessions
        .append("s1", MessageRole::User, "hi".to_string())
        .unwrap();
    state
        .sessions
        .append("s1", MessageRole::Assistant, "hello".to_string())
        .unwrap();
    let server = server(state);

    let response = server.get("/api/chat/export/s1").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["session_id"], "s1");
    assert!(body["timestamp"].is_string());
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "hi");
    assert_eq!(messages[1]["role"], "assistant");
}

#[tokio::test]
async fn test_set_mode_creates_session() {
    let state = test_state();
    let server = server(state.clone());

    let response = server
        .post("/api/chat/mode")
        .form(&[("session_id", "fresh"), ("mode", "automation")])
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["mode"], "automation");
    assert_eq!(body["new_session"], true);

    let log = state.sessions.messages("fresh").unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].content, prompts::lookup("automation"));
}

#[tokio::test]
async fn test_set_mode_keeps_history() {
    let state = test_state();
    state.sessions.ensure("s2", prompts::DEFAULT_MODE);
    state
        .sessions
        .append("s2", MessageRole::User, "question".to_string())
        .unwrap();
    let server = server(state.clone());

    let response = server
        .post("/api/chat/mode")
        .form(&[("session_id", "s2"), ("mode", "data_science")])
        .await;
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert!(body.get("new_session").is_none());

    let log = state.sessions.messages("s2").unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].content, prompts::lookup("data_science"));
    assert_eq!(log[1].content, "question");
}

#[tokio::test]
async fn test_set_mode_unknown_mode_uses_default_prompt() {
    let state = test_state();
    let server = server(state.clone());

    server
        .post("/api/chat/mode")
        .form(&[("session_id", "s3"), ("mode", "poetry")])
        .await
        .assert_status_ok();

    let log = state.sessions.messages("s3").unwrap();
    assert_eq!(log[0].content, prompts::lookup(prompts::DEFAULT_MODE));
}

#[tokio::test]
async fn test_set_mode_without_mode_echoes_null() {
    let state = test_state();
    let server = server(state.clone());

    let response = server
        .post("/api/chat/mode")
        .form(&[("session_id", "s4")])
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body.get("mode"), Some(&Value::Null));

    let log = state.sessions.messages("s4").unwrap();
    assert_eq!(log[0].content, prompts::lookup(prompts::DEFAULT_MODE));
}

#[tokio::test]
async fn test_set_mode_without_session_id() {
    let state = test_state();
    let server = server(state.clone());

    let response = server
        .post("/api/chat/mode")
        .form(&[("mode", "automation")])
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
    assert_eq!(state.sessions.len(), 0);
}

#[tokio::test]
async fn test_upload_rejects_unknown_extension() {
    let server = server(test_state());

    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(b"%PDF-1.7".to_vec()).file_name("report.pdf"),
    );
    let response = server.post("/upload").multipart(form).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["detail"], "Unsupported file type");
}

#[tokio::test]
async fn test_upload_text_preview() {
    let server = server(test_state());

    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(b"meeting notes".to_vec())
            .file_name("notes.txt")
            .mime_type("text/plain"),
    );
    let response = server.post("/upload").multipart(form).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "File uploaded successfully");
    assert_eq!(body["content"], "meeting notes");
}

#[tokio::test]
async fn test_upload_csv_analysis() {
    let server = server(test_state());

    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(b"region,sales\nnorth,10\nsouth,\n".to_vec())
            .file_name("sales.csv")
            .mime_type("text/csv"),
    );
    let response = server.post("/upload").multipart(form).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["filename"], "sales.csv");
    assert_eq!(body["analysis"]["shape"], serde_json::json!([2, 2]));
    assert_eq!(body["analysis"]["missing_values"]["sales"], 1);
}

#[tokio::test]
async fn test_upload_analyzer_failure_is_500() {
    let server = server(test_state());

    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(b"{not json".to_vec()).file_name("broken.json"),
    );
    let response = server.post("/upload").multipart(form).await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert!(
        body["detail"]
            .as_str()
            .unwrap()
            .starts_with("Error processing file:")
    );
}

#[tokio::test]
async fn test_upload_without_file_field() {
    let server = server(test_state());

    let form = MultipartForm::new().add_text("note", "no file here");
    server
        .post("/upload")
        .multipart(form)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_image_without_provider() {
    let server = server(test_state());

    let response = server
        .post("/image")
        .form(&[("user_input", "a lighthouse at dusk")])
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["prompt"], "a lighthouse at dusk");
    assert!(body.get("image_url").is_none());
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_image_success() {
    let server = server(state_with_images(FixedImages(Ok(
        "https://img.example/1.png".to_string()
    ))));

    let response = server
        .post("/image")
        .form(&[("user_input", "a red fox")])
        .await;
    let body: Value = response.json();
    assert_eq!(body["prompt"], "a red fox");
    assert_eq!(body["image_url"], "https://img.example/1.png");
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_image_rate_limited_message() {
    let server = server(state_with_images(FixedImages(Err(429))));

    let response = server
        .post("/image")
        .form(&[("user_input", "a red fox")])
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(
        body["error"],
        "API rate limit exceeded. Please wait a moment and try again."
    );
}

#[tokio::test]
async fn test_rate_limit_rejects_burst() {
    let mut config = test_config();
    config.resilience.rate_limit_enabled = true;
    config.resilience.requests_per_second = 0.001;
    config.resilience.burst_size = 1.0;
    let server = server(build_state(Arc::new(config), None));

    server.get("/health").await.assert_status_ok();
    server
        .get("/health")
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_websocket_skips_binary_and_answers_text() {
    let server = TestServer::builder()
        .http_transport()
        .build(build_router(test_state()))
        .expect("http test server");

    let mut socket = server.get_websocket("/ws/ws-1").await.into_websocket().await;
    socket
        .send_message(WsMessage::Binary(vec![0, 1, 2].into()))
        .await;
    socket.send_text("hello over the socket").await;

    let frame: Value = serde_json::from_str(&socket.receive_text().await).unwrap();
    assert_eq!(frame["type"], "error");
    assert!(frame["message"].is_string());

    let body: Value = server.get("/api/chat/export/ws-1").await.json();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "hello over the socket");

    socket.close().await;
}

#[tokio::test]
async fn test_websocket_turns_share_one_connection() {
    let server = TestServer::builder()
        .http_transport()
        .build(build_router(test_state()))
        .expect("http test server");

    let mut socket = server.get_websocket("/ws/ws-2").await.into_websocket().await;
    socket.send_text("{not json").await;
    let malformed: Value = serde_json::from_str(&socket.receive_text().await).unwrap();
    assert_eq!(malformed["message"], "Invalid message format");

    socket.send_text(r#"{"message": "second"}"#).await;
    let unavailable: Value = serde_json::from_str(&socket.receive_text().await).unwrap();
    assert_eq!(unavailable["type"], "error");

    let body: Value = server.get("/api/chat/export/ws-2").await.json();
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);

    socket.close().await;
}
