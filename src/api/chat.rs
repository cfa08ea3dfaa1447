//! Chat routes: the streaming socket, mode switching and export.

use axum::{
    Form, Json,
    extract::{
        Path, State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt, future};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::prompts;
use crate::session::ChatExport;

/// `GET /ws/{session_id}`
pub async fn chat_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| relay(socket, state, session_id))
}

/// Adapt the socket to text frames and hand it to the gateway.
///
/// Binary and ping/pong frames are skipped; a close frame ends the inbound
/// stream.
async fn relay(socket: WebSocket, state: AppState, session_id: String) {
    let (sender, receiver) = socket.split();

    let inbound = receiver
        .take_while(|msg| future::ready(!matches!(msg, Ok(WsMessage::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(WsMessage::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
        });
    let outbound = sender.with(|text: String| {
        future::ready(Ok::<_, axum::Error>(WsMessage::Text(text.into())))
    });

    if let Err(e) = state.gateway.serve(&session_id, inbound, outbound).await {
        tracing::debug!(session_id = %session_id, error = %e, "Socket relay ended with error");
    }
}

#[derive(Debug, Deserialize)]
pub struct ModeForm {
    pub session_id: Option<String>,
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ModeResponse {
    pub success: bool,
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub new_session: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /api/chat/mode`
///
/// Replaces the session's system prompt, creating the session if needed.
/// A missing `session_id` is reported in the body with status 200.
pub async fn set_mode(
    State(state): State<AppState>,
    Form(form): Form<ModeForm>,
) -> Json<ModeResponse> {
    let Some(session_id) = form.session_id.filter(|id| !id.is_empty()) else {
        return Json(ModeResponse {
            success: false,
            mode: None,
            new_session: false,
            error: Some("No session ID provided".to_string()),
        });
    };

    let mode = form.mode.as_deref().unwrap_or_default();
    let created = state.sessions.set_mode(&session_id, mode);
    tracing::info!(
        name: "chat.mode.set",
        session_id = %session_id,
        mode = %mode,
        known_mode = prompts::is_known(mode),
        new_session = created,
        "Chat mode updated"
    );

    Json(ModeResponse {
        success: true,
        mode: form.mode,
        new_session: created,
        error: None,
    })
}

/// `GET /api/chat/export/{session_id}`
pub async fn export_chat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ChatExport>, ApiError> {
    Ok(Json(state.sessions.export(&session_id)?))
}
