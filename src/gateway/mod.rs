//! Streaming chat gateway.
//!
//! One [`ChatGateway::serve`] call drives one client connection through the
//! turn cycle:
//!
//! ```text
//! AwaitingMessage -> Dispatching -> Streaming -> AwaitingMessage
//!        |                                  \
//!        +------------> Closed <-------------+
//! ```
//!
//! Malformed frames and a missing provider are answered with an `error` frame
//! and the connection stays open. Transport failures and provider errors close
//! the connection without a structured frame; a reply that was mid-stream is
//! discarded and never stored.
//!
//! The gateway is transport-agnostic: it reads text frames from any
//! [`Stream`] and writes serialized frames to any [`Sink`], which lets the
//! WebSocket route and the tests share the same state machine.

pub mod frames;

use std::fmt::Display;
use std::sync::Arc;

use futures::{Sink, SinkExt, Stream, StreamExt};
use uuid::Uuid;

use crate::llm::{CompletionRequest, LlmDriver, LlmError, MessageRole};
use crate::prompts::DEFAULT_MODE;
use crate::session::{SessionError, SessionStore};

use frames::{INVALID_FORMAT_MESSAGE, InboundFrame, OutboundFrame, SERVICE_UNAVAILABLE_MESSAGE};

/// Reasons a connection ends abnormally.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Reading from or writing to the client failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider failed to start or continue a completion.
    #[error("Provider error: {0}")]
    Provider(#[from] LlmError),

    /// The session could not be read back after appending.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Protocol states of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for the next inbound frame.
    AwaitingMessage,
    /// Committing the user message and checking the provider.
    Dispatching,
    /// Relaying provider fragments to the client.
    Streaming,
    /// No further frames are read or written.
    Closed,
}

/// How a single inbound frame was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// A reply was streamed and stored.
    Completed {
        /// Number of chunk frames sent.
        chunks: usize,
    },
    /// The frame was not valid JSON; nothing was stored.
    Malformed,
    /// The user message was stored but no provider is configured.
    Unavailable,
}

/// Relays chat turns between clients, the session store and the provider.
#[derive(Clone)]
pub struct ChatGateway {
    store: Arc<dyn SessionStore>,
    driver: Option<Arc<dyn LlmDriver>>,
}

impl std::fmt::Debug for ChatGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatGateway")
            .field("store", &self.store)
            .field("provider_configured", &self.driver.is_some())
            .finish()
    }
}

impl ChatGateway {
    /// Create a gateway. `driver` is `None` when the provider is not configured.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, driver: Option<Arc<dyn LlmDriver>>) -> Self {
        Self { store, driver }
    }

    /// Whether a completion provider is available.
    #[must_use]
    pub fn provider_configured(&self) -> bool {
        self.driver.is_some()
    }

    /// Serve one connection until the client goes away or a fatal error occurs.
    ///
    /// The session is created with the default mode if it does not exist yet.
    /// The outbound sink is closed before returning.
    pub async fn serve<I, E, O>(
        &self,
        session_id: &str,
        inbound: I,
        outbound: O,
    ) -> Result<(), GatewayError>
    where
        I: Stream<Item = Result<String, E>>,
        E: Display,
        O: Sink<String>,
        O::Error: Display,
    {
        let connection_id = Uuid::new_v4().to_string();
        futures::pin_mut!(inbound);
        futures::pin_mut!(outbound);

        let created = self.store.ensure(session_id, DEFAULT_MODE);
        tracing::info!(
            name: "chat.connection.opened",
            connection_id = %connection_id,
            session_id = %session_id,
            new_session = created,
            "Chat connection opened"
        );

        let mut state = ConnectionState::AwaitingMessage;
        let result = loop {
            debug_assert_eq!(state, ConnectionState::AwaitingMessage);

            let text = match inbound.next().await {
                Some(Ok(text)) => text,
                Some(Err(e)) => break Err(GatewayError::Transport(e.to_string())),
                None => break Ok(()),
            };

            match self
                .handle_frame(session_id, &text, &mut outbound, &mut state)
                .await
            {
                Ok(outcome) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        session_id = %session_id,
                        outcome = ?outcome,
                        "Turn finished"
                    );
                    state = ConnectionState::AwaitingMessage;
                }
                Err(e) => break Err(e),
            }
        };
        state = ConnectionState::Closed;

        if let Err(e) = outbound.close().await {
            tracing::debug!(connection_id = %connection_id, error = %e, "Close failed");
        }

        match &result {
            Ok(()) => tracing::info!(
                name: "chat.connection.closed",
                connection_id = %connection_id,
                session_id = %session_id,
                state = ?state,
                "Chat connection closed"
            ),
            Err(e) => tracing::error!(
                name: "chat.connection.failed",
                connection_id = %connection_id,
                session_id = %session_id,
                error = %e,
                "Chat connection terminated"
            ),
        }
        result
    }

    /// Run one turn for one inbound text frame.
    pub async fn handle_frame<O>(
        &self,
        session_id: &str,
        text: &str,
        outbound: &mut O,
        state: &mut ConnectionState,
    ) -> Result<TurnOutcome, GatewayError>
    where
        O: Sink<String> + Unpin,
        O::Error: Display,
    {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = %e, "Malformed chat frame");
                send(outbound, &OutboundFrame::error(INVALID_FORMAT_MESSAGE)).await?;
                return Ok(TurnOutcome::Malformed);
            }
        };
        if frame.mode != DEFAULT_MODE {
            // The frame's mode never reaches the session; only the mode
            // endpoint changes the system prompt.
            tracing::debug!(
                session_id = %session_id,
                mode = %frame.mode,
                "Ignoring mode carried in chat frame"
            );
        }

        *state = ConnectionState::Dispatching;
        self.append(session_id, MessageRole::User, frame.message);

        let Some(driver) = &self.driver else {
            tracing::warn!(session_id = %session_id, "Completion provider not configured");
            send(outbound, &OutboundFrame::error(SERVICE_UNAVAILABLE_MESSAGE)).await?;
            return Ok(TurnOutcome::Unavailable);
        };

        *state = ConnectionState::Streaming;
        let messages = self.store.messages(session_id)?;
        let request_id = Uuid::new_v4().to_string();
        tracing::info!(
            request_id = %request_id,
            session_id = %session_id,
            message_count = messages.len(),
            "Starting completion"
        );

        let mut stream = driver.stream(CompletionRequest { messages }).await?;
        let mut reply = String::new();
        let mut chunks = 0;
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            if fragment.is_empty() {
                continue;
            }
            reply.push_str(&fragment);
            chunks += 1;
            tracing::trace!(request_id = %request_id, delta_length = fragment.len(), "Message delta");
            send(outbound, &OutboundFrame::Chunk { content: fragment }).await?;
        }

        tracing::info!(
            request_id = %request_id,
            session_id = %session_id,
            content_length = reply.len(),
            chunks = chunks,
            "Saved assistant response to session"
        );
        self.append(session_id, MessageRole::Assistant, reply);
        send(
            outbound,
            &OutboundFrame::Complete {
                session_id: session_id.to_string(),
            },
        )
        .await?;

        Ok(TurnOutcome::Completed { chunks })
    }

    /// Append to the session, recreating it if it was evicted while the
    /// connection was open.
    fn append(&self, session_id: &str, role: MessageRole, content: String) {
        if let Err(SessionError::NotFound(_)) = self.store.append(session_id, role, content.clone())
        {
            tracing::warn!(
                session_id = %session_id,
                "Session evicted during connection, recreating with default mode"
            );
            self.store.ensure(session_id, DEFAULT_MODE);
            if let Err(e) = self.store.append(session_id, role, content) {
                tracing::error!(session_id = %session_id, error = %e, "Failed to append message");
            }
        }
    }
}

async fn send<O>(outbound: &mut O, frame: &OutboundFrame) -> Result<(), GatewayError>
where
    O: Sink<String> + Unpin,
    O::Error: Display,
{
    outbound
        .send(frame.to_text())
        .await
        .map_err(|e| GatewayError::Transport(e.to_string()))
}
