//! Wire format of the chat WebSocket.
//!
//! Inbound frames are either plain text (the message itself) or a JSON object
//! `{"message": "...", "mode": "..."}`. Outbound frames are always JSON objects
//! tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::prompts::DEFAULT_MODE;

/// Error text sent when a JSON frame does not parse.
pub const INVALID_FORMAT_MESSAGE: &str = "Invalid message format";

/// Error text sent when no completion provider is configured.
pub const SERVICE_UNAVAILABLE_MESSAGE: &str = "OpenAI service is currently unavailable";

/// A parsed client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// Text to append as the user's message.
    pub message: String,
    /// Mode named by the client. Parsed but not applied to the session.
    pub mode: String,
}

#[derive(Deserialize)]
struct StructuredFrame {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    mode: Option<String>,
}

impl InboundFrame {
    /// Parse one text frame.
    ///
    /// Text starting with `{` must be a JSON object; anything else is taken
    /// verbatim as the message.
    ///
    /// ```rust
    /// use mode_chat::gateway::frames::InboundFrame;
    ///
    /// let frame = InboundFrame::parse("{\"message\": \"hi\"}").unwrap();
    /// assert_eq!(frame.message, "hi");
    /// assert_eq!(frame.mode, "general");
    /// assert!(InboundFrame::parse("{oops").is_err());
    /// ```
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        if !text.starts_with('{') {
            return Ok(Self {
                message: text.to_string(),
                mode: DEFAULT_MODE.to_string(),
            });
        }

        let frame: StructuredFrame = serde_json::from_str(text)?;
        Ok(Self {
            message: frame.message.unwrap_or_default(),
            mode: frame.mode.unwrap_or_else(|| DEFAULT_MODE.to_string()),
        })
    }
}

/// A frame sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// One streamed fragment of the assistant reply.
    Chunk { content: String },
    /// The reply is finished and stored.
    Complete { session_id: String },
    /// A recoverable problem with the last inbound frame.
    Error { message: String },
}

impl OutboundFrame {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serialize for the wire.
    #[must_use]
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_verbatim() {
        let frame = InboundFrame::parse("  hello {world}").unwrap();
        assert_eq!(frame.message, "  hello {world}");
        assert_eq!(frame.mode, DEFAULT_MODE);
    }

    #[test]
    fn test_structured_frame() {
        let frame = InboundFrame::parse(r#"{"message": "hello", "mode": "data_science"}"#).unwrap();
        assert_eq!(frame.message, "hello");
        assert_eq!(frame.mode, "data_science");
    }

    #[test]
    fn test_structured_frame_defaults() {
        let frame = InboundFrame::parse("{}").unwrap();
        assert_eq!(frame.message, "");
        assert_eq!(frame.mode, DEFAULT_MODE);
    }

    #[test]
    fn test_malformed_structured_frame() {
        assert!(InboundFrame::parse("{\"message\": ").is_err());
        assert!(InboundFrame::parse("{\"message\": 5}").is_err());
    }

    #[test]
    fn test_leading_whitespace_is_not_structured() {
        let frame = InboundFrame::parse(" {\"message\": \"x\"}").unwrap();
        assert_eq!(frame.message, " {\"message\": \"x\"}");
    }

    #[test]
    fn test_outbound_shapes() {
        let chunk = OutboundFrame::Chunk {
            content: "Hi".to_string(),
        };
        assert_eq!(chunk.to_text(), r#"{"type":"chunk","content":"Hi"}"#);

        let complete = OutboundFrame::Complete {
            session_id: "s1".to_string(),
        };
        assert_eq!(complete.to_text(), r#"{"type":"complete","session_id":"s1"}"#);

        let error = OutboundFrame::error(INVALID_FORMAT_MESSAGE);
        assert_eq!(
            error.to_text(),
            r#"{"type":"error","message":"Invalid message format"}"#
        );
    }
}
