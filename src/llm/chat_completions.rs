//! OpenAI Chat Completions API driver.
//!
//! This module implements the [`LlmDriver`] trait for the Chat Completions
//! API (`/v1/chat/completions`) in streaming mode. The response body is a
//! server-sent event stream; every `data:` line carries one JSON chunk whose
//! `choices[0].delta.content` holds the next text fragment.

use futures::{Stream, StreamExt};

use super::{CompletionRequest, CompletionStream, LlmDriver, LlmError, LlmSettings};

/// One decoded `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StreamItem {
    /// Assistant text fragment.
    Delta(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Driver for the OpenAI Chat Completions API.
#[derive(Clone)]
pub struct ChatCompletionsDriver {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsDriver")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .field("provider", &self.settings.provider)
            .finish()
    }
}

impl ChatCompletionsDriver {
    /// Create a new Chat Completions driver with the given settings.
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        Self::with_client(reqwest::Client::new(), settings)
    }

    /// Create a driver sharing an existing HTTP client.
    #[must_use]
    pub fn with_client(http: reqwest::Client, settings: LlmSettings) -> Self {
        Self { http, settings }
    }

    fn request_body(&self, req: &CompletionRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.settings.model,
            "messages": req.messages,
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens,
            "stream": true,
        })
    }
}

#[async_trait::async_trait]
impl LlmDriver for ChatCompletionsDriver {
    async fn stream(&self, req: CompletionRequest) -> Result<CompletionStream, LlmError> {
        let url = self
            .settings
            .provider
            .build_chat_url(&self.settings.base_url);

        let rb = self.http.post(&url).json(&self.request_body(&req));
        let rb = self.settings.provider.authorize(rb, &self.settings.api_key);

        let resp = rb.send().await?;
        if !resp.status().is_success() {
            return Err(LlmError::from_response(resp).await);
        }
        Ok(Box::pin(sse_fragments(resp.bytes_stream())))
    }
}

/// Turn an SSE response body into assistant text fragments.
///
/// Stops at `[DONE]`, at the first transport or payload error, or when the
/// body ends. An event left in the buffer without a trailing blank line is
/// still decoded.
fn sse_fragments<S, B, E>(byte_stream: S) -> impl Stream<Item = Result<String, LlmError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send,
    B: AsRef<[u8]> + Send,
    E: Send,
    LlmError: From<E>,
{
    async_stream::stream! {
        let mut buf = Vec::<u8>::new();
        let mut finished = false;

        futures::pin_mut!(byte_stream);
        'body: while let Some(chunk) = byte_stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(LlmError::from(e));
                    finished = true;
                    break 'body;
                }
            };
            buf.extend_from_slice(chunk.as_ref());

            while let Some((pos, len)) = find_event_boundary(&buf) {
                let frame = buf.drain(..pos + len).collect::<Vec<_>>();
                let text = String::from_utf8_lossy(&frame).into_owned();

                match parse_event_block(&text) {
                    Ok(items) => {
                        for item in items {
                            match item {
                                StreamItem::Delta(fragment) => {
                                    yield Ok(fragment);
                                }
                                StreamItem::Done => {
                                    finished = true;
                                    break 'body;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        finished = true;
                        break 'body;
                    }
                }
            }
        }

        if !finished && !buf.iter().all(u8::is_ascii_whitespace) {
            let text = String::from_utf8_lossy(&buf).into_owned();
            match parse_event_block(&text) {
                Ok(items) => {
                    for item in items {
                        if let StreamItem::Delta(fragment) = item {
                            yield Ok(fragment);
                        }
                    }
                }
                Err(e) => {
                    yield Err(e);
                }
            }
        }
    }
}

/// Find the end of the next event block: its start offset and the length of
/// the blank-line separator (`\n\n` or `\r\n\r\n`).
fn find_event_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Decode every `data:` line of one event block.
fn parse_event_block(text: &str) -> Result<Vec<StreamItem>, LlmError> {
    let mut items = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();

        if data == "[DONE]" {
            items.push(StreamItem::Done);
            continue;
        }

        let v: serde_json::Value = serde_json::from_str(data)?;
        if let Some(err) = v.get("error") {
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("stream error")
                .to_string();
            return Err(LlmError::Api {
                status: 200,
                message,
            });
        }

        if let Some(s) = v["choices"][0]["delta"]
            .get("content")
            .and_then(|x| x.as_str())
        {
            if !s.is_empty() {
                items.push(StreamItem::Delta(s.to_string()));
            }
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Message, Provider};

    fn settings() -> LlmSettings {
        LlmSettings {
            base_url: "https://api.openai.com".to_string(),
            api_key: "sk-test".to_string(),
            model: "chatgpt-4o-latest".to_string(),
            provider: Provider::OpenAI,
            temperature: 0.3,
            max_tokens: 2000,
        }
    }

    #[test]
    fn test_request_body() {
        let driver = ChatCompletionsDriver::new(settings());
        let body = driver.request_body(&CompletionRequest {
            messages: vec![Message::system("sys"), Message::user("hello")],
        });

        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 2000);
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "hello");
    }

    #[test]
    fn test_parse_deltas_and_done() {
        let block = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\
                     data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\
                     data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\
                     data: [DONE]\n";
        let items = parse_event_block(block).unwrap();
        assert_eq!(
            items,
            vec![StreamItem::Delta("Hel".to_string()), StreamItem::Done]
        );
    }

    #[test]
    fn test_parse_ignores_comments() {
        let items = parse_event_block(": keep-alive\n").unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_parse_stream_error_payload() {
        let err = parse_event_block("data: {\"error\":{\"message\":\"overloaded\"}}\n").unwrap_err();
        assert!(err.to_string().contains("overloaded"));
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(matches!(
            parse_event_block("data: {not json\n"),
            Err(LlmError::Json(_))
        ));
    }

    #[test]
    fn test_event_boundary() {
        assert_eq!(find_event_boundary(b"data: a\n\ndata: b"), Some((7, 2)));
        assert_eq!(find_event_boundary(b"data: a\r\n\r\n"), Some((7, 4)));
        assert_eq!(find_event_boundary(b"data: partial"), None);
    }

    fn body(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, LlmError>> + Send {
        let parts: Vec<Result<Vec<u8>, LlmError>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        futures::stream::iter(parts)
    }

    async fn collect_fragments(parts: &[&str]) -> Vec<Result<String, LlmError>> {
        sse_fragments(body(parts)).collect().await
    }

    #[tokio::test]
    async fn test_fragments_across_chunk_boundaries() {
        let out = collect_fragments(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"He",
            "l\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        ])
        .await;
        let fragments: Vec<String> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(fragments, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_trailing_event_without_blank_line() {
        let out = collect_fragments(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}\n",
        ])
        .await;
        let fragments: Vec<String> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(fragments, vec!["Hel", "tail"]);
    }

    #[tokio::test]
    async fn test_nothing_decoded_after_done() {
        let out = collect_fragments(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\ndata: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n",
        ])
        .await;
        let fragments: Vec<String> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(fragments, vec!["a"]);
    }

    #[tokio::test]
    async fn test_error_payload_ends_stream() {
        let out = collect_fragments(&[
            "data: {\"error\":{\"message\":\"overloaded\"}}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n",
        ])
        .await;
        assert_eq!(out.len(), 1);
        assert!(out[0].is_err());
    }
}
