//! Image generation client.

use super::{LlmError, LlmSettings};

/// Image size requested when none is configured.
pub const DEFAULT_IMAGE_SIZE: &str = "1024x1024";

/// Something that turns a text prompt into a hosted image URL.
#[async_trait::async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate one image and return its URL.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Client for the OpenAI-compatible `/v1/images/generations` endpoint.
#[derive(Clone)]
pub struct ImagesClient {
    http: reqwest::Client,
    settings: LlmSettings,
    size: String,
}

impl std::fmt::Debug for ImagesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagesClient")
            .field("base_url", &self.settings.base_url)
            .field("size", &self.size)
            .finish()
    }
}

impl ImagesClient {
    #[must_use]
    pub fn new(http: reqwest::Client, settings: LlmSettings, size: impl Into<String>) -> Self {
        Self {
            http,
            settings,
            size: size.into(),
        }
    }
}

#[async_trait::async_trait]
impl ImageGenerator for ImagesClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let url = self
            .settings
            .provider
            .build_images_url(&self.settings.base_url);
        let body = serde_json::json!({
            "prompt": prompt,
            "n": 1,
            "size": self.size,
        });

        let rb = self.http.post(&url).json(&body);
        let resp = self
            .settings
            .provider
            .authorize(rb, &self.settings.api_key)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(LlmError::from_response(resp).await);
        }

        let v: serde_json::Value = resp.json().await?;
        first_image_url(&v)
    }
}

fn first_image_url(v: &serde_json::Value) -> Result<String, LlmError> {
    v["data"][0]["url"]
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| LlmError::InvalidResponse("missing data[0].url".to_string()))
}

/// Turn an image generation failure into the message shown to the user.
///
/// ```rust
/// use mode_chat::llm::{LlmError, images::describe_image_error};
///
/// let err = LlmError::Api { status: 429, message: "Too many".into() };
/// assert!(describe_image_error(&err).starts_with("API rate limit exceeded"));
/// ```
#[must_use]
pub fn describe_image_error(err: &LlmError) -> String {
    let text = err.to_string();
    let lower = text.to_lowercase();

    if err.is_timeout() || lower.contains("timeout") || lower.contains("timed out") {
        "Request timed out. Please try again with a shorter prompt.".to_string()
    } else if err.is_rate_limited() || lower.contains("rate limit") {
        "API rate limit exceeded. Please wait a moment and try again.".to_string()
    } else if lower.contains("content policy") || lower.contains("content_policy") {
        "Your prompt may violate content policy. Please try a different description.".to_string()
    } else {
        format!("Error generating image: {text}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, message: &str) -> LlmError {
        LlmError::Api {
            status,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_first_image_url() {
        let v = serde_json::json!({"data": [{"url": "https://img.example/1.png"}]});
        assert_eq!(first_image_url(&v).unwrap(), "https://img.example/1.png");
        assert!(first_image_url(&serde_json::json!({"data": []})).is_err());
    }

    #[test]
    fn test_describe_timeout() {
        let msg = describe_image_error(&api(504, "gateway"));
        assert!(msg.starts_with("Request timed out"));
    }

    #[test]
    fn test_describe_content_policy() {
        let msg = describe_image_error(&api(
            400,
            "Your request was rejected as a result of our content policy.",
        ));
        assert!(msg.starts_with("Your prompt may violate content policy"));
    }

    #[test]
    fn test_describe_generic() {
        let msg = describe_image_error(&api(500, "boom"));
        assert_eq!(msg, "Error generating image: API error (500): boom");
    }
}
