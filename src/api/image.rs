//! Image generation route.

use axum::{Form, Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::gateway::frames::SERVICE_UNAVAILABLE_MESSAGE;
use crate::llm::describe_image_error;

#[derive(Debug, Deserialize)]
pub struct ImageForm {
    #[serde(default)]
    pub user_input: String,
}

/// Either `image_url` or `error` is set.
#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /image`
///
/// Provider failures are reported in the body with status 200.
pub async fn create_image(
    State(state): State<AppState>,
    Form(form): Form<ImageForm>,
) -> Json<ImageResponse> {
    let prompt = form.user_input;

    let Some(images) = state.images.as_ref() else {
        return Json(ImageResponse {
            prompt,
            image_url: None,
            error: Some(SERVICE_UNAVAILABLE_MESSAGE.to_string()),
        });
    };

    match images.generate(&prompt).await {
        Ok(url) => {
            tracing::info!(name: "image.generated", "Image generated");
            Json(ImageResponse {
                prompt,
                image_url: Some(url),
                error: None,
            })
        }
        Err(e) => {
            tracing::warn!(name: "image.failed", error = %e, "Image generation failed");
            Json(ImageResponse {
                prompt,
                image_url: None,
                error: Some(describe_image_error(&e)),
            })
        }
    }
}
