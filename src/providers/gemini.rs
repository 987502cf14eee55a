use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    config::GeminiConfig,
    errors::{AppError, Result},
};

/// Gemini `generateContent` call for image-output models.
///
/// Instances are cheap and meant to be built per request so that the key in
/// effect is always the most recently selected one.
pub struct GeminiImageModel {
    http_client: HttpClient,
    api_key: String,
    endpoint: String,
}

impl GeminiImageModel {
    pub fn new(config: &GeminiConfig, api_key: String) -> Result<Self> {
        let http_client = HttpClient::builder()
            .user_agent("ImmersiveChina/0.1")
            .build()?;

        Ok(Self {
            http_client,
            api_key,
            endpoint: format!("{}/models/{}:generateContent", config.base_url, config.model),
        })
    }

    pub async fn generate_content(
        &self,
        request: &GenerateContentRequest<'_>,
    ) -> Result<GenerateContentResponse> {
        debug!(target: "gemini", endpoint = %self.endpoint, "发送图像生成请求");

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(target: "gemini", %status, "Gemini API 请求失败");
            return Err(service_error(status.as_u16(), &body));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// Lifts credential rejections out of the generic service failure so the
/// caller does not have to pattern-match on text.
fn service_error(http_status: u16, body: &str) -> AppError {
    let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(body) else {
        let message = if body.trim().is_empty() {
            format!("Gemini API 请求失败 ({http_status})")
        } else {
            format!("Gemini API 请求失败 ({http_status}): {}", body.trim())
        };
        return AppError::Service {
            http_status,
            message,
        };
    };

    let error = envelope.error;
    let credential_rejected = matches!(
        error.status.as_deref(),
        Some("UNAUTHENTICATED") | Some("PERMISSION_DENIED")
    ) || error
        .details
        .iter()
        .any(|detail| detail.reason.as_deref() == Some("API_KEY_INVALID"));

    if credential_rejected {
        AppError::AuthorizationRejected(error.message)
    } else {
        AppError::Service {
            http_status,
            message: error.message,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest<'a> {
    pub contents: Vec<RequestContent<'a>>,
    pub generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
pub struct RequestContent<'a> {
    pub parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum RequestPart<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineBlob<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineBlob<'a> {
    pub mime_type: &'a str,
    pub data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig<'a> {
    pub image_config: ImageConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig<'a> {
    pub image_size: &'a str,
    pub aspect_ratio: &'a str,
}

#[derive(Debug, Deserialize, Default)]
pub struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    /// Base64 payload of the first image part of the first candidate.
    /// Later candidates are never consulted.
    pub fn first_inline_image(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .filter_map(|part| part.inline_data.as_ref())
            .map(|blob| blob.data.as_str())
            .find(|data| !data.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(default, alias = "inline_data")]
    inline_data: Option<ResponseBlob>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlob {
    #[serde(default)]
    data: String,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    reason: Option<String>,
}
