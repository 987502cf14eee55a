use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Text the service puts in rejections caused by a stale or unusable key.
pub const ENTITY_NOT_FOUND_SIGNATURE: &str = "Requested entity was not found";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("未找到可用的 API Key，请先选择 API Key")]
    CredentialMissing,

    #[error("无法打开 API Key 选择器。如果您已部署此应用，请确保在环境变量中配置了 API_KEY。")]
    CredentialSelectionUnavailable,

    #[error("{0}")]
    AuthorizationRejected(String),

    #[error("No image data found in response")]
    NoImageInResponse,

    #[error("{message}")]
    Service { http_status: u16, message: String },

    #[error("未知场景: {0}")]
    UnknownScene(String),

    #[error("不支持的画质: {0}")]
    InvalidResolution(String),

    #[error("图片数据无效: {0}")]
    InvalidImage(String),

    #[error("图片过大，最大支持 {limit_mb} MB")]
    PhotoTooLarge { limit_mb: usize },

    #[error("当前无法开始生成: {0}")]
    GenerationNotReady(&'static str),

    #[error("尚未生成图片")]
    NoResult,

    #[error("生成请求已取消")]
    Cancelled,

    #[error("会话控制器不可用")]
    ControllerUnavailable,

    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("网络请求失败: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON 解析失败: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Other(String),
}

impl AppError {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    pub fn invalid_image(msg: impl Into<String>) -> Self {
        Self::InvalidImage(msg.into())
    }

    /// Whether the remote service refused the call because of the credential.
    ///
    /// The provider already lifts structured rejections into
    /// `AuthorizationRejected`; anything else only counts when its text
    /// carries the entity-not-found signature.
    pub fn is_authorization_rejected(&self) -> bool {
        match self {
            Self::AuthorizationRejected(_) => true,
            other => other.to_string().contains(ENTITY_NOT_FOUND_SIGNATURE),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::CredentialMissing | Self::AuthorizationRejected(_) => StatusCode::UNAUTHORIZED,
            Self::CredentialSelectionUnavailable => StatusCode::NOT_IMPLEMENTED,
            Self::UnknownScene(_) | Self::InvalidResolution(_) | Self::InvalidImage(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::PhotoTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::GenerationNotReady(_) => StatusCode::CONFLICT,
            Self::NoResult => StatusCode::NOT_FOUND,
            Self::ControllerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Service { http_status, .. } if *http_status == 429 => {
                StatusCode::TOO_MANY_REQUESTS
            }
            Self::NoImageInResponse | Self::Service { .. } | Self::Reqwest(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(http_status: u16, message: &str) -> AppError {
        AppError::Service {
            http_status,
            message: message.to_string(),
        }
    }

    #[test]
    fn entity_not_found_text_counts_as_rejection() {
        let err = service(404, "Requested entity was not found.");
        assert!(err.is_authorization_rejected());
    }

    #[test]
    fn explicit_rejection_is_always_a_rejection() {
        assert!(AppError::AuthorizationRejected("API key not valid".into()).is_authorization_rejected());
    }

    #[test]
    fn other_failures_are_not_rejections() {
        assert!(!service(500, "backend exploded").is_authorization_rejected());
        assert!(!AppError::NoImageInResponse.is_authorization_rejected());
        assert!(!AppError::other("socket closed").is_authorization_rejected());
    }

    #[test]
    fn plain_failures_carrying_signature_are_rejections() {
        let err = AppError::other("upstream said: Requested entity was not found.");
        assert!(err.is_authorization_rejected());
    }

    #[test]
    fn maps_to_http_status() {
        assert_eq!(
            AppError::CredentialMissing.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::GenerationNotReady("x").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::UnknownScene("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            service(429, "quota").status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(service(500, "boom").status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            AppError::PhotoTooLarge { limit_mb: 20 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }
}
