use std::{fmt, str::FromStr};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};

/// Output size token, forwarded untouched to the image model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    #[serde(rename = "1K")]
    Size1K,
    #[serde(rename = "2K")]
    Size2K,
    #[serde(rename = "4K")]
    Size4K,
}

impl Resolution {
    pub const ALL: [Resolution; 3] = [Resolution::Size1K, Resolution::Size2K, Resolution::Size4K];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Size1K => "1K",
            Resolution::Size2K => "2K",
            Resolution::Size4K => "4K",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_uppercase().as_str() {
            "1K" => Ok(Resolution::Size1K),
            "2K" => Ok(Resolution::Size2K),
            "4K" => Ok(Resolution::Size4K),
            _ => Err(AppError::InvalidResolution(value.to_string())),
        }
    }
}

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Raw image bytes plus the MIME type they were declared with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub mime_type: String,
    pub data: Bytes,
}

impl ImageData {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Parses a `data:<mime>;base64,<payload>` URI as produced by a browser
    /// file reader. The format of the image itself is not checked.
    pub fn from_data_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| AppError::invalid_image("缺少 data: 前缀"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| AppError::invalid_image("缺少逗号分隔的数据段"))?;

        let mut params = header.split(';');
        let mime_type = params
            .next()
            .filter(|mime| !mime.is_empty())
            .unwrap_or(DEFAULT_IMAGE_MIME)
            .to_string();
        if !params.any(|param| param.eq_ignore_ascii_case("base64")) {
            return Err(AppError::invalid_image("仅支持 base64 编码的图片"));
        }

        let data = BASE64_STANDARD
            .decode(payload.trim())
            .map_err(|err| AppError::invalid_image(format!("Base64 解码失败: {err}")))?;
        if data.is_empty() {
            return Err(AppError::invalid_image("图片内容为空"));
        }

        Ok(Self::new(mime_type, data))
    }

    /// MIME type to declare on the outbound request; non-image types fall
    /// back to JPEG and let the service sniff the payload.
    pub fn request_mime_type(&self) -> &str {
        if self.mime_type.starts_with("image/") {
            &self.mime_type
        } else {
            DEFAULT_IMAGE_MIME
        }
    }

    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.data)
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_tokens() {
        assert_eq!("2K".parse::<Resolution>().unwrap(), Resolution::Size2K);
        assert_eq!("4k".parse::<Resolution>().unwrap(), Resolution::Size4K);
        assert!("8K".parse::<Resolution>().is_err());
        assert_eq!(Resolution::default(), Resolution::Size1K);
        assert_eq!(
            serde_json::to_value(Resolution::Size4K).unwrap(),
            serde_json::json!("4K")
        );
        let parsed: Resolution = serde_json::from_str("\"2K\"").unwrap();
        assert_eq!(parsed.to_string(), "2K");
    }

    #[test]
    fn parses_browser_data_uri() {
        let image = ImageData::from_data_uri("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(&image.data[..], b"hello");
        assert_eq!(image.to_data_uri(), "data:image/png;base64,aGVsbG8=");
    }

    #[test]
    fn rejects_malformed_data_uris() {
        assert!(ImageData::from_data_uri("aGVsbG8=").is_err());
        assert!(ImageData::from_data_uri("data:image/png;base64").is_err());
        assert!(ImageData::from_data_uri("data:image/png,hello").is_err());
        assert!(ImageData::from_data_uri("data:image/png;base64,!!!").is_err());
        assert!(ImageData::from_data_uri("data:image/png;base64,").is_err());
    }

    #[test]
    fn unknown_mime_falls_back_to_jpeg_on_request() {
        let image = ImageData::from_data_uri("data:;base64,aGVsbG8=").unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        let odd = ImageData::new("application/octet-stream", b"x".to_vec());
        assert_eq!(odd.request_mime_type(), "image/jpeg");
    }
}
