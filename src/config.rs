use std::{env, net::SocketAddr, path::Path};

use anyhow::{Context, anyhow};
use ::config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
use serde::Deserialize;
use tracing::warn;

const DEFAULT_CONFIG_PATH: &str = "config/app_config.toml";
const ENV_PREFIX: &str = "IMMERSIVE";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_MAX_UPLOAD_MB: usize = 20;
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GEMINI_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
/// Portrait framing suits a single person in a scene.
const DEFAULT_ASPECT_RATIO: &str = "3:4";
const DEFAULT_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_upload_bytes: usize,
}

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    /// Statically configured key; environment variables are consulted when absent.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub aspect_ratio: String,
}

#[derive(Clone, Debug)]
pub struct CredentialConfig {
    /// Whether the gate offers an in-app key selector.
    pub interactive_selection: bool,
    pub env_vars: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub gemini: GeminiConfig,
    pub credentials: CredentialConfig,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config_path =
            env::var("APP_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let config_path = Path::new(&config_path);

        if !config_path.exists() {
            warn!(target: "config", path = ?config_path, "配置文件不存在，使用默认配置");
        }

        let builder = Config::builder()
            .add_source(File::from(config_path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );

        Self::from_builder(builder)
            .with_context(|| format!("解析配置文件 {:?} 失败", config_path))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> anyhow::Result<Self> {
        let file_config: FileConfig = builder.build()?.try_deserialize()?;

        Ok(Self {
            server: file_config.server.unwrap_or_default().into_domain()?,
            gemini: file_config.gemini.unwrap_or_default().into_domain(),
            credentials: file_config.credentials.unwrap_or_default().into_domain(),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    server: Option<FileServerConfig>,
    #[serde(default)]
    gemini: Option<FileGeminiConfig>,
    #[serde(default)]
    credentials: Option<FileCredentialConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct FileServerConfig {
    #[serde(default)]
    bind_addr: Option<String>,
    #[serde(default)]
    max_upload_mb: Option<usize>,
}

impl FileServerConfig {
    fn into_domain(self) -> anyhow::Result<ServerConfig> {
        let bind_addr_str = self
            .bind_addr
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .with_context(|| format!("解析 server.bind_addr 失败: {}", bind_addr_str))?;

        let max_upload_mb = self.max_upload_mb.unwrap_or(DEFAULT_MAX_UPLOAD_MB);
        if max_upload_mb == 0 {
            return Err(anyhow!("server.max_upload_mb 必须大于 0"));
        }

        Ok(ServerConfig {
            bind_addr,
            max_upload_bytes: max_upload_mb * 1024 * 1024,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileGeminiConfig {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    aspect_ratio: Option<String>,
}

impl FileGeminiConfig {
    fn into_domain(self) -> GeminiConfig {
        GeminiConfig {
            api_key: self.api_key.filter(|key| !key.trim().is_empty()),
            base_url: self
                .base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            model: self
                .model
                .unwrap_or_else(|| DEFAULT_GEMINI_IMAGE_MODEL.to_string()),
            aspect_ratio: self
                .aspect_ratio
                .unwrap_or_else(|| DEFAULT_ASPECT_RATIO.to_string()),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileCredentialConfig {
    #[serde(default)]
    interactive_selection: Option<bool>,
    #[serde(default)]
    env_vars: Option<Vec<String>>,
}

impl FileCredentialConfig {
    fn into_domain(self) -> CredentialConfig {
        CredentialConfig {
            interactive_selection: self.interactive_selection.unwrap_or(true),
            env_vars: self
                .env_vars
                .filter(|vars| !vars.is_empty())
                .unwrap_or_else(|| DEFAULT_KEY_ENV_VARS.iter().map(|v| v.to_string()).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::config::FileFormat;

    fn parse(toml: &str) -> anyhow::Result<AppConfig> {
        AppConfig::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.server.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.server.max_upload_bytes, 20 * 1024 * 1024);
        assert_eq!(config.gemini.model, "gemini-3-pro-image-preview");
        assert_eq!(config.gemini.aspect_ratio, "3:4");
        assert!(config.gemini.api_key.is_none());
        assert!(config.credentials.interactive_selection);
        assert_eq!(config.credentials.env_vars, vec!["GEMINI_API_KEY", "API_KEY"]);
    }

    #[test]
    fn reads_sections() {
        let config = parse(
            r#"
            [server]
            bind_addr = "0.0.0.0:9000"
            max_upload_mb = 5

            [gemini]
            api_key = "abc"
            base_url = "http://localhost:1234/v1beta/"

            [credentials]
            interactive_selection = false
            env_vars = ["MY_KEY"]
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind_addr.port(), 9000);
        assert_eq!(config.server.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.gemini.api_key.as_deref(), Some("abc"));
        assert_eq!(config.gemini.base_url, "http://localhost:1234/v1beta");
        assert!(!config.credentials.interactive_selection);
        assert_eq!(config.credentials.env_vars, vec!["MY_KEY"]);
    }

    #[test]
    fn blank_api_key_counts_as_absent() {
        let config = parse("[gemini]\napi_key = \"  \"\n").unwrap();
        assert!(config.gemini.api_key.is_none());
    }

    #[test]
    fn rejects_bad_bind_addr() {
        assert!(parse("[server]\nbind_addr = \"nowhere\"\n").is_err());
        assert!(parse("[server]\nmax_upload_mb = 0\n").is_err());
    }
}
