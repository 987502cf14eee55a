use std::{env, sync::Arc};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    config::{CredentialConfig, GeminiConfig},
    errors::{AppError, Result},
};

/// `Unknown` only exists until the startup probe has answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    #[default]
    Unknown,
    Confirmed,
    Unconfirmed,
}

impl CredentialStatus {
    pub fn from_probe(found: bool) -> Self {
        if found {
            CredentialStatus::Confirmed
        } else {
            CredentialStatus::Unconfirmed
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, CredentialStatus::Confirmed)
    }
}

/// Key taken from configuration or the process environment.
#[derive(Debug, Clone)]
pub struct StaticCredential {
    configured: Option<String>,
    env_vars: Vec<String>,
}

impl StaticCredential {
    pub fn new(configured: Option<String>, env_vars: Vec<String>) -> Self {
        Self {
            configured,
            env_vars,
        }
    }

    /// Environment variables are read on every call so that a key exported
    /// after startup is picked up by the next request.
    pub fn lookup(&self) -> Option<String> {
        if let Some(key) = &self.configured {
            return Some(key.clone());
        }

        self.env_vars
            .iter()
            .filter_map(|name| env::var(name).ok())
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
    }
}

/// In-app key selection flow: the gate page submits a key which is held in
/// memory for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct KeySelector {
    selected: Arc<RwLock<Option<String>>>,
}

impl KeySelector {
    pub async fn has_selected_key(&self) -> bool {
        self.selected.read().await.is_some()
    }

    /// Blank submissions keep whatever was selected before.
    pub async fn open_select_key(&self, api_key: Option<String>) {
        let Some(key) = api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
        else {
            debug!(target: "credentials", "选择器未提交新的 API Key");
            return;
        };

        *self.selected.write().await = Some(key);
        info!(target: "credentials", "已通过选择器更新 API Key");
    }

    async fn selected(&self) -> Option<String> {
        self.selected.read().await.clone()
    }
}

#[derive(Debug, Clone)]
pub struct CredentialGate {
    static_source: StaticCredential,
    selector: Option<KeySelector>,
}

impl CredentialGate {
    pub fn new(static_source: StaticCredential, selector: Option<KeySelector>) -> Self {
        Self {
            static_source,
            selector,
        }
    }

    pub fn from_config(gemini: &GeminiConfig, credentials: &CredentialConfig) -> Self {
        let static_source =
            StaticCredential::new(gemini.api_key.clone(), credentials.env_vars.clone());
        let selector = credentials
            .interactive_selection
            .then(KeySelector::default);
        Self::new(static_source, selector)
    }

    pub fn has_selection_flow(&self) -> bool {
        self.selector.is_some()
    }

    /// Startup check: the selector's own probe first, then the static key.
    pub async fn probe(&self) -> bool {
        if let Some(selector) = &self.selector {
            if selector.has_selected_key().await {
                return true;
            }
        }
        self.static_source.lookup().is_some()
    }

    /// Runs the selection flow. Success is optimistic: the caller marks the
    /// credential confirmed without checking the key against the service.
    /// A submission that leaves no key reachable at all is refused.
    pub async fn request_selection(&self, api_key: Option<String>) -> Result<()> {
        let selector = self
            .selector
            .as_ref()
            .ok_or(AppError::CredentialSelectionUnavailable)?;
        selector.open_select_key(api_key).await;
        if self.current_key().await.is_none() {
            return Err(AppError::CredentialMissing);
        }
        Ok(())
    }

    /// Key to use for the next remote call, resolved fresh each time.
    pub async fn current_key(&self) -> Option<String> {
        if let Some(selector) = &self.selector {
            if let Some(key) = selector.selected().await {
                return Some(key);
            }
        }
        self.static_source.lookup()
    }
}
