use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod ids;
pub mod secret;

pub use ids::{api_key_hint, generate_public_id, normalize_base_url, slugify};
pub use secret::{SecretCipher, SecretError};

pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_DATA_BUFFER: usize = 100;
pub const DEFAULT_ERROR_BUFFER: usize = 10;
pub const DEFAULT_MIN_BATCH_WORDS: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required gateway config field: {0}")]
    MissingField(&'static str),
    #[error("invalid gateway config field {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Final, merged gateway configuration used by the running process.
///
/// Merge order: CLI > ENV > defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub admin_key: String,
    /// Database DSN used for this process.
    pub dsn: String,
    /// Symmetric secret for provider credentials at rest.
    pub provider_secret: Option<String>,
    /// Optional outbound proxy (for upstream egress).
    pub proxy: Option<String>,
    /// Organization whose providers act as the global fallback.
    pub default_organization_id: Option<i64>,
    pub stream_timeout_secs: u64,
    pub data_buffer: usize,
    pub error_buffer: usize,
    pub min_batch_words: usize,
}

impl GatewayConfig {
    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    pub fn cipher(&self) -> Option<SecretCipher> {
        self.provider_secret.as_deref().map(SecretCipher::new)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Optional layer used for merging gateway config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub admin_key: Option<String>,
    pub dsn: Option<String>,
    pub provider_secret: Option<String>,
    pub proxy: Option<String>,
    pub default_organization_id: Option<i64>,
    pub stream_timeout_secs: Option<u64>,
    pub data_buffer: Option<usize>,
    pub error_buffer: Option<usize>,
    pub min_batch_words: Option<usize>,
}

impl GatewayConfigPatch {
    pub fn overlay(&mut self, other: GatewayConfigPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.admin_key.is_some() {
            self.admin_key = other.admin_key;
        }
        if other.dsn.is_some() {
            self.dsn = other.dsn;
        }
        if other.provider_secret.is_some() {
            self.provider_secret = other.provider_secret;
        }
        if other.proxy.is_some() {
            self.proxy = other.proxy;
        }
        if other.default_organization_id.is_some() {
            self.default_organization_id = other.default_organization_id;
        }
        if other.stream_timeout_secs.is_some() {
            self.stream_timeout_secs = other.stream_timeout_secs;
        }
        if other.data_buffer.is_some() {
            self.data_buffer = other.data_buffer;
        }
        if other.error_buffer.is_some() {
            self.error_buffer = other.error_buffer;
        }
        if other.min_batch_words.is_some() {
            self.min_batch_words = other.min_batch_words;
        }
    }

    pub fn into_config(self) -> Result<GatewayConfig, ConfigError> {
        let config = GatewayConfig {
            host: self.host.unwrap_or_else(|| "0.0.0.0".to_string()),
            port: self.port.unwrap_or(8787),
            admin_key: non_empty(self.admin_key).ok_or(ConfigError::MissingField("admin_key"))?,
            dsn: non_empty(self.dsn).ok_or(ConfigError::MissingField("dsn"))?,
            provider_secret: non_empty(self.provider_secret),
            proxy: non_empty(self.proxy),
            default_organization_id: self.default_organization_id,
            stream_timeout_secs: self
                .stream_timeout_secs
                .unwrap_or(DEFAULT_STREAM_TIMEOUT.as_secs()),
            data_buffer: self.data_buffer.unwrap_or(DEFAULT_DATA_BUFFER),
            error_buffer: self.error_buffer.unwrap_or(DEFAULT_ERROR_BUFFER),
            min_batch_words: self.min_batch_words.unwrap_or(DEFAULT_MIN_BATCH_WORDS),
        };
        if config.stream_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "stream_timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        if config.data_buffer == 0 || config.error_buffer == 0 {
            return Err(ConfigError::Invalid {
                field: "buffer",
                message: "channel capacities must be greater than zero".to_string(),
            });
        }
        Ok(config)
    }
}

impl From<GatewayConfig> for GatewayConfigPatch {
    fn from(value: GatewayConfig) -> Self {
        Self {
            host: Some(value.host),
            port: Some(value.port),
            admin_key: Some(value.admin_key),
            dsn: Some(value.dsn),
            provider_secret: value.provider_secret,
            proxy: value.proxy,
            default_organization_id: value.default_organization_id,
            stream_timeout_secs: Some(value.stream_timeout_secs),
            data_buffer: Some(value.data_buffer),
            error_buffer: Some(value.error_buffer),
            min_batch_words: Some(value.min_batch_words),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
}
