use std::env;

use serde::Deserialize;

pub const STORAGE_URL_VAR: &str = "CLOUDFILES_STORAGE_URL";
pub const AUTH_TOKEN_VAR: &str = "CLOUDFILES_AUTH_TOKEN";
pub const CDN_URL_VAR: &str = "CLOUDFILES_CDN_URL";
pub const TIMEOUT_VAR: &str = "CLOUDFILES_TIMEOUT";

/// Endpoints and credentials of an already authenticated account session.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Base URL of the account on the storage endpoint.
    pub storage_url: String,
    /// Base URL of the CDN management endpoint, if the account has CDN
    /// enabled.
    #[serde(default)]
    pub cdn_url: Option<String>,
    /// Token sent as `X-Auth-Token` on every request.
    pub auth_token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("cloudfiles-resource/{}", env!("CARGO_PKG_VERSION"))
}

impl ConnectionConfig {
    pub fn new(storage_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            storage_url: storage_url.into(),
            cdn_url: None,
            auth_token: auth_token.into(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }

    pub fn with_cdn_url(mut self, cdn_url: impl Into<String>) -> Self {
        self.cdn_url = Some(cdn_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Load the configuration from the `CLOUDFILES_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let storage_url = lookup(STORAGE_URL_VAR).ok_or(ConfigError::Missing(STORAGE_URL_VAR))?;
        let auth_token = lookup(AUTH_TOKEN_VAR).ok_or(ConfigError::Missing(AUTH_TOKEN_VAR))?;
        let mut config = Self::new(storage_url, auth_token);
        if let Some(cdn_url) = lookup(CDN_URL_VAR).filter(|url| !url.is_empty()) {
            config = config.with_cdn_url(cdn_url);
        }
        if let Some(timeout) = lookup(TIMEOUT_VAR) {
            let secs = timeout
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue {
                    var: TIMEOUT_VAR,
                    value: timeout.clone(),
                })?;
            config = config.with_timeout(secs);
        }
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),
    #[error("environment variable {var} has an invalid value: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}
