//! Backend connection settings from environment variables.

use reqwest::Url;
use store::DaybookConfig;

use crate::error::ConfigError;

/// Base URL and public key of the hosted backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: Url,
    pub anon_key: String,
}

impl BackendConfig {
    pub fn new(url: &str, anon_key: &str) -> Result<Self, ConfigError> {
        if url.trim().is_empty() {
            return Err(ConfigError::Missing("backend url"));
        }
        if anon_key.trim().is_empty() {
            return Err(ConfigError::Missing("backend anon key"));
        }
        let url = Url::parse(url.trim().trim_end_matches('/'))
            .map_err(|e| ConfigError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl(format!(
                "{url}: scheme must be http or https"
            )));
        }

        Ok(Self {
            url,
            anon_key: anon_key.trim().to_string(),
        })
    }

    /// Create config from `DAYBOOK_BACKEND_URL` and `DAYBOOK_ANON_KEY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let url = std::env::var("DAYBOOK_BACKEND_URL")
            .map_err(|_| ConfigError::Missing("DAYBOOK_BACKEND_URL"))?;
        let anon_key = std::env::var("DAYBOOK_ANON_KEY")
            .map_err(|_| ConfigError::Missing("DAYBOOK_ANON_KEY"))?;

        Self::new(&url, &anon_key)
    }

    /// Create config from the `[backend]` section of `daybook.toml`.
    pub fn from_daybook(config: &DaybookConfig) -> Result<Self, ConfigError> {
        Self::new(&config.backend.url, &config.backend.anon_key)
    }

    /// Endpoint under the base URL, e.g. `auth/v1/token`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.url.as_str().trim_end_matches('/'), path)
    }
}
