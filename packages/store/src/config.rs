//! # Client configuration: `daybook.toml`
//!
//! Defines the TOML configuration read by Daybook frontends (filename:
//! [`DaybookConfig::filename`] = `"daybook.toml"`). Every section is optional;
//! a missing or empty file is equivalent to the defaults.
//!
//! ## Structure
//!
//! ```toml
//! [backend]
//! url = "https://project.example.co"   # auth + table API base URL
//! anon_key = "public-anon-key"
//!
//! [app]
//! site_url = "http://localhost:8080"    # base for password-reset redirects
//!
//! [days]
//! policy = "local"                      # "local" or "utc"
//!
//! [history]
//! recent_limit = 7
//! ```

use serde::{Deserialize, Serialize};

use crate::day::DayPolicy;

/// Top-level configuration stored in `daybook.toml`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DaybookConfig {
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub days: DaysSection,
    #[serde(default)]
    pub history: HistorySection,
}

/// Where the hosted backend lives.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendSection {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub anon_key: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppSection {
    /// Public URL of the app; password-reset links land on `<site_url>/reset-password`.
    #[serde(default = "default_site_url")]
    pub site_url: String,
}

fn default_site_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            site_url: default_site_url(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DaysSection {
    #[serde(default)]
    pub policy: DayPolicy,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistorySection {
    /// Number of days listed by recent-history views.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

fn default_recent_limit() -> usize {
    7
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            recent_limit: default_recent_limit(),
        }
    }
}

impl DaybookConfig {
    /// Create a config pointing at the given backend.
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            backend: BackendSection {
                url: url.into(),
                anon_key: anon_key.into(),
            },
            ..Self::default()
        }
    }

    /// Builder method to set the day policy.
    pub fn with_day_policy(mut self, policy: DayPolicy) -> Self {
        self.days.policy = policy;
        self
    }

    /// Builder method to set the site URL.
    pub fn with_site_url(mut self, site_url: impl Into<String>) -> Self {
        self.app.site_url = site_url.into();
        self
    }

    /// Absolute URL password-reset emails redirect to.
    pub fn reset_password_redirect(&self) -> String {
        format!("{}/reset-password", self.app.site_url.trim_end_matches('/'))
    }

    /// The well-known filename for the config file.
    pub fn filename() -> &'static str {
        "daybook.toml"
    }

    /// Parse from TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Serialize to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
