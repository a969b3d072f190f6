/// Config schema types (backend endpoint, timeouts).
use std::time::Duration;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub backend: BackendConfig,
    pub timeouts: TimeoutsConfig,
}

/// Where the admin API (credential store, model catalog) lives.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the admin API, e.g. `https://admin.example.com/api`.
    pub base_url: String,

    /// Bearer token sent with every admin API request.
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_token: Option<Secret<String>>,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api".into(),
            api_token: None,
        }
    }
}

/// Upper bounds for each kind of network call. A call that exceeds its bound
/// resolves to a failure outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Connectivity test against the provider. Defaults to 30.
    pub test_secs: u64,
    /// Persisting credentials. Defaults to 30.
    pub save_secs: u64,
    /// Model discovery. Defaults to 60.
    pub fetch_secs: u64,
    /// Single and bulk model flag updates. Defaults to 30.
    pub update_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            test_secs: 30,
            save_secs: 30,
            fetch_secs: 60,
            update_secs: 30,
        }
    }
}

impl TimeoutsConfig {
    pub fn test(&self) -> Duration {
        Duration::from_secs(self.test_secs)
    }

    pub fn save(&self) -> Duration {
        Duration::from_secs(self.save_secs)
    }

    pub fn fetch(&self) -> Duration {
        Duration::from_secs(self.fetch_secs)
    }

    pub fn update(&self) -> Duration {
        Duration::from_secs(self.update_secs)
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
