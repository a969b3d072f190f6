//! Provider records, credentials and connectivity test results.

use {
    chatdesk_common::{ModelId, ProviderId},
    chrono::{DateTime, Utc},
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize, Serializer, ser::SerializeStruct},
};

use crate::status::ProviderStatus;

/// Credential set for one provider. Opaque to the engine apart from equality
/// and emptiness; the API key is never logged or serialized in views.
#[derive(Clone)]
pub struct Credentials {
    api_key: Secret<String>,
    pub base_url: String,
    pub region: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            api_key: Secret::new(String::new()),
            base_url: String::new(),
            region: String::new(),
        }
    }
}

impl Credentials {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            base_url: base_url.into(),
            region: region.into(),
        }
    }

    pub fn api_key(&self) -> &Secret<String> {
        &self.api_key
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.expose_secret().trim().is_empty()
    }

    /// Enough to attempt a connectivity test.
    pub fn is_complete(&self) -> bool {
        self.has_api_key()
    }

    pub fn same_as(&self, other: &Self) -> bool {
        self.api_key.expose_secret() == other.api_key.expose_secret()
            && self.base_url == other.base_url
            && self.region == other.region
    }

    /// Apply a partial edit. Returns whether anything changed.
    pub fn apply(&mut self, patch: &CredentialsPatch) -> bool {
        let mut changed = false;
        if let Some(ref key) = patch.api_key
            && key != self.api_key.expose_secret()
        {
            self.api_key = Secret::new(key.clone());
            changed = true;
        }
        if let Some(ref url) = patch.base_url
            && url != &self.base_url
        {
            self.base_url.clone_from(url);
            changed = true;
        }
        if let Some(ref region) = patch.region
            && region != &self.region
        {
            self.region.clone_from(region);
            changed = true;
        }
        changed
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("region", &self.region)
            .finish()
    }
}

/// UI view: reports whether a key is present, never the key itself.
impl Serialize for Credentials {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Credentials", 3)?;
        s.serialize_field("hasApiKey", &self.has_api_key())?;
        s.serialize_field("baseUrl", &self.base_url)?;
        s.serialize_field("region", &self.region)?;
        s.end()
    }
}

/// Partial credential edit from the credentials form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsPatch {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

impl CredentialsPatch {
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Default::default()
        }
    }
}

/// Outcome of the last connectivity test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

/// A provider as the console sees it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub id: ProviderId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub status: ProviderStatus,
    pub credentials: Credentials,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_result: Option<TestResult>,
    pub model_count: usize,
    pub saved_model_ids: Vec<ModelId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// The credential store holds credentials for this provider.
    pub persisted: bool,
}

impl Provider {
    pub fn new(id: impl Into<ProviderId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: None,
            status: ProviderStatus::Unconfigured,
            credentials: Credentials::default(),
            test_result: None,
            model_count: 0,
            saved_model_ids: Vec::new(),
            last_error: None,
            persisted: false,
        }
    }
}
