//! Service trait interfaces the console's API layer dispatches into.
//!
//! Parameters and replies are JSON so a gateway can forward requests without
//! knowing the engine's types.

use {async_trait::async_trait, serde_json::Value};

/// Error type returned by service methods.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The request was malformed or illegal in the current state. Nothing
    /// reached the network.
    #[error("{message}")]
    Rejected { message: String },
    #[error("{message}")]
    Message { message: String },
    #[error("{0}")]
    Serde(#[from] serde_json::Error),
}

impl ServiceError {
    #[must_use]
    pub fn message(message: impl std::fmt::Display) -> Self {
        Self::Message {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn rejected(message: impl std::fmt::Display) -> Self {
        Self::Rejected {
            message: message.to_string(),
        }
    }

    /// Short machine-readable code for API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "INVALID_REQUEST",
            Self::Message { .. } => "UNAVAILABLE",
            Self::Serde(_) => "INTERNAL",
        }
    }
}

impl From<String> for ServiceError {
    fn from(value: String) -> Self {
        Self::rejected(value)
    }
}

impl From<&str> for ServiceError {
    fn from(value: &str) -> Self {
        Self::rejected(value)
    }
}

pub type ServiceResult<T = Value> = Result<T, ServiceError>;

// ── Provider setup ──────────────────────────────────────────────────────────

/// Provider onboarding and model catalog operations.
///
/// Every method that touches one provider takes a `provider` parameter; there
/// is no implicit current provider.
#[async_trait]
pub trait ProviderSetupService: Send + Sync {
    /// All known providers with status, test result and catalog summary.
    async fn list(&self) -> ServiceResult;
    /// Edit draft credentials: `{ provider, apiKey?, baseUrl?, region? }`.
    async fn enter_credentials(&self, params: Value) -> ServiceResult;
    /// Run the connectivity test. Returns the stored test result.
    async fn test_connection(&self, params: Value) -> ServiceResult;
    /// Persist tested credentials, then discover models.
    async fn save(&self, params: Value) -> ServiceResult;
    /// Re-fetch the model catalog from the backend.
    async fn fetch_models(&self, params: Value) -> ServiceResult;
    /// Drop draft credentials and the in-memory catalog.
    async fn reset(&self, params: Value) -> ServiceResult;
    /// Query the catalog: `{ provider, family?, saved?, active?, search?, includeDeprecated? }`.
    async fn models(&self, params: Value) -> ServiceResult;
    /// Edit the working selection: `{ provider, op: "add"|"remove"|"all"|"clear", models? }`.
    async fn select_models(&self, params: Value) -> ServiceResult;
    /// Apply an action to explicit models or the selection:
    /// `{ provider, action, models? }`.
    async fn bulk_update(&self, params: Value) -> ServiceResult;
    /// Flip one flag on one model: `{ provider, model, field }`.
    async fn toggle_model(&self, params: Value) -> ServiceResult;
}
