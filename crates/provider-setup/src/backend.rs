//! Admin API collaborator: credential store, connectivity test and model
//! catalog endpoints.
//!
//! [`ProviderBackend`] is the seam the engine depends on; [`HttpBackend`] is
//! the HTTP/JSON binding used in production.

use std::{future::Future, time::Duration};

use {
    async_trait::async_trait,
    chatdesk_common::{ModelId, ProviderId},
    reqwest::{Client, Method, RequestBuilder, Response},
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    tracing::debug,
    url::Url,
};

use crate::{
    error::{Context, Error, Result},
    model::{ModelPatch, ProviderModel},
    provider::Credentials,
};

/// Provider record as the backend returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRecord {
    pub id: ProviderId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Credentials are already persisted for this provider.
    #[serde(default)]
    pub configured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_count: Option<usize>,
}

/// Raw answer of the connectivity test endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    /// Milliseconds, as measured by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,
    #[serde(default)]
    pub timestamp: String,
}

#[async_trait]
pub trait ProviderBackend: Send + Sync {
    async fn list_providers(&self) -> Result<Vec<ProviderRecord>>;

    async fn test_provider_connection(
        &self,
        provider: &ProviderId,
        credentials: &Credentials,
    ) -> Result<ConnectionReport>;

    async fn save_provider(
        &self,
        provider: &ProviderId,
        credentials: &Credentials,
    ) -> Result<ProviderRecord>;

    async fn get_provider_models(&self, provider: &ProviderId) -> Result<Vec<ProviderModel>>;

    async fn update_model(&self, model: &ModelId, patch: &ModelPatch) -> Result<()>;

    /// Applies the same patch to every listed model, all or nothing.
    async fn bulk_update_models(&self, models: &[ModelId], patch: &ModelPatch) -> Result<()>;
}

/// Run a backend call with an upper bound; elapsing resolves to
/// [`Error::Timeout`].
pub(crate) async fn bounded<T>(
    operation: &'static str,
    after: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout { operation, after }),
    }
}

// ── HTTP binding ────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsBody<'a> {
    api_key: &'a str,
    base_url: &'a str,
    region: &'a str,
}

impl<'a> From<&'a Credentials> for CredentialsBody<'a> {
    fn from(credentials: &'a Credentials) -> Self {
        Self {
            api_key: credentials.api_key().expose_secret(),
            base_url: &credentials.base_url,
            region: &credentials.region,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BulkUpdateBody<'a> {
    model_ids: &'a [ModelId],
    #[serde(flatten)]
    patch: &'a ModelPatch,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// [`ProviderBackend`] over the admin HTTP/JSON API.
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    api_token: Option<Secret<String>>,
}

impl HttpBackend {
    pub fn new(base_url: &str, api_token: Option<Secret<String>>) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid backend url")?;
        if base_url.cannot_be_a_base() {
            return Err(Error::message(format!(
                "backend url cannot be used as a base: {base_url}"
            )));
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::transport("build http client", e))?;
        Ok(Self {
            client,
            base_url,
            api_token,
        })
    }

    pub fn from_config(config: &chatdesk_config::BackendConfig) -> Result<Self> {
        Self::new(&config.base_url, config.api_token.clone())
    }

    /// `base_url` joined with percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        match self.api_token {
            Some(ref token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    async fn send(&self, operation: &'static str, builder: RequestBuilder) -> Result<Response> {
        let resp = builder
            .send()
            .await
            .map_err(|e| Error::transport(operation, e))?;
        let status = resp.status();
        debug!(operation, status = status.as_u16(), "backend responded");
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.or(b.message))
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("HTTP {status}")
                } else {
                    body
                }
            });
        Err(Error::application(operation, message))
    }

    async fn json<T: DeserializeOwned>(operation: &'static str, resp: Response) -> Result<T> {
        resp.json()
            .await
            .map_err(|e| Error::transport(operation, format!("malformed response: {e}")))
    }
}

#[async_trait]
impl ProviderBackend for HttpBackend {
    async fn list_providers(&self) -> Result<Vec<ProviderRecord>> {
        const OP: &str = "listProviders";
        let url = self.endpoint(&["providers"]);
        let resp = self.send(OP, self.request(Method::GET, url)).await?;
        Self::json(OP, resp).await
    }

    async fn test_provider_connection(
        &self,
        provider: &ProviderId,
        credentials: &Credentials,
    ) -> Result<ConnectionReport> {
        const OP: &str = "testProviderConnection";
        let url = self.endpoint(&["providers", provider.as_str(), "test"]);
        let req = self
            .request(Method::POST, url)
            .json(&CredentialsBody::from(credentials));
        let resp = self.send(OP, req).await?;
        Self::json(OP, resp).await
    }

    async fn save_provider(
        &self,
        provider: &ProviderId,
        credentials: &Credentials,
    ) -> Result<ProviderRecord> {
        const OP: &str = "saveProvider";
        let url = self.endpoint(&["providers", provider.as_str()]);
        let req = self
            .request(Method::PUT, url)
            .json(&CredentialsBody::from(credentials));
        let resp = self.send(OP, req).await?;
        Self::json(OP, resp).await
    }

    async fn get_provider_models(&self, provider: &ProviderId) -> Result<Vec<ProviderModel>> {
        const OP: &str = "getProviderModels";
        let url = self.endpoint(&["providers", provider.as_str(), "models"]);
        let resp = self.send(OP, self.request(Method::GET, url)).await?;
        Self::json(OP, resp).await
    }

    async fn update_model(&self, model: &ModelId, patch: &ModelPatch) -> Result<()> {
        const OP: &str = "updateModel";
        let url = self.endpoint(&["models", model.as_str()]);
        self.send(OP, self.request(Method::PATCH, url).json(patch))
            .await?;
        Ok(())
    }

    async fn bulk_update_models(&self, models: &[ModelId], patch: &ModelPatch) -> Result<()> {
        const OP: &str = "bulkUpdateModels";
        let url = self.endpoint(&["models"]);
        let body = BulkUpdateBody {
            model_ids: models,
            patch,
        };
        self.send(OP, self.request(Method::PATCH, url).json(&body))
            .await?;
        Ok(())
    }
}
