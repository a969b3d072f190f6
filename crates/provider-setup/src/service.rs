use std::sync::Arc;

use {
    async_trait::async_trait,
    chatdesk_common::{ModelId, ProviderId},
    serde_json::{Value, json},
};

use chatdesk_service_traits::{ProviderSetupService, ServiceError, ServiceResult};

use crate::{
    catalog::ModelQuery,
    console::ProviderConsole,
    coordinator::BulkAction,
    model::FlagField,
    provider::CredentialsPatch,
};

/// [`ProviderSetupService`] backed by a live [`ProviderConsole`].
pub struct LiveProviderSetupService {
    console: Arc<ProviderConsole>,
}

impl LiveProviderSetupService {
    pub fn new(console: Arc<ProviderConsole>) -> Self {
        Self { console }
    }

    pub fn console(&self) -> &Arc<ProviderConsole> {
        &self.console
    }
}

fn provider_param(params: &Value) -> ServiceResult<ProviderId> {
    params
        .get("provider")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(ProviderId::from)
        .ok_or_else(|| "missing 'provider' parameter".into())
}

fn string_param<'a>(params: &'a Value, name: &str) -> ServiceResult<&'a str> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::rejected(format!("missing '{name}' parameter")))
}

/// `models` as a list of ids; absent means "not given".
fn models_param(params: &Value) -> ServiceResult<Option<Vec<ModelId>>> {
    match params.get("models") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(ModelId::from)
                    .ok_or_else(|| ServiceError::rejected("'models' must be a list of model ids"))
            })
            .collect::<ServiceResult<Vec<_>>>()
            .map(Some),
        Some(_) => Err("'models' must be a list of model ids".into()),
    }
}

fn query_param(params: &Value) -> ServiceResult<ModelQuery> {
    let mut query: ModelQuery = serde_json::from_value(params.clone())?;
    if params.get("includeDeprecated").and_then(Value::as_bool) == Some(false) {
        query.deprecated = Some(false);
    }
    Ok(query)
}

#[async_trait]
impl ProviderSetupService for LiveProviderSetupService {
    async fn list(&self) -> ServiceResult {
        let mut providers = Vec::new();
        for provider in self.console.providers() {
            let mut entry = serde_json::to_value(&provider)?;
            if let Ok(summary) = self.console.summary(&provider.id)
                && let Some(obj) = entry.as_object_mut()
            {
                obj.insert("catalog".into(), serde_json::to_value(summary)?);
            }
            providers.push(entry);
        }
        Ok(Value::Array(providers))
    }

    async fn enter_credentials(&self, params: Value) -> ServiceResult {
        let provider = provider_param(&params)?;
        let patch: CredentialsPatch = serde_json::from_value(params)?;
        let view = self.console.enter_credentials(&provider, &patch).await?;
        Ok(serde_json::to_value(view)?)
    }

    async fn test_connection(&self, params: Value) -> ServiceResult {
        let provider = provider_param(&params)?;
        let result = self.console.test_connection(&provider).await?;
        Ok(serde_json::to_value(result)?)
    }

    async fn save(&self, params: Value) -> ServiceResult {
        let provider = provider_param(&params)?;
        self.console.save_provider(&provider).await?;
        Ok(serde_json::to_value(self.console.provider(&provider)?)?)
    }

    async fn fetch_models(&self, params: Value) -> ServiceResult {
        let provider = provider_param(&params)?;
        let catalog = self.console.fetch_models(&provider).await?;
        Ok(json!({
            "provider": provider,
            "revision": catalog.revision(),
            "summary": catalog.summary(),
        }))
    }

    async fn reset(&self, params: Value) -> ServiceResult {
        let provider = provider_param(&params)?;
        let view = self.console.reset_provider(&provider).await?;
        Ok(serde_json::to_value(view)?)
    }

    async fn models(&self, params: Value) -> ServiceResult {
        let provider = provider_param(&params)?;
        let query = query_param(&params)?;
        let models = self.console.models(&provider, &query)?;
        Ok(json!({
            "models": models,
            "summary": self.console.summary(&provider)?,
            "selection": self.console.coordinator().selection(&provider)?,
        }))
    }

    async fn select_models(&self, params: Value) -> ServiceResult {
        let provider = provider_param(&params)?;
        let coordinator = self.console.coordinator();
        let models = models_param(&params)?.unwrap_or_default();
        let selection = match string_param(&params, "op")? {
            "add" => coordinator.select(&provider, &models)?,
            "remove" => coordinator.deselect(&provider, &models)?,
            "all" => coordinator.select_all(&provider, &query_param(&params)?)?,
            "clear" => {
                coordinator.clear_selection(&provider)?;
                Vec::new()
            },
            other => return Err(format!("unknown selection op: {other}").into()),
        };
        Ok(json!({ "selection": selection }))
    }

    async fn bulk_update(&self, params: Value) -> ServiceResult {
        let provider = provider_param(&params)?;
        let action: BulkAction = string_param(&params, "action")?.parse()?;
        let outcome = match models_param(&params)? {
            Some(models) => self.console.execute(&provider, &models, action).await?,
            None => self.console.execute_selection(&provider, action).await?,
        };
        Ok(serde_json::to_value(outcome)?)
    }

    async fn toggle_model(&self, params: Value) -> ServiceResult {
        let provider = provider_param(&params)?;
        let model = ModelId::from(string_param(&params, "model")?);
        let field: FlagField = string_param(&params, "field")?.parse()?;
        let outcome = self.console.toggle(&provider, &model, field).await?;
        Ok(serde_json::to_value(outcome)?)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{model::test_model, testing::ScriptedBackend},
        chatdesk_config::TimeoutsConfig,
    };

    fn service(backend: &Arc<ScriptedBackend>) -> LiveProviderSetupService {
        let console = ProviderConsole::new(backend.clone(), &TimeoutsConfig::default());
        console.insert_provider("openai", "OpenAI").unwrap();
        LiveProviderSetupService::new(Arc::new(console))
    }

    #[tokio::test]
    async fn rejects_missing_provider_param() {
        let backend = Arc::new(ScriptedBackend::default());
        let err = service(&backend)
            .test_connection(json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing 'provider'"));
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn onboarding_and_bulk_through_json() {
        let backend = Arc::new(ScriptedBackend::default());
        let mut gpt = test_model("gpt-4o");
        gpt.is_saved = true;
        backend.set_models(vec![gpt, test_model("gpt-4o-mini"), test_model("o3")]);
        let svc = service(&backend);

        let view = svc
            .enter_credentials(json!({"provider": "openai", "apiKey": "sk-1"}))
            .await
            .unwrap();
        assert_eq!(view["status"]["state"], "configuring");
        assert_eq!(view["credentials"]["hasApiKey"], true);

        let result = svc
            .test_connection(json!({"provider": "openai"}))
            .await
            .unwrap();
        assert_eq!(result["success"], true);

        let saved = svc.save(json!({"provider": "openai"})).await.unwrap();
        assert_eq!(saved["status"]["state"], "ready");
        assert_eq!(saved["modelCount"], 3);

        let listing = svc
            .models(json!({"provider": "openai", "family": "gpt"}))
            .await
            .unwrap();
        assert_eq!(listing["models"].as_array().unwrap().len(), 2);

        svc.select_models(json!({"provider": "openai", "op": "add", "models": ["o3"]}))
            .await
            .unwrap();
        let outcome = svc
            .bulk_update(json!({"provider": "openai", "action": "activate"}))
            .await
            .unwrap();
        assert_eq!(outcome["deltas"][0]["modelId"], "o3");
        assert_eq!(outcome["deltas"][0]["patch"], json!({"isSaved": true, "isActive": true}));

        let outcome = svc
            .toggle_model(json!({"provider": "openai", "model": "o3", "field": "isDefault"}))
            .await
            .unwrap();
        assert_eq!(outcome["batches"], 1);

        let list = svc.list().await.unwrap();
        assert_eq!(list[0]["catalog"]["defaultModel"], "o3");
        assert_eq!(list[0]["catalog"]["active"], 1);
    }

    #[tokio::test]
    async fn engine_rejections_map_to_invalid_request() {
        let backend = Arc::new(ScriptedBackend::default());
        let svc = service(&backend);

        let err = svc.save(json!({"provider": "openai"})).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");

        let err = svc
            .bulk_update(json!({"provider": "openai", "action": "promote"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown bulk action"));

        let err = svc
            .select_models(json!({"provider": "openai", "op": "add", "models": "o3"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn connectivity_failures_map_to_unavailable() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.fail_next(crate::testing::Call::Save, "store offline");
        let svc = service(&backend);
        svc.enter_credentials(json!({"provider": "openai", "apiKey": "sk-1"}))
            .await
            .unwrap();
        svc.test_connection(json!({"provider": "openai"}))
            .await
            .unwrap();

        let err = svc.save(json!({"provider": "openai"})).await.unwrap_err();
        assert_eq!(err.code(), "UNAVAILABLE");
        assert_eq!(err.to_string(), "store offline");
    }
}
