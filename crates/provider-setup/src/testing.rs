//! In-memory backend for driving the engine without a network.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use {
    async_trait::async_trait,
    chatdesk_common::{ModelId, ProviderId},
    tokio::sync::watch,
};

use crate::{
    backend::{ConnectionReport, ProviderBackend, ProviderRecord},
    error::{Error, Result},
    model::{ModelPatch, ProviderModel},
    provider::Credentials,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Call {
    List,
    Test,
    Save,
    Fetch,
    Update,
    BulkUpdate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Calls {
    pub lists: usize,
    pub tests: usize,
    pub saves: usize,
    pub fetches: usize,
    pub updates: usize,
    pub bulk_updates: usize,
}

impl Calls {
    fn bump(&mut self, call: Call) -> usize {
        let slot = match call {
            Call::List => &mut self.lists,
            Call::Test => &mut self.tests,
            Call::Save => &mut self.saves,
            Call::Fetch => &mut self.fetches,
            Call::Update => &mut self.updates,
            Call::BulkUpdate => &mut self.bulk_updates,
        };
        *slot += 1;
        *slot
    }
}

struct Script {
    providers: Vec<ProviderRecord>,
    models: Vec<ProviderModel>,
    report: ConnectionReport,
    calls: Calls,
    /// Call kind and 1-based call number that should fail, with its message.
    failures: HashMap<(Call, usize), String>,
    held: HashSet<Call>,
    updates: Vec<(Vec<ModelId>, ModelPatch)>,
    last_tested: Option<Credentials>,
}

/// Scripted [`ProviderBackend`]. Calls succeed by default; individual calls
/// can be made to fail or to block until [`ScriptedBackend::release`].
pub(crate) struct ScriptedBackend {
    script: Mutex<Script>,
    gate: watch::Sender<bool>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            script: Mutex::new(Script {
                providers: Vec::new(),
                models: Vec::new(),
                report: ConnectionReport {
                    success: true,
                    message: "Connection successful".into(),
                    latency: Some(42.0),
                    timestamp: "2026-01-01T00:00:00Z".into(),
                },
                calls: Calls::default(),
                failures: HashMap::new(),
                held: HashSet::new(),
                updates: Vec::new(),
                last_tested: None,
            }),
            gate: watch::Sender::new(false),
        }
    }
}

impl ScriptedBackend {
    fn with_script<T>(&self, f: impl FnOnce(&mut Script) -> T) -> T {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut script)
    }

    pub fn set_providers(&self, providers: Vec<ProviderRecord>) {
        self.with_script(|s| s.providers = providers);
    }

    pub fn set_models(&self, models: Vec<ProviderModel>) {
        self.with_script(|s| s.models = models);
    }

    pub fn set_report(&self, report: ConnectionReport) {
        self.with_script(|s| s.report = report);
    }

    /// Fail the next call of this kind with an application error.
    pub fn fail_next(&self, call: Call, message: &str) {
        self.with_script(|s| {
            let next = match call {
                Call::List => s.calls.lists,
                Call::Test => s.calls.tests,
                Call::Save => s.calls.saves,
                Call::Fetch => s.calls.fetches,
                Call::Update => s.calls.updates,
                Call::BulkUpdate => s.calls.bulk_updates,
            } + 1;
            s.failures.insert((call, next), message.to_string());
        });
    }

    /// Fail the `nth` (1-based, counted from construction) call of this kind.
    pub fn fail_on(&self, call: Call, nth: usize, message: &str) {
        self.with_script(|s| s.failures.insert((call, nth), message.to_string()));
    }

    /// Block calls of this kind until [`Self::release`].
    pub fn hold(&self, call: Call) {
        self.with_script(|s| s.held.insert(call));
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn calls(&self) -> Calls {
        self.with_script(|s| s.calls.clone())
    }

    /// Every successful update call in order; single-model updates appear as
    /// one-element lists.
    pub fn updates(&self) -> Vec<(Vec<ModelId>, ModelPatch)> {
        self.with_script(|s| s.updates.clone())
    }

    pub fn last_tested(&self) -> Option<Credentials> {
        self.with_script(|s| s.last_tested.clone())
    }

    async fn enter(&self, call: Call) -> Result<()> {
        let (failure, held) = self.with_script(|s| {
            let n = s.calls.bump(call);
            (s.failures.remove(&(call, n)), s.held.contains(&call))
        });
        if held {
            let mut open = self.gate.subscribe();
            let _ = open.wait_for(|open| *open).await;
        }
        match failure {
            Some(message) => Err(Error::application("scripted", message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProviderBackend for ScriptedBackend {
    async fn list_providers(&self) -> Result<Vec<ProviderRecord>> {
        self.enter(Call::List).await?;
        Ok(self.with_script(|s| s.providers.clone()))
    }

    async fn test_provider_connection(
        &self,
        _provider: &ProviderId,
        credentials: &Credentials,
    ) -> Result<ConnectionReport> {
        self.with_script(|s| s.last_tested = Some(credentials.clone()));
        self.enter(Call::Test).await?;
        Ok(self.with_script(|s| s.report.clone()))
    }

    async fn save_provider(
        &self,
        provider: &ProviderId,
        _credentials: &Credentials,
    ) -> Result<ProviderRecord> {
        self.enter(Call::Save).await?;
        Ok(ProviderRecord {
            id: provider.clone(),
            name: provider.to_string(),
            icon: None,
            configured: true,
            model_count: None,
        })
    }

    async fn get_provider_models(&self, _provider: &ProviderId) -> Result<Vec<ProviderModel>> {
        self.enter(Call::Fetch).await?;
        Ok(self.with_script(|s| s.models.clone()))
    }

    async fn update_model(&self, model: &ModelId, patch: &ModelPatch) -> Result<()> {
        self.enter(Call::Update).await?;
        self.with_script(|s| s.updates.push((vec![model.clone()], *patch)));
        Ok(())
    }

    async fn bulk_update_models(&self, models: &[ModelId], patch: &ModelPatch) -> Result<()> {
        self.enter(Call::BulkUpdate).await?;
        self.with_script(|s| s.updates.push((models.to_vec(), *patch)));
        Ok(())
    }
}
