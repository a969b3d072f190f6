//! Provider registry and lifecycle engine.
//!
//! [`ProviderConsole`] owns every provider's record, catalog and selection,
//! and is the only way to move a provider through its lifecycle. Status
//! flips to the in-flight state before the first await, so a second
//! request that arrives meanwhile is rejected by the transition guard.

use std::{sync::Arc, time::Duration};

use {
    chatdesk_common::{ModelId, ProviderId},
    chatdesk_config::TimeoutsConfig,
    tracing::{info, warn},
};

use crate::{
    backend::{ProviderBackend, bounded},
    catalog::{Catalog, CatalogSummary, CatalogSynchronizer, ModelQuery},
    coordinator::{BulkAction, BulkCoordinator, BulkOutcome},
    error::{Error, Result},
    events::{Events, SetupBroadcaster},
    model::{FlagField, ProviderModel},
    prober::ConnectivityProber,
    provider::{CredentialsPatch, Provider, TestResult},
    state::{OperationTiming, ProviderQueues, ProviderTable},
    status::{FailedStage, Operation, ProviderStatus},
};

pub struct ProviderConsole {
    backend: Arc<dyn ProviderBackend>,
    table: ProviderTable,
    queues: ProviderQueues,
    events: Events,
    prober: ConnectivityProber,
    synchronizer: CatalogSynchronizer,
    coordinator: BulkCoordinator,
    save_timeout: Duration,
    list_timeout: Duration,
}

fn guard(provider: &Provider, operation: Operation) -> Result<()> {
    if provider.status.permits(operation) {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            provider: provider.id.clone(),
            operation,
            status: provider.status,
        })
    }
}

impl ProviderConsole {
    pub fn new(backend: Arc<dyn ProviderBackend>, timeouts: &TimeoutsConfig) -> Self {
        let table = ProviderTable::default();
        let queues = ProviderQueues::default();
        let events = Events::default();
        Self {
            prober: ConnectivityProber::new(Arc::clone(&backend), timeouts.test()),
            synchronizer: CatalogSynchronizer::new(Arc::clone(&backend), timeouts.fetch()),
            coordinator: BulkCoordinator::new(
                Arc::clone(&backend),
                table.clone(),
                queues.clone(),
                events.clone(),
                timeouts.update(),
            ),
            save_timeout: timeouts.save(),
            list_timeout: timeouts.fetch(),
            backend,
            table,
            queues,
            events,
        }
    }

    /// Set the broadcaster that receives status and catalog events.
    pub fn set_broadcaster(&self, broadcaster: Arc<dyn SetupBroadcaster>) {
        self.events.set(broadcaster);
    }

    /// Pull the provider list from the backend. Providers already known keep
    /// their local state; new ones the backend reports as configured start
    /// at `configured`.
    pub async fn load_providers(&self) -> Result<Vec<Provider>> {
        let records = bounded(
            "listProviders",
            self.list_timeout,
            self.backend.list_providers(),
        )
        .await?;

        let mut added = 0;
        for record in records {
            let mut provider = Provider::new(record.id, record.name);
            provider.icon = record.icon;
            if record.configured {
                provider.status = ProviderStatus::Configured;
                provider.persisted = true;
            }
            provider.model_count = record.model_count.unwrap_or_default();
            if self.table.upsert(provider) {
                added += 1;
            }
        }
        info!(added, "loaded providers");
        Ok(self.providers())
    }

    /// Register a provider the backend has not listed yet.
    pub fn insert_provider(
        &self,
        id: impl Into<ProviderId>,
        name: impl Into<String>,
    ) -> Result<Provider> {
        let provider = Provider::new(id, name);
        let id = provider.id.clone();
        self.table.upsert(provider);
        self.provider(&id)
    }

    pub fn providers(&self) -> Vec<Provider> {
        self.table.providers()
    }

    pub fn provider(&self, id: &ProviderId) -> Result<Provider> {
        self.table.with(id, |slot| Ok(slot.provider.clone()))
    }

    pub fn catalog(&self, id: &ProviderId) -> Result<Catalog> {
        self.table.with(id, |slot| slot.catalog().cloned())
    }

    pub fn models(&self, id: &ProviderId, query: &ModelQuery) -> Result<Vec<ProviderModel>> {
        self.table.with(id, |slot| {
            Ok(slot.catalog()?.query(query).into_iter().cloned().collect())
        })
    }

    pub fn summary(&self, id: &ProviderId) -> Result<CatalogSummary> {
        self.table.with(id, |slot| Ok(slot.catalog()?.summary()))
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Edit draft credentials. A change moves the provider back to
    /// `configuring` and drops the stale test result.
    pub async fn enter_credentials(
        &self,
        id: &ProviderId,
        patch: &CredentialsPatch,
    ) -> Result<Provider> {
        let (view, moved) = self.table.with(id, |slot| {
            let provider = &mut slot.provider;
            guard(provider, Operation::EnterCredentials)?;
            let changed = provider.credentials.apply(patch);
            let before = provider.status;
            if changed || before == ProviderStatus::Unconfigured {
                provider.status = ProviderStatus::Configuring;
                provider.test_result = None;
            }
            Ok((provider.clone(), provider.status != before))
        })?;
        if moved {
            self.events.status(&view).await;
        }
        Ok(view)
    }

    /// Run one connectivity test. Rejected while any other transition for
    /// this provider is in flight.
    pub async fn test_connection(&self, id: &ProviderId) -> Result<TestResult> {
        let _timing = OperationTiming::start("test-connection", id);
        let (credentials, view) = self.table.with(id, |slot| {
            let provider = &mut slot.provider;
            guard(provider, Operation::TestConnection)?;
            if !provider.credentials.is_complete() {
                return Err(Error::MissingCredentials {
                    provider: provider.id.clone(),
                });
            }
            provider.status = ProviderStatus::Testing;
            Ok((provider.credentials.clone(), provider.clone()))
        })?;
        self.events.status(&view).await;

        let result = self.prober.probe(id, &credentials).await;

        let view = self.table.with(id, |slot| {
            slot.provider.status = if result.success {
                ProviderStatus::TestPassed
            } else {
                ProviderStatus::TestFailed
            };
            slot.provider.test_result = Some(result.clone());
            // Providers hydrated from the backend never reveal their stored
            // key, so any tested key may differ from it.
            let replaced = slot
                .saved_credentials
                .as_ref()
                .is_none_or(|saved| !saved.same_as(&credentials));
            if replaced && slot.catalog.is_some() {
                info!(provider = %id, "credentials changed, discarding model catalog");
                slot.discard_catalog();
            }
            Ok(slot.provider.clone())
        })?;
        self.events.status(&view).await;
        Ok(result)
    }

    /// Persist tested credentials, then discover models.
    ///
    /// Returns the status the provider ends up in. A failed model fetch after
    /// a successful save is recorded on the provider (`error(fetch)`), not
    /// returned as an error.
    pub async fn save_provider(&self, id: &ProviderId) -> Result<ProviderStatus> {
        let timing = OperationTiming::start("save-provider", id);
        let (credentials, view) = self.table.with(id, |slot| {
            let provider = &mut slot.provider;
            guard(provider, Operation::SaveProvider)?;
            provider.status = ProviderStatus::Saving;
            Ok((provider.credentials.clone(), provider.clone()))
        })?;
        self.events.status(&view).await;

        let saved = bounded(
            "saveProvider",
            self.save_timeout,
            self.backend.save_provider(id, &credentials),
        )
        .await;

        match saved {
            Ok(record) => {
                let view = self.table.with(id, |slot| {
                    let provider = &mut slot.provider;
                    provider.status = ProviderStatus::Configured;
                    provider.persisted = true;
                    provider.last_error = None;
                    if !record.name.is_empty() {
                        provider.name = record.name;
                    }
                    slot.saved_credentials = Some(credentials);
                    Ok(slot.provider.clone())
                })?;
                self.events.status(&view).await;
                drop(timing);

                if let Err(e) = self.fetch_models(id).await {
                    warn!(provider = %id, error = %e, "model discovery after save failed");
                }
                Ok(self.provider(id)?.status)
            },
            Err(e) => {
                let view = self.table.with(id, |slot| {
                    slot.provider.status = ProviderStatus::Error {
                        stage: FailedStage::Save,
                    };
                    slot.provider.last_error = Some(e.to_string());
                    Ok(slot.provider.clone())
                })?;
                warn!(provider = %id, error = %e, "saving provider failed");
                self.events.status(&view).await;
                Err(e)
            },
        }
    }

    /// Replace the catalog with the backend's current model list.
    pub async fn fetch_models(&self, id: &ProviderId) -> Result<Catalog> {
        let _timing = OperationTiming::start("fetch-models", id);
        let (prior, view) = self.table.with(id, |slot| {
            let provider = &mut slot.provider;
            guard(provider, Operation::FetchModels)?;
            let prior = provider.status;
            provider.status = ProviderStatus::FetchingModels;
            Ok((prior, provider.clone()))
        })?;
        self.events.status(&view).await;

        let _turn = self.queues.acquire(id).await;
        let fetched = self.synchronizer.fetch(id, prior).await;

        match fetched {
            Ok(catalog) => {
                let (catalog, summary, view) = self.table.with(id, |slot| {
                    let installed = slot.install_catalog(catalog).clone();
                    let summary = installed.summary();
                    slot.provider.status = ProviderStatus::Ready;
                    slot.provider.last_error = None;
                    Ok((installed, summary, slot.provider.clone()))
                })?;
                self.events.status(&view).await;
                self.events
                    .models(id, catalog.revision(), &summary, &[])
                    .await;
                Ok(catalog)
            },
            Err(e) => {
                let view = self.table.with(id, |slot| {
                    slot.provider.status = ProviderStatus::Error {
                        stage: FailedStage::Fetch,
                    };
                    slot.provider.last_error = Some(e.to_string());
                    Ok(slot.provider.clone())
                })?;
                warn!(provider = %id, error = %e, "fetching models failed");
                self.events.status(&view).await;
                Err(e)
            },
        }
    }

    /// Drop draft credentials, test result, error and catalog. The
    /// credential store is not touched.
    pub async fn reset_provider(&self, id: &ProviderId) -> Result<Provider> {
        let view = self.table.with(id, |slot| {
            guard(&slot.provider, Operation::ResetProvider)?;
            slot.discard_catalog();
            let provider = &mut slot.provider;
            provider.credentials = Default::default();
            provider.test_result = None;
            provider.last_error = None;
            provider.model_count = 0;
            provider.saved_model_ids.clear();
            provider.status = ProviderStatus::Unconfigured;
            Ok(provider.clone())
        })?;
        info!(provider = %id, "provider reset");
        self.events.status(&view).await;
        Ok(view)
    }

    // ── Model flags ─────────────────────────────────────────────────────────

    pub fn coordinator(&self) -> &BulkCoordinator {
        &self.coordinator
    }

    pub async fn execute(
        &self,
        id: &ProviderId,
        models: &[ModelId],
        action: BulkAction,
    ) -> Result<BulkOutcome> {
        self.coordinator.execute(id, models, action).await
    }

    pub async fn execute_selection(&self, id: &ProviderId, action: BulkAction) -> Result<BulkOutcome> {
        self.coordinator.execute_selection(id, action).await
    }

    pub async fn toggle(
        &self,
        id: &ProviderId,
        model: &ModelId,
        field: FlagField,
    ) -> Result<BulkOutcome> {
        self.coordinator.toggle(id, model, field).await
    }
}
