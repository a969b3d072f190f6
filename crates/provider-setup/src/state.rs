//! Per-provider shared state and the queues that serialize work on it.
//!
//! The table lock is a plain `std::sync::Mutex`; it is only ever held inside
//! [`ProviderTable::with`] and never across an await.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{Arc, Mutex},
    time::Instant,
};

use {
    chatdesk_common::{ModelId, ProviderId},
    tokio::sync::OwnedMutexGuard,
    tracing::info,
};

use crate::{
    catalog::Catalog,
    error::{Error, Result},
    provider::{Credentials, Provider},
};

pub(crate) struct ProviderSlot {
    pub provider: Provider,
    /// Credentials last accepted by the credential store in this session.
    pub saved_credentials: Option<Credentials>,
    pub catalog: Option<Catalog>,
    pub selection: BTreeSet<ModelId>,
    last_revision: u64,
}

impl ProviderSlot {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            saved_credentials: None,
            catalog: None,
            selection: BTreeSet::new(),
            last_revision: 0,
        }
    }

    /// Replace the catalog wholesale under a fresh revision.
    pub fn install_catalog(&mut self, catalog: Catalog) -> &Catalog {
        self.last_revision += 1;
        let catalog = catalog.with_revision(self.last_revision);
        self.selection.retain(|id| catalog.contains(id.as_str()));
        self.provider.model_count = catalog.len();
        self.provider.saved_model_ids = catalog.saved_ids();
        self.catalog.insert(catalog)
    }

    pub fn discard_catalog(&mut self) {
        self.catalog = None;
        self.selection.clear();
    }

    pub fn refresh_caches(&mut self) {
        if let Some(ref catalog) = self.catalog {
            self.provider.model_count = catalog.len();
            self.provider.saved_model_ids = catalog.saved_ids();
        }
    }

    pub fn catalog(&self) -> Result<&Catalog> {
        self.catalog.as_ref().ok_or_else(|| Error::CatalogNotLoaded {
            provider: self.provider.id.clone(),
        })
    }
}

#[derive(Clone, Default)]
pub(crate) struct ProviderTable(Arc<Mutex<BTreeMap<ProviderId, ProviderSlot>>>);

impl ProviderTable {
    /// Run `f` against one provider's slot under the table lock.
    pub fn with<T>(
        &self,
        provider: &ProviderId,
        f: impl FnOnce(&mut ProviderSlot) -> Result<T>,
    ) -> Result<T> {
        let mut table = self.0.lock().unwrap_or_else(|e| e.into_inner());
        let slot = table.get_mut(provider).ok_or_else(|| Error::UnknownProvider {
            provider: provider.clone(),
        })?;
        f(slot)
    }

    /// Insert a provider, or refresh display fields of an existing one.
    /// Returns whether the provider was new.
    pub fn upsert(&self, provider: Provider) -> bool {
        let mut table = self.0.lock().unwrap_or_else(|e| e.into_inner());
        match table.get_mut(&provider.id) {
            Some(slot) => {
                slot.provider.name = provider.name;
                slot.provider.icon = provider.icon;
                false
            },
            None => {
                table.insert(provider.id.clone(), ProviderSlot::new(provider));
                true
            },
        }
    }

    pub fn providers(&self) -> Vec<Provider> {
        let table = self.0.lock().unwrap_or_else(|e| e.into_inner());
        table.values().map(|slot| slot.provider.clone()).collect()
    }
}

/// One fair FIFO queue per provider for catalog-mutating work.
#[derive(Clone, Default)]
pub(crate) struct ProviderQueues(Arc<Mutex<HashMap<ProviderId, Arc<tokio::sync::Mutex<()>>>>>);

impl ProviderQueues {
    pub async fn acquire(&self, provider: &ProviderId) -> OwnedMutexGuard<()> {
        let queue = {
            let mut queues = self.0.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(queues.entry(provider.clone()).or_default())
        };
        queue.lock_owned().await
    }
}

/// Logs start and finish of a provider operation with its duration.
pub(crate) struct OperationTiming {
    operation: &'static str,
    provider: ProviderId,
    started: Instant,
}

impl OperationTiming {
    pub fn start(operation: &'static str, provider: &ProviderId) -> Self {
        info!(operation, provider = %provider, "provider operation started");
        Self {
            operation,
            provider: provider.clone(),
            started: Instant::now(),
        }
    }
}

impl Drop for OperationTiming {
    fn drop(&mut self) {
        info!(
            operation = self.operation,
            provider = %self.provider,
            elapsed_ms = self.started.elapsed().as_millis(),
            "provider operation finished"
        );
    }
}
