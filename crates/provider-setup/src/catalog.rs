//! In-memory model catalog and the synchronizer that refreshes it.

use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use {
    chatdesk_common::{ModelId, ProviderId},
    serde::{Deserialize, Serialize},
    tracing::{info, warn},
};

use crate::{
    backend::{ProviderBackend, bounded},
    enforcer::Violation,
    error::{Error, Result},
    model::ProviderModel,
    status::{Operation, ProviderStatus},
};

/// Every model of one provider, in backend order.
///
/// `revision` changes whenever the catalog is replaced wholesale, so work
/// that started against an older catalog can tell it is stale.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    provider: ProviderId,
    models: Vec<ProviderModel>,
    revision: u64,
}

/// A local fix applied to a remote catalog that broke a flag invariant.
///
/// Repairs are never written back. Until a flag change for the model is sent,
/// the backend keeps its own flags, and an action whose target state the
/// repair already produced (saving a lifted model, say) has no delta and
/// sends nothing. A later change that does reach the model carries the
/// action's full patch, so deactivating and re-activating a lifted model
/// persists its saved flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    DroppedDuplicate(ModelId),
    /// Default model was not active.
    LiftedActive(ModelId),
    /// Active model was not saved.
    LiftedSaved(ModelId),
    ClearedExtraDefault(ModelId),
}

impl std::fmt::Display for Repair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DroppedDuplicate(id) => write!(f, "dropped duplicate entry for {id}"),
            Self::LiftedActive(id) => write!(f, "marked default model {id} active"),
            Self::LiftedSaved(id) => write!(f, "marked active model {id} saved"),
            Self::ClearedExtraDefault(id) => write!(f, "cleared extra default on {id}"),
        }
    }
}

/// Filter for catalog listings. Unset fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelQuery {
    pub family: Option<String>,
    pub saved: Option<bool>,
    pub active: Option<bool>,
    pub deprecated: Option<bool>,
    /// Case-insensitive substring of id, name or description.
    pub search: Option<String>,
}

impl ModelQuery {
    pub fn matches(&self, model: &ProviderModel) -> bool {
        if let Some(ref family) = self.family
            && !model.family.eq_ignore_ascii_case(family)
        {
            return false;
        }
        if self.saved.is_some_and(|saved| model.is_saved != saved)
            || self.active.is_some_and(|active| model.is_active != active)
            || self
                .deprecated
                .is_some_and(|deprecated| model.is_deprecated != deprecated)
        {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                model.id.as_str().to_lowercase().contains(&needle)
                    || model.name.to_lowercase().contains(&needle)
                    || model.description.to_lowercase().contains(&needle)
            },
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSummary {
    pub total: usize,
    pub saved: usize,
    pub active: usize,
    pub deprecated: usize,
    pub families: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<ModelId>,
}

impl Catalog {
    /// Wrap models as-is, without normalization.
    pub fn new(provider: impl Into<ProviderId>, models: Vec<ProviderModel>) -> Self {
        Self {
            provider: provider.into(),
            models,
            revision: 0,
        }
    }

    /// Build a catalog from a backend listing, repairing anything that breaks
    /// the flag invariants. Each repair is reported back and applies to the
    /// local copy only.
    pub fn from_remote(
        provider: impl Into<ProviderId>,
        models: Vec<ProviderModel>,
    ) -> (Self, Vec<Repair>) {
        let mut repairs = Vec::new();
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(models.len());
        let mut default_seen = false;

        for mut model in models {
            if !seen.insert(model.id.clone()) {
                repairs.push(Repair::DroppedDuplicate(model.id));
                continue;
            }
            if model.is_default && default_seen {
                model.is_default = false;
                repairs.push(Repair::ClearedExtraDefault(model.id.clone()));
            }
            if model.is_default {
                default_seen = true;
                if !model.is_active {
                    model.is_active = true;
                    repairs.push(Repair::LiftedActive(model.id.clone()));
                }
            }
            if model.is_active && !model.is_saved {
                model.is_saved = true;
                repairs.push(Repair::LiftedSaved(model.id.clone()));
            }
            kept.push(model);
        }

        (Self::new(provider, kept), repairs)
    }

    pub fn provider(&self) -> &ProviderId {
        &self.provider
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    pub fn models(&self) -> &[ProviderModel] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ProviderModel> {
        self.models.iter().find(|m| m.id.as_str() == id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut ProviderModel> {
        self.models.iter_mut().find(|m| m.id.as_str() == id)
    }

    pub(crate) fn models_mut(&mut self) -> impl Iterator<Item = &mut ProviderModel> {
        self.models.iter_mut()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn default_model(&self) -> Option<&ProviderModel> {
        self.models.iter().find(|m| m.is_default)
    }

    pub fn saved_ids(&self) -> Vec<ModelId> {
        self.models
            .iter()
            .filter(|m| m.is_saved)
            .map(|m| m.id.clone())
            .collect()
    }

    pub fn query(&self, query: &ModelQuery) -> Vec<&ProviderModel> {
        self.models.iter().filter(|m| query.matches(m)).collect()
    }

    /// Models grouped by family; models without a family land under `""`.
    pub fn by_family(&self) -> BTreeMap<&str, Vec<&ProviderModel>> {
        let mut groups: BTreeMap<&str, Vec<&ProviderModel>> = BTreeMap::new();
        for model in &self.models {
            groups.entry(model.family.as_str()).or_default().push(model);
        }
        groups
    }

    pub fn summary(&self) -> CatalogSummary {
        CatalogSummary {
            total: self.models.len(),
            saved: self.models.iter().filter(|m| m.is_saved).count(),
            active: self.models.iter().filter(|m| m.is_active).count(),
            deprecated: self.models.iter().filter(|m| m.is_deprecated).count(),
            families: self.by_family().len(),
            default_model: self.default_model().map(|m| m.id.clone()),
        }
    }

    /// Verify all three flag invariants over the whole catalog.
    pub fn check_invariants(&self) -> std::result::Result<(), Violation> {
        for model in &self.models {
            if model.is_active && !model.is_saved {
                return Err(Violation::ActiveRequiresSaved {
                    model: model.id.clone(),
                });
            }
            if model.is_default && !model.is_active {
                return Err(Violation::DefaultRequiresActive {
                    model: model.id.clone(),
                });
            }
        }
        let defaults: Vec<ModelId> = self
            .models
            .iter()
            .filter(|m| m.is_default)
            .map(|m| m.id.clone())
            .collect();
        if defaults.len() > 1 {
            return Err(Violation::MultipleDefaults { models: defaults });
        }
        Ok(())
    }
}

// ── Synchronizer ────────────────────────────────────────────────────────────

/// Fetches a provider's remote model list and turns it into a [`Catalog`].
#[derive(Clone)]
pub struct CatalogSynchronizer {
    backend: Arc<dyn ProviderBackend>,
    timeout: Duration,
}

impl CatalogSynchronizer {
    pub fn new(backend: Arc<dyn ProviderBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Fetch the authoritative catalog. `status` is the provider's status
    /// before the fetch began; calling from any state other than configured,
    /// ready, or a failed fetch is a caller bug and fails immediately.
    pub async fn fetch(&self, provider: &ProviderId, status: ProviderStatus) -> Result<Catalog> {
        if !status.permits(Operation::FetchModels) {
            return Err(Error::InvalidTransition {
                provider: provider.clone(),
                operation: Operation::FetchModels,
                status,
            });
        }

        let started = Instant::now();
        let models = bounded(
            "getProviderModels",
            self.timeout,
            self.backend.get_provider_models(provider),
        )
        .await?;

        let (catalog, repairs) = Catalog::from_remote(provider.clone(), models);
        for repair in &repairs {
            warn!(provider = %provider, %repair, "normalized remote catalog entry");
        }
        info!(
            provider = %provider,
            models = catalog.len(),
            repairs = repairs.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "fetched model catalog"
        );
        Ok(catalog)
    }
}

#[cfg(test)]
pub(crate) fn test_catalog(specs: &[(&str, &str)]) -> Catalog {
    use crate::model::test_model;

    let models = specs
        .iter()
        .map(|(id, flags)| {
            let mut model = test_model(id);
            model.is_saved = flags.contains('s');
            model.is_active = flags.contains('a');
            model.is_default = flags.contains('d');
            model
        })
        .collect();
    Catalog::new("openai", models)
}
