//! Bulk and single-model flag changes with optimistic local updates.
//!
//! Each operation runs under the provider's queue:
//!
//! 1. compute the next catalog with the enforcer (no network);
//! 2. snapshot the catalog and install the result locally;
//! 3. send the changes: one call carrying the action's patch, or for a
//!    default move, one call per group of identical patches;
//! 4. commit on success, restore the snapshot on failure.
//!
//! A catalog replaced or discarded while calls were in flight is left alone.

use std::{collections::HashMap, str::FromStr, sync::Arc, time::Duration};

use {
    chatdesk_common::{ModelId, ProviderId},
    serde::{Deserialize, Serialize},
    tracing::{info, warn},
};

use crate::{
    backend::{ProviderBackend, bounded},
    catalog::{Catalog, ModelQuery},
    enforcer::{self, FlagEdit, ModelDelta},
    error::{Error, Result},
    events::Events,
    model::{FlagField, ModelPatch},
    state::{OperationTiming, ProviderQueues, ProviderSlot, ProviderTable},
    status::Operation,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BulkAction {
    Save,
    /// Unsave and deactivate together.
    Unsave,
    Activate,
    Deactivate,
    /// Exactly one target.
    SetDefault,
}

impl BulkAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Unsave => "unsave",
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
            Self::SetDefault => "set-default",
        }
    }

    pub fn edits(self) -> Vec<FlagEdit> {
        match self {
            Self::Save => vec![FlagEdit::new(FlagField::Saved, true)],
            Self::Unsave => vec![
                FlagEdit::new(FlagField::Saved, false),
                FlagEdit::new(FlagField::Active, false),
            ],
            Self::Activate => vec![FlagEdit::new(FlagField::Active, true)],
            Self::Deactivate => vec![FlagEdit::new(FlagField::Active, false)],
            Self::SetDefault => vec![FlagEdit::new(FlagField::Default, true)],
        }
    }

    /// Patch that takes any target to the action's end state. `None` for
    /// `SetDefault`, whose previous holder needs a different patch.
    pub fn patch(self) -> Option<ModelPatch> {
        let (is_saved, is_active, is_default) = match self {
            Self::Save => (Some(true), None, None),
            Self::Unsave => (Some(false), Some(false), Some(false)),
            Self::Activate => (Some(true), Some(true), None),
            Self::Deactivate => (None, Some(false), Some(false)),
            Self::SetDefault => return None,
        };
        Some(ModelPatch {
            is_saved,
            is_active,
            is_default,
        })
    }
}

impl std::fmt::Display for BulkAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BulkAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "save" => Ok(Self::Save),
            "unsave" => Ok(Self::Unsave),
            "activate" => Ok(Self::Activate),
            "deactivate" => Ok(Self::Deactivate),
            "set-default" | "default" => Ok(Self::SetDefault),
            other => Err(format!("unknown bulk action: {other}")),
        }
    }
}

/// One network call: the same patch for every listed model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBatch {
    pub model_ids: Vec<ModelId>,
    pub patch: ModelPatch,
}

/// Group deltas by identical patch. Groups that turn a flag off go first so
/// the backend never sees two defaults at once.
pub fn plan_batches(deltas: &[ModelDelta]) -> Vec<UpdateBatch> {
    let mut index: HashMap<ModelPatch, usize> = HashMap::new();
    let mut batches: Vec<UpdateBatch> = Vec::new();
    for delta in deltas {
        match index.get(&delta.patch) {
            Some(&i) => batches[i].model_ids.push(delta.model_id.clone()),
            None => {
                index.insert(delta.patch, batches.len());
                batches.push(UpdateBatch {
                    model_ids: vec![delta.model_id.clone()],
                    patch: delta.patch,
                });
            },
        }
    }
    batches.sort_by_key(|batch| !batch.patch.clears_any());
    batches
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub deltas: Vec<ModelDelta>,
    pub side_effects: Vec<ModelDelta>,
    pub batches: usize,
    /// Catalog revision the change was committed to.
    pub revision: u64,
}

#[derive(Clone)]
pub struct BulkCoordinator {
    backend: Arc<dyn ProviderBackend>,
    table: ProviderTable,
    queues: ProviderQueues,
    events: Events,
    timeout: Duration,
}

impl BulkCoordinator {
    pub(crate) fn new(
        backend: Arc<dyn ProviderBackend>,
        table: ProviderTable,
        queues: ProviderQueues,
        events: Events,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            table,
            queues,
            events,
            timeout,
        }
    }

    /// Apply `action` to explicit models. Clears the selection on commit.
    pub async fn execute(
        &self,
        provider: &ProviderId,
        models: &[ModelId],
        action: BulkAction,
    ) -> Result<BulkOutcome> {
        self.run(provider, action.as_str(), true, action.patch(), |_| {
            Ok((models.to_vec(), action.edits()))
        })
        .await
    }

    /// Apply `action` to the current selection.
    pub async fn execute_selection(
        &self,
        provider: &ProviderId,
        action: BulkAction,
    ) -> Result<BulkOutcome> {
        self.run(provider, action.as_str(), true, action.patch(), |slot| {
            Ok((slot.selection.iter().cloned().collect(), action.edits()))
        })
        .await
    }

    /// Flip one flag on one model. The selection is left as is.
    pub async fn toggle(
        &self,
        provider: &ProviderId,
        model: &ModelId,
        field: FlagField,
    ) -> Result<BulkOutcome> {
        self.run(provider, "toggle", false, None, |slot| {
            let current = slot
                .catalog()?
                .get(model.as_str())
                .ok_or_else(|| Error::UnknownModel {
                    provider: provider.clone(),
                    model: model.clone(),
                })?
                .flag(field);
            Ok((vec![model.clone()], vec![FlagEdit::new(field, !current)]))
        })
        .await
    }

    async fn run<F>(
        &self,
        provider: &ProviderId,
        label: &'static str,
        clear_selection: bool,
        uniform: Option<ModelPatch>,
        plan: F,
    ) -> Result<BulkOutcome>
    where
        F: FnOnce(&ProviderSlot) -> Result<(Vec<ModelId>, Vec<FlagEdit>)> + Send,
    {
        let _timing = OperationTiming::start(label, provider);
        let _turn = self.queues.acquire(provider).await;

        let prepared = self.table.with(provider, |slot| {
            let status = slot.provider.status;
            if !status.permits(Operation::UpdateModels) {
                return Err(Error::InvalidTransition {
                    provider: provider.clone(),
                    operation: Operation::UpdateModels,
                    status,
                });
            }
            if !slot.provider.persisted {
                return Err(Error::NotPersisted {
                    provider: provider.clone(),
                });
            }
            let (targets, edits) = plan(&*slot)?;
            let catalog = slot.catalog()?;
            let enforcement = enforcer::apply_edits(catalog, &targets, &edits)?;
            let revision = catalog.revision();

            if enforcement.is_noop() {
                if clear_selection {
                    slot.selection.clear();
                }
                return Ok(Err(revision));
            }
            let snapshot = catalog.clone();
            slot.catalog = Some(enforcement.catalog.clone());
            Ok(Ok((snapshot, enforcement)))
        })?;

        let (snapshot, enforcement) = match prepared {
            Ok(prepared) => prepared,
            Err(revision) => {
                info!(provider = %provider, action = label, "no flag changes needed");
                return Ok(BulkOutcome {
                    revision,
                    ..Default::default()
                });
            },
        };

        let batches = match uniform.filter(|_| enforcement.side_effects.is_empty()) {
            Some(patch) => vec![UpdateBatch {
                model_ids: enforcement
                    .deltas
                    .iter()
                    .map(|delta| delta.model_id.clone())
                    .collect(),
                patch,
            }],
            None => plan_batches(&enforcement.deltas),
        };
        let mut applied = 0;
        let mut failure = None;
        for batch in &batches {
            let sent = match batch.model_ids.as_slice() {
                [single] => {
                    bounded(
                        "updateModel",
                        self.timeout,
                        self.backend.update_model(single, &batch.patch),
                    )
                    .await
                },
                many => {
                    bounded(
                        "bulkUpdateModels",
                        self.timeout,
                        self.backend.bulk_update_models(many, &batch.patch),
                    )
                    .await
                },
            };
            match sent {
                Ok(()) => applied += 1,
                Err(e) => {
                    failure = Some(e);
                    break;
                },
            }
        }

        let revision = snapshot.revision();
        let succeeded = failure.is_none();
        let committed = self.table.with(provider, |slot| {
            if slot.catalog.as_ref().map(Catalog::revision) != Some(revision) {
                return Ok(None);
            }
            if succeeded {
                slot.refresh_caches();
                if clear_selection {
                    slot.selection.clear();
                }
                Ok(slot.catalog.as_ref().map(Catalog::summary))
            } else {
                slot.catalog = Some(snapshot);
                Ok(None)
            }
        })?;

        if let Some(e) = failure {
            warn!(
                provider = %provider,
                action = label,
                applied,
                total = batches.len(),
                error = %e,
                "model update failed, local changes rolled back"
            );
            return Err(if applied > 0 {
                Error::PartiallyApplied {
                    applied,
                    total: batches.len(),
                    source: Box::new(e),
                }
            } else {
                e
            });
        }

        match committed {
            Some(summary) => {
                info!(
                    provider = %provider,
                    action = label,
                    changed = enforcement.deltas.len(),
                    side_effects = enforcement.side_effects.len(),
                    calls = batches.len(),
                    "model flags committed"
                );
                self.events
                    .models(provider, revision, &summary, &enforcement.deltas)
                    .await;
            },
            None => warn!(
                provider = %provider,
                action = label,
                "catalog replaced while updating; result not applied locally"
            ),
        }

        Ok(BulkOutcome {
            deltas: enforcement.deltas,
            side_effects: enforcement.side_effects,
            batches: batches.len(),
            revision,
        })
    }

    // ── Selection ───────────────────────────────────────────────────────────

    pub fn select(&self, provider: &ProviderId, models: &[ModelId]) -> Result<Vec<ModelId>> {
        self.table.with(provider, |slot| {
            let catalog = slot.catalog()?;
            if let Some(unknown) = models.iter().find(|id| !catalog.contains(id.as_str())) {
                return Err(Error::UnknownModel {
                    provider: provider.clone(),
                    model: unknown.clone(),
                });
            }
            slot.selection.extend(models.iter().cloned());
            Ok(slot.selection.iter().cloned().collect())
        })
    }

    pub fn deselect(&self, provider: &ProviderId, models: &[ModelId]) -> Result<Vec<ModelId>> {
        self.table.with(provider, |slot| {
            for id in models {
                slot.selection.remove(id);
            }
            Ok(slot.selection.iter().cloned().collect())
        })
    }

    /// Select every model matching `query`.
    pub fn select_all(&self, provider: &ProviderId, query: &ModelQuery) -> Result<Vec<ModelId>> {
        self.table.with(provider, |slot| {
            let matching: Vec<ModelId> = slot
                .catalog()?
                .query(query)
                .into_iter()
                .map(|m| m.id.clone())
                .collect();
            slot.selection.extend(matching);
            Ok(slot.selection.iter().cloned().collect())
        })
    }

    pub fn clear_selection(&self, provider: &ProviderId) -> Result<()> {
        self.table.with(provider, |slot| {
            slot.selection.clear();
            Ok(())
        })
    }

    pub fn selection(&self, provider: &ProviderId) -> Result<Vec<ModelId>> {
        self.table
            .with(provider, |slot| Ok(slot.selection.iter().cloned().collect()))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::catalog::test_catalog, rstest::rstest};

    fn delta(id: &str, patch: ModelPatch) -> ModelDelta {
        ModelDelta {
            model_id: ModelId::new(id),
            patch,
        }
    }

    #[test]
    fn identical_patches_share_a_batch_and_clears_go_first() {
        let on = ModelPatch {
            is_active: Some(true),
            ..Default::default()
        };
        let off = ModelPatch {
            is_default: Some(false),
            ..Default::default()
        };
        let batches = plan_batches(&[delta("a", on), delta("b", off), delta("c", on)]);
        assert_eq!(batches, vec![
            UpdateBatch {
                model_ids: vec![ModelId::new("b")],
                patch: off,
            },
            UpdateBatch {
                model_ids: vec![ModelId::new("a"), ModelId::new("c")],
                patch: on,
            },
        ]);
    }

    #[rstest]
    #[case("save", BulkAction::Save)]
    #[case("unsave", BulkAction::Unsave)]
    #[case(" activate", BulkAction::Activate)]
    #[case("deactivate", BulkAction::Deactivate)]
    #[case("default", BulkAction::SetDefault)]
    #[case("set-default", BulkAction::SetDefault)]
    fn action_parses(#[case] raw: &str, #[case] expected: BulkAction) {
        assert_eq!(raw.parse::<BulkAction>().unwrap(), expected);
    }

    #[rstest]
    #[case(BulkAction::Save, &["c", "d"])]
    #[case(BulkAction::Activate, &["b", "c", "d"])]
    #[case(BulkAction::Deactivate, &["a", "b", "d"])]
    #[case(BulkAction::Unsave, &["a", "b", "c"])]
    fn action_patch_reproduces_enforced_flags(
        #[case] action: BulkAction,
        #[case] targets: &[&str],
    ) {
        let catalog = test_catalog(&[("a", "sad"), ("b", "sa"), ("c", "s"), ("d", "")]);
        let targets: Vec<ModelId> = targets.iter().map(|id| ModelId::new(*id)).collect();
        let enforced = enforcer::apply_edits(&catalog, &targets, &action.edits()).unwrap();
        assert!(enforced.side_effects.is_empty());

        let patch = action.patch().unwrap();
        let mut sent = catalog.clone();
        for delta in &enforced.deltas {
            patch.apply_to(sent.get_mut(delta.model_id.as_str()).unwrap());
        }
        assert_eq!(sent.models(), enforced.catalog.models());
    }

    #[test]
    fn set_default_has_no_uniform_patch() {
        assert!(BulkAction::SetDefault.patch().is_none());
    }

    #[test]
    fn unsave_action_applies_as_one_transaction() {
        let catalog = test_catalog(&[("a", "sa")]);
        let out =
            enforcer::apply_edits(&catalog, &[ModelId::new("a")], &BulkAction::Unsave.edits())
                .unwrap();
        assert_eq!(out.deltas[0].patch, ModelPatch {
            is_saved: Some(false),
            is_active: Some(false),
            is_default: None,
        });
    }
}
