//! Pure flag arithmetic over a catalog.
//!
//! Given a catalog snapshot, a target set and one or more flag assignments,
//! compute the next catalog with every cascade applied, or refuse. Nothing
//! here touches the network or shared state; callers decide what to do with
//! the result.

use {
    chatdesk_common::ModelId,
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

use crate::{
    catalog::Catalog,
    model::{FlagField, ModelPatch},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("no target models given")]
    EmptyTargets,

    #[error("no flag edits given")]
    NoEdits,

    #[error("unknown model: {0}")]
    UnknownModel(ModelId),

    #[error("conflicting edits to {field}")]
    ConflictingEdits { field: FlagField },

    #[error("only one model can be the default, got {}", .models.len())]
    MultipleDefaults { models: Vec<ModelId> },

    #[error("{model} is active and must stay saved; deactivate it in the same change")]
    ActiveRequiresSaved { model: ModelId },

    #[error("{model} is the default and must stay active")]
    DefaultRequiresActive { model: ModelId },
}

/// One flag assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagEdit {
    pub field: FlagField,
    pub value: bool,
}

impl FlagEdit {
    pub fn new(field: FlagField, value: bool) -> Self {
        Self { field, value }
    }
}

/// Changed flags of one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDelta {
    pub model_id: ModelId,
    pub patch: ModelPatch,
}

#[derive(Debug, Clone)]
pub struct Enforcement {
    pub catalog: Catalog,
    /// Every model whose flags changed, in catalog order.
    pub deltas: Vec<ModelDelta>,
    /// The deltas that fall outside the target set.
    pub side_effects: Vec<ModelDelta>,
}

impl Enforcement {
    pub fn is_noop(&self) -> bool {
        self.deltas.is_empty()
    }
}

/// Set `field` to `value` on every target.
pub fn apply(
    catalog: &Catalog,
    targets: &[ModelId],
    field: FlagField,
    value: bool,
) -> Result<Enforcement, Violation> {
    apply_edits(catalog, targets, &[FlagEdit::new(field, value)])
}

/// Apply several assignments to every target as one transaction.
pub fn apply_edits(
    catalog: &Catalog,
    targets: &[ModelId],
    edits: &[FlagEdit],
) -> Result<Enforcement, Violation> {
    if targets.is_empty() {
        return Err(Violation::EmptyTargets);
    }
    let edit = merge_edits(edits)?;

    let mut unique: Vec<&ModelId> = Vec::with_capacity(targets.len());
    for id in targets {
        if !catalog.contains(id.as_str()) {
            return Err(Violation::UnknownModel(id.clone()));
        }
        if !unique.contains(&id) {
            unique.push(id);
        }
    }

    if edit.is_default == Some(true) && unique.len() > 1 {
        return Err(Violation::MultipleDefaults {
            models: unique.into_iter().cloned().collect(),
        });
    }

    let mut next = catalog.clone();
    for id in &unique {
        let Some(model) = next.get_mut(id.as_str()) else {
            return Err(Violation::UnknownModel((*id).clone()));
        };
        edit.apply_to(model);

        if edit.is_default == Some(true) {
            model.is_active = true;
            model.is_saved = true;
        }
        if edit.is_active == Some(true) {
            model.is_saved = true;
        }
        if edit.is_active == Some(false) {
            model.is_default = false;
        }

        // Cascades from one edit must not undo another.
        for field in FlagField::ALL {
            if let Some(value) = edit.get(field)
                && model.flag(field) != value
            {
                return Err(Violation::ConflictingEdits { field });
            }
        }
        if edit.is_saved == Some(false) && model.is_active {
            return Err(Violation::ActiveRequiresSaved {
                model: model.id.clone(),
            });
        }
    }

    if edit.is_default == Some(true) {
        for model in next.models_mut() {
            if model.is_default && !unique.contains(&&model.id) {
                model.is_default = false;
            }
        }
    }

    next.check_invariants()?;

    let mut deltas = Vec::new();
    let mut side_effects = Vec::new();
    for (before, after) in catalog.models().iter().zip(next.models()) {
        let patch = before.diff(after);
        if patch.is_empty() {
            continue;
        }
        let delta = ModelDelta {
            model_id: after.id.clone(),
            patch,
        };
        if !unique.contains(&&after.id) {
            side_effects.push(delta.clone());
        }
        deltas.push(delta);
    }

    Ok(Enforcement {
        catalog: next,
        deltas,
        side_effects,
    })
}

/// Fold a list of assignments into one patch, refusing contradictions.
fn merge_edits(edits: &[FlagEdit]) -> Result<ModelPatch, Violation> {
    if edits.is_empty() {
        return Err(Violation::NoEdits);
    }
    let mut patch = ModelPatch::default();
    for edit in edits {
        let slot = match edit.field {
            FlagField::Saved => &mut patch.is_saved,
            FlagField::Active => &mut patch.is_active,
            FlagField::Default => &mut patch.is_default,
        };
        match *slot {
            Some(existing) if existing != edit.value => {
                return Err(Violation::ConflictingEdits { field: edit.field });
            },
            _ => *slot = Some(edit.value),
        }
    }
    Ok(patch)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::catalog::test_catalog, rstest::rstest};

    fn ids(list: &[&str]) -> Vec<ModelId> {
        list.iter().map(|id| ModelId::new(*id)).collect()
    }

    fn flags(catalog: &Catalog, id: &str) -> (bool, bool, bool) {
        let m = catalog.get(id).unwrap();
        (m.is_saved, m.is_active, m.is_default)
    }

    #[test]
    fn bulk_activate_keeps_existing_default() {
        let catalog = test_catalog(&[("a", "sad"), ("b", "s")]);
        let out = apply(&catalog, &ids(&["b"]), FlagField::Active, true).unwrap();

        assert_eq!(flags(&out.catalog, "b"), (true, true, false));
        assert_eq!(flags(&out.catalog, "a"), (true, true, true));
        assert_eq!(out.deltas.len(), 1);
        assert!(out.side_effects.is_empty());
    }

    #[test]
    fn default_moves_and_cascades() {
        let catalog = test_catalog(&[("a", "sad"), ("b", "")]);
        let out = apply(&catalog, &ids(&["b"]), FlagField::Default, true).unwrap();

        assert_eq!(flags(&out.catalog, "b"), (true, true, true));
        assert_eq!(flags(&out.catalog, "a"), (true, true, false));
        assert_eq!(out.side_effects, vec![ModelDelta {
            model_id: ModelId::new("a"),
            patch: ModelPatch {
                is_default: Some(false),
                ..Default::default()
            },
        }]);
        assert_eq!(out.deltas[1].patch, ModelPatch {
            is_saved: Some(true),
            is_active: Some(true),
            is_default: Some(true),
        });
    }

    #[test]
    fn reapplying_default_is_a_noop() {
        let catalog = test_catalog(&[("a", "sad"), ("b", "s")]);
        let first = apply(&catalog, &ids(&["b"]), FlagField::Default, true).unwrap();
        let second = apply(&first.catalog, &ids(&["b"]), FlagField::Default, true).unwrap();
        assert!(second.side_effects.is_empty());
        assert!(second.is_noop());
        assert_eq!(second.catalog, first.catalog);
    }

    #[test]
    fn deactivating_clears_default_but_not_saved() {
        let catalog = test_catalog(&[("a", "sad")]);
        let out = apply(&catalog, &ids(&["a"]), FlagField::Active, false).unwrap();
        assert_eq!(flags(&out.catalog, "a"), (true, false, false));
    }

    #[test]
    fn unsaving_active_model_is_rejected() {
        let catalog = test_catalog(&[("a", "sa"), ("b", "s")]);
        let err = apply(&catalog, &ids(&["a", "b"]), FlagField::Saved, false).unwrap_err();
        assert_eq!(err, Violation::ActiveRequiresSaved {
            model: ModelId::new("a"),
        });
    }

    #[test]
    fn unsave_with_deactivate_is_accepted() {
        let catalog = test_catalog(&[("a", "sad"), ("b", "s")]);
        let out = apply_edits(&catalog, &ids(&["a", "b"]), &[
            FlagEdit::new(FlagField::Saved, false),
            FlagEdit::new(FlagField::Active, false),
        ])
        .unwrap();
        assert_eq!(flags(&out.catalog, "a"), (false, false, false));
        assert_eq!(flags(&out.catalog, "b"), (false, false, false));
        assert_eq!(out.deltas.len(), 2);
    }

    #[rstest]
    #[case::empty(&[], FlagField::Active, true, Violation::EmptyTargets)]
    #[case::unknown(&["a", "zzz"], FlagField::Saved, true, Violation::UnknownModel(ModelId::new("zzz")))]
    #[case::two_defaults(&["a", "b"], FlagField::Default, true, Violation::MultipleDefaults {
        models: vec![ModelId::new("a"), ModelId::new("b")],
    })]
    fn validation_errors(
        #[case] targets: &[&str],
        #[case] field: FlagField,
        #[case] value: bool,
        #[case] expected: Violation,
    ) {
        let catalog = test_catalog(&[("a", ""), ("b", "")]);
        assert_eq!(
            apply(&catalog, &ids(targets), field, value).unwrap_err(),
            expected
        );
    }

    #[test]
    fn duplicate_targets_count_once() {
        let catalog = test_catalog(&[("a", ""), ("b", "")]);
        let out = apply(&catalog, &ids(&["a", "a"]), FlagField::Default, true).unwrap();
        assert_eq!(flags(&out.catalog, "a"), (true, true, true));
    }

    #[test]
    fn contradictory_edits_are_rejected() {
        let catalog = test_catalog(&[("a", "")]);
        let err = apply_edits(&catalog, &ids(&["a"]), &[
            FlagEdit::new(FlagField::Active, true),
            FlagEdit::new(FlagField::Active, false),
        ])
        .unwrap_err();
        assert_eq!(err, Violation::ConflictingEdits {
            field: FlagField::Active,
        });

        let err = apply_edits(&catalog, &ids(&["a"]), &[
            FlagEdit::new(FlagField::Default, true),
            FlagEdit::new(FlagField::Saved, false),
        ])
        .unwrap_err();
        assert_eq!(err, Violation::ConflictingEdits {
            field: FlagField::Saved,
        });

        assert!(matches!(
            apply_edits(&catalog, &ids(&["a"]), &[]),
            Err(Violation::NoEdits)
        ));
    }

    #[test]
    fn invariants_hold_after_any_sequence() {
        let mut catalog = test_catalog(&[("a", ""), ("b", "s"), ("c", "sa"), ("d", "sad")]);
        let names = ["a", "b", "c", "d"];
        let mut step = 0usize;
        for round in 0..6 {
            for (i, id) in names.iter().enumerate() {
                for field in FlagField::ALL {
                    step += 1;
                    let value = (step + i + round) % 3 != 0;
                    if let Ok(out) = apply(&catalog, &ids(&[id]), field, value) {
                        catalog = out.catalog;
                    }
                    catalog.check_invariants().unwrap();
                    assert!(catalog.models().iter().filter(|m| m.is_default).count() <= 1);
                }
            }
        }
    }

    #[test]
    fn rejection_leaves_input_untouched() {
        let catalog = test_catalog(&[("a", "sa")]);
        let before = catalog.clone();
        let _ = apply(&catalog, &ids(&["a"]), FlagField::Saved, false);
        assert_eq!(catalog, before);
    }
}
