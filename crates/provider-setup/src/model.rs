//! Provider models and their user-controlled flags.

use std::{collections::BTreeSet, str::FromStr};

use {
    chatdesk_common::ModelId,
    serde::{Deserialize, Serialize},
};

/// One selectable model exposed by a provider.
///
/// Identity and metadata come from the backend and are never edited here;
/// only the three flags change, and only through the enforcer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderModel {
    pub id: ModelId,
    #[serde(default)]
    pub family: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    /// USD per million input tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_cost: Option<f64>,
    /// USD per million output tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_cost: Option<f64>,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub is_deprecated: bool,
    #[serde(default)]
    pub is_saved: bool,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_default: bool,
}

impl ProviderModel {
    pub fn flag(&self, field: FlagField) -> bool {
        match field {
            FlagField::Saved => self.is_saved,
            FlagField::Active => self.is_active,
            FlagField::Default => self.is_default,
        }
    }

    pub(crate) fn set_flag(&mut self, field: FlagField, value: bool) {
        match field {
            FlagField::Saved => self.is_saved = value,
            FlagField::Active => self.is_active = value,
            FlagField::Default => self.is_default = value,
        }
    }

    /// Patch carrying only the flags that differ between `self` and `next`.
    pub(crate) fn diff(&self, next: &Self) -> ModelPatch {
        let changed = |field: FlagField| (self.flag(field) != next.flag(field)).then(|| next.flag(field));
        ModelPatch {
            is_saved: changed(FlagField::Saved),
            is_active: changed(FlagField::Active),
            is_default: changed(FlagField::Default),
        }
    }
}

/// The three user-controlled model flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FlagField {
    #[serde(rename = "isSaved")]
    Saved,
    #[serde(rename = "isActive")]
    Active,
    #[serde(rename = "isDefault")]
    Default,
}

impl FlagField {
    pub const ALL: [Self; 3] = [Self::Saved, Self::Active, Self::Default];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Saved => "isSaved",
            Self::Active => "isActive",
            Self::Default => "isDefault",
        }
    }
}

impl std::fmt::Display for FlagField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlagField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "isSaved" | "saved" => Ok(Self::Saved),
            "isActive" | "active" => Ok(Self::Active),
            "isDefault" | "default" => Ok(Self::Default),
            other => Err(format!("unknown model flag: {other}")),
        }
    }
}

/// Partial flag update sent to the backend. `None` fields are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_saved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

impl ModelPatch {
    pub fn is_empty(&self) -> bool {
        self.is_saved.is_none() && self.is_active.is_none() && self.is_default.is_none()
    }

    pub fn get(&self, field: FlagField) -> Option<bool> {
        match field {
            FlagField::Saved => self.is_saved,
            FlagField::Active => self.is_active,
            FlagField::Default => self.is_default,
        }
    }

    /// Whether the patch turns any flag off.
    pub fn clears_any(&self) -> bool {
        FlagField::ALL
            .into_iter()
            .any(|field| self.get(field) == Some(false))
    }

    pub(crate) fn apply_to(&self, model: &mut ProviderModel) {
        for field in FlagField::ALL {
            if let Some(value) = self.get(field) {
                model.set_flag(field, value);
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn test_model(id: &str) -> ProviderModel {
    ProviderModel {
        id: ModelId::new(id),
        family: id.split('-').next().unwrap_or(id).to_string(),
        name: id.to_uppercase(),
        description: format!("{id} test model"),
        context_window: Some(128_000),
        max_tokens: Some(8_192),
        input_cost: Some(2.5),
        output_cost: Some(10.0),
        capabilities: BTreeSet::from(["chat".to_string()]),
        is_deprecated: false,
        is_saved: false,
        is_active: false,
        is_default: false,
    }
}
