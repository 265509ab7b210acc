//! Serializable catalog definitions.
//!
//! Hosts that ship their conditions as data describe them with a
//! [`CatalogDefinition`]:
//!
//! ```json
//! {
//!   "mutability": "mutable",
//!   "flags": [{ "name": "door_open", "value": false }, { "name": "has_key", "value": true }],
//!   "conditions": [
//!     { "type": "equals", "name": "ready", "left": "door_open", "right": "has_key" },
//!     { "type": "is_set", "name": "holding_key", "flag": "has_key" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, DispatchResult};

use super::flags::CatalogMutability;
use super::{CatalogBuilder, ConditionCatalog};

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagDefinition {
    pub name: String,
    #[serde(default)]
    pub value: bool,
}

/// A statically expressible condition over declared flags.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionDefinition {
    /// True while both flags hold the same value.
    Equals {
        name: String,
        left: String,
        right: String,
    },
    /// True while the flags differ.
    NotEquals {
        name: String,
        left: String,
        right: String,
    },
    /// True while the flag is set.
    IsSet { name: String, flag: String },
    /// True while the flag is clear.
    IsClear { name: String, flag: String },
}

impl ConditionDefinition {
    /// Name of the condition.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Equals { name, .. }
            | Self::NotEquals { name, .. }
            | Self::IsSet { name, .. }
            | Self::IsClear { name, .. } => name,
        }
    }
}

/// Complete serialized catalog.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDefinition {
    #[serde(default)]
    pub mutability: CatalogMutability,
    #[serde(default)]
    pub flags: Vec<FlagDefinition>,
    #[serde(default)]
    pub conditions: Vec<ConditionDefinition>,
}

impl CatalogDefinition {
    /// Parse a definition from JSON.
    pub fn from_json(input: &str) -> DispatchResult<Self> {
        serde_json::from_str(input).map_err(|e| DispatchError::InvalidDefinition {
            reason: e.to_string(),
        })
    }

    /// Convert into a builder, keeping declaration order.
    #[must_use]
    pub fn into_builder(self) -> CatalogBuilder {
        let mut builder = CatalogBuilder::new();
        for flag in self.flags {
            builder = builder.flag(flag.name, flag.value);
        }
        for condition in self.conditions {
            builder = builder.rule(condition);
        }
        builder
    }

    /// Build the catalog with the declared mutability.
    pub fn build(self) -> DispatchResult<ConditionCatalog> {
        let mutability = self.mutability;
        self.into_builder().build(mutability)
    }
}
