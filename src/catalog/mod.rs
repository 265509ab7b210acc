//! Condition catalog: well-known predicates declared ahead of time.
//!
//! A catalog is seeded into a [`Registry`](crate::Registry) at construction so
//! its predicates have entries before anyone subscribes. Conditions are either
//! comparisons over named flags or arbitrary [`Predicate`]s.

/// Serializable catalog definitions.
pub mod definition;
/// Named flags and the mutability switch.
pub mod flags;

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use crate::error::{DispatchError, DispatchResult};
use crate::predicate::Predicate;

pub use definition::{CatalogDefinition, ConditionDefinition, FlagDefinition};
pub use flags::{CatalogMutability, FlagBoard};

#[derive(Debug)]
enum Declared {
    Rule(ConditionDefinition),
    Custom { name: String, predicate: Predicate },
}

impl Declared {
    fn name(&self) -> &str {
        match self {
            Self::Rule(rule) => rule.name(),
            Self::Custom { name, .. } => name,
        }
    }
}

/// Builder for [`ConditionCatalog`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    flags: Vec<(String, bool)>,
    conditions: Vec<Declared>,
}

impl CatalogBuilder {
    /// Start an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a flag with its initial value.
    #[must_use]
    pub fn flag(mut self, name: impl Into<String>, initial: bool) -> Self {
        self.flags.push((name.into(), initial));
        self
    }

    /// Condition true while `left == right`.
    #[must_use]
    pub fn equals(
        self,
        name: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        self.rule(ConditionDefinition::Equals {
            name: name.into(),
            left: left.into(),
            right: right.into(),
        })
    }

    /// Condition true while `left != right`.
    #[must_use]
    pub fn not_equals(
        self,
        name: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        self.rule(ConditionDefinition::NotEquals {
            name: name.into(),
            left: left.into(),
            right: right.into(),
        })
    }

    /// Condition true while `flag` is set.
    #[must_use]
    pub fn is_set(self, name: impl Into<String>, flag: impl Into<String>) -> Self {
        self.rule(ConditionDefinition::IsSet {
            name: name.into(),
            flag: flag.into(),
        })
    }

    /// Add a condition from its serialized form.
    #[must_use]
    pub fn rule(mut self, rule: ConditionDefinition) -> Self {
        self.conditions.push(Declared::Rule(rule));
        self
    }

    /// Add an arbitrary predicate under `name`.
    #[must_use]
    pub fn condition(mut self, name: impl Into<String>, predicate: Predicate) -> Self {
        self.conditions.push(Declared::Custom {
            name: name.into(),
            predicate,
        });
        self
    }

    /// Resolve flag references and produce the catalog.
    pub fn build(self, mutability: CatalogMutability) -> DispatchResult<ConditionCatalog> {
        let mut flags = FlagBoard::default();
        for (name, initial) in &self.flags {
            flags.declare(name, *initial)?;
        }

        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(self.conditions.len());
        let mut conditions = Vec::with_capacity(self.conditions.len());
        for declared in self.conditions {
            if !seen.insert(declared.name().to_string()) {
                return Err(DispatchError::DuplicateName {
                    name: declared.name().to_string(),
                });
            }
            names.push(declared.name().to_string());
            let predicate = match declared {
                Declared::Custom { predicate, .. } => predicate,
                Declared::Rule(rule) => compile(&flags, &rule)?,
            };
            conditions.push(predicate);
        }

        Ok(ConditionCatalog {
            flags,
            names,
            conditions,
            mutability,
        })
    }
}

fn compile(flags: &FlagBoard, rule: &ConditionDefinition) -> DispatchResult<Predicate> {
    let predicate = match rule {
        ConditionDefinition::Equals { name, left, right } => {
            let (l, r) = (flags.cell(left)?, flags.cell(right)?);
            Predicate::labeled(name.clone(), move || {
                l.load(Ordering::Acquire) == r.load(Ordering::Acquire)
            })
        }
        ConditionDefinition::NotEquals { name, left, right } => {
            let (l, r) = (flags.cell(left)?, flags.cell(right)?);
            Predicate::labeled(name.clone(), move || {
                l.load(Ordering::Acquire) != r.load(Ordering::Acquire)
            })
        }
        ConditionDefinition::IsSet { name, flag } => {
            let cell = flags.cell(flag)?;
            Predicate::labeled(name.clone(), move || cell.load(Ordering::Acquire))
        }
        ConditionDefinition::IsClear { name, flag } => {
            let cell = flags.cell(flag)?;
            Predicate::labeled(name.clone(), move || !cell.load(Ordering::Acquire))
        }
    };
    Ok(predicate)
}

/// An ordered set of named predicates plus the flags they read.
///
/// Cloning shares flags and predicate identities, so a host can keep a clone
/// to flip flags and subscribe to catalog predicates after handing the
/// original to a registry.
#[derive(Debug, Clone, Default)]
pub struct ConditionCatalog {
    flags: FlagBoard,
    names: Vec<String>,
    conditions: Vec<Predicate>,
    mutability: CatalogMutability,
}

impl ConditionCatalog {
    /// Start building a catalog.
    #[must_use]
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    /// A catalog with no conditions.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Two flags, both set, compared in both directions.
    pub fn example(mutability: CatalogMutability) -> DispatchResult<Self> {
        Self::builder()
            .flag("example1", true)
            .flag("example2", true)
            .equals("example1_eq_example2", "example1", "example2")
            .equals("example2_eq_example1", "example2", "example1")
            .build(mutability)
    }

    /// Predicates in declaration order.
    #[must_use]
    pub fn predicates(&self) -> &[Predicate] {
        &self.conditions
    }

    /// Look up a condition by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Predicate> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| &self.conditions[idx])
    }

    /// Condition names in declaration order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Declared flags.
    #[must_use]
    pub const fn flags(&self) -> &FlagBoard {
        &self.flags
    }

    /// Current value of a flag.
    pub fn flag(&self, name: &str) -> DispatchResult<bool> {
        self.flags.get(name)
    }

    /// Write a flag. Fails on static catalogs.
    pub fn set_flag(&self, name: &str, value: bool) -> DispatchResult<()> {
        if self.mutability == CatalogMutability::Static {
            return Err(DispatchError::CatalogFrozen {
                name: name.to_string(),
            });
        }
        self.flags.store(name, value)
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn mutability(&self) -> CatalogMutability {
        self.mutability
    }

    /// Number of conditions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// True when the catalog has no conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}
