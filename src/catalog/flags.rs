//! Named boolean flags backing catalog conditions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, DispatchResult};

/// Whether catalog flags may change after the catalog is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogMutability {
    /// Flags are fixed at build time; writes fail with `CatalogFrozen`.
    #[default]
    Static,
    /// Flags may be written at runtime; the next poll sees the new value.
    Mutable,
}

/// Declared flags, shared between a catalog and the predicates built from it.
///
/// Cloning shares the underlying cells.
#[derive(Debug, Clone, Default)]
pub struct FlagBoard {
    order: Vec<String>,
    cells: HashMap<String, Arc<AtomicBool>>,
}

impl FlagBoard {
    pub(crate) fn declare(&mut self, name: &str, initial: bool) -> DispatchResult<()> {
        if self.cells.contains_key(name) {
            return Err(DispatchError::DuplicateName {
                name: name.to_string(),
            });
        }
        self.order.push(name.to_string());
        self.cells
            .insert(name.to_string(), Arc::new(AtomicBool::new(initial)));
        Ok(())
    }

    pub(crate) fn cell(&self, name: &str) -> DispatchResult<Arc<AtomicBool>> {
        self.cells
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| DispatchError::UnknownFlag {
                name: name.to_string(),
            })
    }

    pub(crate) fn store(&self, name: &str, value: bool) -> DispatchResult<()> {
        self.cell(name)?.store(value, Ordering::Release);
        Ok(())
    }

    /// Current value of a flag.
    pub fn get(&self, name: &str) -> DispatchResult<bool> {
        Ok(self.cell(name)?.load(Ordering::Acquire))
    }

    /// Flag names in declaration order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Number of declared flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when no flags are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
