//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Named operator sets keyed by device type."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, StatsError};
use crate::operator::{OperatorOutput, OperatorSpec};

/// Ordered operators for one device type.
#[derive(Debug, Clone, Default)]
pub struct SpecSet {
    ops: IndexMap<String, OperatorSpec>,
}

impl SpecSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an operator. A later entry with the same name replaces the earlier
    /// one in place.
    pub fn with_op(mut self, name: impl Into<String>, spec: OperatorSpec) -> Self {
        self.ops.insert(name.into(), spec);
        self
    }

    /// Start from `self` and layer `other` on top.
    pub fn extended_with(&self, other: &SpecSet) -> Self {
        let mut ops = self.ops.clone();
        for (name, spec) in &other.ops {
            ops.insert(name.clone(), spec.clone());
        }
        Self { ops }
    }

    pub fn op(&self, name: &str) -> Option<&OperatorSpec> {
        self.ops.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ops.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Evaluate every operator over `entries`, in registration order.
    pub fn evaluate(&self, entries: &[Value]) -> IndexMap<String, OperatorOutput> {
        self.ops
            .iter()
            .map(|(name, spec)| (name.clone(), spec.evaluate(entries)))
            .collect()
    }
}

/// Immutable device-type → [`SpecSet`] mapping, shared read-only once built.
#[derive(Debug, Default)]
pub struct SpecsTable {
    sets: IndexMap<String, SpecSet>,
}

impl SpecsTable {
    pub fn builder() -> SpecsTableBuilder {
        SpecsTableBuilder::default()
    }

    pub fn get(&self, device_type: &str) -> Option<&SpecSet> {
        self.sets.get(device_type)
    }

    pub fn device_types(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }
}

#[derive(Debug, Default)]
pub struct SpecsTableBuilder {
    sets: IndexMap<String, SpecSet>,
}

impl SpecsTableBuilder {
    pub fn register(mut self, device_type: impl Into<String>, set: SpecSet) -> Result<Self> {
        let device_type = device_type.into();
        if self.sets.contains_key(&device_type) {
            return Err(StatsError::DuplicateSpecSet(device_type));
        }
        self.sets.insert(device_type, set);
        Ok(self)
    }

    /// Register `device_type` as `base` extended with `overrides`.
    pub fn extend(
        self,
        device_type: impl Into<String>,
        base: &str,
        overrides: SpecSet,
    ) -> Result<Self> {
        let merged = self
            .sets
            .get(base)
            .ok_or_else(|| StatsError::UnknownSpecSet(base.to_owned()))?
            .extended_with(&overrides);
        self.register(device_type, merged)
    }

    pub fn build(self) -> Arc<SpecsTable> {
        debug!(sets = self.sets.len(), "specs table built");
        Arc::new(SpecsTable { sets: self.sets })
    }
}
