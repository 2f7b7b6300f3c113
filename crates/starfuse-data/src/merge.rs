//! Merge engine: fold one record into another, cell by cell
//!
//! Rules, in order of precedence:
//! 1. Bookkeeping fields are always refreshed from a source that has them.
//! 2. A target cell from a protected origin only yields to the override origin
//!    or to a newer value from the same origin.
//! 3. Under `Partial`, a masked field the source lacks is cleared.
//! 4. Otherwise the overwrite policy decides, and a kept numeric value may
//!    still receive an error it was missing.

use crate::error::{StarError, StarResult};
use crate::origin::Origin;
use crate::property::PropertyCell;
use crate::schema::{PropertySchema, PropertyType};
use crate::stars::StarRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwritePolicy {
    /// Fill empty cells only
    #[default]
    None,
    /// Source wins wherever it has a value
    All,
    /// Source wins on masked fields; without a mask behaves like `None`
    Partial,
}

/// Per-field switch restricting which fields a `Partial` merge may touch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMask {
    bits: Vec<bool>,
}

impl PropertyMask {
    pub fn new(len: usize) -> Self {
        Self { bits: vec![false; len] }
    }

    pub fn for_schema(schema: &PropertySchema) -> Self {
        Self::new(schema.len())
    }

    /// Mask with exactly the named fields enabled
    pub fn from_ids<S: AsRef<str>>(schema: &PropertySchema, ids: &[S]) -> StarResult<Self> {
        let mut mask = Self::for_schema(schema);
        for id in ids {
            let index = schema.require(id.as_ref())?;
            mask.set(index, true);
        }
        Ok(mask)
    }

    /// Out-of-range indices are ignored
    pub fn set(&mut self, index: usize, enabled: bool) {
        if let Some(bit) = self.bits.get_mut(index) {
            *bit = enabled;
        }
    }

    pub fn get(&self, index: usize) -> bool {
        self.bits.get(index).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn enabled(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().enumerate().filter(|(_, on)| **on).map(|(i, _)| i)
    }
}

/// Provenance protection applied before the overwrite policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeRules {
    /// Origins whose values are kept against any other source
    pub protected_origins: Vec<Origin>,
    /// Origin allowed to replace protected values
    pub override_origin: Option<Origin>,
}

impl Default for MergeRules {
    fn default() -> Self {
        Self {
            protected_origins: vec![Origin::Simbad],
            override_origin: Some(Origin::Gaia),
        }
    }
}

/// How many times each field changed over a series of updates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCounters {
    pub per_index: Vec<u64>,
}

impl UpdateCounters {
    pub fn new(len: usize) -> Self {
        Self { per_index: vec![0; len] }
    }

    pub fn count(&self, index: usize) -> u64 {
        self.per_index.get(index).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.per_index.iter().sum()
    }

    fn bump(&mut self, index: usize) {
        if self.per_index.len() <= index {
            self.per_index.resize(index + 1, 0);
        }
        self.per_index[index] += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Keep,
    Copy,
    FillError,
    Clear,
}

impl MergeRules {
    /// A protected origin may still refresh its own values
    fn protects(&self, target: Origin, source: Origin) -> bool {
        self.protected_origins.contains(&target) && source != target && self.override_origin != Some(source)
    }

    fn decide(&self, target: &PropertyCell, source: &PropertyCell, bookkeeping: bool, overwrite: bool, clear_masked: bool) -> Action {
        if bookkeeping {
            return if source.is_set() && !target.same_content(source) { Action::Copy } else { Action::Keep };
        }
        if target.is_set() && self.protects(target.origin(), source.origin()) {
            return Action::Keep;
        }
        if !source.is_set() {
            return if clear_masked && target.is_set() { Action::Clear } else { Action::Keep };
        }
        if !target.is_set() {
            return Action::Copy;
        }
        if overwrite {
            return if target.same_content(source) { Action::Keep } else { Action::Copy };
        }
        if target.kind() == PropertyType::Float && !target.is_error_set() && source.is_error_set() {
            return Action::FillError;
        }
        Action::Keep
    }

    /// Fold `source` into `target`; returns whether any cell content changed
    pub fn apply(
        &self,
        target: &mut StarRecord,
        source: &StarRecord,
        policy: OverwritePolicy,
        mask: Option<&PropertyMask>,
        mut counters: Option<&mut UpdateCounters>,
    ) -> StarResult<bool> {
        // checked up front so a mismatch never leaves the target half merged
        let compatible = target.len() == source.len()
            && (Arc::ptr_eq(target.schema(), source.schema())
                || target.cells().iter().zip(source.cells()).all(|(a, b)| a.kind() == b.kind()));
        if !compatible {
            return Err(StarError::SchemaMismatch { left: target.len(), right: source.len() });
        }

        let mut changed = false;

        for (index, from) in source.cells().iter().enumerate() {
            let into = &target.cells()[index];
            let masked = policy == OverwritePolicy::Partial && mask.is_some_and(|m| m.get(index));
            let overwrite = policy == OverwritePolicy::All || masked;
            let bookkeeping = target.schema().is_bookkeeping(index);
            let action = self.decide(into, from, bookkeeping, overwrite, masked);

            if action == Action::Keep {
                continue;
            }

            // cell_mut drops the coordinate caches when RA or DEC is touched
            let Some(cell) = target.cell_mut(index) else { continue };
            match action {
                Action::Copy => *cell = from.clone(),
                Action::FillError => {
                    cell.set_error(from.error_or_nan(), false)?;
                }
                Action::Clear => cell.clear(),
                Action::Keep => {}
            }

            tracing::trace!("merge {:?} on property #{}", action, index);
            changed = true;
            if let Some(counters) = counters.as_deref_mut() {
                counters.bump(index);
            }
        }

        Ok(changed)
    }
}

/// Merge with the default provenance rules
pub fn update(target: &mut StarRecord, source: &StarRecord, policy: OverwritePolicy, mask: Option<&PropertyMask>) -> StarResult<bool> {
    MergeRules::default().apply(target, source, policy, mask, None)
}

/// [`update`] that also tallies changed fields
pub fn update_counted(
    target: &mut StarRecord,
    source: &StarRecord,
    policy: OverwritePolicy,
    mask: Option<&PropertyMask>,
    counters: &mut UpdateCounters,
) -> StarResult<bool> {
    MergeRules::default().apply(target, source, policy, mask, Some(counters))
}
