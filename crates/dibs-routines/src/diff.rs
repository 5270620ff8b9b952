//! Snapshot diffing - compare the live catalog against the canonicalized desired state.
//!
//! Objects are matched by identity key only:
//!
//! - routines by `(schema, name, identity_args)`, so overloads are independent
//! - triggers by `(schema, table_name, trigger_name)`
//!
//! Definitions are compared byte-for-byte. Both sides are expected to be
//! canonical already (the current side straight from the catalog, the desired
//! side from [`canonicalize`](crate::canonicalize())), so nothing is normalized
//! here.
//!
//! ```text
//! current                     desired
//! public.f() = "old"          public.f() = "new"      ~ replace
//!                             public.g() = "..."      + create
//! public.h() = "..."                                  - drop
//! ```

use std::collections::BTreeMap;

use crate::catalog::{CatalogObject, CatalogSnapshot, RoutineInfo, TriggerInfo};

/// The kind of change needed for one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Replace,
    Drop,
}

/// A single diff entry for one identity key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOp<T> {
    /// Only in the desired state.
    Create { desired: T },
    /// In both states with different definitions.
    Replace { current: T, desired: T },
    /// Only in the current state.
    Drop { current: T },
}

impl<T> DiffOp<T> {
    pub fn action(&self) -> Action {
        match self {
            DiffOp::Create { .. } => Action::Create,
            DiffOp::Replace { .. } => Action::Replace,
            DiffOp::Drop { .. } => Action::Drop,
        }
    }

    pub fn current(&self) -> Option<&T> {
        match self {
            DiffOp::Create { .. } => None,
            DiffOp::Replace { current, .. } | DiffOp::Drop { current } => Some(current),
        }
    }

    pub fn desired(&self) -> Option<&T> {
        match self {
            DiffOp::Drop { .. } => None,
            DiffOp::Create { desired } | DiffOp::Replace { desired, .. } => Some(desired),
        }
    }
}

impl<T: CatalogObject> DiffOp<T> {
    /// The identity key this entry is about.
    pub fn key(&self) -> T::Key {
        match self {
            DiffOp::Create { desired } => desired.key(),
            DiffOp::Replace { desired, .. } => desired.key(),
            DiffOp::Drop { current } => current.key(),
        }
    }
}

/// Result of comparing two snapshots. Both lists are sorted by identity key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    pub routine_ops: Vec<DiffOp<RoutineInfo>>,
    pub trigger_ops: Vec<DiffOp<TriggerInfo>>,
}

impl DiffResult {
    /// Returns true if there are no differences.
    pub fn is_empty(&self) -> bool {
        self.routine_ops.is_empty() && self.trigger_ops.is_empty()
    }

    /// Count total number of changes.
    pub fn change_count(&self) -> usize {
        self.routine_ops.len() + self.trigger_ops.len()
    }
}

/// Compare `current` against `desired`.
pub fn diff(current: &CatalogSnapshot, desired: &CatalogSnapshot) -> DiffResult {
    let result = DiffResult {
        routine_ops: diff_objects(&current.routines, &desired.routines),
        trigger_ops: diff_objects(&current.triggers, &desired.triggers),
    };
    tracing::debug!(
        routine_ops = result.routine_ops.len(),
        trigger_ops = result.trigger_ops.len(),
        "diffed catalog snapshots"
    );
    result
}

/// Diff two lists of catalog objects by identity key.
pub fn diff_objects<T: CatalogObject>(current: &[T], desired: &[T]) -> Vec<DiffOp<T>> {
    let mut by_key: BTreeMap<T::Key, (Option<&T>, Option<&T>)> = BTreeMap::new();
    for item in current {
        by_key.entry(item.key()).or_default().0 = Some(item);
    }
    for item in desired {
        by_key.entry(item.key()).or_default().1 = Some(item);
    }

    by_key
        .into_values()
        .filter_map(|entry| match entry {
            (None, Some(desired)) => Some(DiffOp::Create {
                desired: desired.clone(),
            }),
            (Some(current), None) => Some(DiffOp::Drop {
                current: current.clone(),
            }),
            (Some(current), Some(desired)) if current.definition() != desired.definition() => {
                Some(DiffOp::Replace {
                    current: current.clone(),
                    desired: desired.clone(),
                })
            }
            _ => None,
        })
        .collect()
}
