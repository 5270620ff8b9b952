//! Migration operations handed to the host migration tool.
//!
//! An [`Operation`] is a plain data carrier: what to do, and the catalog
//! values it applies to. Rendering into a migration script is the host's job;
//! [`Operation::to_sql`] gives the raw DDL statements that carry the operation
//! out, which is usually all a renderer needs.

use std::fmt;

use crate::catalog::{ObjectKey, RoutineInfo, TriggerInfo};

/// The kind of an [`Operation`], used for dispatch on the host side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    CreateRoutine,
    ReplaceRoutine,
    DropRoutine,
    CreateTrigger,
    ReplaceTrigger,
    DropTrigger,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::CreateRoutine => "create_routine",
            OperationKind::ReplaceRoutine => "replace_routine",
            OperationKind::DropRoutine => "drop_routine",
            OperationKind::CreateTrigger => "create_trigger",
            OperationKind::ReplaceTrigger => "replace_trigger",
            OperationKind::DropTrigger => "drop_trigger",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single create/replace/drop of a routine or trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    CreateRoutine(RoutineInfo),
    ReplaceRoutine {
        current: RoutineInfo,
        desired: RoutineInfo,
    },
    DropRoutine(RoutineInfo),
    CreateTrigger(TriggerInfo),
    /// PostgreSQL can't swap a trigger in place atomically, so the orderer
    /// emits a drop followed by a create instead. This variant exists for
    /// hosts that build operations themselves.
    ReplaceTrigger {
        current: TriggerInfo,
        desired: TriggerInfo,
    },
    DropTrigger(TriggerInfo),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::CreateRoutine(_) => OperationKind::CreateRoutine,
            Operation::ReplaceRoutine { .. } => OperationKind::ReplaceRoutine,
            Operation::DropRoutine(_) => OperationKind::DropRoutine,
            Operation::CreateTrigger(_) => OperationKind::CreateTrigger,
            Operation::ReplaceTrigger { .. } => OperationKind::ReplaceTrigger,
            Operation::DropTrigger(_) => OperationKind::DropTrigger,
        }
    }

    /// The identity key of the object this operation touches.
    pub fn key(&self) -> ObjectKey {
        match self {
            Operation::CreateRoutine(r)
            | Operation::ReplaceRoutine { desired: r, .. }
            | Operation::DropRoutine(r) => ObjectKey::Routine(r.key()),
            Operation::CreateTrigger(t)
            | Operation::ReplaceTrigger { desired: t, .. }
            | Operation::DropTrigger(t) => ObjectKey::Trigger(t.key()),
        }
    }

    /// `(kind, key)`, which is what the host uses to tell changes apart.
    pub fn change_id(&self) -> (OperationKind, ObjectKey) {
        (self.kind(), self.key())
    }

    /// The operation that undoes this one.
    pub fn reverse(&self) -> Operation {
        match self {
            Operation::CreateRoutine(r) => Operation::DropRoutine(r.clone()),
            Operation::ReplaceRoutine { current, desired } => Operation::ReplaceRoutine {
                current: desired.clone(),
                desired: current.clone(),
            },
            Operation::DropRoutine(r) => Operation::CreateRoutine(r.clone()),
            Operation::CreateTrigger(t) => Operation::DropTrigger(t.clone()),
            Operation::ReplaceTrigger { current, desired } => Operation::ReplaceTrigger {
                current: desired.clone(),
                desired: current.clone(),
            },
            Operation::DropTrigger(t) => Operation::CreateTrigger(t.clone()),
        }
    }

    /// DDL statements that carry out this operation, in execution order.
    ///
    /// Creates and replaces use the canonical definition as-is (PostgreSQL
    /// regenerates routines as `CREATE OR REPLACE`). Drops are built from the
    /// identity key alone.
    pub fn to_sql(&self) -> Vec<String> {
        match self {
            Operation::CreateRoutine(r) | Operation::ReplaceRoutine { desired: r, .. } => {
                vec![r.definition.clone()]
            }
            Operation::DropRoutine(r) => vec![drop_routine_sql(r)],
            Operation::CreateTrigger(t) => vec![t.definition.clone()],
            Operation::ReplaceTrigger { current, desired } => {
                vec![drop_trigger_sql(current), desired.definition.clone()]
            }
            Operation::DropTrigger(t) => vec![drop_trigger_sql(t)],
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateRoutine(r) => write!(f, "+ {} {}", r.kind, r.key()),
            Operation::ReplaceRoutine { desired, .. } => {
                write!(f, "~ {} {}", desired.kind, desired.key())
            }
            Operation::DropRoutine(r) => write!(f, "- {} {}", r.kind, r.key()),
            Operation::CreateTrigger(t) => write!(f, "+ trigger {}", t.key()),
            Operation::ReplaceTrigger { desired, .. } => write!(f, "~ trigger {}", desired.key()),
            Operation::DropTrigger(t) => write!(f, "- trigger {}", t.key()),
        }
    }
}

/// Quote a PostgreSQL identifier, doubling embedded quotes.
///
/// Always quotes, so reserved words and mixed case need no special handling.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn drop_routine_sql(r: &RoutineInfo) -> String {
    format!(
        "DROP {} {}.{}({})",
        r.kind.keyword(),
        quote_ident(&r.schema),
        quote_ident(&r.name),
        r.identity_args
    )
}

fn drop_trigger_sql(t: &TriggerInfo) -> String {
    format!(
        "DROP TRIGGER {} ON {}.{}",
        quote_ident(&t.trigger_name),
        quote_ident(&t.schema),
        quote_ident(&t.table_name)
    )
}
