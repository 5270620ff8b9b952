//! Operation ordering - turns diff entries into a dependency-safe sequence.
//!
//! Triggers depend on the functions they execute, so the sequence is always:
//!
//! 1. drop triggers (frees their functions)
//! 2. drop routines
//! 3. create/replace routines (a trigger may need them)
//! 4. create/replace triggers
//!
//! ## Example Problem
//!
//! ```text
//! -- This fails:
//! DROP FUNCTION public.audit();           -- trigger audit_trg still uses it!
//! DROP TRIGGER audit_trg ON public.orders;
//!
//! -- This works:
//! DROP TRIGGER audit_trg ON public.orders;
//! DROP FUNCTION public.audit();
//! ```
//!
//! Within each phase the diff's key order is kept, so the output is as
//! deterministic as the diff itself.
//!
//! ## Limitation
//!
//! A trigger replace stays an adjacent drop+create in phase 4, after the
//! routine drops. When a changed trigger moves off a routine that is dropped
//! in the same cycle, the routine drop comes first and PostgreSQL refuses it:
//!
//! ```text
//! DROP FUNCTION public.old_audit();       -- audit_trg still executes it
//! DROP TRIGGER audit_trg ON public.orders;
//! CREATE TRIGGER audit_trg ... EXECUTE FUNCTION audit();
//! ```
//!
//! Split such a change over two cycles: first repoint the trigger, then stop
//! declaring the old routine.

use crate::catalog::{RoutineInfo, TriggerInfo};
use crate::diff::{DiffOp, DiffResult};
use crate::ops::Operation;

/// Order routine and trigger diff entries into executable operations.
///
/// A trigger replace becomes a drop immediately followed by a create.
pub fn order(
    routine_ops: &[DiffOp<RoutineInfo>],
    trigger_ops: &[DiffOp<TriggerInfo>],
) -> Vec<Operation> {
    let mut result = Vec::with_capacity(routine_ops.len() + trigger_ops.len());

    for op in trigger_ops {
        if let DiffOp::Drop { current } = op {
            result.push(Operation::DropTrigger(current.clone()));
        }
    }

    for op in routine_ops {
        if let DiffOp::Drop { current } = op {
            result.push(Operation::DropRoutine(current.clone()));
        }
    }

    for op in routine_ops {
        match op {
            DiffOp::Create { desired } => result.push(Operation::CreateRoutine(desired.clone())),
            DiffOp::Replace { current, desired } => result.push(Operation::ReplaceRoutine {
                current: current.clone(),
                desired: desired.clone(),
            }),
            DiffOp::Drop { .. } => {}
        }
    }

    for op in trigger_ops {
        match op {
            DiffOp::Create { desired } => result.push(Operation::CreateTrigger(desired.clone())),
            DiffOp::Replace { current, desired } => {
                result.push(Operation::DropTrigger(current.clone()));
                result.push(Operation::CreateTrigger(desired.clone()));
            }
            DiffOp::Drop { .. } => {}
        }
    }

    result
}

/// [`order`] over a whole [`DiffResult`].
pub fn order_diff(diff: &DiffResult) -> Vec<Operation> {
    order(&diff.routine_ops, &diff.trigger_ops)
}
