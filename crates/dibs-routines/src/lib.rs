//! Postgres function, procedure and trigger reconciliation.
//!
//! Tables get their migrations from schema diffs. Routines and triggers
//! don't fit that model: their bodies are opaque text, and the server rewrites
//! whatever you hand it. This crate compares a set of declared
//! `CREATE FUNCTION` / `CREATE PROCEDURE` / `CREATE TRIGGER` statements against
//! the live catalog and produces the operations that bring the two together.
//!
//! # How a cycle works
//!
//! 1. **Inspect** the live catalog (`pg_proc`, `pg_trigger`), skipping system
//!    schemas, extension members and internal triggers.
//! 2. **Canonicalize** the declarations: run them inside a savepoint, read the
//!    catalog back, roll back. The result is what the server itself would
//!    report, so comparisons are byte-exact without false positives.
//! 3. **Diff** the two snapshots by identity key.
//! 4. **Order** the diff so triggers are dropped before the functions they
//!    call, and created after them.
//!
//! ```ignore
//! use dibs_routines::{Declarations, produce_operations};
//!
//! let declarations = Declarations::new()
//!     .routine("CREATE FUNCTION audit() RETURNS trigger LANGUAGE plpgsql AS $$ BEGIN RETURN NEW; END $$")
//!     .trigger("CREATE TRIGGER audit_trg AFTER INSERT ON orders FOR EACH ROW EXECUTE FUNCTION audit()");
//!
//! let ops = produce_operations(&mut client, &declarations, &[None]).await?;
//! for op in &ops {
//!     println!("{op}");
//!     for sql in op.to_sql() {
//!         client.batch_execute(&sql).await?;
//!     }
//! }
//! ```
//!
//! # Identity
//!
//! Routines are identified by `(schema, name, identity arguments)`, so each
//! overload is its own object. Triggers are identified by
//! `(schema, table, trigger name)`.

mod canonicalize;
mod catalog;
mod diff;
mod error;
mod identity;
mod inspect;
mod ops;
mod order;
mod reconcile;
mod traced;

pub use canonicalize::{canonicalize, canonicalize_routines, canonicalize_triggers};
pub use catalog::{
    CatalogObject, CatalogSnapshot, ObjectKey, RoutineInfo, RoutineKey, RoutineKind, SchemaFilter,
    TriggerInfo, TriggerKey,
};
pub use diff::{Action, DiffOp, DiffResult, diff, diff_objects};
pub use error::Error;
pub use identity::{
    RoutineIdentity, RoutineName, TriggerIdentity, Unresolvable, ensure_or_replace,
    resolve_routine_identity, resolve_trigger_identity,
};
pub use inspect::{current_schema, inspect, inspect_routines, inspect_triggers};
pub use ops::{Operation, OperationKind, quote_ident};
pub use order::{order, order_diff};
pub use reconcile::{Declarations, DeclaredIdentities, produce_operations, reconcile, resolve_schemas};
pub use traced::{Connection, ConnectionExt, TracedConn};

/// Result type for reconciliation.
pub type Result<T> = std::result::Result<T, Error>;
