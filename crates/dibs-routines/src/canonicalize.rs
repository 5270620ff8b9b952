//! Desired-state canonicalization by round-tripping DDL through PostgreSQL.
//!
//! Comparing declared text against `pg_get_functiondef()` output directly would
//! report a difference on every run: the server fills in defaults, reorders
//! clauses and rewrites casts. So the declarations are executed for real,
//! inside a nested transaction, the catalog is read back, and everything is
//! rolled back again. What comes out is exactly what the live catalog would say
//! if the declarations had been applied.
//!
//! ```ignore
//! let mut tx = client.transaction().await?;
//! let desired = canonicalize(&mut tx, &functions, &triggers, &SchemaFilter::AllUser).await?;
//! // `tx` is exactly as it was before the call.
//! ```

use tokio_postgres::{GenericClient, Transaction};

use crate::catalog::{CatalogSnapshot, RoutineInfo, SchemaFilter, TriggerInfo};
use crate::identity::{ensure_or_replace, resolve_trigger_identity};
use crate::inspect::inspect;
use crate::traced::ConnectionExt;
use crate::{Error, Result};

/// Execute `routine_ddl` then `trigger_ddl` in a savepoint and return the resulting catalog.
///
/// `conn` is either a bare client (a transaction is opened) or an open
/// transaction (a savepoint is opened). Either way the nested scope is rolled
/// back before this returns, on success and on failure.
///
/// Routines run first so triggers in the same batch can use them. Each
/// declaration is rewritten to `CREATE OR REPLACE` when needed so it can't
/// collide with an object that already exists. An existing constraint trigger
/// of the same name is dropped inside the savepoint instead.
///
/// The snapshot holds every object visible through `filter`, not only the
/// declared ones.
pub async fn canonicalize<C, R, T>(
    conn: &mut C,
    routine_ddl: &[R],
    trigger_ddl: &[T],
    filter: &SchemaFilter,
) -> Result<CatalogSnapshot>
where
    C: GenericClient,
    R: AsRef<str>,
    T: AsRef<str>,
{
    let savepoint = conn.transaction().await?;

    let outcome = execute_and_inspect(&savepoint, routine_ddl, trigger_ddl, filter).await;
    let rollback = savepoint.rollback().await;

    let snapshot = outcome?;
    rollback?;

    tracing::debug!(
        routines = snapshot.routines.len(),
        triggers = snapshot.triggers.len(),
        "canonicalized declarations"
    );
    Ok(snapshot)
}

/// [`canonicalize`] with routine declarations only.
pub async fn canonicalize_routines<C, R>(
    conn: &mut C,
    ddl: &[R],
    filter: &SchemaFilter,
) -> Result<Vec<RoutineInfo>>
where
    C: GenericClient,
    R: AsRef<str>,
{
    let no_triggers: &[&str] = &[];
    Ok(canonicalize(conn, ddl, no_triggers, filter).await?.routines)
}

/// [`canonicalize`] with trigger declarations only.
pub async fn canonicalize_triggers<C, T>(
    conn: &mut C,
    ddl: &[T],
    filter: &SchemaFilter,
) -> Result<Vec<TriggerInfo>>
where
    C: GenericClient,
    T: AsRef<str>,
{
    let no_routines: &[&str] = &[];
    Ok(canonicalize(conn, no_routines, ddl, filter).await?.triggers)
}

async fn execute_and_inspect<R, T>(
    tx: &Transaction<'_>,
    routine_ddl: &[R],
    trigger_ddl: &[T],
    filter: &SchemaFilter,
) -> Result<CatalogSnapshot>
where
    R: AsRef<str>,
    T: AsRef<str>,
{
    for ddl in routine_ddl {
        execute(tx, &ensure_or_replace(ddl.as_ref())).await?;
    }

    for ddl in trigger_ddl {
        let ddl = ddl.as_ref();
        // Constraint triggers can't be replaced in place, so clear the way first.
        if let Ok(identity) = resolve_trigger_identity(ddl) {
            if identity.constraint {
                execute(tx, &identity.drop_if_exists_sql()).await?;
            }
        }
        execute(tx, &ensure_or_replace(ddl)).await?;
    }

    inspect(tx, filter).await
}

async fn execute(tx: &Transaction<'_>, statement: &str) -> Result<()> {
    tx.traced()
        .batch_execute(statement)
        .await
        .map_err(|source| Error::Ddl {
            statement: statement.to_owned(),
            source,
        })
}
