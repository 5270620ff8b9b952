//! Catalog inspection for functions, procedures and triggers.
//!
//! Everything here is a read-only query against the system catalog. The
//! definitions come from `pg_get_functiondef()` and `pg_get_triggerdef()`, so
//! they are already in the form PostgreSQL itself would regenerate.
//!
//! Objects that belong to an extension (`pg_depend.deptype = 'e'`) are never
//! returned, so installing something like `pgcrypto` doesn't make its
//! functions show up as drops.

use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

use crate::catalog::{CatalogSnapshot, RoutineInfo, RoutineKind, SchemaFilter, TriggerInfo};
use crate::traced::{Connection, ConnectionExt};
use crate::{Error, Result};

const USER_SCHEMAS: &str = r"n.nspname <> 'information_schema' AND n.nspname NOT LIKE 'pg\_%'";

const ALLOWED_SCHEMAS: &str = "n.nspname = ANY($1)";

const ROUTINES_QUERY: &str = r#"
SELECT
    n.nspname AS schema,
    p.proname AS name,
    pg_catalog.pg_get_function_identity_arguments(p.oid) AS identity_args,
    p.prokind AS kind,
    pg_catalog.pg_get_functiondef(p.oid) AS definition
FROM pg_catalog.pg_proc p
JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
WHERE p.prokind IN ('f', 'p')
  AND NOT EXISTS (
      SELECT 1
      FROM pg_catalog.pg_depend d
      WHERE d.classid = 'pg_catalog.pg_proc'::regclass
        AND d.objid = p.oid
        AND d.deptype = 'e'
  )
  AND ({schema_filter})
ORDER BY n.nspname COLLATE "C", p.proname COLLATE "C",
    pg_catalog.pg_get_function_identity_arguments(p.oid) COLLATE "C"
"#;

// Clones of a partitioned table's trigger (tgparentid <> 0) follow their parent
// and are not tracked on their own.
const TRIGGERS_QUERY: &str = r#"
SELECT
    n.nspname AS schema,
    c.relname AS table_name,
    t.tgname AS trigger_name,
    pg_catalog.pg_get_triggerdef(t.oid) AS definition
FROM pg_catalog.pg_trigger t
JOIN pg_catalog.pg_class c ON c.oid = t.tgrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE NOT t.tgisinternal
  AND t.tgparentid = 0
  AND NOT EXISTS (
      SELECT 1
      FROM pg_catalog.pg_depend d
      WHERE d.deptype = 'e'
        AND (
            (d.classid = 'pg_catalog.pg_trigger'::regclass AND d.objid = t.oid)
            OR (d.classid = 'pg_catalog.pg_class'::regclass AND d.objid = c.oid)
        )
  )
  AND ({schema_filter})
ORDER BY n.nspname COLLATE "C", c.relname COLLATE "C", t.tgname COLLATE "C"
"#;

/// Load every plain function and procedure visible through `filter`.
///
/// Aggregates, window functions and extension members are excluded. Results
/// are sorted by `(schema, name, identity_args)`.
pub async fn inspect_routines<C>(conn: &C, filter: &SchemaFilter) -> Result<Vec<RoutineInfo>>
where
    C: Connection + ?Sized,
{
    let rows = run_filtered(conn, ROUTINES_QUERY, filter).await?;

    let mut routines = Vec::with_capacity(rows.len());
    for row in rows {
        let prokind: i8 = row.try_get("kind")?;
        let Some(kind) = RoutineKind::from_prokind(prokind) else {
            tracing::debug!(prokind, "skipping routine with unexpected prokind");
            continue;
        };
        routines.push(RoutineInfo {
            schema: row.try_get("schema")?,
            name: row.try_get("name")?,
            identity_args: row.try_get("identity_args")?,
            kind,
            definition: row.try_get("definition")?,
        });
    }
    routines.sort_by_key(RoutineInfo::key);

    tracing::debug!(count = routines.len(), "inspected routines");
    Ok(routines)
}

/// Load every user-defined trigger visible through `filter`.
///
/// Internal triggers (the ones backing foreign keys, for example) and triggers
/// owned by extensions are excluded. Results are sorted by
/// `(schema, table_name, trigger_name)`.
pub async fn inspect_triggers<C>(conn: &C, filter: &SchemaFilter) -> Result<Vec<TriggerInfo>>
where
    C: Connection + ?Sized,
{
    let rows = run_filtered(conn, TRIGGERS_QUERY, filter).await?;

    let mut triggers = rows
        .iter()
        .map(|row| {
            Ok(TriggerInfo {
                schema: row.try_get("schema")?,
                table_name: row.try_get("table_name")?,
                trigger_name: row.try_get("trigger_name")?,
                definition: row.try_get("definition")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    triggers.sort_by_key(TriggerInfo::key);

    tracing::debug!(count = triggers.len(), "inspected triggers");
    Ok(triggers)
}

/// Load routines and triggers together.
pub async fn inspect<C>(conn: &C, filter: &SchemaFilter) -> Result<CatalogSnapshot>
where
    C: Connection + ?Sized,
{
    let routines = inspect_routines(conn, filter).await?;
    let triggers = inspect_triggers(conn, filter).await?;
    Ok(CatalogSnapshot { routines, triggers })
}

/// The connection's default schema, used for unqualified declarations.
pub async fn current_schema<C>(conn: &C) -> Result<String>
where
    C: Connection + ?Sized,
{
    let row = conn
        .traced()
        .query_one("SELECT pg_catalog.current_schema()::text", &[])
        .await?;
    let schema: Option<String> = row.try_get(0)?;
    schema.ok_or(Error::NoCurrentSchema)
}

async fn run_filtered<C>(conn: &C, template: &str, filter: &SchemaFilter) -> Result<Vec<Row>>
where
    C: Connection + ?Sized,
{
    let rows = match filter {
        SchemaFilter::AllUser => {
            let sql = template.replace("{schema_filter}", USER_SCHEMAS);
            conn.traced().query(&sql, &[]).await?
        }
        SchemaFilter::Only(schemas) => {
            let sql = template.replace("{schema_filter}", ALLOWED_SCHEMAS);
            let params: [&(dyn ToSql + Sync); 1] = [schemas];
            conn.traced().query(&sql, &params).await?
        }
    };
    Ok(rows)
}
