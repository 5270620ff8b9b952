//! The reconciliation cycle: declared DDL in, ordered operations out.
//!
//! This is the narrow surface a host migration tool calls into. Hooking
//! [`produce_operations`] into the host's comparator machinery is left to a
//! thin adapter on the host side.
//!
//! # Scope of a cycle
//!
//! Every routine and trigger in the filtered schemas is managed. Anything the
//! live catalog has that isn't declared is dropped, so an empty
//! [`Declarations`] means "drop everything". Hosts that only want to run the
//! cycle when the user configured declarations should check
//! [`Declarations::is_empty`] first.
//!
//! # Overloads
//!
//! Declared routines are matched to the canonical catalog by `(schema, name)`,
//! not by full signature. Declaring `f(integer)` therefore also keeps every
//! other existing overload of `f` in the desired state, and those overloads are
//! never dropped. Managing only some overloads of a name can leave stale ones
//! alive.

use std::collections::BTreeSet;

use tokio_postgres::GenericClient;

use crate::canonicalize::canonicalize;
use crate::catalog::{CatalogSnapshot, SchemaFilter, TriggerKey};
use crate::diff::{DiffResult, diff};
use crate::identity::{RoutineName, Unresolvable, resolve_routine_identity, resolve_trigger_identity};
use crate::inspect::{current_schema, inspect};
use crate::ops::Operation;
use crate::order::order_diff;
use crate::traced::Connection;
use crate::Result;

/// The routine and trigger DDL a caller wants to exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declarations {
    /// `CREATE [OR REPLACE] FUNCTION|PROCEDURE` statements.
    pub routines: Vec<String>,
    /// `CREATE [OR REPLACE] [CONSTRAINT] TRIGGER` statements.
    pub triggers: Vec<String>,
}

impl Declarations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routine(mut self, ddl: impl Into<String>) -> Self {
        self.routines.push(ddl.into());
        self
    }

    pub fn trigger(mut self, ddl: impl Into<String>) -> Self {
        self.triggers.push(ddl.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty() && self.triggers.is_empty()
    }
}

/// Identities named by a set of [`Declarations`], with schemas filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredIdentities {
    pub routines: BTreeSet<RoutineName>,
    pub triggers: BTreeSet<TriggerKey>,
}

impl DeclaredIdentities {
    /// Resolve every declaration, qualifying unqualified names with `default_schema`.
    ///
    /// Fails on the first declaration that isn't a recognizable creation statement.
    pub fn resolve(
        declarations: &Declarations,
        default_schema: &str,
    ) -> std::result::Result<Self, Unresolvable> {
        let routines = declarations
            .routines
            .iter()
            .map(|ddl| Ok(resolve_routine_identity(ddl)?.qualify(default_schema)))
            .collect::<std::result::Result<_, Unresolvable>>()?;
        let triggers = declarations
            .triggers
            .iter()
            .map(|ddl| Ok(resolve_trigger_identity(ddl)?.qualify(default_schema)))
            .collect::<std::result::Result<_, Unresolvable>>()?;
        Ok(Self { routines, triggers })
    }

    /// Keep only the canonical objects that were declared.
    pub fn narrow(&self, mut canonical: CatalogSnapshot) -> CatalogSnapshot {
        canonical.routines.retain(|r| {
            self.routines.contains(&RoutineName {
                schema: r.schema.clone(),
                name: r.name.clone(),
            })
        });
        canonical
            .triggers
            .retain(|t| self.triggers.contains(&t.key()));
        canonical
    }
}

/// Turn a host schema set into a [`SchemaFilter`].
///
/// `None` entries stand for "the default schema" and resolve to
/// `current_schema()`. An empty set means every user schema.
pub async fn resolve_schemas<C>(conn: &C, schemas: &[Option<String>]) -> Result<SchemaFilter>
where
    C: Connection + ?Sized,
{
    if schemas.is_empty() {
        return Ok(SchemaFilter::AllUser);
    }

    let mut default_schema = None;
    let mut resolved: Vec<String> = Vec::with_capacity(schemas.len());
    for schema in schemas {
        let name = match schema {
            Some(name) => name.clone(),
            None => match default_schema.clone() {
                Some(name) => name,
                None => {
                    let name = current_schema(conn).await?;
                    default_schema = Some(name.clone());
                    name
                }
            },
        };
        if !resolved.contains(&name) {
            resolved.push(name);
        }
    }
    Ok(SchemaFilter::Only(resolved))
}

/// Run one cycle and return the raw diff between the live catalog and `declarations`.
pub async fn reconcile<C>(
    conn: &mut C,
    declarations: &Declarations,
    schemas: &[Option<String>],
) -> Result<DiffResult>
where
    C: GenericClient + Connection,
{
    let filter = resolve_schemas(&*conn, schemas).await?;
    tracing::debug!(?filter, "resolved schemas");

    // Identities resolve before any DDL runs.
    let default_schema = current_schema(&*conn).await?;
    let declared = DeclaredIdentities::resolve(declarations, &default_schema)?;

    let current = inspect(&*conn, &filter).await?;
    tracing::info!(
        routines = current.routines.len(),
        triggers = current.triggers.len(),
        "found routines and triggers in database"
    );

    let canonical = canonicalize(
        conn,
        declarations.routines.as_slice(),
        declarations.triggers.as_slice(),
        &filter,
    )
    .await?;
    let canonical_routines = canonical.routines.len();
    let canonical_triggers = canonical.triggers.len();
    let desired = declared.narrow(canonical);
    tracing::debug!(
        routines = desired.routines.len(),
        triggers = desired.triggers.len(),
        filtered_routines = canonical_routines - desired.routines.len(),
        filtered_triggers = canonical_triggers - desired.triggers.len(),
        "narrowed canonical state to declarations"
    );

    if !declarations.routines.is_empty() && desired.routines.is_empty() {
        tracing::warn!("no canonical routines matched the declarations, check their schema qualifiers");
    }
    if !declarations.triggers.is_empty() && desired.triggers.is_empty() {
        tracing::warn!("no canonical triggers matched the declarations, check their schema qualifiers");
    }

    Ok(diff(&current, &desired))
}

/// Run one cycle and return the operations that bring the database to `declarations`.
pub async fn produce_operations<C>(
    conn: &mut C,
    declarations: &Declarations,
    schemas: &[Option<String>],
) -> Result<Vec<Operation>>
where
    C: GenericClient + Connection,
{
    let result = reconcile(conn, declarations, schemas).await?;
    let ops = order_diff(&result);
    tracing::info!(
        count = ops.len(),
        ops = ?ops.iter().map(Operation::kind).collect::<Vec<_>>(),
        "produced migration operations"
    );
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{RoutineInfo, RoutineKind, TriggerInfo};

    fn routine(schema: &str, name: &str, args: &str) -> RoutineInfo {
        RoutineInfo {
            schema: schema.to_string(),
            name: name.to_string(),
            identity_args: args.to_string(),
            kind: RoutineKind::Function,
            definition: format!("def {name}({args})"),
        }
    }

    fn trigger(schema: &str, table: &str, name: &str) -> TriggerInfo {
        TriggerInfo {
            schema: schema.to_string(),
            table_name: table.to_string(),
            trigger_name: name.to_string(),
            definition: format!("def {name}"),
        }
    }

    #[test]
    fn test_declarations_builder() {
        let decls = Declarations::new()
            .routine("CREATE FUNCTION f() RETURNS void LANGUAGE sql AS $$ $$")
            .trigger("CREATE TRIGGER t AFTER INSERT ON x FOR EACH ROW EXECUTE FUNCTION f()");
        assert_eq!(decls.routines.len(), 1);
        assert_eq!(decls.triggers.len(), 1);
        assert!(!decls.is_empty());
        assert!(Declarations::new().is_empty());
    }

    #[test]
    fn test_resolve_qualifies_with_default_schema() {
        let decls = Declarations::new()
            .routine("CREATE FUNCTION f() RETURNS void LANGUAGE sql AS $$ $$")
            .routine("CREATE FUNCTION audit.g() RETURNS void LANGUAGE sql AS $$ $$")
            .trigger("CREATE TRIGGER t AFTER INSERT ON orders FOR EACH ROW EXECUTE FUNCTION f()");

        let declared = DeclaredIdentities::resolve(&decls, "app").unwrap();
        assert_eq!(
            declared.routines.into_iter().collect::<Vec<_>>(),
            vec![
                RoutineName {
                    schema: "app".into(),
                    name: "f".into()
                },
                RoutineName {
                    schema: "audit".into(),
                    name: "g".into()
                },
            ]
        );
        assert!(declared.triggers.contains(&TriggerKey {
            schema: "app".into(),
            table_name: "orders".into(),
            trigger_name: "t".into(),
        }));
    }

    #[test]
    fn test_resolve_fails_on_unrecognized_declaration() {
        let decls = Declarations::new()
            .routine("CREATE FUNCTION f() RETURNS void LANGUAGE sql AS $$ $$")
            .routine("SELECT 1");
        let err = DeclaredIdentities::resolve(&decls, "public").unwrap_err();
        assert_eq!(err.ddl, "SELECT 1");
    }

    #[test]
    fn test_narrow_keeps_only_declared() {
        let canonical = CatalogSnapshot {
            routines: vec![
                routine("public", "f", ""),
                routine("public", "unrelated", ""),
                routine("audit", "f", ""),
            ],
            triggers: vec![
                trigger("public", "orders", "audit_trg"),
                trigger("public", "orders", "other_trg"),
            ],
        };
        let decls = Declarations::new()
            .routine("CREATE FUNCTION public.f() RETURNS void LANGUAGE sql AS $$ $$")
            .trigger("CREATE TRIGGER audit_trg AFTER INSERT ON public.orders FOR EACH ROW EXECUTE FUNCTION f()");
        let declared = DeclaredIdentities::resolve(&decls, "public").unwrap();

        let desired = declared.narrow(canonical);
        assert_eq!(desired.routines, vec![routine("public", "f", "")]);
        assert_eq!(desired.triggers, vec![trigger("public", "orders", "audit_trg")]);
    }

    #[test]
    fn test_narrow_keeps_undeclared_overloads_of_declared_name() {
        let canonical = CatalogSnapshot {
            routines: vec![
                routine("public", "f", "x integer"),
                routine("public", "f", "x text"),
            ],
            triggers: vec![],
        };
        let decls = Declarations::new()
            .routine("CREATE FUNCTION f(x integer) RETURNS int LANGUAGE sql AS $$ SELECT x $$");
        let declared = DeclaredIdentities::resolve(&decls, "public").unwrap();

        let desired = declared.narrow(canonical);
        assert_eq!(desired.routines.len(), 2);
    }
}
