//! Catalog value types: routines, triggers, their identity keys, and snapshots.

use std::fmt;

/// Whether a routine is a function or a procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoutineKind {
    Function,
    Procedure,
}

impl RoutineKind {
    /// Parse a `pg_proc.prokind` value. Only plain routines map to a kind.
    pub fn from_prokind(prokind: i8) -> Option<Self> {
        match prokind as u8 {
            b'f' => Some(RoutineKind::Function),
            b'p' => Some(RoutineKind::Procedure),
            _ => None,
        }
    }

    /// The SQL keyword for this kind.
    pub fn keyword(self) -> &'static str {
        match self {
            RoutineKind::Function => "FUNCTION",
            RoutineKind::Procedure => "PROCEDURE",
        }
    }
}

impl fmt::Display for RoutineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutineKind::Function => write!(f, "function"),
            RoutineKind::Procedure => write!(f, "procedure"),
        }
    }
}

/// Identity of a routine: schema, name and the overload signature.
///
/// Field order is the sort order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutineKey {
    pub schema: String,
    pub name: String,
    pub identity_args: String,
}

impl fmt::Display for RoutineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({})", self.schema, self.name, self.identity_args)
    }
}

/// Identity of a trigger: schema, table and trigger name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriggerKey {
    pub schema: String,
    pub table_name: String,
    pub trigger_name: String,
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {}.{}",
            self.trigger_name, self.schema, self.table_name
        )
    }
}

/// Either kind of identity key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKey {
    Routine(RoutineKey),
    Trigger(TriggerKey),
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKey::Routine(key) => key.fmt(f),
            ObjectKey::Trigger(key) => key.fmt(f),
        }
    }
}

/// A function or procedure as loaded from `pg_proc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutineInfo {
    pub schema: String,
    pub name: String,
    /// `pg_get_function_identity_arguments()`, disambiguates overloads.
    pub identity_args: String,
    pub kind: RoutineKind,
    /// `pg_get_functiondef()`, the canonical creation text.
    pub definition: String,
}

impl RoutineInfo {
    pub fn key(&self) -> RoutineKey {
        RoutineKey {
            schema: self.schema.clone(),
            name: self.name.clone(),
            identity_args: self.identity_args.clone(),
        }
    }
}

/// A trigger as loaded from `pg_trigger`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriggerInfo {
    pub schema: String,
    pub table_name: String,
    pub trigger_name: String,
    /// `pg_get_triggerdef()`, the canonical creation text.
    pub definition: String,
}

impl TriggerInfo {
    pub fn key(&self) -> TriggerKey {
        TriggerKey {
            schema: self.schema.clone(),
            table_name: self.table_name.clone(),
            trigger_name: self.trigger_name.clone(),
        }
    }
}

/// An object that can be diffed by identity key and definition text.
pub trait CatalogObject: Clone {
    type Key: Ord + Clone + fmt::Display;

    fn key(&self) -> Self::Key;

    fn definition(&self) -> &str;
}

impl CatalogObject for RoutineInfo {
    type Key = RoutineKey;

    fn key(&self) -> RoutineKey {
        RoutineInfo::key(self)
    }

    fn definition(&self) -> &str {
        &self.definition
    }
}

impl CatalogObject for TriggerInfo {
    type Key = TriggerKey;

    fn key(&self) -> TriggerKey {
        TriggerInfo::key(self)
    }

    fn definition(&self) -> &str {
        &self.definition
    }
}

/// A point-in-time view of routines and triggers, either live or hypothetical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    pub routines: Vec<RoutineInfo>,
    pub triggers: Vec<TriggerInfo>,
}

impl CatalogSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty() && self.triggers.is_empty()
    }
}

/// Which schemas the inspector looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SchemaFilter {
    /// Every schema except `information_schema` and the `pg_*` system schemas.
    #[default]
    AllUser,
    /// Exactly these schemas.
    Only(Vec<String>),
}

impl SchemaFilter {
    pub fn only<I, S>(schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SchemaFilter::Only(schemas.into_iter().map(Into::into).collect())
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routine_key_ordering() {
        let a = RoutineKey {
            schema: "public".into(),
            name: "f".into(),
            identity_args: "integer".into(),
        };
        let b = RoutineKey {
            schema: "public".into(),
            name: "f".into(),
            identity_args: "text".into(),
        };
        let c = RoutineKey {
            schema: "public".into(),
            name: "g".into(),
            identity_args: "".into(),
        };
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_schema_filter_only() {
        assert_eq!(
            SchemaFilter::only(["audit", "public"]),
            SchemaFilter::Only(vec!["audit".to_string(), "public".to_string()])
        );
        assert_eq!(SchemaFilter::default(), SchemaFilter::AllUser);
    }

    #[test]
    fn test_prokind() {
        assert_eq!(RoutineKind::from_prokind(b'f' as i8), Some(RoutineKind::Function));
        assert_eq!(RoutineKind::from_prokind(b'p' as i8), Some(RoutineKind::Procedure));
        assert_eq!(RoutineKind::from_prokind(b'a' as i8), None);
        assert_eq!(RoutineKind::from_prokind(b'w' as i8), None);
    }
}
