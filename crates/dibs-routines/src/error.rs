use thiserror::Error;

use crate::identity::Unresolvable;

#[derive(Debug, Error)]
pub enum Error {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("declaration failed to execute: {source}\n{statement}")]
    Ddl {
        statement: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error(transparent)]
    Unresolvable(#[from] Unresolvable),

    #[error("current_schema() returned NULL, check the connection's search_path")]
    NoCurrentSchema,
}
