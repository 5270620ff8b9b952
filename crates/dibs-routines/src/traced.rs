//! Connections the pipeline runs on, and query tracing.
//!
//! Every catalog read and every declaration batch goes through [`TracedConn`],
//! which runs the call under a `tracing` debug span carrying the SQL.

use std::future::Future;
use std::pin::Pin;

use tokio_postgres::types::ToSql;
use tokio_postgres::{Error, Row};
use tracing::Instrument;

type PgFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

type Params<'a> = &'a [&'a (dyn ToSql + Sync)];

/// Something the catalog can be read through and declarations run on.
///
/// Implemented for `tokio_postgres::Client`, `tokio_postgres::Transaction`
/// and `deadpool_postgres::Object`.
pub trait Connection: Send + Sync {
    fn query<'a>(&'a self, sql: &'a str, params: Params<'a>) -> PgFuture<'a, Vec<Row>>;

    fn query_one<'a>(&'a self, sql: &'a str, params: Params<'a>) -> PgFuture<'a, Row>;

    /// Simple query protocol, so dollar-quoted bodies reach the server verbatim.
    fn batch_execute<'a>(&'a self, sql: &'a str) -> PgFuture<'a, ()>;
}

macro_rules! impl_connection {
    ($ty:ty) => {
        impl Connection for $ty {
            fn query<'a>(&'a self, sql: &'a str, params: Params<'a>) -> PgFuture<'a, Vec<Row>> {
                Box::pin(<$ty>::query(self, sql, params))
            }

            fn query_one<'a>(&'a self, sql: &'a str, params: Params<'a>) -> PgFuture<'a, Row> {
                Box::pin(<$ty>::query_one(self, sql, params))
            }

            fn batch_execute<'a>(&'a self, sql: &'a str) -> PgFuture<'a, ()> {
                Box::pin(<$ty>::batch_execute(self, sql))
            }
        }
    };
}

impl_connection!(tokio_postgres::Client);
impl_connection!(tokio_postgres::Transaction<'_>);

// Pooled objects go through the client they wrap.
impl Connection for deadpool_postgres::Object {
    fn query<'a>(&'a self, sql: &'a str, params: Params<'a>) -> PgFuture<'a, Vec<Row>> {
        Connection::query(client_of(self), sql, params)
    }

    fn query_one<'a>(&'a self, sql: &'a str, params: Params<'a>) -> PgFuture<'a, Row> {
        Connection::query_one(client_of(self), sql, params)
    }

    fn batch_execute<'a>(&'a self, sql: &'a str) -> PgFuture<'a, ()> {
        Connection::batch_execute(client_of(self), sql)
    }
}

fn client_of(object: &deadpool_postgres::Object) -> &tokio_postgres::Client {
    object
}

/// A borrowed [`Connection`] whose calls are traced.
pub struct TracedConn<'a, C: Connection + ?Sized> {
    conn: &'a C,
}

impl<'a, C: Connection + ?Sized> TracedConn<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>, Error> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql,
            params = params.len(),
            rows = tracing::field::Empty,
        );
        let rows = self.conn.query(sql, params).instrument(span.clone()).await?;
        span.record("rows", rows.len());
        Ok(rows)
    }

    pub async fn query_one(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Row, Error> {
        let span = tracing::debug_span!("db.query", sql = %sql, params = params.len(), rows = 1u64);
        self.conn.query_one(sql, params).instrument(span).await
    }

    pub async fn batch_execute(&self, sql: &str) -> Result<(), Error> {
        let span = tracing::debug_span!("db.batch_execute", sql = %sql);
        self.conn.batch_execute(sql).instrument(span).await
    }
}

/// `.traced()` on any [`Connection`].
pub trait ConnectionExt: Connection {
    fn traced(&self) -> TracedConn<'_, Self> {
        TracedConn::new(self)
    }
}

impl<C: Connection + ?Sized> ConnectionExt for C {}
