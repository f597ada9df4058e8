//! Postgres [`Database`] implementation.

mod impls;

use deadpool_postgres::{CreatePoolError, Object, Pool, PoolError, Runtime};
use derive_more::{Display, Error as StdError, From};
use tokio_postgres::{error::SqlState, types::ToSql, NoTls, Row};
use tracerr::Traced;

use crate::infra::database;
#[cfg(doc)]
use crate::infra::Database;

pub use deadpool_postgres::Config;

/// Parameters of a SQL statement.
type Params<'a> = &'a [&'a (dyn ToSql + Sync)];

/// Postgres [`Database`] client backed by a connection [`Pool`].
#[derive(Clone, Debug)]
pub struct Postgres(Pool);

impl Postgres {
    /// Creates a new [`Postgres`] client with the provided [`Config`].
    ///
    /// Connections are established lazily, so an unreachable server is
    /// reported by the first query only.
    ///
    /// # Errors
    ///
    /// If the provided [`Config`] is invalid.
    pub fn new(conf: &Config) -> Result<Self, Traced<database::Error>> {
        conf.create_pool(Some(Runtime::Tokio1), NoTls)
            .map(Self)
            .map_err(tracerr::from_and_wrap!(=> Error))
            .map_err(tracerr::map_from)
    }

    /// Checks a pooled connection out.
    async fn client(&self) -> Result<Object, Traced<database::Error>> {
        self.0
            .get()
            .await
            .map_err(tracerr::from_and_wrap!(=> Error))
            .map_err(tracerr::map_from)
    }

    /// Runs the provided `sql` query, expecting at most one row back.
    async fn query_opt(
        &self,
        sql: &str,
        params: Params<'_>,
    ) -> Result<Option<Row>, Traced<database::Error>> {
        let client = self.client().await.map_err(tracerr::wrap!())?;
        client
            .query_opt(sql, params)
            .await
            .map_err(tracerr::from_and_wrap!(=> Error))
            .map_err(tracerr::map_from)
    }

    /// Runs the provided `sql` query, expecting exactly one row back.
    async fn query_one(
        &self,
        sql: &str,
        params: Params<'_>,
    ) -> Result<Row, Traced<database::Error>> {
        let client = self.client().await.map_err(tracerr::wrap!())?;
        client
            .query_one(sql, params)
            .await
            .map_err(tracerr::from_and_wrap!(=> Error))
            .map_err(tracerr::map_from)
    }

    /// Executes the provided `sql` statement, returning the number of
    /// affected rows.
    async fn exec(
        &self,
        sql: &str,
        params: Params<'_>,
    ) -> Result<u64, Traced<database::Error>> {
        let client = self.client().await.map_err(tracerr::wrap!())?;
        client
            .execute(sql, params)
            .await
            .map_err(tracerr::from_and_wrap!(=> Error))
            .map_err(tracerr::map_from)
    }
}

/// Postgres database [`Error`].
#[derive(Debug, Display, StdError, From)]
pub enum Error {
    /// SQL statement failed.
    #[display("SQL statement failed: {_0}")]
    Query(tokio_postgres::Error),

    /// Connection [`Pool`] cannot be created.
    #[display("Failed to create connection pool: {_0}")]
    PoolCreation(CreatePoolError),

    /// No connection can be checked out of the [`Pool`].
    #[display("Connection pool failed: {_0}")]
    Pool(PoolError),
}

impl Error {
    /// Checks whether this [`Error`] is a unique constraint violation.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Query(e) => e.code() == Some(&SqlState::UNIQUE_VIOLATION),
            Self::Pool(_) | Self::PoolCreation(_) => false,
        }
    }
}
