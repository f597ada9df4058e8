//! Infrastructure layer.

pub mod auth;
pub mod database;
pub mod storage;

pub use self::{auth::Provider, database::Database, storage::Storage};
#[cfg(feature = "postgres")]
pub use self::database::{postgres, Postgres};
