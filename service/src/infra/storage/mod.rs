//! [`Storage`]-related implementations.

pub mod file;
#[cfg(any(test, feature = "memory"))]
pub mod memory;

use derive_more::{Display, Error as StdError, From};
use serde::{de::DeserializeOwned, Serialize};

use crate::domain::user::{AuthSession, Snapshot};

#[cfg(any(test, feature = "memory"))]
pub use self::memory::Memory;
pub use self::file::File;

/// Local persisted key-value storage operation.
pub use common::Handler as Storage;

/// Value persisted in a [`Storage`] under its own key.
pub trait Record: Serialize + DeserializeOwned {
    /// Key this [`Record`] is persisted under.
    const KEY: &'static str;
}

impl Record for Snapshot {
    const KEY: &'static str = "user";
}

impl Record for AuthSession {
    const KEY: &'static str = "auth-token";
}

/// [`Storage`] error.
#[derive(Debug, Display, From, StdError)]
pub enum Error {
    /// I/O error.
    #[display("I/O error: {_0}")]
    Io(std::io::Error),

    /// Persisted value cannot be decoded into a [`Record`].
    #[display("Persisted value is corrupted: {_0}")]
    Corrupted(serde_json::Error),
}

impl Error {
    /// Indicates whether this [`Error`] is caused by an undecodable value.
    #[must_use]
    pub fn is_corrupted(&self) -> bool {
        matches!(self, Self::Corrupted(_))
    }
}
