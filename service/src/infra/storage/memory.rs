//! In-memory [`Storage`] implementation.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use common::operations::{By, Delete, Insert, Select};
use tracerr::Traced;

use crate::infra::{storage, Storage};

use super::Record;

/// [`Storage`] keeping raw JSON values in memory.
///
/// Clones share the same values.
#[derive(Clone, Debug, Default)]
pub struct Memory(Arc<Mutex<HashMap<&'static str, String>>>);

impl Memory {
    /// Returns the raw value stored under the provided key, if any.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.values().get(key).cloned()
    }

    /// Stores the provided raw value under the provided key, bypassing any
    /// encoding.
    pub fn set_raw(&self, key: &'static str, value: impl Into<String>) {
        _ = self.values().insert(key, value.into());
    }

    /// Locks the underlying values.
    fn values(&self) -> MutexGuard<'_, HashMap<&'static str, String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<R: Record> Storage<Select<By<Option<R>, ()>>> for Memory {
    type Ok = Option<R>;
    type Err = Traced<storage::Error>;

    async fn execute(
        &self,
        _: Select<By<Option<R>, ()>>,
    ) -> Result<Self::Ok, Self::Err> {
        self.raw(R::KEY)
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(tracerr::from_and_wrap!(=> storage::Error))
    }
}

impl<R: Record> Storage<Insert<R>> for Memory {
    type Ok = ();
    type Err = Traced<storage::Error>;

    async fn execute(
        &self,
        Insert(record): Insert<R>,
    ) -> Result<Self::Ok, Self::Err> {
        let raw = serde_json::to_string(&record)
            .map_err(tracerr::from_and_wrap!(=> storage::Error))?;
        self.set_raw(R::KEY, raw);
        Ok(())
    }
}

impl<R: Record> Storage<Delete<By<R, ()>>> for Memory {
    type Ok = ();
    type Err = Traced<storage::Error>;

    async fn execute(
        &self,
        _: Delete<By<R, ()>>,
    ) -> Result<Self::Ok, Self::Err> {
        _ = self.values().remove(R::KEY);
        Ok(())
    }
}
