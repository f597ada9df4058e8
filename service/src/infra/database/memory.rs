//! In-memory [`Database`] implementation.

use std::{
    future, mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use common::operations::{By, Delete, Insert, Select, Update};
use derive_more::{Display, Error as StdError};
use tracerr::Traced;

use crate::{
    domain::{
        user::{self, NewUser},
        User,
    },
    infra::{database, Database},
};

/// In-memory [`Database`] holding the `users` table.
///
/// Clones share the same table.
#[derive(Clone, Debug, Default)]
pub struct Memory(Arc<Mutex<Table>>);

/// `users` table of a [`Memory`] [`Database`].
#[derive(Debug, Default)]
struct Table {
    /// Stored [`User`]s.
    rows: Vec<User>,

    /// Last assigned [`user::Id`].
    last_id: i64,

    /// Current [`Mode`] of the [`Memory`] [`Database`].
    mode: Mode,

    /// [`NewUser`] to be inserted right before the next [`Insert`] executes.
    racing_insert: Option<NewUser>,

    /// Indicator whether the next [`Insert`] fails with
    /// [`Error::Unavailable`].
    failing_insert: bool,

    /// Number of executed [`Select`]s.
    selects: usize,

    /// Number of executed [`Insert`]s.
    inserts: usize,
}

/// Behavior of a [`Memory`] [`Database`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Mode {
    /// Operations succeed.
    #[default]
    Available,

    /// Operations fail with [`Error::Unavailable`].
    Unavailable,

    /// Operations never complete.
    Hanging,
}

/// [`Memory`] database error.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, StdError)]
pub enum Error {
    /// [`Memory`] database is switched to [`Mode::Unavailable`].
    #[display("`users` table is unavailable")]
    Unavailable,

    /// Row with the same unique value exists already.
    #[display("duplicate key value violates unique constraint")]
    UniqueViolation,
}

impl Memory {
    /// Creates a new [`Memory`] database pre-filled with the provided
    /// [`NewUser`]s.
    #[must_use]
    pub fn with_users(users: impl IntoIterator<Item = NewUser>) -> Self {
        let this = Self::default();
        {
            let mut table = this.table();
            for new in users {
                _ = table.insert(new);
            }
        }
        this
    }

    /// Switches this [`Memory`] database into the provided [`Mode`].
    pub fn set_mode(&self, mode: Mode) {
        self.table().mode = mode;
    }

    /// Makes the next [`Insert`] lose a race against the provided
    /// [`NewUser`] being inserted concurrently.
    pub fn race_next_insert(&self, new: NewUser) {
        self.table().racing_insert = Some(new);
    }

    /// Makes the next [`Insert`] fail with [`Error::Unavailable`], while
    /// [`Select`]s keep succeeding.
    pub fn fail_next_insert(&self) {
        self.table().failing_insert = true;
    }

    /// Returns all the stored [`User`]s.
    #[must_use]
    pub fn users(&self) -> Vec<User> {
        self.table().rows.clone()
    }

    /// Returns the number of executed [`Select`]s.
    #[must_use]
    pub fn selects(&self) -> usize {
        self.table().selects
    }

    /// Returns the number of executed [`Insert`]s.
    #[must_use]
    pub fn inserts(&self) -> usize {
        self.table().inserts
    }

    /// Locks the underlying [`Table`].
    fn table(&self) -> MutexGuard<'_, Table> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies the current [`Mode`] before executing an operation.
    async fn ready(&self) -> Result<(), Traced<database::Error>> {
        let mode = self.table().mode;
        match mode {
            Mode::Available => Ok(()),
            Mode::Unavailable => {
                Err(tracerr::new!(database::Error::from(Error::Unavailable)))
            }
            Mode::Hanging => future::pending().await,
        }
    }

    /// Selects the first [`User`] matching the provided predicate.
    async fn select_by(
        &self,
        pred: impl Fn(&User) -> bool,
    ) -> Result<Option<User>, Traced<database::Error>> {
        self.ready().await.map_err(tracerr::wrap!())?;

        let mut table = self.table();
        table.selects += 1;
        Ok(table.rows.iter().find(|u| pred(u)).cloned())
    }
}

impl Table {
    /// Inserts the provided [`NewUser`] enforcing the unique constraints.
    fn insert(&mut self, new: NewUser) -> Result<User, Error> {
        let occupied = self
            .rows
            .iter()
            .any(|u| u.email == new.email || u.username == new.username);
        if occupied {
            return Err(Error::UniqueViolation);
        }

        self.last_id += 1;
        let user = new.with_id(self.last_id.into());
        self.rows.push(user.clone());
        Ok(user)
    }
}

impl Database<Select<By<Option<User>, user::Id>>> for Memory {
    type Ok = Option<User>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<User>, user::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        self.select_by(|u| u.id == id)
            .await
            .map_err(tracerr::wrap!())
    }
}

impl Database<Select<By<Option<User>, user::Email>>> for Memory {
    type Ok = Option<User>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<User>, user::Email>>,
    ) -> Result<Self::Ok, Self::Err> {
        let email = by.into_inner();
        self.select_by(|u| u.email == email)
            .await
            .map_err(tracerr::wrap!())
    }
}

impl Database<Select<By<Option<User>, user::Username>>> for Memory {
    type Ok = Option<User>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<User>, user::Username>>,
    ) -> Result<Self::Ok, Self::Err> {
        let username = by.into_inner();
        self.select_by(|u| u.username == username)
            .await
            .map_err(tracerr::wrap!())
    }
}

impl Database<Insert<NewUser>> for Memory {
    type Ok = User;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(new): Insert<NewUser>,
    ) -> Result<Self::Ok, Self::Err> {
        self.ready().await.map_err(tracerr::wrap!())?;

        let mut table = self.table();
        table.inserts += 1;
        if mem::take(&mut table.failing_insert) {
            return Err(tracerr::new!(database::Error::from(
                Error::Unavailable
            )));
        }
        if let Some(racing) = table.racing_insert.take() {
            _ = table.insert(racing);
        }
        table
            .insert(new)
            .map_err(tracerr::from_and_wrap!(=> database::Error))
    }
}

impl Database<Update<User>> for Memory {
    type Ok = Option<User>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(user): Update<User>,
    ) -> Result<Self::Ok, Self::Err> {
        self.ready().await.map_err(tracerr::wrap!())?;

        let mut table = self.table();
        let occupied = table.rows.iter().any(|u| {
            u.id != user.id
                && (u.email == user.email || u.username == user.username)
        });
        if occupied {
            return Err(tracerr::new!(database::Error::from(
                Error::UniqueViolation
            )));
        }
        Ok(table.rows.iter_mut().find(|u| u.id == user.id).map(|row| {
            row.clone_from(&user);
            user
        }))
    }
}

impl Database<Delete<By<User, user::Id>>> for Memory {
    type Ok = bool;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Delete(by): Delete<By<User, user::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        self.ready().await.map_err(tracerr::wrap!())?;

        let id = by.into_inner();
        let mut table = self.table();
        let before = table.rows.len();
        table.rows.retain(|u| u.id != id);
        Ok(table.rows.len() < before)
    }
}
