//! [`Command`] for updating a [`User`] profile.

use std::convert::Infallible;

use common::operations::{By, Select, Update};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{
        user::{self, ResolvedSession},
        User,
    },
    infra::{database, Database},
    Service,
};

use super::{Command, RememberSession};

/// [`Command`] for updating a [`User`] profile.
///
/// [`None`] fields are left untouched.
#[derive(Clone, Debug, Default)]
pub struct UpdateUser {
    /// ID of the [`User`] to update.
    pub id: user::Id,

    /// New [`user::Username`] of the [`User`].
    pub username: Option<user::Username>,

    /// New [`user::FullName`] of the [`User`].
    ///
    /// `Some(None)` removes the current one.
    pub full_name: Option<Option<user::FullName>>,

    /// New [`user::Phone`] of the [`User`].
    ///
    /// `Some(None)` removes the current one.
    pub phone: Option<Option<user::Phone>>,

    /// New value of [`User::is_store_employee`].
    pub is_store_employee: Option<bool>,

    /// New value of [`User::require_password_change`].
    pub require_password_change: Option<bool>,
}

impl<Db, Auth, Store> Command<UpdateUser> for Service<Db, Auth, Store>
where
    Db: Database<
            Select<By<Option<User>, user::Id>>,
            Ok = Option<User>,
            Err = Traced<database::Error>,
        > + Database<Update<User>, Ok = Option<User>, Err = Traced<database::Error>>,
    Self: Command<RememberSession, Ok = (), Err = Infallible>,
{
    type Ok = User;
    type Err = Traced<ExecutionError>;

    async fn execute(&self, cmd: UpdateUser) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let UpdateUser {
            id,
            username,
            full_name,
            phone,
            is_store_employee,
            require_password_change,
        } = cmd;

        let mut user = self
            .database()
            .execute(Select(By::<Option<User>, _>::new(id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::UserNotExists(id))
            .map_err(tracerr::wrap!())?;

        if let Some(username) = username {
            user.username = username;
        }
        if let Some(full_name) = full_name {
            user.full_name = full_name;
        }
        if let Some(phone) = phone {
            user.phone = phone;
        }
        if let Some(flag) = is_store_employee {
            user.is_store_employee = flag;
        }
        if let Some(flag) = require_password_change {
            user.require_password_change = flag;
        }

        let user = match self.database().execute(Update(user.clone())).await {
            Ok(Some(user)) => user,
            Ok(None) => return Err(tracerr::new!(E::UserNotExists(id))),
            Err(e) if e.as_ref().is_unique_violation() => {
                return Err(tracerr::new!(E::UsernameOccupied(user.username)));
            }
            Err(e) => return Err(e).map_err(tracerr::map_from_and_wrap!(=> E)),
        };

        let cached = self.state.session.borrow().clone();
        if let Some(session) = cached.filter(|s| s.user.id == user.id) {
            self.execute(RememberSession(ResolvedSession {
                user: user.clone(),
                ..session
            }))
            .await
            .unwrap_or_else(|e| match e {});
        }

        Ok(user)
    }
}

/// Error of [`UpdateUser`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    Db(database::Error),

    /// [`User`] doesn't exist.
    #[display("`User(id: {_0})` does not exist")]
    #[from(ignore)]
    UserNotExists(#[error(not(source))] user::Id),

    /// [`user::Username`] is occupied by another [`User`].
    #[display("`Username({_0})` is occupied")]
    #[from(ignore)]
    UsernameOccupied(#[error(not(source))] user::Username),
}

#[cfg(test)]
mod spec {
    use crate::{
        command::Login,
        domain::user::{self, NewUser, Password, Phone, Username},
        infra::database,
        testing::{identity, Harness},
        Command as _, Config,
    };

    use super::{ExecutionError, UpdateUser};

    fn harness() -> Harness {
        Harness::with_database(
            Config::default(),
            database::Memory::with_users([
                NewUser::from_identity(&identity("a@x.com")),
                NewUser::from_identity(&identity("b@x.com")),
            ]),
        )
    }

    #[tokio::test]
    async fn updates_provided_fields_only() {
        let h = harness();
        let before = h.database.users()[0].clone();

        let user = h
            .service
            .execute(UpdateUser {
                id: before.id,
                phone: Some(Phone::new("+380501234567")),
                is_store_employee: Some(true),
                ..UpdateUser::default()
            })
            .await
            .unwrap();

        assert_eq!(user.username, before.username);
        assert_eq!(user.phone, Phone::new("+380501234567"));
        assert!(user.is_store_employee);
        assert_eq!(h.database.users()[0], user);
    }

    #[tokio::test]
    async fn refreshes_cached_session_of_current_user() {
        let h = harness();
        _ = h.register("a@x.com", "secret123");
        let session = h
            .service
            .execute(Login {
                email: user::Email::new("a@x.com").unwrap(),
                password: Box::new(Password::new("secret123").unwrap())
                    .into(),
            })
            .await
            .unwrap();

        _ = h
            .service
            .execute(UpdateUser {
                id: session.user.id,
                username: Some(Username::new("cashier").unwrap()),
                ..UpdateUser::default()
            })
            .await
            .unwrap();

        let cached = h.service.state.session.borrow().clone().unwrap();
        assert_eq!(cached.user.username.as_ref(), "cashier");
        assert_eq!(cached.identity, session.identity);
    }

    #[tokio::test]
    async fn rejects_occupied_username() {
        let h = harness();
        let id = h.database.users()[0].id;

        let err = h
            .service
            .execute(UpdateUser {
                id,
                username: Some(Username::new("b").unwrap()),
                ..UpdateUser::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err.as_ref(), ExecutionError::UsernameOccupied(_)));
    }

    #[tokio::test]
    async fn rejects_unknown_user() {
        let h = harness();

        let err = h
            .service
            .execute(UpdateUser {
                id: 404.into(),
                ..UpdateUser::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err.as_ref(), ExecutionError::UserNotExists(_)));
    }
}
