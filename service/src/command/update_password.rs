//! [`Command`] for updating the [`Password`] of the current session.

use std::convert::Infallible;

use common::operations::Update;
use derive_more::{Display, Error, From};
use secrecy::SecretBox;
use tracerr::Traced;
use tracing as log;

#[cfg(doc)]
use crate::domain::user::Password;
use crate::{
    domain::{
        user::{self, Identity, ResolvedSession},
        User,
    },
    infra::{auth, database, Database, Provider},
    Service,
};

use super::{Command, RememberSession};

/// [`Command`] for updating the [`Password`] of the current session.
///
/// Clears the [`User::require_password_change`] flag of the current profile,
/// if set.
#[derive(Debug)]
pub struct UpdatePassword(pub SecretBox<user::Password>);

impl<Db, Auth, Store> Command<UpdatePassword> for Service<Db, Auth, Store>
where
    Db: Database<Update<User>, Ok = Option<User>, Err = Traced<database::Error>>,
    Auth: Provider<
        auth::UpdatePassword,
        Ok = Identity,
        Err = Traced<auth::Error>,
    >,
    Self: Command<RememberSession, Ok = (), Err = Infallible>,
{
    type Ok = ();
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        UpdatePassword(password): UpdatePassword,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let identity = self
            .provider()
            .execute(auth::UpdatePassword(password))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        let cached = self.state.session.borrow().clone();
        let Some(mut session) = cached.filter(|s| {
            s.belongs_to(&identity.auth_id)
                && s.user.require_password_change
                && s.user.id.is_known()
        }) else {
            return Ok(());
        };

        session.user.require_password_change = false;
        let updated = self
            .database()
            .execute(Update(session.user.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        match updated {
            Some(user) => {
                log::info!("`User(id: {})` changed the password", user.id);
                self.execute(RememberSession(ResolvedSession {
                    user,
                    ..session
                }))
                .await
                .unwrap_or_else(|e| match e {});
            }
            None => log::warn!(
                "profile of `User(id: {})` vanished on password change",
                session.user.id,
            ),
        }
        Ok(())
    }
}

/// Error of [`UpdatePassword`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    Db(database::Error),

    /// Auth [`Provider`] error.
    #[display("Auth `Provider` operation failed: {_0}")]
    Provider(auth::Error),
}

#[cfg(test)]
mod spec {
    use crate::{
        command::Login,
        domain::user::{self, NewUser, Password},
        infra::{auth, database},
        testing::{identity, Harness},
        Command as _, Config,
    };

    use super::{ExecutionError, UpdatePassword};

    fn password(s: &str) -> secrecy::SecretBox<Password> {
        Box::new(Password::new(s).unwrap()).into()
    }

    #[tokio::test]
    async fn clears_required_password_change() {
        let mut profile = NewUser::from_identity(&identity("a@x.com"));
        profile.require_password_change = true;
        let h = Harness::with_database(
            Config::default(),
            database::Memory::with_users([profile]),
        );
        _ = h.register("a@x.com", "secret123");
        let session = h
            .service
            .execute(Login {
                email: user::Email::new("a@x.com").unwrap(),
                password: password("secret123"),
            })
            .await
            .unwrap();
        assert!(session.user.require_password_change);

        h.service
            .execute(UpdatePassword(password("new-secret")))
            .await
            .unwrap();

        assert!(!h.database.users()[0].require_password_change);
        let cached = h.service.state.session.borrow().clone().unwrap();
        assert!(!cached.user.require_password_change);

        _ = h
            .service
            .execute(Login {
                email: user::Email::new("a@x.com").unwrap(),
                password: password("new-secret"),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn requires_session() {
        let h = Harness::new();

        let err = h
            .service
            .execute(UpdatePassword(password("new-secret")))
            .await
            .unwrap_err();

        assert!(matches!(
            err.as_ref(),
            ExecutionError::Provider(auth::Error::NoSession),
        ));
    }
}
