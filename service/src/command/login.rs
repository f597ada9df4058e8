//! [`Command`] for logging in with an [`Email`].

use std::convert::Infallible;

use derive_more::{Display, Error};
use secrecy::SecretBox;
use tracerr::Traced;
use tracing as log;

#[cfg(doc)]
use crate::domain::user::{Email, Password};
use crate::{
    domain::user::{self, AuthSession, ResolvedSession},
    infra::{auth, Provider},
    Service,
};

use super::{Command, FetchProfile, RememberSession};

/// [`Command`] for logging in with an [`Email`] and a [`Password`].
///
/// Signs in at the auth [`Provider`], then fetches (or creates) the profile
/// of the signed in identity and remembers the resolved session.
#[derive(Debug)]
pub struct Login {
    /// [`Email`] to log in with.
    pub email: user::Email,

    /// [`Password`] to log in with.
    pub password: SecretBox<user::Password>,
}

impl<Db, Auth, Store> Command<Login> for Service<Db, Auth, Store>
where
    Auth: Provider<
        auth::SignIn,
        Ok = AuthSession,
        Err = Traced<auth::Error>,
    >,
    Self: Command<FetchProfile, Ok = ResolvedSession, Err = Infallible>
        + Command<RememberSession, Ok = (), Err = Infallible>,
{
    type Ok = ResolvedSession;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        Login { email, password }: Login,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let session = self
            .provider()
            .execute(auth::SignIn { email, password })
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        log::info!("`{}` signed in", session.user.email);

        let resolved = self
            .execute(FetchProfile(session.user))
            .await
            .unwrap_or_else(|e| match e {});
        self.execute(RememberSession(resolved.clone()))
            .await
            .unwrap_or_else(|e| match e {});

        Ok(resolved)
    }
}

/// Error of [`Login`] [`Command`] execution.
#[derive(Debug, Display, Error)]
pub enum ExecutionError {
    /// Auth [`Provider`] error.
    #[display("Auth `Provider` operation failed: {_0}")]
    Provider(auth::Error),

    /// Auth [`Provider`] rejected the credentials.
    #[display("Wrong credentials: {_0}")]
    WrongCredentials(#[error(not(source))] String),
}

impl From<auth::Error> for ExecutionError {
    fn from(e: auth::Error) -> Self {
        match e {
            auth::Error::WrongCredentials(msg) => Self::WrongCredentials(msg),
            e @ (auth::Error::NoSession
            | auth::Error::Rejected(_)
            | auth::Error::Unavailable
            | auth::Error::Storage(_)) => Self::Provider(e),
            #[cfg(feature = "rest")]
            e @ (auth::Error::Http(_) | auth::Error::Url(_)) => {
                Self::Provider(e)
            }
        }
    }
}
