//! Auth [`Provider`]-related implementations.

#[cfg(any(test, feature = "memory"))]
pub mod memory;
#[cfg(feature = "rest")]
pub mod rest;

use common::operations::{By, Delete, Insert, Select};
use derive_more::{Display, Error as StdError, From};
use secrecy::SecretBox;
use tracerr::Traced;

use crate::{
    domain::user::{self, AuthSession, Password},
    infra::{storage, Storage},
};

#[cfg(any(test, feature = "memory"))]
pub use self::memory::Memory;
#[cfg(feature = "rest")]
pub use self::rest::Rest;

/// Operation of the hosted auth service.
pub use common::Handler as Provider;

/// [`Storage`] of the [`AuthSession`] persisted by a [`Provider`].
pub trait SessionStorage:
    Storage<
        Select<By<Option<AuthSession>, ()>>,
        Ok = Option<AuthSession>,
        Err = Traced<storage::Error>,
    > + Storage<Insert<AuthSession>, Ok = (), Err = Traced<storage::Error>>
    + Storage<Delete<By<AuthSession, ()>>, Ok = (), Err = Traced<storage::Error>>
{
}

impl<S> SessionStorage for S where
    S: Storage<
            Select<By<Option<AuthSession>, ()>>,
            Ok = Option<AuthSession>,
            Err = Traced<storage::Error>,
        > + Storage<Insert<AuthSession>, Ok = (), Err = Traced<storage::Error>>
        + Storage<
            Delete<By<AuthSession, ()>>,
            Ok = (),
            Err = Traced<storage::Error>,
        >
{
}

/// [`Provider`] operation signing in with credentials.
///
/// On success, the issued [`user::AuthSession`] is stored locally and
/// [`user::AuthEvent::SignedIn`] is emitted.
#[derive(Debug)]
pub struct SignIn {
    /// [`user::Email`] to sign in with.
    pub email: user::Email,

    /// [`Password`] to sign in with.
    pub password: SecretBox<Password>,
}

/// [`Provider`] operation signing out the current session.
///
/// Local session is forgotten even if the auth service is unreachable.
#[derive(Clone, Copy, Debug)]
pub struct SignOut;

/// [`Provider`] operation returning the current [`user::AuthSession`],
/// refreshing it if expired.
#[derive(Clone, Copy, Debug)]
pub struct GetSession;

/// [`Provider`] operation sending a password-reset email.
#[derive(Clone, Debug)]
pub struct SendPasswordReset(pub user::Email);

/// [`Provider`] operation changing the password of the current session.
#[derive(Debug)]
pub struct UpdatePassword(pub SecretBox<Password>);

/// [`Provider`] operation subscribing to [`user::AuthEvent`]s.
#[derive(Clone, Copy, Debug)]
pub struct Subscribe;

/// [`Provider`] error.
#[derive(Debug, Display, From, StdError)]
pub enum Error {
    /// Provided credentials were rejected.
    #[display("Wrong credentials: {_0}")]
    #[from(ignore)]
    WrongCredentials(#[error(not(source))] String),

    /// Operation requires a session, but there is none.
    #[display("No active session")]
    NoSession,

    /// Auth service rejected the request.
    #[display("Auth service rejected the request: {_0}")]
    #[from(ignore)]
    Rejected(#[error(not(source))] String),

    /// Auth service cannot be reached.
    #[display("Auth service is unavailable")]
    Unavailable,

    /// HTTP request failed.
    #[cfg(feature = "rest")]
    #[display("HTTP request failed: {_0}")]
    Http(reqwest::Error),

    /// Auth service URL is invalid.
    #[cfg(feature = "rest")]
    #[display("Invalid auth service URL: {_0}")]
    Url(url::ParseError),

    /// Local session storage failed.
    #[display("Session storage failed: {_0}")]
    Storage(storage::Error),
}
