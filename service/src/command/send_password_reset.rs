//! [`Command`] for sending a password-reset email.

use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::user,
    infra::{auth, Provider},
    Service,
};

use super::Command;

/// [`Command`] for sending a password-reset email to the provided
/// [`user::Email`].
#[derive(Clone, Debug)]
pub struct SendPasswordReset(pub user::Email);

impl<Db, Auth, Store> Command<SendPasswordReset> for Service<Db, Auth, Store>
where
    Auth: Provider<
        auth::SendPasswordReset,
        Ok = (),
        Err = Traced<auth::Error>,
    >,
{
    type Ok = ();
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        SendPasswordReset(email): SendPasswordReset,
    ) -> Result<Self::Ok, Self::Err> {
        self.provider()
            .execute(auth::SendPasswordReset(email))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> ExecutionError))
    }
}

/// Error of [`SendPasswordReset`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// Auth [`Provider`] error.
    #[display("Auth `Provider` operation failed: {_0}")]
    Provider(auth::Error),
}

#[cfg(test)]
mod spec {
    use crate::{
        domain::user, infra::auth, testing::Harness, Command as _,
    };

    use super::{ExecutionError, SendPasswordReset};

    #[tokio::test]
    async fn sends_email() {
        let h = Harness::new();

        h.service
            .execute(SendPasswordReset(user::Email::new("a@x.com").unwrap()))
            .await
            .unwrap();

        assert_eq!(h.provider.password_resets(), vec!["a@x.com".to_owned()]);
    }

    #[tokio::test]
    async fn surfaces_provider_failure() {
        let h = Harness::new();
        h.provider.set_mode(auth::memory::Mode::Unavailable);

        let err = h
            .service
            .execute(SendPasswordReset(user::Email::new("a@x.com").unwrap()))
            .await
            .unwrap_err();

        assert!(matches!(
            err.as_ref(),
            ExecutionError::Provider(auth::Error::Unavailable),
        ));
    }
}
