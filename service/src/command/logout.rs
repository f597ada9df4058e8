//! [`Command`] for logging out.

use std::convert::Infallible;

use tracerr::Traced;
use tracing as log;

use crate::{
    infra::{auth, Provider},
    Service,
};

use super::{Command, ForgetSession};

/// [`Command`] for logging out of the current session.
///
/// Local session state is forgotten even if the auth [`Provider`] cannot be
/// reached.
#[derive(Clone, Copy, Debug)]
pub struct Logout;

impl<Db, Auth, Store> Command<Logout> for Service<Db, Auth, Store>
where
    Auth: Provider<auth::SignOut, Ok = (), Err = Traced<auth::Error>>,
    Self: Command<ForgetSession, Ok = (), Err = Infallible>,
{
    type Ok = ();
    type Err = Infallible;

    async fn execute(&self, _: Logout) -> Result<Self::Ok, Self::Err> {
        if let Err(e) = self.provider().execute(auth::SignOut).await {
            log::warn!("auth `Provider` failed to sign out: {e}");
        }
        self.execute(ForgetSession).await
    }
}

#[cfg(test)]
mod spec {
    use crate::{
        command::{Login, ResolveCurrentUser},
        domain::user::{AuthSession, Password, Snapshot},
        infra::{auth, storage::Record as _},
        testing::Harness,
        Command as _,
    };

    use super::Logout;

    async fn logged_in() -> Harness {
        let h = Harness::new();
        let identity = h.register("a@x.com", "secret123");
        _ = h
            .service
            .execute(Login {
                email: identity.email,
                password: Box::new(Password::new("secret123").unwrap())
                    .into(),
            })
            .await
            .unwrap();
        h
    }

    #[tokio::test]
    async fn forgets_session() {
        let h = logged_in().await;

        h.service.execute(Logout).await.unwrap();

        assert_eq!(h.storage.raw(Snapshot::KEY), None);
        assert_eq!(h.storage.raw(AuthSession::KEY), None);
        assert_eq!(*h.service.state.session.borrow(), None);
        assert_eq!(h.provider.sign_outs(), 1);

        let resolved = h.service.execute(ResolveCurrentUser).await.unwrap();
        assert_eq!(resolved, None);
    }

    #[tokio::test]
    async fn forgets_session_on_unavailable_provider() {
        let h = logged_in().await;
        h.provider.set_mode(auth::memory::Mode::Unavailable);

        h.service.execute(Logout).await.unwrap();

        assert_eq!(h.storage.raw(Snapshot::KEY), None);
        assert_eq!(h.storage.raw(AuthSession::KEY), None);
        assert_eq!(*h.service.state.session.borrow(), None);
    }
}
