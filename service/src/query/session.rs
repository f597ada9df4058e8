//! [`Query`] collection related to the current session.

use std::convert::Infallible;

use tokio::sync::watch;

use crate::{domain::user::ResolvedSession, Service};

use super::Query;

/// Queries the currently cached [`ResolvedSession`], without resolving it.
#[derive(Clone, Copy, Debug)]
pub struct Current;

impl<Db, Auth, Store> Query<Current> for Service<Db, Auth, Store> {
    type Ok = Option<ResolvedSession>;
    type Err = Infallible;

    async fn execute(&self, _: Current) -> Result<Self::Ok, Self::Err> {
        Ok(self.state.session.borrow().clone())
    }
}

/// Queries a stream of the cached [`ResolvedSession`] changes.
///
/// The returned [`watch::Receiver`] observes the current value immediately.
#[derive(Clone, Copy, Debug)]
pub struct Changes;

impl<Db, Auth, Store> Query<Changes> for Service<Db, Auth, Store> {
    type Ok = watch::Receiver<Option<ResolvedSession>>;
    type Err = Infallible;

    async fn execute(&self, _: Changes) -> Result<Self::Ok, Self::Err> {
        Ok(self.state.session.subscribe())
    }
}

#[cfg(test)]
mod spec {
    use crate::{
        command::{Login, Logout},
        domain::user::{self, Password},
        testing::Harness,
        Command as _, Query as _,
    };

    use super::{Changes, Current};

    #[tokio::test]
    async fn follows_login_and_logout() {
        let h = Harness::new();
        _ = h.register("a@x.com", "secret123");
        let mut changes = h.service.execute(Changes).await.unwrap();
        assert_eq!(h.service.execute(Current).await.unwrap(), None);

        let session = h
            .service
            .execute(Login {
                email: user::Email::new("a@x.com").unwrap(),
                password: Box::new(Password::new("secret123").unwrap())
                    .into(),
            })
            .await
            .unwrap();

        changes.changed().await.unwrap();
        assert_eq!(*changes.borrow_and_update(), Some(session.clone()));
        assert_eq!(h.service.execute(Current).await.unwrap(), Some(session));

        h.service.execute(Logout).await.unwrap();

        changes.changed().await.unwrap();
        assert_eq!(*changes.borrow_and_update(), None);
        assert_eq!(h.service.execute(Current).await.unwrap(), None);
    }
}
