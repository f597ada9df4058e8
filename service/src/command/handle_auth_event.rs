//! [`Command`] for handling an [`AuthEvent`].

use std::{convert::Infallible, sync::atomic::Ordering};

use tracing as log;

use crate::{
    domain::user::{AuthEvent, Identity, ResolvedSession},
    Service,
};

use super::{Command, ForgetSession, RememberSession, ResolveCurrentUser};

/// [`Command`] for keeping the cached session in sync with an out-of-band
/// [`AuthEvent`] of the auth provider.
///
/// Ignored while the initial session resolution is in progress.
#[derive(Clone, Debug)]
pub struct HandleAuthEvent(pub AuthEvent);

impl<Db, Auth, Store> Command<HandleAuthEvent> for Service<Db, Auth, Store>
where
    Self: Command<
            ResolveCurrentUser,
            Ok = Option<ResolvedSession>,
            Err = Infallible,
        > + Command<RememberSession, Ok = (), Err = Infallible>
        + Command<ForgetSession, Ok = (), Err = Infallible>,
{
    type Ok = ();
    type Err = Infallible;

    async fn execute(
        &self,
        HandleAuthEvent(event): HandleAuthEvent,
    ) -> Result<Self::Ok, Self::Err> {
        if self.state.initializing.load(Ordering::Acquire) {
            log::debug!("ignoring `{event}` during initial resolution");
            return Ok(());
        }

        let cached = self.state.session.borrow().clone();
        match event {
            AuthEvent::TokenRefreshed(session) => {
                match cached.filter(|c| c.belongs_to(&session.user.auth_id)) {
                    Some(mut cached) => {
                        cached.fetched_at = self.clock().now().coerce();
                        self.execute(RememberSession(cached)).await?;
                    }
                    None => {
                        log::debug!("ignoring token refresh of another session");
                    }
                }
            }
            AuthEvent::SignedIn(_) | AuthEvent::UserUpdated(_) => {
                if event
                    .identity()
                    .is_some_and(|i| is_cached(cached.as_ref(), i))
                {
                    log::debug!("`{event}` of the cached identity, skipping");
                    return Ok(());
                }
                _ = self.execute(ResolveCurrentUser).await?;
            }
            AuthEvent::SignedOut => {
                if cached.is_none() {
                    log::debug!("`{event}` without cached session, skipping");
                    return Ok(());
                }
                self.execute(ForgetSession).await?;
                _ = self.execute(ResolveCurrentUser).await?;
            }
        }
        Ok(())
    }
}

/// Indicates whether the provided [`Identity`] is the one of the `cached`
/// session.
fn is_cached(cached: Option<&ResolvedSession>, identity: &Identity) -> bool {
    cached.is_some_and(|c| {
        c.identity.auth_id == identity.auth_id
            && c.identity.email == identity.email
    })
}

#[cfg(test)]
mod spec {
    use std::{sync::atomic::Ordering, time::Duration};

    use common::operations::{By, Select};

    use crate::{
        command::Login,
        domain::user::{AuthEvent, Password, Snapshot},
        infra::{auth, storage::Record as _, Provider as _, Storage as _},
        testing::{identity, Harness},
        Command as _,
    };

    use super::HandleAuthEvent;

    const MINUTE: Duration = Duration::from_secs(60);

    async fn login(h: &Harness) {
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
    }

    #[tokio::test]
    async fn token_refresh_only_advances_freshness() {
        let h = Harness::new();
        login(&h).await;
        let before = h.service.state.session.borrow().clone().unwrap();
        let (selects, checks) =
            (h.database.selects(), h.provider.session_checks());
        h.clock.advance(30 * MINUTE);
        let session = h.provider.issue(before.identity.clone()).unwrap();

        h.service
            .execute(HandleAuthEvent(AuthEvent::TokenRefreshed(session)))
            .await
            .unwrap();

        let after = h.service.state.session.borrow().clone().unwrap();
        assert_eq!(after.identity, before.identity);
        assert_eq!(after.user, before.user);
        assert_eq!(
            before.fetched_at.elapsed_till(after.fetched_at),
            30 * MINUTE,
        );
        let persisted = h
            .storage
            .execute(Select(By::<Option<Snapshot>, ()>::single()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            persisted.last_fetched.unix_timestamp(),
            after.fetched_at.unix_timestamp(),
        );
        assert_eq!(h.database.selects(), selects);
        assert_eq!(h.provider.session_checks(), checks);
    }

    #[tokio::test]
    async fn skips_sign_in_of_cached_identity() {
        let h = Harness::new();
        login(&h).await;
        let session = h.provider.issue(identity("a@x.com")).unwrap();
        let checks = h.provider.session_checks();

        h.service
            .execute(HandleAuthEvent(AuthEvent::SignedIn(session)))
            .await
            .unwrap();

        assert_eq!(h.provider.session_checks(), checks);
    }

    #[tokio::test]
    async fn resolves_sign_in_of_another_identity() {
        let h = Harness::new();
        let other = h.register("b@x.com", "secret123");
        _ = h
            .provider
            .execute(auth::SignIn {
                email: other.email,
                password: Box::new(Password::new("secret123").unwrap())
                    .into(),
            })
            .await
            .unwrap();
        let session = h.provider.issue(identity("b@x.com")).unwrap();

        h.service
            .execute(HandleAuthEvent(AuthEvent::SignedIn(session)))
            .await
            .unwrap();

        let cached = h.service.state.session.borrow().clone().unwrap();
        assert_eq!(cached.identity.email.as_ref(), "b@x.com");
        assert_eq!(h.provider.session_checks(), 1);
    }

    #[tokio::test]
    async fn sign_out_clears_cached_session() {
        let h = Harness::new();
        login(&h).await;
        _ = h.provider.execute(auth::SignOut).await.unwrap();

        h.service
            .execute(HandleAuthEvent(AuthEvent::SignedOut))
            .await
            .unwrap();

        assert_eq!(*h.service.state.session.borrow(), None);
        assert_eq!(h.storage.raw(Snapshot::KEY), None);
    }

    #[tokio::test]
    async fn skips_sign_out_without_cached_session() {
        let h = Harness::new();

        h.service
            .execute(HandleAuthEvent(AuthEvent::SignedOut))
            .await
            .unwrap();

        assert_eq!(h.provider.session_checks(), 0);
    }

    #[tokio::test]
    async fn ignores_events_during_initial_resolution() {
        let h = Harness::new();
        _ = h.register("a@x.com", "secret123");
        h.service.state.initializing.store(true, Ordering::Release);
        let session = h.provider.issue(identity("a@x.com")).unwrap();

        h.service
            .execute(HandleAuthEvent(AuthEvent::SignedIn(session)))
            .await
            .unwrap();

        assert_eq!(h.provider.session_checks(), 0);
        assert_eq!(*h.service.state.session.borrow(), None);
    }
}
