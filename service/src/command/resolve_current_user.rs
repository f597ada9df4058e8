//! [`Command`] for resolving the currently logged-in [`User`].

use std::convert::Infallible;

use common::{
    operations::{By, Delete, Select},
    HandlerExt as _,
};
use tokio::time;
use tracerr::Traced;
use tracing as log;

#[cfg(doc)]
use crate::domain::User;
use crate::{
    domain::user::{AuthSession, ResolvedSession, Snapshot},
    infra::{auth, storage, Provider, Storage},
    Service,
};

use super::{Command, FetchProfile, ForgetSession, RememberSession};

/// [`Command`] for resolving the currently logged-in [`User`].
///
/// Concurrent executions share a single in-flight resolution. Never fails:
/// every failure results either in a reused (possibly stale) session, in a
/// fallback profile, or in no session at all.
#[derive(Clone, Copy, Debug)]
pub struct ResolveCurrentUser;

/// Maximum number of retries of a failed resolution.
const MAX_RETRIES: u32 = 1;

/// Outcome of a single resolution attempt.
#[derive(Debug)]
enum Outcome {
    /// Session is resolved.
    Resolved(ResolvedSession),

    /// Auth provider reports there is no session.
    SignedOut,

    /// Neither the auth provider, nor the local state could resolve the
    /// session.
    Failed,
}

impl<Db, Auth, Store> Command<ResolveCurrentUser> for Service<Db, Auth, Store>
where
    Auth: Provider<
        auth::GetSession,
        Ok = Option<AuthSession>,
        Err = Traced<auth::Error>,
    >,
    Store: Storage<
            Select<By<Option<Snapshot>, ()>>,
            Ok = Option<Snapshot>,
            Err = Traced<storage::Error>,
        > + Storage<
            Select<By<Option<AuthSession>, ()>>,
            Ok = Option<AuthSession>,
            Err = Traced<storage::Error>,
        > + Storage<
            Delete<By<Snapshot, ()>>,
            Ok = (),
            Err = Traced<storage::Error>,
        >,
    Self: Command<FetchProfile, Ok = ResolvedSession, Err = Infallible>
        + Command<RememberSession, Ok = (), Err = Infallible>
        + Command<ForgetSession, Ok = (), Err = Infallible>,
{
    type Ok = Option<ResolvedSession>;
    type Err = Infallible;

    async fn execute(
        &self,
        _: ResolveCurrentUser,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self.state.resolution.run(|| self.resolve()).await)
    }
}

impl<Db, Auth, Store> Service<Db, Auth, Store>
where
    Auth: Provider<
        auth::GetSession,
        Ok = Option<AuthSession>,
        Err = Traced<auth::Error>,
    >,
    Store: Storage<
            Select<By<Option<Snapshot>, ()>>,
            Ok = Option<Snapshot>,
            Err = Traced<storage::Error>,
        > + Storage<
            Select<By<Option<AuthSession>, ()>>,
            Ok = Option<AuthSession>,
            Err = Traced<storage::Error>,
        > + Storage<
            Delete<By<Snapshot, ()>>,
            Ok = (),
            Err = Traced<storage::Error>,
        >,
    Self: Command<FetchProfile, Ok = ResolvedSession, Err = Infallible>
        + Command<RememberSession, Ok = (), Err = Infallible>
        + Command<ForgetSession, Ok = (), Err = Infallible>,
{
    /// Resolves the current session, retrying once on failure.
    async fn resolve(&self) -> Option<ResolvedSession> {
        let mut attempt = 0;
        loop {
            match self.attempt().await {
                Outcome::Resolved(session) => {
                    self.execute(RememberSession(session.clone()))
                        .await
                        .unwrap_or_else(|e| match e {});
                    return Some(session);
                }
                Outcome::SignedOut => {
                    log::debug!("no live session, forgetting local state");
                    break;
                }
                Outcome::Failed if attempt < MAX_RETRIES => {
                    let backoff = self.config().backoff(attempt);
                    log::info!(
                        "session resolution failed, retrying in {backoff:?}",
                    );
                    time::sleep(backoff).await;
                    attempt += 1;
                }
                Outcome::Failed => {
                    log::warn!(
                        "session resolution failed after {attempt} retries, \
                         forgetting local state",
                    );
                    break;
                }
            }
        }

        self.execute(ForgetSession)
            .await
            .unwrap_or_else(|e| match e {});
        None
    }

    /// Performs a single resolution attempt.
    async fn attempt(&self) -> Outcome {
        let now = self.clock().now();
        let snapshot = self.stored_snapshot().await;
        let token = self.stored_token().await;

        // Recently fetched profile of a still valid token is trusted as is.
        // Fallback profile is only a stopgap, so it's always refetched.
        if let (Some(s), Some(t)) = (&snapshot, &token) {
            if !s.is_fallback
                && s.belongs_to(&t.user.auth_id)
                && !t.is_expired(now)
                && s.is_younger_than(self.config().fresh_snapshot_age, now)
            {
                log::debug!("reusing fresh session `Snapshot`");
                return Outcome::Resolved(s.clone());
            }
        }

        let check = self
            .provider()
            .execute_within(
                auth::GetSession,
                self.config().session_check_timeout,
            )
            .await;
        match check {
            Ok(Ok(Some(session))) => {
                let reusable = snapshot.filter(|s| {
                    !s.is_fallback
                        && s.belongs_to(&session.user.auth_id)
                        && s.is_younger_than(
                            self.config().stale_snapshot_age,
                            now,
                        )
                });
                if let Some(s) = reusable {
                    log::debug!("reusing session `Snapshot` of live session");
                    return Outcome::Resolved(s);
                }
                return Outcome::Resolved(
                    self.execute(FetchProfile(session.user))
                        .await
                        .unwrap_or_else(|e| match e {}),
                );
            }
            Ok(Ok(None)) => return Outcome::SignedOut,
            Ok(Err(e)) => log::warn!("session check failed: {e}"),
            Err(_) => log::warn!(
                "session check timed out after {:?}",
                self.config().session_check_timeout,
            ),
        }

        // Auth provider is unreachable, so rely on the local state only.
        let Some(token) = token else {
            return Outcome::Failed;
        };
        let reusable = snapshot.filter(|s| {
            s.belongs_to(&token.user.auth_id)
                && s.is_younger_than(self.config().stale_snapshot_age, now)
        });
        if let Some(s) = reusable {
            log::debug!("reusing stale session `Snapshot`");
            return Outcome::Resolved(s);
        }

        let identity = match token.access_token.claims() {
            Ok(claims) => claims.into_identity(now),
            Err(e) => {
                log::warn!("stored access token is malformed: {e}");
                None
            }
        };
        let Some(identity) = identity else {
            return Outcome::Failed;
        };
        log::debug!("reconstructed identity from stored access token");
        Outcome::Resolved(
            self.execute(FetchProfile(identity))
                .await
                .unwrap_or_else(|e| match e {}),
        )
    }

    /// Returns the persisted [`ResolvedSession`], if any.
    ///
    /// Undecodable [`Snapshot`] is discarded.
    async fn stored_snapshot(&self) -> Option<ResolvedSession> {
        match self
            .storage()
            .execute(Select(By::<Option<Snapshot>, ()>::single()))
            .await
        {
            Ok(snapshot) => snapshot.map(Into::into),
            Err(e) => {
                log::warn!("discarding session `Snapshot`: {e}");
                if e.as_ref().is_corrupted() {
                    _ = self
                        .storage()
                        .execute(Delete(By::<Snapshot, ()>::single()))
                        .await
                        .map_err(|e| {
                            log::warn!("failed to remove `Snapshot`: {e}");
                        });
                }
                None
            }
        }
    }

    /// Returns the locally stored [`AuthSession`], if any.
    async fn stored_token(&self) -> Option<AuthSession> {
        self.storage()
            .execute(Select(By::<Option<AuthSession>, ()>::single()))
            .await
            .unwrap_or_else(|e| {
                log::warn!("ignoring stored `AuthSession`: {e}");
                None
            })
    }
}

#[cfg(test)]
mod spec {
    use std::time::Duration;

    use common::{
        operations::{By, Delete, Insert},
        Clock as _,
    };
    use futures::future;
    use tokio::time::Instant;

    use crate::{
        domain::user::{AuthSession, NewUser, Password, ResolvedSession, Snapshot},
        infra::{
            auth, database, storage::Record as _, Provider as _, Storage as _,
        },
        testing::{identity, Harness},
        Command as _, Config,
    };

    use super::ResolveCurrentUser;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    /// Signs in `a@x.com` at the auth provider, storing its session locally.
    async fn sign_in(h: &Harness) -> AuthSession {
        let identity = h.register("a@x.com", "secret123");
        h.provider
            .execute(auth::SignIn {
                email: identity.email,
                password: Box::new(Password::new("secret123").unwrap()).into(),
            })
            .await
            .unwrap()
    }

    /// Persists a session [`Snapshot`] of the provided [`AuthSession`].
    async fn persist_snapshot(h: &Harness, session: &AuthSession) -> Snapshot {
        let resolved = ResolvedSession::new(
            session.user.clone(),
            NewUser::from_identity(&session.user)
                .with_id(42.into()),
            h.clock.now(),
        );
        let snapshot = Snapshot::from(resolved);
        h.storage.execute(Insert(snapshot.clone())).await.unwrap();
        snapshot
    }

    #[tokio::test]
    async fn reuses_fresh_snapshot_without_fetching() {
        let h = Harness::new();
        let session = sign_in(&h).await;
        let snapshot = persist_snapshot(&h, &session).await;
        h.clock.advance(HOUR / 2);

        let resolved = h
            .service
            .execute(ResolveCurrentUser)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(Snapshot::from(resolved), snapshot);
        assert_eq!(h.database.selects(), 0);
        assert_eq!(h.provider.session_checks(), 0);
    }

    #[tokio::test]
    async fn checks_live_session_once_stored_token_expires() {
        let h = Harness::new();
        let session = sign_in(&h).await;
        _ = persist_snapshot(&h, &session).await;
        h.clock.advance(auth::memory::TOKEN_TTL + HOUR / 2);

        let resolved = h
            .service
            .execute(ResolveCurrentUser)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(resolved.user.id, 42.into());
        assert_eq!(h.provider.session_checks(), 1);
        assert_eq!(h.database.selects(), 0);
    }

    #[tokio::test]
    async fn refetches_fallback_profile_once_table_recovers() {
        let h = Harness::new();
        _ = sign_in(&h).await;
        h.database.set_mode(database::memory::Mode::Unavailable);
        let degraded = h
            .service
            .execute(ResolveCurrentUser)
            .await
            .unwrap()
            .unwrap();
        assert!(degraded.is_fallback);

        h.database.set_mode(database::memory::Mode::Available);
        h.clock.advance(HOUR / 2);
        let resolved = h
            .service
            .execute(ResolveCurrentUser)
            .await
            .unwrap()
            .unwrap();

        assert!(!resolved.is_fallback);
        assert!(resolved.user.id.is_known());
        assert_eq!(h.provider.session_checks(), 2);
        assert_eq!(h.database.users().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reuses_fallback_profile_while_offline() {
        let h = Harness::new();
        _ = sign_in(&h).await;
        h.database.set_mode(database::memory::Mode::Unavailable);
        let degraded = h
            .service
            .execute(ResolveCurrentUser)
            .await
            .unwrap()
            .unwrap();
        h.provider.set_mode(auth::memory::Mode::Unavailable);
        h.clock.advance(HOUR / 2);

        let resolved = h
            .service
            .execute(ResolveCurrentUser)
            .await
            .unwrap()
            .unwrap();

        assert!(resolved.is_fallback);
        assert_eq!(resolved.fetched_at, degraded.fetched_at);
    }

    #[tokio::test]
    async fn fetches_profile_of_live_session() {
        let h = Harness::new();
        let session = sign_in(&h).await;

        let resolved = h
            .service
            .execute(ResolveCurrentUser)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(resolved.identity.auth_id, session.user.auth_id);
        assert_eq!(resolved.user.username.as_ref(), "a");
        assert_eq!(h.provider.session_checks(), 1);
        assert!(h.storage.raw(Snapshot::KEY).is_some());
        assert_eq!(
            h.service.state.session.borrow().as_ref(),
            Some(&resolved),
        );
    }

    #[tokio::test]
    async fn reuses_stale_snapshot_of_live_session() {
        let h = Harness::new();
        let session = sign_in(&h).await;
        _ = persist_snapshot(&h, &session).await;
        h.clock.advance(3 * HOUR);

        let resolved = h
            .service
            .execute(ResolveCurrentUser)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(resolved.user.id, 42.into());
        assert_eq!(h.provider.session_checks(), 1);
        assert_eq!(h.database.selects(), 0);
    }

    #[tokio::test]
    async fn refetches_snapshot_of_another_identity() {
        let h = Harness::new();
        let session = sign_in(&h).await;
        _ = persist_snapshot(
            &h,
            &AuthSession {
                user: identity("b@x.com"),
                ..session
            },
        )
        .await;

        let resolved = h
            .service
            .execute(ResolveCurrentUser)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(resolved.identity.email.as_ref(), "a@x.com");
        assert_eq!(h.database.selects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shares_concurrent_resolutions() {
        let h = Harness::new();
        _ = sign_in(&h).await;
        h.provider.set_latency(Duration::from_millis(300));

        let (first, second) = future::join(
            h.service.execute(ResolveCurrentUser),
            h.service.execute(ResolveCurrentUser),
        )
        .await;

        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(h.provider.session_checks(), 1);
        assert_eq!(h.database.inserts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_on_hanging_provider_without_local_state() {
        let config = Config::default();
        let h = Harness::with_config(config);
        h.provider.set_mode(auth::memory::Mode::Hanging);
        let started = Instant::now();

        let resolved =
            h.service.execute(ResolveCurrentUser).await.unwrap();

        assert_eq!(resolved, None);
        assert!(
            started.elapsed()
                <= 2 * config.session_check_timeout + config.backoff(0),
        );
        assert_eq!(h.provider.session_checks(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reuses_stale_snapshot_on_hanging_provider() {
        let h = Harness::new();
        let session = sign_in(&h).await;
        _ = persist_snapshot(&h, &session).await;
        h.clock.advance(5 * HOUR);
        h.provider.set_mode(auth::memory::Mode::Hanging);

        let resolved = h
            .service
            .execute(ResolveCurrentUser)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(resolved.user.id, 42.into());
        assert_eq!(h.database.selects(), 0);
    }

    #[tokio::test]
    async fn reconstructs_identity_from_stored_token() {
        let h = Harness::new();
        let session = sign_in(&h).await;
        _ = persist_snapshot(&h, &session).await;
        // Too old to be reused even on provider failure.
        h.clock.advance(7 * HOUR);
        let session = h.provider.issue(session.user).unwrap();
        h.storage.execute(Insert(session.clone())).await.unwrap();
        h.provider.set_mode(auth::memory::Mode::Unavailable);

        let resolved = h
            .service
            .execute(ResolveCurrentUser)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(resolved.identity.auth_id, session.user.auth_id);
        assert_eq!(resolved.user.email.as_ref(), "a@x.com");
        assert!(!resolved.is_fallback);
        assert_eq!(h.database.selects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_expired_stored_token_on_unavailable_provider() {
        let h = Harness::new();
        _ = sign_in(&h).await;
        h.clock.advance(8 * HOUR);
        h.provider.set_mode(auth::memory::Mode::Unavailable);

        let resolved =
            h.service.execute(ResolveCurrentUser).await.unwrap();

        assert_eq!(resolved, None);
        assert_eq!(h.provider.session_checks(), 2);
        assert_eq!(h.storage.raw(AuthSession::KEY), None);
        assert_eq!(h.database.selects(), 0);
    }

    #[tokio::test]
    async fn falls_back_when_profile_table_is_unavailable() {
        let h = Harness::new();
        _ = sign_in(&h).await;
        h.database.set_mode(database::memory::Mode::Unavailable);

        let resolved = h
            .service
            .execute(ResolveCurrentUser)
            .await
            .unwrap()
            .unwrap();

        assert!(resolved.is_fallback);
        assert_eq!(resolved.user.email.as_ref(), "a@x.com");
    }

    #[tokio::test]
    async fn forgets_local_state_without_live_session() {
        let h = Harness::new();
        let session = sign_in(&h).await;
        _ = persist_snapshot(&h, &session).await;
        h.storage
            .execute(Delete(By::<AuthSession, ()>::single()))
            .await
            .unwrap();

        let resolved =
            h.service.execute(ResolveCurrentUser).await.unwrap();

        assert_eq!(resolved, None);
        assert_eq!(h.storage.raw(Snapshot::KEY), None);
    }

    #[tokio::test]
    async fn discards_corrupted_snapshot() {
        let h = Harness::new();
        _ = sign_in(&h).await;
        h.storage.set_raw(Snapshot::KEY, "{\"id\": \"not a number\"}");

        let resolved = h
            .service
            .execute(ResolveCurrentUser)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(resolved.user.username.as_ref(), "a");
        assert_eq!(h.database.selects(), 1);
    }
}
