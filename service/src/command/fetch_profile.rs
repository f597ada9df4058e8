//! [`Command`] for fetching the profile of an [`Identity`].

use std::convert::Infallible;

use common::operations::{By, Insert, Select};
use tokio::time;
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{
        user::{self, Identity, NewUser, ResolvedSession},
        User,
    },
    infra::{database, Database},
    Service,
};

use super::Command;

/// [`Command`] for fetching the [`User`] profile of the provided
/// [`Identity`], creating it on the first login.
///
/// Profile is looked up by [`user::Email`]. If the `users` table cannot be
/// reached in time, a fallback [`ResolvedSession`] is returned instead.
#[derive(Clone, Debug)]
pub struct FetchProfile(pub Identity);

impl<Db, Auth, Store> Command<FetchProfile> for Service<Db, Auth, Store>
where
    Db: Database<
            Select<By<Option<User>, user::Email>>,
            Ok = Option<User>,
            Err = Traced<database::Error>,
        > + Database<Insert<NewUser>, Ok = User, Err = Traced<database::Error>>,
{
    type Ok = ResolvedSession;
    type Err = Infallible;

    async fn execute(
        &self,
        FetchProfile(identity): FetchProfile,
    ) -> Result<Self::Ok, Self::Err> {
        let lookup = time::timeout(
            self.config().profile_lookup_timeout,
            self.find_or_create(&identity),
        );
        let user = match lookup.await {
            Ok(Ok(user)) => Some(user),
            Ok(Err(e)) => {
                log::warn!(
                    "profile lookup of `{}` failed, using fallback: {e}",
                    identity.email,
                );
                None
            }
            Err(_) => {
                log::warn!(
                    "profile lookup of `{}` timed out, using fallback",
                    identity.email,
                );
                None
            }
        };

        let now = self.clock().now();
        Ok(match user {
            Some(user) => ResolvedSession::new(identity, user, now),
            None => ResolvedSession::fallback(identity, now),
        })
    }
}

impl<Db, Auth, Store> Service<Db, Auth, Store>
where
    Db: Database<
            Select<By<Option<User>, user::Email>>,
            Ok = Option<User>,
            Err = Traced<database::Error>,
        > + Database<Insert<NewUser>, Ok = User, Err = Traced<database::Error>>,
{
    /// Selects the [`User`] of the provided [`Identity`], inserting a new one
    /// if there is none.
    async fn find_or_create(
        &self,
        identity: &Identity,
    ) -> Result<User, Traced<database::Error>> {
        let by_email = || {
            Select(By::<Option<User>, _>::new(identity.email.clone()))
        };

        if let Some(user) = self
            .database()
            .execute(by_email())
            .await
            .map_err(tracerr::wrap!())?
        {
            return Ok(user);
        }

        log::info!("creating profile of `{}`", identity.email);
        let new = NewUser::from_identity(identity);
        let err = match self.database().execute(Insert(new.clone())).await {
            Ok(user) => return Ok(user),
            Err(e) if e.as_ref().is_unique_violation() => e,
            Err(e) => return Err(e).map_err(tracerr::wrap!()),
        };

        // Either the profile was created concurrently (by another terminal),
        // or the derived `Username` is occupied by someone else.
        if let Some(user) = self
            .database()
            .execute(by_email())
            .await
            .map_err(tracerr::wrap!())?
        {
            log::info!("profile of `{}` was created concurrently", user.email);
            return Ok(user);
        }
        log::info!(
            "`Username({})` is occupied, disambiguating: {err}",
            new.username,
        );
        let new = NewUser {
            username: new.username.with_suffix(identity.auth_id.as_ref()),
            ..new
        };
        self.database()
            .execute(Insert(new))
            .await
            .map_err(tracerr::wrap!())
    }
}

#[cfg(test)]
mod spec {
    use std::time::Duration;

    use crate::{
        domain::user::NewUser,
        infra::database,
        testing::{identity, Harness},
        Command as _, Config,
    };

    use super::FetchProfile;

    #[tokio::test]
    async fn creates_missing_profile() {
        let h = Harness::new();

        let session = h
            .service
            .execute(FetchProfile(identity("a@x.com")))
            .await
            .unwrap();

        assert!(!session.is_fallback);
        assert!(session.user.id.is_known());
        assert_eq!(session.user.username.as_ref(), "a");
        assert_eq!(session.user.email.as_ref(), "a@x.com");
        assert!(!session.user.is_store_employee);
        assert!(!session.user.require_password_change);
        assert_eq!(h.database.users(), vec![session.user]);
    }

    #[tokio::test]
    async fn reuses_existing_profile() {
        let mut existing = NewUser::from_identity(&identity("a@x.com"));
        existing.is_store_employee = true;
        let h = Harness::with_database(
            Config::default(),
            database::Memory::with_users([existing]),
        );

        let session = h
            .service
            .execute(FetchProfile(identity("a@x.com")))
            .await
            .unwrap();

        assert!(session.user.is_store_employee);
        assert_eq!(h.database.inserts(), 0);
    }

    #[tokio::test]
    async fn uses_concurrently_created_profile() {
        let h = Harness::new();
        let mut racing = NewUser::from_identity(&identity("a@x.com"));
        racing.is_store_employee = true;
        h.database.race_next_insert(racing);

        let session = h
            .service
            .execute(FetchProfile(identity("a@x.com")))
            .await
            .unwrap();

        assert!(!session.is_fallback);
        assert!(session.user.is_store_employee);
        assert_eq!(h.database.users().len(), 1);
    }

    #[tokio::test]
    async fn disambiguates_occupied_username() {
        let h = Harness::with_database(
            Config::default(),
            database::Memory::with_users([NewUser::from_identity(&identity(
                "a@y.com",
            ))]),
        );

        let session = h
            .service
            .execute(FetchProfile(identity("a@x.com")))
            .await
            .unwrap();

        assert!(!session.is_fallback);
        assert_eq!(session.user.username.as_ref(), "a-authaxco");
        assert_eq!(h.database.users().len(), 2);
    }

    #[tokio::test]
    async fn falls_back_when_database_is_unavailable() {
        let h = Harness::new();
        h.database.set_mode(database::memory::Mode::Unavailable);

        let session = h
            .service
            .execute(FetchProfile(identity("jane.doe@x.com")))
            .await
            .unwrap();

        assert!(session.is_fallback);
        assert!(!session.user.id.is_known());
        assert_eq!(session.user.username.as_ref(), "jane.doe");
        assert_eq!(session.identity, identity("jane.doe@x.com"));
    }

    #[tokio::test]
    async fn falls_back_when_insert_fails() {
        let h = Harness::new();
        h.database.fail_next_insert();

        let session = h
            .service
            .execute(FetchProfile(identity("jane.doe@x.com")))
            .await
            .unwrap();

        assert!(session.is_fallback);
        assert!(!session.user.id.is_known());
        assert_eq!(h.database.inserts(), 1);
        assert_eq!(h.database.selects(), 1);
        assert!(h.database.users().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_when_database_hangs() {
        let h = Harness::with_config(Config {
            profile_lookup_timeout: Duration::from_secs(3),
            ..Config::default()
        });
        h.database.set_mode(database::memory::Mode::Hanging);
        let started = tokio::time::Instant::now();

        let session = h
            .service
            .execute(FetchProfile(identity("a@x.com")))
            .await
            .unwrap();

        assert!(session.is_fallback);
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
