//! Service contains the session logic of the point-of-sale application.
//!
//! List of available Cargo features:
#![doc = document_features::document_features!()]
#![deny(
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::all,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code
)]
#![forbid(non_ascii_idents)]
#![warn(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    clippy::pedantic,
    clippy::wildcard_enum_match_arm,
    deprecated_in_future,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    unused_crate_dependencies,
    unused_import_braces,
    unused_labels,
    unused_lifetimes,
    unused_qualifications,
    unused_results
)]

pub mod command;
pub mod domain;
pub mod infra;
pub mod query;
pub mod task;
#[cfg(test)]
mod testing;

use std::{
    error::Error,
    sync::{atomic::AtomicBool, Arc},
    time::Duration,
};

use common::{operations::Start, Clock, SingleFlight};
use derive_more::Debug;
use smart_default::SmartDefault;
use tokio::sync::watch;

#[cfg(doc)]
use crate::infra::{Database, Provider, Storage};
use crate::domain::user::ResolvedSession;

pub use self::{command::Command, query::Query, task::Task};

/// [`Service`] configuration.
#[derive(Clone, Copy, Debug, SmartDefault)]
pub struct Config {
    /// Maximum time to wait for the live session check of the auth
    /// [`Provider`].
    #[default(Duration::from_secs(2))]
    pub session_check_timeout: Duration,

    /// Maximum time to wait for a profile lookup in the [`Database`].
    #[default(Duration::from_secs(5))]
    pub profile_lookup_timeout: Duration,

    /// Age under which a persisted session snapshot is reused without
    /// contacting the auth [`Provider`] at all.
    #[default(Duration::from_secs(2 * 60 * 60))]
    pub fresh_snapshot_age: Duration,

    /// Age under which a persisted session snapshot is reused instead of
    /// fetching the profile from the [`Database`].
    #[default(Duration::from_secs(6 * 60 * 60))]
    pub stale_snapshot_age: Duration,

    /// Initial delay before retrying a failed session resolution.
    #[default(Duration::from_millis(500))]
    pub retry_backoff: Duration,

    /// Maximum delay before retrying a failed session resolution.
    #[default(Duration::from_secs(5))]
    pub retry_backoff_cap: Duration,
}

impl Config {
    /// Returns the delay before the retry following the provided failed
    /// `attempt` (starting from `0`).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff
            .checked_mul(2_u32.saturating_pow(attempt))
            .map_or(self.retry_backoff_cap, |d| d.min(self.retry_backoff_cap))
    }
}

/// Domain service.
#[derive(Clone, Debug)]
pub struct Service<Db, Auth, Store> {
    /// Configuration of this [`Service`].
    config: Config,

    /// [`Database`] of this [`Service`].
    database: Db,

    /// Auth [`Provider`] of this [`Service`].
    provider: Auth,

    /// Local [`Storage`] of this [`Service`].
    storage: Store,

    /// [`Clock`] of this [`Service`].
    clock: Arc<dyn Clock>,

    /// Session [`State`] shared by all clones of this [`Service`].
    state: Arc<State>,
}

/// In-memory session state of a [`Service`].
#[derive(Debug)]
struct State {
    /// Coordinator of the in-flight session resolution.
    resolution: SingleFlight<Option<ResolvedSession>>,

    /// Currently resolved session, if any.
    session: watch::Sender<Option<ResolvedSession>>,

    /// Indicator whether the initial session resolution is in progress.
    initializing: AtomicBool,
}

impl Default for State {
    fn default() -> Self {
        Self {
            resolution: SingleFlight::new(),
            session: watch::Sender::new(None),
            initializing: AtomicBool::new(false),
        }
    }
}

impl<Db, Auth, Store> Service<Db, Auth, Store> {
    /// Creates a new [`Service`] with the provided parameters, along with
    /// the [`task::Background`] listening to auth events.
    pub fn new(
        config: Config,
        database: Db,
        provider: Auth,
        storage: Store,
        clock: Arc<dyn Clock>,
    ) -> (Self, task::Background)
    where
        Self: Task<Start<task::ListenAuthEvents>, Ok = (), Err: Error>
            + Clone
            + 'static,
    {
        let this = Self::detached(config, database, provider, storage, clock);

        let mut bg = task::Background::default();
        let svc = this.clone();
        bg.spawn(
            "ListenAuthEvents",
            async move { svc.execute(Start(task::ListenAuthEvents)).await },
        );

        (this, bg)
    }

    /// Creates a new [`Service`] without listening to auth events.
    #[must_use]
    pub fn detached(
        config: Config,
        database: Db,
        provider: Auth,
        storage: Store,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            database,
            provider,
            storage,
            clock,
            state: Arc::default(),
        }
    }

    /// Returns [`Config`] of this [`Service`].
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns [`Database`] of this [`Service`].
    #[must_use]
    pub fn database(&self) -> &Db {
        &self.database
    }

    /// Returns auth [`Provider`] of this [`Service`].
    #[must_use]
    pub fn provider(&self) -> &Auth {
        &self.provider
    }

    /// Returns local [`Storage`] of this [`Service`].
    #[must_use]
    pub fn storage(&self) -> &Store {
        &self.storage
    }

    /// Returns [`Clock`] of this [`Service`].
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        &*self.clock
    }
}

#[cfg(test)]
mod spec {
    use std::time::Duration;

    use super::Config;

    #[test]
    fn backoff_grows_exponentially_up_to_cap() {
        let config = Config {
            retry_backoff: Duration::from_millis(500),
            retry_backoff_cap: Duration::from_secs(3),
            ..Config::default()
        };

        assert_eq!(config.backoff(0), Duration::from_millis(500));
        assert_eq!(config.backoff(1), Duration::from_secs(1));
        assert_eq!(config.backoff(2), Duration::from_secs(2));
        assert_eq!(config.backoff(3), Duration::from_secs(3));
        assert_eq!(config.backoff(40), Duration::from_secs(3));
    }

    #[test]
    fn defaults_match_session_policy() {
        let config = Config::default();

        assert_eq!(config.session_check_timeout, Duration::from_secs(2));
        assert_eq!(config.fresh_snapshot_age, Duration::from_secs(2 * 3600));
        assert_eq!(config.stale_snapshot_age, Duration::from_secs(6 * 3600));
    }
}
