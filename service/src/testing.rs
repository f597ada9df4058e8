//! Test harness wiring a [`Service`] over in-memory infrastructure.

use std::sync::Arc;

use common::{DateTime, ManualClock};

use crate::{
    domain::user::{self, Identity, Metadata},
    infra::{auth, database, storage},
    Config, Service,
};

/// [`Service`] over in-memory infrastructure.
pub(crate) type MemoryService = Service<
    database::Memory,
    auth::Memory<storage::Memory>,
    storage::Memory,
>;

/// [`MemoryService`] along with handles to its infrastructure.
#[derive(Debug)]
pub(crate) struct Harness {
    /// [`Service`] under test.
    pub(crate) service: MemoryService,

    /// `users` table of the [`Service`].
    pub(crate) database: database::Memory,

    /// Auth provider of the [`Service`].
    pub(crate) provider: auth::Memory<storage::Memory>,

    /// Local storage of the [`Service`].
    pub(crate) storage: storage::Memory,

    /// Clock of the [`Service`].
    pub(crate) clock: ManualClock,
}

impl Harness {
    /// Creates a new [`Harness`] with the default [`Config`].
    pub(crate) fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a new [`Harness`] with the provided [`Config`].
    pub(crate) fn with_config(config: Config) -> Self {
        Self::with_database(config, database::Memory::default())
    }

    /// Creates a new [`Harness`] with the provided [`Config`] over the
    /// provided `users` table.
    pub(crate) fn with_database(
        config: Config,
        database: database::Memory,
    ) -> Self {
        let clock = ManualClock::new(
            DateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        );
        let storage = storage::Memory::default();
        let provider =
            auth::Memory::new(storage.clone(), Arc::new(clock.clone()));
        let service = Service::detached(
            config,
            database.clone(),
            provider.clone(),
            storage.clone(),
            Arc::new(clock.clone()),
        );
        Self {
            service,
            database,
            provider,
            storage,
            clock,
        }
    }

    /// Registers an account at the auth provider.
    pub(crate) fn register(&self, email: &str, password: &str) -> Identity {
        let identity = identity(email);
        self.provider.register(identity.clone(), password);
        identity
    }
}

/// Creates an [`Identity`] for the provided `email`.
pub(crate) fn identity(email: &str) -> Identity {
    Identity {
        auth_id: format!("auth-{email}").into(),
        email: user::Email::new(email).unwrap(),
        metadata: Metadata::default(),
    }
}
