//! In-memory [`Provider`] implementation.

use std::{
    future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use common::{
    operations::{By, Delete, Insert, Select},
    Clock,
};
use derive_more::Debug;
use jsonwebtoken::{EncodingKey, Header};
use secrecy::ExposeSecret as _;
use tokio::sync::broadcast;
use tracerr::Traced;

use crate::{
    domain::user::{AuthEvent, AuthSession, Claims, Identity},
    infra::{auth, Provider},
};

use super::{
    GetSession, SendPasswordReset, SessionStorage, SignIn, SignOut,
    Subscribe, UpdatePassword,
};

/// Lifetime of the access tokens issued by a [`Memory`] provider.
pub const TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// In-memory [`Provider`] with scriptable behavior.
///
/// Issued [`AuthSession`]s are persisted in the provided storage, the same
/// way a real [`Provider`] does. Clones share the same state.
#[derive(Clone, Debug)]
pub struct Memory<S> {
    /// Shared state of this [`Memory`] provider.
    state: Arc<Mutex<State>>,

    /// Storage of the [`AuthSession`].
    storage: S,

    /// [`Clock`] issuing and expiring [`AuthSession`]s.
    clock: Arc<dyn Clock>,

    /// Sender of [`AuthEvent`]s.
    events: broadcast::Sender<AuthEvent>,
}

/// State of a [`Memory`] provider.
#[derive(Debug, Default)]
struct State {
    /// Registered accounts with their passwords.
    #[debug(skip)]
    accounts: Vec<(Identity, String)>,

    /// Current [`Mode`].
    mode: Mode,

    /// Delay of every remote call.
    latency: Duration,

    /// Number of issued tokens, making each of them unique.
    issued: u64,

    /// Number of executed [`GetSession`]s.
    session_checks: usize,

    /// Number of executed [`SignIn`]s.
    sign_ins: usize,

    /// Number of executed [`SignOut`]s.
    sign_outs: usize,

    /// Recipients of password-reset emails.
    password_resets: Vec<String>,
}

/// Behavior of a [`Memory`] provider's remote calls.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Mode {
    /// Calls succeed.
    #[default]
    Available,

    /// Calls fail with [`auth::Error::Unavailable`].
    Unavailable,

    /// Calls never complete.
    Hanging,
}

impl<S> Memory<S> {
    /// Creates a new [`Memory`] provider persisting into the provided
    /// storage.
    #[must_use]
    pub fn new(storage: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::default(),
            storage,
            clock,
            events: broadcast::channel(16).0,
        }
    }

    /// Registers an account with the provided [`Identity`] and password.
    pub fn register(&self, identity: Identity, password: impl Into<String>) {
        self.state().accounts.push((identity, password.into()));
    }

    /// Switches this [`Memory`] provider into the provided [`Mode`].
    pub fn set_mode(&self, mode: Mode) {
        self.state().mode = mode;
    }

    /// Delays every remote call of this [`Memory`] provider by the provided
    /// [`Duration`].
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    /// Emits the provided [`AuthEvent`] to all the current subscribers.
    pub fn emit(&self, event: AuthEvent) {
        _ = self.events.send(event);
    }

    /// Returns the number of executed [`GetSession`]s.
    #[must_use]
    pub fn session_checks(&self) -> usize {
        self.state().session_checks
    }

    /// Returns the number of executed [`SignIn`]s.
    #[must_use]
    pub fn sign_ins(&self) -> usize {
        self.state().sign_ins
    }

    /// Returns the number of executed [`SignOut`]s.
    #[must_use]
    pub fn sign_outs(&self) -> usize {
        self.state().sign_outs
    }

    /// Returns recipients of the sent password-reset emails.
    #[must_use]
    pub fn password_resets(&self) -> Vec<String> {
        self.state().password_resets.clone()
    }

    /// Issues a new [`AuthSession`] for the provided [`Identity`].
    ///
    /// # Errors
    ///
    /// If the access token cannot be encoded.
    pub fn issue(
        &self,
        identity: Identity,
    ) -> Result<AuthSession, Traced<auth::Error>> {
        let now = self.clock.now();
        let expires_at = (now + TOKEN_TTL).coerce();
        let issued = {
            let mut state = self.state();
            state.issued += 1;
            state.issued
        };

        let claims = Claims {
            sub: identity.auth_id.clone(),
            email: Some(identity.email.clone()),
            exp: expires_at,
            user_metadata: identity.metadata.clone(),
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"memory"),
        )
        .map_err(|e| tracerr::new!(auth::Error::Rejected(e.to_string())))?;

        Ok(AuthSession {
            access_token: token.into(),
            refresh_token: format!("refresh-{issued}").into(),
            expires_at,
            user: identity,
        })
    }

    /// Locks the underlying [`State`].
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies the current [`Mode`] before executing a remote call.
    async fn remote(&self) -> Result<(), Traced<auth::Error>> {
        let (mode, latency) = {
            let state = self.state();
            (state.mode, state.latency)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match mode {
            Mode::Available => Ok(()),
            Mode::Unavailable => Err(tracerr::new!(auth::Error::Unavailable)),
            Mode::Hanging => future::pending().await,
        }
    }
}

impl<S: SessionStorage> Memory<S> {
    /// Returns the locally stored [`AuthSession`], if any.
    async fn stored(&self) -> Result<Option<AuthSession>, Traced<auth::Error>> {
        self.storage
            .execute(Select(By::<Option<AuthSession>, ()>::single()))
            .await
            .map_err(tracerr::map_from_and_wrap!())
    }

    /// Persists the provided [`AuthSession`] locally.
    async fn store(
        &self,
        session: AuthSession,
    ) -> Result<(), Traced<auth::Error>> {
        self.storage
            .execute(Insert(session))
            .await
            .map_err(tracerr::map_from_and_wrap!())
    }

    /// Removes the locally stored [`AuthSession`].
    async fn forget(&self) -> Result<(), Traced<auth::Error>> {
        self.storage
            .execute(Delete(By::<AuthSession, ()>::single()))
            .await
            .map_err(tracerr::map_from_and_wrap!())
    }
}

impl<S: SessionStorage> Provider<SignIn> for Memory<S> {
    type Ok = AuthSession;
    type Err = Traced<auth::Error>;

    async fn execute(&self, cmd: SignIn) -> Result<Self::Ok, Self::Err> {
        self.state().sign_ins += 1;
        self.remote().await.map_err(tracerr::wrap!())?;

        let password = cmd.password.expose_secret().as_str();
        let identity = self
            .state()
            .accounts
            .iter()
            .find(|(i, p)| i.email == cmd.email && p == password)
            .map(|(i, _)| i.clone())
            .ok_or_else(|| {
                tracerr::new!(auth::Error::WrongCredentials(
                    "Invalid login credentials".to_owned(),
                ))
            })?;

        let session = self.issue(identity).map_err(tracerr::wrap!())?;
        self.store(session.clone()).await.map_err(tracerr::wrap!())?;
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }
}

impl<S: SessionStorage> Provider<SignOut> for Memory<S> {
    type Ok = ();
    type Err = Traced<auth::Error>;

    async fn execute(&self, _: SignOut) -> Result<Self::Ok, Self::Err> {
        self.state().sign_outs += 1;

        self.forget().await.map_err(tracerr::wrap!())?;
        self.emit(AuthEvent::SignedOut);

        self.remote().await.map_err(tracerr::wrap!())
    }
}

impl<S: SessionStorage> Provider<GetSession> for Memory<S> {
    type Ok = Option<AuthSession>;
    type Err = Traced<auth::Error>;

    async fn execute(&self, _: GetSession) -> Result<Self::Ok, Self::Err> {
        self.state().session_checks += 1;
        self.remote().await.map_err(tracerr::wrap!())?;

        let Some(session) = self.stored().await.map_err(tracerr::wrap!())?
        else {
            return Ok(None);
        };
        if !session.is_expired(self.clock.now()) {
            return Ok(Some(session));
        }

        let refreshed = self.issue(session.user).map_err(tracerr::wrap!())?;
        self.store(refreshed.clone())
            .await
            .map_err(tracerr::wrap!())?;
        self.emit(AuthEvent::TokenRefreshed(refreshed.clone()));
        Ok(Some(refreshed))
    }
}

impl<S> Provider<SendPasswordReset> for Memory<S> {
    type Ok = ();
    type Err = Traced<auth::Error>;

    async fn execute(
        &self,
        SendPasswordReset(email): SendPasswordReset,
    ) -> Result<Self::Ok, Self::Err> {
        self.remote().await.map_err(tracerr::wrap!())?;

        self.state().password_resets.push(email.into());
        Ok(())
    }
}

impl<S: SessionStorage> Provider<UpdatePassword> for Memory<S> {
    type Ok = Identity;
    type Err = Traced<auth::Error>;

    async fn execute(
        &self,
        UpdatePassword(password): UpdatePassword,
    ) -> Result<Self::Ok, Self::Err> {
        let session = self
            .execute(GetSession)
            .await
            .map_err(tracerr::wrap!())?
            .ok_or_else(|| tracerr::new!(auth::Error::NoSession))?;

        let identity = session.user;
        if let Some((_, p)) = self
            .state()
            .accounts
            .iter_mut()
            .find(|(i, _)| i.auth_id == identity.auth_id)
        {
            password.expose_secret().as_str().clone_into(p);
        }
        self.emit(AuthEvent::UserUpdated(identity.clone()));
        Ok(identity)
    }
}

impl<S> Provider<Subscribe> for Memory<S> {
    type Ok = broadcast::Receiver<AuthEvent>;
    type Err = Traced<auth::Error>;

    async fn execute(&self, _: Subscribe) -> Result<Self::Ok, Self::Err> {
        Ok(self.events.subscribe())
    }
}
