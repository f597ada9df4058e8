//! [`Provider`] implementation over the REST API of a hosted auth service
//! (GoTrue-compatible).

use std::{sync::Arc, time::Duration};

use common::{
    operations::{By, Delete, Insert, Select},
    Clock, DateTime,
};
use derive_more::Debug;
use secrecy::{ExposeSecret as _, SecretString};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracerr::Traced;
use tracing as log;
use url::Url;

use crate::{
    domain::user::{AuthEvent, AuthSession, Identity, RefreshToken, Token},
    infra::{auth, Provider, Storage},
};

use super::{
    GetSession, SendPasswordReset, SessionStorage, SignIn, SignOut,
    Subscribe, UpdatePassword,
};

/// [`Rest`] provider configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Base [`Url`] of the hosted backend.
    pub url: Url,

    /// Public API key of the hosted backend.
    #[debug(skip)]
    pub api_key: SecretString,

    /// Timeout of a single HTTP request.
    pub request_timeout: Duration,
}

/// Capacity of the [`AuthEvent`]s channel.
const EVENTS_CAPACITY: usize = 16;

/// Endpoints of the auth service REST API.
#[derive(Clone, Debug)]
struct Endpoints {
    /// Endpoint issuing tokens.
    token: Url,

    /// Endpoint revoking the current session.
    logout: Url,

    /// Endpoint of the current user.
    user: Url,

    /// Endpoint sending password-reset emails.
    recover: Url,
}

/// [`Provider`] calling the REST API of a hosted auth service.
///
/// Issued [`AuthSession`]s are persisted in the provided [`Storage`].
#[derive(Clone, Debug)]
pub struct Rest<S> {
    /// HTTP client.
    http: reqwest::Client,

    /// [`Endpoints`] of the auth service.
    endpoints: Arc<Endpoints>,

    /// Public API key of the hosted backend.
    #[debug(skip)]
    api_key: SecretString,

    /// [`Storage`] of the [`AuthSession`].
    storage: S,

    /// [`Clock`] checking [`AuthSession`] expiration.
    clock: Arc<dyn Clock>,

    /// Sender of [`AuthEvent`]s.
    events: broadcast::Sender<AuthEvent>,
}

impl<S> Rest<S> {
    /// Creates a new [`Rest`] provider with the provided [`Config`].
    ///
    /// # Errors
    ///
    /// If the [`Config::url`] cannot be a base of the API endpoints, or the
    /// HTTP client fails to initialize.
    pub fn new(
        conf: Config,
        storage: S,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Traced<auth::Error>> {
        let Config {
            mut url,
            api_key,
            request_timeout,
        } = conf;
        if !url.path().ends_with('/') {
            url.set_path(&format!("{}/", url.path()));
        }
        let endpoint = |path: &str| {
            url.join(path).map_err(tracerr::from_and_wrap!(=> auth::Error))
        };
        let endpoints = Endpoints {
            token: endpoint("auth/v1/token")?,
            logout: endpoint("auth/v1/logout")?,
            user: endpoint("auth/v1/user")?,
            recover: endpoint("auth/v1/recover")?,
        };

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(tracerr::from_and_wrap!(=> auth::Error))?;

        Ok(Self {
            http,
            endpoints: Arc::new(endpoints),
            api_key,
            storage,
            clock,
            events: broadcast::channel(EVENTS_CAPACITY).0,
        })
    }

    /// Emits the provided [`AuthEvent`] to all the current subscribers.
    fn emit(&self, event: AuthEvent) {
        log::debug!("emitting `{event}` auth event");
        _ = self.events.send(event);
    }

    /// Builds a request to the provided [`Url`] authorized by the API key and,
    /// optionally, by the provided access [`Token`].
    fn request(
        &self,
        method: reqwest::Method,
        url: &Url,
        token: Option<&Token>,
    ) -> reqwest::RequestBuilder {
        let key = self.api_key.expose_secret();
        self.http
            .request(method, url.clone())
            .header("apikey", key)
            .bearer_auth(token.map_or(key, |t| t.as_ref()))
    }

    /// Checks the status of the provided [`reqwest::Response`], turning
    /// failures into an [`auth::Error`].
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, Traced<auth::Error>> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.json::<ErrorBody>().await.unwrap_or_default();
        let message = body.message().unwrap_or_else(|| status.to_string());
        let err = if body.is_invalid_credentials() {
            auth::Error::WrongCredentials(message)
        } else {
            auth::Error::Rejected(message)
        };
        Err(tracerr::new!(err))
    }

    /// Issues a new [`AuthSession`] by the provided token `grant` type and
    /// `body`.
    async fn grant(
        &self,
        grant: &str,
        body: &serde_json::Value,
    ) -> Result<AuthSession, Traced<auth::Error>> {
        let response = self
            .request(reqwest::Method::POST, &self.endpoints.token, None)
            .query(&[("grant_type", grant)])
            .json(body)
            .send()
            .await
            .map_err(tracerr::from_and_wrap!(=> auth::Error))?;
        let issued = Self::ensure_success(response)
            .await
            .map_err(tracerr::wrap!())?
            .json::<IssuedSession>()
            .await
            .map_err(tracerr::from_and_wrap!(=> auth::Error))?;
        Ok(issued.into_session(self.clock.now()))
    }
}

impl<S: SessionStorage> Rest<S> {
    /// Returns the locally stored [`AuthSession`], if any.
    ///
    /// Undecodable value is discarded as if there were none.
    async fn stored(&self) -> Result<Option<AuthSession>, Traced<auth::Error>> {
        match self
            .storage
            .execute(Select(By::<Option<AuthSession>, ()>::single()))
            .await
        {
            Ok(session) => Ok(session),
            Err(e) if e.as_ref().is_corrupted() => {
                log::warn!("discarding stored `AuthSession`: {e}");
                self.forget().await.map_err(tracerr::wrap!())?;
                Ok(None)
            }
            Err(e) => Err(e).map_err(tracerr::map_from_and_wrap!()),
        }
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

impl<S: SessionStorage> Provider<SignIn> for Rest<S> {
    type Ok = AuthSession;
    type Err = Traced<auth::Error>;

    async fn execute(&self, cmd: SignIn) -> Result<Self::Ok, Self::Err> {
        let SignIn { email, password } = cmd;

        let session = self
            .grant(
                "password",
                &serde_json::json!({
                    "email": email,
                    "password": password.expose_secret().as_str(),
                }),
            )
            .await
            .map_err(tracerr::wrap!())?;

        self.store(session.clone()).await.map_err(tracerr::wrap!())?;
        self.emit(AuthEvent::SignedIn(session.clone()));

        Ok(session)
    }
}

impl<S: SessionStorage> Provider<SignOut> for Rest<S> {
    type Ok = ();
    type Err = Traced<auth::Error>;

    async fn execute(&self, _: SignOut) -> Result<Self::Ok, Self::Err> {
        let session = self.stored().await.map_err(tracerr::wrap!())?;

        // Local session is forgotten first, so the sign-out takes effect even
        // if the auth service is unreachable.
        self.forget().await.map_err(tracerr::wrap!())?;
        self.emit(AuthEvent::SignedOut);

        let Some(session) = session else {
            return Ok(());
        };
        let response = self
            .request(
                reqwest::Method::POST,
                &self.endpoints.logout,
                Some(&session.access_token),
            )
            .send()
            .await
            .map_err(tracerr::from_and_wrap!(=> auth::Error))?;
        match response.status() {
            // Session is already revoked or expired.
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::NOT_FOUND => {
                Ok(())
            }
            _ => Self::ensure_success(response)
                .await
                .map(drop)
                .map_err(tracerr::wrap!()),
        }
    }
}

impl<S: SessionStorage> Provider<GetSession> for Rest<S> {
    type Ok = Option<AuthSession>;
    type Err = Traced<auth::Error>;

    async fn execute(&self, _: GetSession) -> Result<Self::Ok, Self::Err> {
        let Some(session) = self.stored().await.map_err(tracerr::wrap!())?
        else {
            return Ok(None);
        };
        if !session.is_expired(self.clock.now()) {
            return Ok(Some(session));
        }

        log::debug!("refreshing expired `AuthSession`");
        let refreshed = self
            .grant(
                "refresh_token",
                &serde_json::json!({
                    "refresh_token": session.refresh_token,
                }),
            )
            .await;
        match refreshed {
            Ok(session) => {
                self.store(session.clone())
                    .await
                    .map_err(tracerr::wrap!())?;
                self.emit(AuthEvent::TokenRefreshed(session.clone()));
                Ok(Some(session))
            }
            Err(e) => match e.as_ref() {
                auth::Error::WrongCredentials(_) | auth::Error::Rejected(_) => {
                    log::info!("refresh token is rejected: {e}");
                    self.forget().await.map_err(tracerr::wrap!())?;
                    self.emit(AuthEvent::SignedOut);
                    Ok(None)
                }
                _ => Err(e).map_err(tracerr::wrap!()),
            },
        }
    }
}

impl<S> Provider<SendPasswordReset> for Rest<S> {
    type Ok = ();
    type Err = Traced<auth::Error>;

    async fn execute(
        &self,
        SendPasswordReset(email): SendPasswordReset,
    ) -> Result<Self::Ok, Self::Err> {
        let response = self
            .request(reqwest::Method::POST, &self.endpoints.recover, None)
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await
            .map_err(tracerr::from_and_wrap!(=> auth::Error))?;
        Self::ensure_success(response)
            .await
            .map(drop)
            .map_err(tracerr::wrap!())
    }
}

impl<S> Provider<UpdatePassword> for Rest<S>
where
    S: SessionStorage,
    Self: Provider<
        GetSession,
        Ok = Option<AuthSession>,
        Err = Traced<auth::Error>,
    >,
{
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

        let response = self
            .request(
                reqwest::Method::PUT,
                &self.endpoints.user,
                Some(&session.access_token),
            )
            .json(&serde_json::json!({
                "password": password.expose_secret().as_str(),
            }))
            .send()
            .await
            .map_err(tracerr::from_and_wrap!(=> auth::Error))?;
        let identity = Self::ensure_success(response)
            .await
            .map_err(tracerr::wrap!())?
            .json::<Identity>()
            .await
            .map_err(tracerr::from_and_wrap!(=> auth::Error))?;

        self.store(AuthSession {
            user: identity.clone(),
            ..session
        })
        .await
        .map_err(tracerr::wrap!())?;
        self.emit(AuthEvent::UserUpdated(identity.clone()));

        Ok(identity)
    }
}

impl<S> Provider<Subscribe> for Rest<S> {
    type Ok = broadcast::Receiver<AuthEvent>;
    type Err = Traced<auth::Error>;

    async fn execute(&self, _: Subscribe) -> Result<Self::Ok, Self::Err> {
        Ok(self.events.subscribe())
    }
}

/// Successful response of the token endpoint.
#[derive(Debug, Deserialize)]
struct IssuedSession {
    /// Issued access [`Token`].
    access_token: Token,

    /// Issued [`RefreshToken`].
    refresh_token: RefreshToken,

    /// Number of seconds the access [`Token`] is valid for.
    expires_in: u64,

    /// Unix timestamp the access [`Token`] expires at.
    #[serde(default)]
    expires_at: Option<i64>,

    /// [`Identity`] the session is issued for.
    user: Identity,
}

impl IssuedSession {
    /// Converts this [`IssuedSession`] into an [`AuthSession`] issued at the
    /// provided moment.
    fn into_session(self, now: DateTime) -> AuthSession {
        let expires_at = self
            .expires_at
            .and_then(DateTime::from_unix_timestamp)
            .unwrap_or_else(|| now + Duration::from_secs(self.expires_in));
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: expires_at.coerce(),
            user: self.user,
        }
    }
}

/// Error response of the auth service.
///
/// Different versions of the service report errors in different shapes.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    /// Machine-readable error code.
    #[serde(default)]
    error: Option<String>,

    /// Machine-readable error code of newer service versions.
    #[serde(default)]
    error_code: Option<String>,

    /// Human-readable description.
    #[serde(default)]
    error_description: Option<String>,

    /// Human-readable message of newer service versions.
    #[serde(default, alias = "message")]
    msg: Option<String>,
}

impl ErrorBody {
    /// Returns the human-readable message of this [`ErrorBody`], if any.
    fn message(&self) -> Option<String> {
        self.msg
            .clone()
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error.clone())
    }

    /// Indicates whether this [`ErrorBody`] reports rejected credentials.
    fn is_invalid_credentials(&self) -> bool {
        matches!(self.error.as_deref(), Some("invalid_grant"))
            || matches!(
                self.error_code.as_deref(),
                Some("invalid_credentials" | "invalid_grant"),
            )
    }
}

#[cfg(test)]
mod spec {
    use common::DateTime;

    use super::{ErrorBody, IssuedSession};

    #[test]
    fn recognizes_invalid_credentials() {
        let legacy = serde_json::from_str::<ErrorBody>(
            r#"{
                "error": "invalid_grant",
                "error_description": "Invalid login credentials"
            }"#,
        )
        .unwrap();
        assert!(legacy.is_invalid_credentials());
        assert_eq!(
            legacy.message().as_deref(),
            Some("Invalid login credentials"),
        );

        let modern = serde_json::from_str::<ErrorBody>(
            r#"{
                "code": 400,
                "error_code": "invalid_credentials",
                "msg": "Invalid login credentials"
            }"#,
        )
        .unwrap();
        assert!(modern.is_invalid_credentials());
        assert_eq!(
            modern.message().as_deref(),
            Some("Invalid login credentials"),
        );

        let other = serde_json::from_str::<ErrorBody>(
            r#"{"code": 429, "msg": "Too many requests"}"#,
        )
        .unwrap();
        assert!(!other.is_invalid_credentials());
    }

    #[test]
    fn computes_expiration_when_absent() {
        let now = DateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let issued = serde_json::from_str::<IssuedSession>(
            r#"{
                "access_token": "a.b.c",
                "token_type": "bearer",
                "expires_in": 3600,
                "refresh_token": "r",
                "user": {"id": "auth-1", "email": "a@x.com"}
            }"#,
        )
        .unwrap();

        let session = issued.into_session(now);

        assert_eq!(session.expires_at.unix_timestamp(), 1_700_003_600);
        assert_eq!(session.user.email.as_ref(), "a@x.com");
    }
}
