//! Session definitions.

use std::time::Duration;

use common::{unit, DateTime, DateTimeOf};
use derive_more::{AsRef, Display, From};
use jsonwebtoken::{DecodingKey, Validation};
use serde::{Deserialize, Serialize};

#[cfg(doc)]
use crate::domain::User;
use crate::domain::user::{self, AuthId, Identity, Metadata};

/// Session of a [`User`] resolved by reconciling the auth provider with the
/// application profile.
///
/// This is a non-authoritative cache entry: it's only trusted while its
/// [`Identity`] matches the provider one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedSession {
    /// [`Identity`] of the [`User`] at the auth provider.
    pub identity: Identity,

    /// Application profile of the [`User`].
    pub user: user::User,

    /// [`DateTime`] when the profile was fetched.
    pub fetched_at: FetchDateTime,

    /// Indicator whether the [`ResolvedSession::user`] was synthesized from
    /// the [`Identity`] only, because the profile storage was unreachable.
    pub is_fallback: bool,
}

impl ResolvedSession {
    /// Creates a [`ResolvedSession`] backed by a stored profile.
    #[must_use]
    pub fn new(identity: Identity, user: user::User, now: DateTime) -> Self {
        Self {
            identity,
            user,
            fetched_at: now.coerce(),
            is_fallback: false,
        }
    }

    /// Creates a degraded [`ResolvedSession`] out of the [`Identity`] only.
    #[must_use]
    pub fn fallback(identity: Identity, now: DateTime) -> Self {
        Self {
            user: user::User::fallback(&identity),
            identity,
            fetched_at: now.coerce(),
            is_fallback: true,
        }
    }

    /// Indicates whether this [`ResolvedSession`] was fetched less than
    /// `max_age` ago.
    #[must_use]
    pub fn is_younger_than(&self, max_age: Duration, now: DateTime) -> bool {
        self.fetched_at.elapsed_till(now) < max_age
    }

    /// Indicates whether this [`ResolvedSession`] belongs to the provided
    /// [`AuthId`].
    #[must_use]
    pub fn belongs_to(&self, auth_id: &AuthId) -> bool {
        &self.identity.auth_id == auth_id
    }
}

/// [`DateTime`] when a [`ResolvedSession`] profile was fetched.
pub type FetchDateTime = DateTimeOf<(ResolvedSession, unit::Fetching)>;

/// Persisted form of a [`ResolvedSession`], reused across restarts.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// ID of the [`User`].
    pub id: user::Id,

    /// [`user::Username`] of the [`User`].
    pub username: user::Username,

    /// [`user::Email`] of the [`User`].
    pub email: user::Email,

    /// [`user::FullName`] of the [`User`].
    pub full_name: Option<user::FullName>,

    /// [`user::Phone`] of the [`User`].
    pub phone: Option<user::Phone>,

    /// Indicator whether the [`User`] is employed by a store.
    pub is_store_employee: bool,

    /// Indicator whether the [`User`] must change the password.
    pub require_password_change: bool,

    /// [`AuthId`] of the [`User`] at the auth provider.
    pub auth_id: AuthId,

    /// [`DateTime`] when the profile was fetched.
    #[serde(with = "common::datetime::serde::unix_timestamp_millis")]
    pub last_fetched: FetchDateTime,

    /// Indicator whether the profile is a fallback one.
    #[serde(default)]
    pub is_fallback: bool,
}

impl From<ResolvedSession> for Snapshot {
    fn from(session: ResolvedSession) -> Self {
        let ResolvedSession {
            identity,
            user,
            fetched_at,
            is_fallback,
        } = session;
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            phone: user.phone,
            is_store_employee: user.is_store_employee,
            require_password_change: user.require_password_change,
            auth_id: identity.auth_id,
            last_fetched: fetched_at,
            is_fallback,
        }
    }
}

impl From<Snapshot> for ResolvedSession {
    fn from(snapshot: Snapshot) -> Self {
        let Snapshot {
            id,
            username,
            email,
            full_name,
            phone,
            is_store_employee,
            require_password_change,
            auth_id,
            last_fetched,
            is_fallback,
        } = snapshot;
        Self {
            identity: Identity {
                auth_id,
                email: email.clone(),
                metadata: Metadata::default(),
            },
            user: user::User {
                id,
                username,
                email,
                full_name,
                phone,
                is_store_employee,
                require_password_change,
            },
            fetched_at: last_fetched,
            is_fallback,
        }
    }
}

/// Session issued by the auth provider and stored locally by its client.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AuthSession {
    /// Access [`Token`] of this [`AuthSession`].
    pub access_token: Token,

    /// [`RefreshToken`] of this [`AuthSession`].
    pub refresh_token: RefreshToken,

    /// [`DateTime`] when the [`AuthSession::access_token`] expires.
    #[serde(with = "common::datetime::serde::unix_timestamp")]
    pub expires_at: ExpirationDateTime,

    /// [`Identity`] this [`AuthSession`] is issued for.
    pub user: Identity,
}

impl AuthSession {
    /// Indicates whether this [`AuthSession`] is expired at the provided
    /// moment.
    #[must_use]
    pub fn is_expired(&self, now: DateTime) -> bool {
        self.expires_at.coerce::<()>() <= now
    }
}

/// [`DateTime`] when an [`AuthSession`] expires.
pub type ExpirationDateTime = DateTimeOf<(AuthSession, unit::Expiration)>;

/// Access token of an [`AuthSession`].
#[derive(AsRef, Clone, Debug, Deserialize, Display, Eq, From, PartialEq, Serialize)]
#[as_ref(str)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// Reads [`Claims`] embedded into this [`Token`].
    ///
    /// Signature is __not__ verified: the result may only be used to
    /// reconstruct an [`Identity`], never to authorize anything.
    ///
    /// # Errors
    ///
    /// If this [`Token`] is not a well-formed JWT carrying [`Claims`].
    pub fn claims(&self) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_aud = false;
        validation.validate_exp = false;

        jsonwebtoken::decode::<Claims>(
            &self.0,
            &DecodingKey::from_secret(&[]),
            &validation,
        )
        .map(|data| data.claims)
    }
}

/// Refresh token of an [`AuthSession`].
#[derive(AsRef, Clone, Debug, Deserialize, Eq, From, PartialEq, Serialize)]
#[as_ref(str)]
#[serde(transparent)]
pub struct RefreshToken(String);

/// Claims embedded into an access [`Token`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Claims {
    /// [`AuthId`] the [`Token`] is issued for.
    pub sub: AuthId,

    /// Email the [`Token`] is issued for.
    #[serde(default)]
    pub email: Option<user::Email>,

    /// [`DateTime`] when the [`Token`] expires.
    #[serde(with = "common::datetime::serde::unix_timestamp")]
    pub exp: ExpirationDateTime,

    /// Provider-issued [`Metadata`].
    #[serde(default)]
    pub user_metadata: Metadata,
}

impl Claims {
    /// Reconstructs an [`Identity`] out of these [`Claims`], if they're not
    /// expired at the provided moment and carry an email.
    #[must_use]
    pub fn into_identity(self, now: DateTime) -> Option<Identity> {
        let Self {
            sub,
            email,
            exp,
            user_metadata,
        } = self;
        if exp.coerce::<()>() <= now {
            return None;
        }
        Some(Identity {
            auth_id: sub,
            email: email?,
            metadata: user_metadata,
        })
    }
}

#[cfg(test)]
mod spec {
    use std::time::Duration;

    use common::DateTime;
    use jsonwebtoken::{EncodingKey, Header};

    use crate::domain::user::{self, Identity, Metadata};

    use super::{Claims, ResolvedSession, Snapshot, Token};

    fn identity() -> Identity {
        Identity {
            auth_id: "auth-1".to_owned().into(),
            email: user::Email::new("a@x.com").unwrap(),
            metadata: Metadata::default(),
        }
    }

    fn token(claims: &Claims) -> Token {
        jsonwebtoken::encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(b"whatever"),
        )
        .unwrap()
        .into()
    }

    #[test]
    fn snapshot_uses_camel_case_keys() {
        let now = DateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let session = ResolvedSession::new(
            identity(),
            user::NewUser::from_identity(&identity()).with_id(7.into()),
            now,
        );

        let json = serde_json::to_value(Snapshot::from(session)).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "username": "a",
                "email": "a@x.com",
                "fullName": null,
                "phone": null,
                "isStoreEmployee": false,
                "requirePasswordChange": false,
                "authId": "auth-1",
                "lastFetched": 1_700_000_000_000_i64,
                "isFallback": false,
            }),
        );
    }

    #[test]
    fn snapshot_restores_session() {
        let now = DateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let session = ResolvedSession::fallback(identity(), now);

        let restored = ResolvedSession::from(Snapshot::from(session.clone()));

        assert_eq!(restored, session);
        assert!(restored.is_fallback);
    }

    #[test]
    fn freshness_is_measured_against_provided_moment() {
        let fetched = DateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let session = ResolvedSession::fallback(identity(), fetched);
        let hour = Duration::from_secs(60 * 60);

        assert!(session.is_younger_than(2 * hour, fetched + hour));
        assert!(!session.is_younger_than(2 * hour, fetched + 3 * hour));
    }

    #[test]
    fn reads_unverified_claims() {
        let now = DateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let claims = Claims {
            sub: "auth-1".to_owned().into(),
            email: Some(user::Email::new("a@x.com").unwrap()),
            exp: (now + Duration::from_secs(60)).coerce(),
            user_metadata: Metadata::default(),
        };

        let decoded = token(&claims).claims().unwrap();

        assert_eq!(decoded, claims);
        assert_eq!(decoded.clone().into_identity(now), Some(identity()));
        assert_eq!(
            decoded.into_identity(now + Duration::from_secs(60)),
            None,
        );
    }

    #[test]
    fn rejects_malformed_token() {
        assert!(Token::from("not-a-jwt".to_owned()).claims().is_err());
    }
}
