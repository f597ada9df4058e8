//! [`AuthEvent`] definitions.

use derive_more::Display;

use super::{AuthSession, Identity};

/// Event emitted by the auth provider whenever its session changes.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum AuthEvent {
    /// User signed in.
    #[display("SIGNED_IN")]
    SignedIn(AuthSession),

    /// User signed out, or the session was revoked.
    #[display("SIGNED_OUT")]
    SignedOut,

    /// Access token was refreshed for the same user.
    #[display("TOKEN_REFRESHED")]
    TokenRefreshed(AuthSession),

    /// User attributes were updated at the auth provider.
    #[display("USER_UPDATED")]
    UserUpdated(Identity),
}

impl AuthEvent {
    /// Returns the [`Identity`] this [`AuthEvent`] carries, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::SignedIn(s) | Self::TokenRefreshed(s) => Some(&s.user),
            Self::UserUpdated(identity) => Some(identity),
            Self::SignedOut => None,
        }
    }
}
