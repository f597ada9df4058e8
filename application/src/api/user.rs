//! [`User`]-related definitions.

use derive_more::{AsRef, Display, From, Into};
use juniper::{graphql_object, GraphQLScalar};
use service::domain;

use crate::{api::scalar, Context};

/// Profile of a point-of-sale [`User`].
#[derive(Clone, Debug, From, Into)]
pub struct User(domain::User);

/// Profile of a point-of-sale `User`.
#[graphql_object(context = Context)]
impl User {
    /// Unique identifier of this `User`.
    ///
    /// Zero for a fallback profile not backed by the `users` table.
    #[must_use]
    pub fn id(&self) -> Id {
        self.0.id.into()
    }

    /// Username of this `User`.
    #[must_use]
    pub fn username(&self) -> Username {
        self.0.username.clone().into()
    }

    /// Email of this `User`.
    #[must_use]
    pub fn email(&self) -> Email {
        self.0.email.clone().into()
    }

    /// Full name of this `User`.
    #[must_use]
    pub fn full_name(&self) -> Option<FullName> {
        self.0.full_name.clone().map(Into::into)
    }

    /// Phone of this `User`.
    #[must_use]
    pub fn phone(&self) -> Option<Phone> {
        self.0.phone.clone().map(Into::into)
    }

    /// Indicator whether this `User` is employed by a store.
    #[must_use]
    pub fn is_store_employee(&self) -> bool {
        self.0.is_store_employee
    }

    /// Indicator whether this `User` must change the password.
    #[must_use]
    pub fn require_password_change(&self) -> bool {
        self.0.require_password_change
    }
}

/// Unique identifier of a `User`.
#[derive(
    AsRef, Clone, Copy, Debug, Display, Eq, From, GraphQLScalar, Into, PartialEq,
)]
#[graphql(name = "UserId", with = scalar::Via::<domain::user::Id>)]
pub struct Id(domain::user::Id);

/// Username of a `User`.
#[derive(AsRef, Clone, Debug, Display, From, GraphQLScalar, Into)]
#[graphql(
    name = "UserUsername",
    with = scalar::Via::<domain::user::Username>,
)]
pub struct Username(domain::user::Username);

/// Email of a `User`.
#[derive(AsRef, Clone, Debug, Display, From, GraphQLScalar, Into)]
#[graphql(
    name = "UserEmail",
    with = scalar::Via::<domain::user::Email>,
)]
pub struct Email(domain::user::Email);

/// Full name of a `User`.
#[derive(AsRef, Clone, Debug, Display, From, GraphQLScalar, Into)]
#[graphql(
    name = "UserFullName",
    with = scalar::Via::<domain::user::FullName>,
)]
pub struct FullName(domain::user::FullName);

/// Phone of a `User`.
#[derive(AsRef, Clone, Debug, Display, From, GraphQLScalar, Into)]
#[graphql(
    name = "UserPhone",
    with = scalar::Via::<domain::user::Phone>,
)]
pub struct Phone(domain::user::Phone);

/// Password of a `User`.
#[derive(AsRef, Clone, Debug, From, GraphQLScalar, Into)]
#[graphql(
    name = "UserPassword",
    with = scalar::Via::<domain::user::Password>,
)]
pub struct Password(domain::user::Password);

impl From<Password> for secrecy::SecretBox<domain::user::Password> {
    fn from(password: Password) -> Self {
        Self::new(Box::new(password.0))
    }
}

pub mod session {
    //! [`Session`]-related definitions.

    use common::DateTime;
    use derive_more::{From, Into};
    use juniper::graphql_object;
    use service::domain::user::ResolvedSession;

    use crate::{api, Context};

    /// Session of the logged in `User`.
    #[derive(Clone, Debug, From, Into)]
    pub struct Session(ResolvedSession);

    /// Session of the logged in `User` of this terminal.
    #[graphql_object(name = "UserSession", context = Context)]
    impl Session {
        /// Profile of the logged in `User`.
        #[must_use]
        pub fn user(&self) -> api::User {
            self.0.user.clone().into()
        }

        /// Identifier of the `User` at the auth provider.
        #[must_use]
        pub fn auth_id(&self) -> &str {
            self.0.identity.auth_id.as_ref()
        }

        /// `DateTime` when the profile was fetched.
        #[must_use]
        pub fn fetched_at(&self) -> DateTime {
            self.0.fetched_at.coerce()
        }

        /// Indicator whether the profile was synthesized from the auth
        /// provider identity only, because the `users` table was
        /// unreachable.
        ///
        /// Only `email` and `username` of such a profile are reliable.
        #[must_use]
        pub fn is_fallback(&self) -> bool {
            self.0.is_fallback
        }
    }
}
