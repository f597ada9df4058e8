//! [`User`] definitions.

pub mod event;
pub mod identity;
pub mod session;

use std::{str::FromStr, sync::LazyLock};

use derive_more::{AsRef, Display, From, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use regex::Regex;
use secrecy::{zeroize::Zeroize, CloneableSecret};
use serde::{Deserialize, Serialize};

pub use self::{
    event::AuthEvent,
    identity::{AuthId, Identity, Metadata},
    session::{
        AuthSession, Claims, RefreshToken, ResolvedSession, Snapshot, Token,
    },
};

/// Application profile of a point-of-sale user.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct User {
    /// ID of this [`User`].
    pub id: Id,

    /// [`Username`] of this [`User`].
    pub username: Username,

    /// [`Email`] of this [`User`].
    pub email: Email,

    /// [`FullName`] of this [`User`].
    pub full_name: Option<FullName>,

    /// [`Phone`] of this [`User`].
    pub phone: Option<Phone>,

    /// Indicator whether this [`User`] is employed by a store.
    pub is_store_employee: bool,

    /// Indicator whether this [`User`] must change the password on the next
    /// login.
    pub require_password_change: bool,
}

impl User {
    /// Synthesizes a degraded [`User`] out of the provided [`Identity`] only.
    ///
    /// Used when the profile storage is unreachable: everything besides the
    /// [`Email`] is a best-effort guess.
    #[must_use]
    pub fn fallback(identity: &Identity) -> Self {
        Self {
            id: Id::UNKNOWN,
            username: Username::from_email(&identity.email),
            email: identity.email.clone(),
            full_name: identity.metadata.full_name(),
            phone: None,
            is_store_employee: false,
            require_password_change: false,
        }
    }
}

/// Values of a [`User`] to be created.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewUser {
    /// [`Username`] of a new [`User`].
    pub username: Username,

    /// [`Email`] of a new [`User`].
    pub email: Email,

    /// [`FullName`] of a new [`User`].
    pub full_name: Option<FullName>,

    /// [`Phone`] of a new [`User`].
    pub phone: Option<Phone>,

    /// Indicator whether a new [`User`] is employed by a store.
    pub is_store_employee: bool,

    /// Indicator whether a new [`User`] must change the password.
    pub require_password_change: bool,
}

impl NewUser {
    /// Derives default [`NewUser`] values from the provided [`Identity`].
    #[must_use]
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            username: Username::from_email(&identity.email),
            email: identity.email.clone(),
            full_name: identity.metadata.full_name(),
            phone: None,
            is_store_employee: false,
            require_password_change: false,
        }
    }

    /// Turns this [`NewUser`] into a [`User`] with the assigned [`Id`].
    #[must_use]
    pub fn with_id(self, id: Id) -> User {
        let Self {
            username,
            email,
            full_name,
            phone,
            is_store_employee,
            require_password_change,
        } = self;
        User {
            id,
            username,
            email,
            full_name,
            phone,
            is_store_employee,
            require_password_change,
        }
    }
}

/// ID of a [`User`].
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    From,
    Hash,
    Into,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[cfg_attr(feature = "postgres", derive(ToSql, FromSql), postgres(transparent))]
#[serde(transparent)]
pub struct Id(i64);

impl Id {
    /// [`Id`] of a [`User`] not backed by a stored profile.
    pub const UNKNOWN: Self = Self(0);

    /// Indicates whether this [`Id`] refers to a stored profile.
    #[must_use]
    pub const fn is_known(self) -> bool {
        self.0 > 0
    }
}

impl FromStr for Id {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self).map_err(|_| "invalid `Id`")
    }
}

/// Defines [`TryFrom<String>`] and [`FromStr`] for a validated string type,
/// so it can be deserialized and parsed.
macro_rules! impl_validated_str {
    ($ty:ident) => {
        impl TryFrom<String> for $ty {
            type Error = &'static str;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(s).ok_or(concat!("invalid `", stringify!($ty), "`"))
            }
        }

        impl FromStr for $ty {
            type Err = &'static str;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::try_from(s.to_owned())
            }
        }
    };
}

/// Username of a [`User`].
#[derive(
    AsRef, Clone, Debug, Deserialize, Display, Eq, Hash, Into, PartialEq, Serialize,
)]
#[as_ref(str)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Maximum length of a [`Username`].
    const MAX_LEN: usize = 64;

    /// Creates a new [`Username`] if the given `username` is valid.
    #[must_use]
    pub fn new(username: impl Into<String>) -> Option<Self> {
        let username = username.into();
        Self::check(&username).then_some(Self(username))
    }

    /// Derives a default [`Username`] from the local part of an [`Email`].
    #[must_use]
    pub fn from_email(email: &Email) -> Self {
        let local = email
            .local_part()
            .chars()
            .filter(|c| !c.is_whitespace() && !c.is_control() && *c != '"')
            .take(Self::MAX_LEN)
            .collect::<String>();
        Self::new(local).unwrap_or_else(|| Self("user".to_owned()))
    }

    /// Derives a new [`Username`] out of this one, distinguished by the
    /// alphanumeric characters of the provided `suffix`.
    #[must_use]
    pub fn with_suffix(&self, suffix: &str) -> Self {
        let suffix = suffix
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(8)
            .collect::<String>();
        if suffix.is_empty() {
            return self.clone();
        }
        let base = self
            .0
            .chars()
            .take(Self::MAX_LEN - suffix.len() - 1)
            .collect::<String>();
        Self(format!("{base}-{suffix}"))
    }

    /// Checks whether the given `username` is a valid [`Username`].
    fn check(username: impl AsRef<str>) -> bool {
        let username = username.as_ref();
        !username.is_empty()
            && username.chars().count() <= Self::MAX_LEN
            && !username.chars().any(|c| c.is_whitespace() || c.is_control())
    }
}

impl_validated_str!(Username);

/// Password of a [`User`].
#[derive(Clone, Debug, Display, Eq, From, PartialEq)]
#[from(&str, String)]
pub struct Password(String);

impl Password {
    /// Creates a new [`Password`] if the given `password` is valid.
    #[must_use]
    pub fn new(password: impl Into<String>) -> Option<Self> {
        let password = password.into();
        Self::check(&password).then_some(Self(password))
    }

    /// Returns this [`Password`] as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks whether the given `password` is a valid [`Password`].
    fn check(password: impl AsRef<str>) -> bool {
        let password = password.as_ref();
        password.len() >= 6 && password.len() <= 128
    }
}

impl FromStr for Password {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `Password`")
    }
}

impl CloneableSecret for Password {}
impl Zeroize for Password {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Email address of a [`User`].
#[derive(
    AsRef, Clone, Debug, Deserialize, Display, Eq, Hash, Into, PartialEq, Serialize,
)]
#[as_ref(str)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Creates a new [`Email`] if the given `address` is valid.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Option<Self> {
        let address = address.into();
        Self::check(&address).then_some(Self(address))
    }

    /// Returns the local part of this [`Email`] (the one before `@`).
    #[must_use]
    pub fn local_part(&self) -> &str {
        self.0.rsplit_once('@').map_or(&*self.0, |(local, _)| local)
    }

    /// Checks whether the given `address` is a valid [`Email`].
    fn check(address: impl AsRef<str>) -> bool {
        /// Regular expression checking [`Email`] format.
        static REGEX: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(
                "^([^\\x00-\\x20\\x22\\x28\\x29\\x2c\\x2e\\x3a-\
                     \\x3c\\x3e\\x40\\x5b-\\x5d\\x7f-\\xff]+\
                  |\\x22([^\\x0d\\x22\\x5c\\x80-\\xff]\
                  |\\x5c[\\x00-\\x7f])*\\x22)\
                  (\\x2e([^\\x00-\\x20\\x22\\x28\\x29\\x2c\\x2e\\x3a-\
                           \\x3c\\x3e\\x40\\x5b-\\x5d\\x7f-\\xff]+\
                        |\\x22([^\\x0d\\x22\\x5c\\x80-\\xff]\
                        |\\x5c[\\x00-\\x7f])*\\x22))*\\x40\
                  ([^\\x00-\\x20\\x22\\x28\\x29\\x2c\\x2e\\x3a-\
                     \\x3c\\x3e\\x40\\x5b-\\x5d\\x7f-\\xff]+\
                  |\\x5b([^\\x0d\\x5b-\\x5d\\x80-\\xff]\
                        |\\x5c[\\x00-\\x7f])*\\x5d)\
                  (\\x2e([^\\x00-\\x20\\x22\\x28\\x29\\x2c\\x2e\\x3a-\
                           \\x3c\\x3e\\x40\\x5b-\\x5d\\x7f-\\xff]+\
                        |\\x5b([^\\x0d\\x5b-\\x5d\\x80-\\xff]\
                        |\\x5c[\\x00-\\x7f])*\\x5d))*$",
            )
            .expect("valid regex")
        });

        REGEX.is_match(address.as_ref())
    }
}

impl_validated_str!(Email);

/// Full (display) name of a [`User`].
#[derive(
    AsRef, Clone, Debug, Deserialize, Display, Eq, Into, PartialEq, Serialize,
)]
#[as_ref(str)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
#[serde(try_from = "String", into = "String")]
pub struct FullName(String);

impl FullName {
    /// Creates a new [`FullName`] if the given `name` is valid.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        Self::check(&name).then_some(Self(name))
    }

    /// Checks whether the given `name` is a valid [`FullName`].
    fn check(name: impl AsRef<str>) -> bool {
        let name = name.as_ref();
        name.trim() == name && !name.is_empty() && name.len() <= 512
    }
}

impl_validated_str!(FullName);

/// Phone number of a [`User`].
#[derive(
    AsRef, Clone, Debug, Deserialize, Display, Eq, Into, PartialEq, Serialize,
)]
#[as_ref(str)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
#[serde(try_from = "String", into = "String")]
pub struct Phone(String);

impl Phone {
    /// Creates a new [`Phone`] if the given `number` is valid.
    #[must_use]
    pub fn new(number: impl Into<String>) -> Option<Self> {
        let number = number.into();
        Self::check(&number).then_some(Self(number))
    }

    /// Checks whether the given `number` is a valid [`Phone`].
    fn check(number: impl AsRef<str>) -> bool {
        /// Regular expression checking [`Phone`] format.
        static REGEX: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"^([+]?\d{1,3}[-\s]?|)\d{2,4}[-\s]?\d{3}[-\s]?\d{3,4}$")
                .expect("valid regex")
        });

        REGEX.is_match(number.as_ref())
    }
}

impl_validated_str!(Phone);

#[cfg(test)]
mod spec {
    use super::{Email, FullName, Identity, Metadata, NewUser, User, Username};

    fn email(s: &str) -> Email {
        Email::new(s).unwrap()
    }

    #[test]
    fn username_defaults_to_email_local_part() {
        assert_eq!(Username::from_email(&email("a@x.com")).as_ref(), "a");
        assert_eq!(
            Username::from_email(&email("jane.doe+pos@store.io")).as_ref(),
            "jane.doe+pos",
        );
    }

    #[test]
    fn suffixed_username_stays_valid() {
        let long = Username::new("x".repeat(64)).unwrap();

        let suffixed = long.with_suffix("6f1c1f7e-5f2a-4c09");

        assert_eq!(suffixed.as_ref().len(), 64);
        assert!(suffixed.as_ref().ends_with("-6f1c1f7e"));
        assert_eq!(
            Username::new("ann").unwrap().with_suffix("b9d4").as_ref(),
            "ann-b9d4",
        );
        assert_eq!(
            Username::new("ann").unwrap().with_suffix("--").as_ref(),
            "ann",
        );
    }

    #[test]
    fn validates_username() {
        assert!(Username::new("cashier1").is_some());
        assert!(Username::new("").is_none());
        assert!(Username::new("two words").is_none());
        assert!(Username::new("x".repeat(65)).is_none());
    }

    #[test]
    fn new_user_uses_identity_metadata() {
        let identity = Identity {
            auth_id: "b9d4".to_owned().into(),
            email: email("ann@x.com"),
            metadata: serde_json::from_str::<Metadata>(
                r#"{"full_name": "Ann Lee"}"#,
            )
            .unwrap(),
        };

        let new = NewUser::from_identity(&identity);

        assert_eq!(new.username.as_ref(), "ann");
        assert_eq!(new.full_name, FullName::new("Ann Lee"));
        assert!(!new.is_store_employee);
        assert!(!new.require_password_change);
    }

    #[test]
    fn fallback_has_unknown_id() {
        let identity = Identity {
            auth_id: "b9d4".to_owned().into(),
            email: email("ann@x.com"),
            metadata: Metadata::default(),
        };

        let user = User::fallback(&identity);

        assert!(!user.id.is_known());
        assert_eq!(user.email, identity.email);
        assert_eq!(user.full_name, None);
    }

    #[test]
    fn rejects_invalid_email_on_deserialization() {
        assert!(serde_json::from_str::<Email>(r#""a@x.com""#).is_ok());
        assert!(serde_json::from_str::<Email>(r#""not an email""#).is_err());
    }
}
