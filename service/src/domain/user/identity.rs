//! [`Identity`] definitions.

use derive_more::{AsRef, Display, From, Into};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[cfg(doc)]
use crate::domain::User;

use super::{Email, FullName};

/// Identity of a [`User`] as known to the auth provider.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Identity {
    /// Opaque handle issued by the auth provider.
    #[serde(rename = "id")]
    pub auth_id: AuthId,

    /// [`Email`] the [`User`] signs in with.
    pub email: Email,

    /// Provider-issued [`Metadata`].
    #[serde(default, rename = "user_metadata")]
    pub metadata: Metadata,
}

/// Opaque handle of an [`Identity`] issued by the auth provider.
#[derive(
    AsRef,
    Clone,
    Debug,
    Deserialize,
    Display,
    Eq,
    From,
    Hash,
    Into,
    PartialEq,
    Serialize,
)]
#[as_ref(str)]
#[serde(transparent)]
pub struct AuthId(String);

/// Free-form metadata attached to an [`Identity`] by the auth provider.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    /// Keys the display name is looked up by, in order of preference.
    const FULL_NAME_KEYS: [&'static str; 3] = ["full_name", "fullName", "name"];

    /// Returns the [`FullName`] stored in this [`Metadata`], if any.
    #[must_use]
    pub fn full_name(&self) -> Option<FullName> {
        Self::FULL_NAME_KEYS
            .iter()
            .filter_map(|key| self.0.get(*key).and_then(Value::as_str))
            .find_map(|name| FullName::new(name.trim()))
    }
}

#[cfg(test)]
mod spec {
    use super::{Identity, Metadata};

    #[test]
    fn deserializes_provider_user() {
        let identity = serde_json::from_str::<Identity>(
            r#"{
                "id": "6f1c1f7e-5f2a-4c09-a3f2-0c1d3c1a9b10",
                "aud": "authenticated",
                "email": "clerk@store.io",
                "user_metadata": {"name": "  Store Clerk "}
            }"#,
        )
        .unwrap();

        assert_eq!(
            identity.auth_id.as_ref(),
            "6f1c1f7e-5f2a-4c09-a3f2-0c1d3c1a9b10",
        );
        assert_eq!(identity.email.as_ref(), "clerk@store.io");
        assert_eq!(
            identity.metadata.full_name().map(|n| n.to_string()),
            Some("Store Clerk".to_owned()),
        );
    }

    #[test]
    fn missing_metadata_is_empty() {
        let identity = serde_json::from_str::<Identity>(
            r#"{"id": "abc", "email": "a@x.com"}"#,
        )
        .unwrap();

        assert_eq!(identity.metadata, Metadata::default());
        assert_eq!(identity.metadata.full_name(), None);
    }
}
