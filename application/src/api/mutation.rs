//! GraphQL [`Mutation`]s definitions.

use juniper::{graphql_object, Nullable};
use service::{command, Command as _};

use crate::{api, define_error, AsError, Context, Error};

/// Root of all GraphQL mutations.
#[derive(Clone, Copy, Debug)]
pub struct Mutation;

impl Mutation {
    /// Name of the [`tracing::Span`] for the mutations.
    const SPAN_NAME: &'static str = "GraphQL mutation";
}

#[graphql_object(context = Context)]
impl Mutation {
    /// Logs in the `User` with the provided email and password.
    ///
    /// Creates the `User` profile on the first login.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `WRONG_CREDENTIALS` - provided credentials were rejected;
    /// - `PROVIDER_UNAVAILABLE` - auth provider cannot be reached.
    #[tracing::instrument(
        skip_all,
        fields(
            email = %email,
            gql.name = "login",
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn login(
        email: api::user::Email,
        password: api::user::Password,
        ctx: &Context,
    ) -> Result<api::user::session::Session, Error> {
        ctx.service()
            .execute(command::Login {
                email: email.into(),
                password: password.into(),
            })
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())
            .map(Into::into)
    }

    /// Logs in the `User` with the provided username and password.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `WRONG_CREDENTIALS` - provided credentials were rejected, or no
    ///                         `User` has the provided username;
    /// - `PROVIDER_UNAVAILABLE` - auth provider cannot be reached.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "loginWithUsername",
            otel.name = Self::SPAN_NAME,
            username = %username,
        ),
    )]
    pub async fn login_with_username(
        username: api::user::Username,
        password: api::user::Password,
        ctx: &Context,
    ) -> Result<api::user::session::Session, Error> {
        ctx.service()
            .execute(command::LoginWithUsername {
                username: username.into(),
                password: password.into(),
            })
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())
            .map(Into::into)
    }

    /// Logs out the current `User` of this terminal.
    ///
    /// Local session is cleared even if the auth provider cannot be reached.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "logout",
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn logout(ctx: &Context) -> bool {
        ctx.service()
            .execute(command::Logout)
            .await
            .unwrap_or_else(|e| match e {});
        true
    }

    /// Re-resolves the session of this terminal against the auth provider.
    ///
    /// Concurrent calls share a single resolution.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "resolveSession",
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn resolve_session(
        ctx: &Context,
    ) -> Option<api::user::session::Session> {
        ctx.service()
            .execute(command::ResolveCurrentUser)
            .await
            .unwrap_or_else(|e| match e {})
            .map(Into::into)
    }

    /// Sends a password reset email to the provided address.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `PROVIDER_REJECTED` - auth provider rejected the request;
    /// - `PROVIDER_UNAVAILABLE` - auth provider cannot be reached.
    #[tracing::instrument(
        skip_all,
        fields(
            email = %email,
            gql.name = "sendPasswordReset",
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn send_password_reset(
        email: api::user::Email,
        ctx: &Context,
    ) -> Result<bool, Error> {
        ctx.service()
            .execute(command::SendPasswordReset(email.into()))
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())?;
        Ok(true)
    }

    /// Updates the password of the current `User`.
    ///
    /// Clears the `requirePasswordChange` flag of the `User`, if set.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `NO_SESSION` - there is no logged in `User`;
    /// - `PROVIDER_REJECTED` - auth provider rejected the new password;
    /// - `PROVIDER_UNAVAILABLE` - auth provider cannot be reached.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "updatePassword",
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn update_password(
        password: api::user::Password,
        ctx: &Context,
    ) -> Result<bool, Error> {
        ctx.service()
            .execute(command::UpdatePassword(password.into()))
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())?;
        Ok(true)
    }

    /// Updates the profile of the `User` with the provided ID.
    ///
    /// Omitted fields are left untouched, while `null` ones are removed.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `USER_NOT_EXISTS` - the `User` with the provided ID does not exist;
    /// - `USERNAME_OCCUPIED` - provided username is occupied by another
    ///                         `User`.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "updateUser",
            id = %id,
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn update_user(
        id: api::user::Id,
        username: Option<api::user::Username>,
        full_name: Nullable<api::user::FullName>,
        phone: Nullable<api::user::Phone>,
        is_store_employee: Option<bool>,
        require_password_change: Option<bool>,
        ctx: &Context,
    ) -> Result<api::User, Error> {
        ctx.service()
            .execute(command::UpdateUser {
                id: id.into(),
                username: username.map(Into::into),
                full_name: full_name.explicit().map(|n| n.map(Into::into)),
                phone: phone.explicit().map(|p| p.map(Into::into)),
                is_store_employee,
                require_password_change,
            })
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())
            .map(Into::into)
    }

    /// Deletes the `User` with the provided ID.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `USER_NOT_EXISTS` - the `User` with the provided ID does not exist.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "deleteUser",
            id = %id,
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn delete_user(
        id: api::user::Id,
        ctx: &Context,
    ) -> Result<bool, Error> {
        ctx.service()
            .execute(command::DeleteUser(id.into()))
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())?;
        Ok(true)
    }
}

define_error! {
    enum UserError {
        #[code = "USER_NOT_EXISTS"]
        #[status = NOT_FOUND]
        #[message = "`User` does not exist"]
        NotExists,

        #[code = "USERNAME_OCCUPIED"]
        #[status = CONFLICT]
        #[message = "`UserUsername` is occupied by another `User`"]
        UsernameOccupied,
    }
}

define_error! {
    enum CredentialsError {
        #[code = "WRONG_CREDENTIALS"]
        #[status = FORBIDDEN]
        #[message = "Provided credentials were rejected"]
        WrongCredentials,
    }
}

/// Creates a [`CredentialsError::WrongCredentials`] carrying the provided
/// auth provider message.
fn wrong_credentials(msg: &str) -> Error {
    Error {
        message: msg.to_owned(),
        ..CredentialsError::WrongCredentials.into()
    }
}

impl AsError for command::login::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Provider(e) => e.try_as_error(),
            Self::WrongCredentials(msg) => Some(wrong_credentials(msg)),
        }
    }
}

impl AsError for command::login_with_username::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Db(e) => e.try_as_error(),
            Self::Login(e) => e.try_as_error(),
            Self::WrongCredentials(msg) => Some(wrong_credentials(msg)),
        }
    }
}

impl AsError for command::send_password_reset::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Provider(e) => e.try_as_error(),
        }
    }
}

impl AsError for command::update_password::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Db(e) => e.try_as_error(),
            Self::Provider(e) => e.try_as_error(),
        }
    }
}

impl AsError for command::update_user::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Db(e) => e.try_as_error(),
            Self::UserNotExists(_) => Some(UserError::NotExists.into()),
            Self::UsernameOccupied(_) => {
                Some(UserError::UsernameOccupied.into())
            }
        }
    }
}

impl AsError for command::delete_user::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Db(e) => e.try_as_error(),
            Self::UserNotExists(_) => Some(UserError::NotExists.into()),
        }
    }
}
