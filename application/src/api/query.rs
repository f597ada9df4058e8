//! GraphQL [`Query`]s definitions.

use juniper::graphql_object;
use service::{query, Query as _};

use crate::{api, define_error, AsError, Context, Error};

/// Root of all GraphQL queries.
#[derive(Clone, Copy, Debug)]
pub struct Query;

impl Query {
    /// Name of the [`tracing::Span`] for the queries.
    const SPAN_NAME: &'static str = "GraphQL query";
}

#[graphql_object(context = Context)]
impl Query {
    /// Returns the session of the `User` logged in on this terminal, if any.
    ///
    /// Never contacts the auth provider: use `resolveSession` mutation to
    /// re-validate the session.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "currentSession",
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn current_session(
        ctx: &Context,
    ) -> Option<api::user::session::Session> {
        ctx.service()
            .execute(query::session::Current)
            .await
            .unwrap_or_else(|e| match e {})
            .map(Into::into)
    }

    /// Returns the `User` with the specified ID.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `USER_NOT_EXISTS` - the `User` with the specified ID does not exist.
    #[tracing::instrument(
        skip_all,
        fields(
            id = %id,
            gql.name = "user",
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn user(
        id: api::user::Id,
        ctx: &Context,
    ) -> Result<api::User, Error> {
        ctx.service()
            .execute(query::user::ById::by(id.into()))
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())?
            .ok_or_else(|| UserError::NotExists.into())
            .map_err(ctx.error())
            .map(Into::into)
    }

    /// Returns the `User` with the specified email.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `USER_NOT_EXISTS` - the `User` with the specified email does not
    ///                       exist.
    #[tracing::instrument(
        skip_all,
        fields(
            email = %email,
            gql.name = "userByEmail",
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn user_by_email(
        email: api::user::Email,
        ctx: &Context,
    ) -> Result<api::User, Error> {
        ctx.service()
            .execute(query::user::ByEmail::by(email.into()))
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())?
            .ok_or_else(|| UserError::NotExists.into())
            .map_err(ctx.error())
            .map(Into::into)
    }

    /// Returns the `User` with the specified username.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `USER_NOT_EXISTS` - the `User` with the specified username does not
    ///                       exist.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "userByUsername",
            otel.name = Self::SPAN_NAME,
            username = %username,
        ),
    )]
    pub async fn user_by_username(
        username: api::user::Username,
        ctx: &Context,
    ) -> Result<api::User, Error> {
        ctx.service()
            .execute(query::user::ByUsername::by(username.into()))
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())?
            .ok_or_else(|| UserError::NotExists.into())
            .map_err(ctx.error())
            .map(Into::into)
    }
}

define_error! {
    enum UserError {
        #[code = "USER_NOT_EXISTS"]
        #[status = NOT_FOUND]
        #[message = "`User` does not exist"]
        NotExists,
    }
}
