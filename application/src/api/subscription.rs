//! GraphQL [`Subscription`]s definitions.

use futures::stream::{self, BoxStream, StreamExt as _};
use juniper::graphql_subscription;
use service::{query, Query as _};

use crate::{api, Context, Error};

/// Root of all GraphQL subscription.
#[derive(Clone, Copy, Debug)]
pub struct Subscription;

#[graphql_subscription(context = Context)]
impl Subscription {
    /// Subscription to the session of the `User` logged in on this terminal.
    ///
    /// Yields the current session immediately, and then each time it
    /// changes: on login, logout, token refresh or profile update.
    pub async fn session_changed(
        &self,
        ctx: &Context,
    ) -> BoxStream<'static, Result<Option<api::user::session::Session>, Error>>
    {
        let changes = ctx
            .service()
            .execute(query::session::Changes)
            .await
            .unwrap_or_else(|e| match e {});

        stream::unfold((changes, true), |(mut changes, first)| async move {
            if !first {
                changes.changed().await.ok()?;
            }
            let session = changes.borrow_and_update().clone();
            Some((Ok(session.map(Into::into)), (changes, false)))
        })
        .boxed()
    }
}
