//! [`Command`] for remembering a [`ResolvedSession`].

use std::convert::Infallible;

use common::operations::Insert;
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::user::{ResolvedSession, Snapshot},
    infra::{storage, Storage},
    Service,
};

use super::Command;

/// [`Command`] for remembering a [`ResolvedSession`] both in memory and in the
/// persisted [`Snapshot`].
///
/// Failure to persist the [`Snapshot`] is only logged: the in-memory session
/// stays authoritative.
#[derive(Clone, Debug)]
pub struct RememberSession(pub ResolvedSession);

impl<Db, Auth, Store> Command<RememberSession> for Service<Db, Auth, Store>
where
    Store: Storage<Insert<Snapshot>, Ok = (), Err = Traced<storage::Error>>,
{
    type Ok = ();
    type Err = Infallible;

    async fn execute(
        &self,
        RememberSession(session): RememberSession,
    ) -> Result<Self::Ok, Self::Err> {
        _ = self.state.session.send_replace(Some(session.clone()));

        if let Err(e) = self
            .storage()
            .execute(Insert(Snapshot::from(session)))
            .await
        {
            log::warn!("failed to persist session `Snapshot`: {e}");
        }
        Ok(())
    }
}
