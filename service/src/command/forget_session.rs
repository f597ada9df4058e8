//! [`Command`] for forgetting the current session.

use std::convert::Infallible;

use common::operations::{By, Delete};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::user::{AuthSession, Snapshot},
    infra::{storage, Storage},
    Service,
};

use super::Command;

/// [`Command`] for forgetting the current session: the in-memory one, the
/// persisted [`Snapshot`] and the locally stored [`AuthSession`].
#[derive(Clone, Copy, Debug)]
pub struct ForgetSession;

impl<Db, Auth, Store> Command<ForgetSession> for Service<Db, Auth, Store>
where
    Store: Storage<
            Delete<By<Snapshot, ()>>,
            Ok = (),
            Err = Traced<storage::Error>,
        > + Storage<
            Delete<By<AuthSession, ()>>,
            Ok = (),
            Err = Traced<storage::Error>,
        >,
{
    type Ok = ();
    type Err = Infallible;

    async fn execute(&self, _: ForgetSession) -> Result<Self::Ok, Self::Err> {
        _ = self.state.session.send_replace(None);

        if let Err(e) = self
            .storage()
            .execute(Delete(By::<Snapshot, ()>::single()))
            .await
        {
            log::warn!("failed to remove session `Snapshot`: {e}");
        }
        if let Err(e) = self
            .storage()
            .execute(Delete(By::<AuthSession, ()>::single()))
            .await
        {
            log::warn!("failed to remove stored `AuthSession`: {e}");
        }
        Ok(())
    }
}
