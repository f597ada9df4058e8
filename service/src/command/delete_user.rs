//! [`Command`] for deleting a [`User`] profile.

use common::operations::{By, Delete};
use derive_more::{Display, Error, From};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{user, User},
    infra::{database, Database},
    Service,
};

use super::Command;

/// [`Command`] for deleting a [`User`] profile.
///
/// The account at the auth provider is left intact, so the profile is
/// recreated on the next login of the [`User`].
#[derive(Clone, Copy, Debug)]
pub struct DeleteUser(pub user::Id);

impl<Db, Auth, Store> Command<DeleteUser> for Service<Db, Auth, Store>
where
    Db: Database<
        Delete<By<User, user::Id>>,
        Ok = bool,
        Err = Traced<database::Error>,
    >,
{
    type Ok = ();
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        DeleteUser(id): DeleteUser,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let deleted = self
            .database()
            .execute(Delete(By::new(id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        if !deleted {
            return Err(tracerr::new!(E::UserNotExists(id)));
        }
        log::info!("`User(id: {id})` deleted");
        Ok(())
    }
}

/// Error of [`DeleteUser`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    Db(database::Error),

    /// [`User`] doesn't exist.
    #[display("`User(id: {_0})` does not exist")]
    #[from(ignore)]
    UserNotExists(#[error(not(source))] user::Id),
}

#[cfg(test)]
mod spec {
    use crate::{
        domain::user::NewUser,
        infra::database,
        testing::{identity, Harness},
        Command as _, Config,
    };

    use super::{DeleteUser, ExecutionError};

    #[tokio::test]
    async fn deletes_existing_user() {
        let h = Harness::with_database(
            Config::default(),
            database::Memory::with_users([NewUser::from_identity(&identity(
                "a@x.com",
            ))]),
        );
        let id = h.database.users()[0].id;

        h.service.execute(DeleteUser(id)).await.unwrap();

        assert!(h.database.users().is_empty());
        let err = h.service.execute(DeleteUser(id)).await.unwrap_err();
        assert!(matches!(err.as_ref(), ExecutionError::UserNotExists(_)));
    }
}
