//! File-based [`Storage`] implementation.

use std::{
    io::{self, Write as _},
    path::PathBuf,
};

use common::operations::{By, Delete, Insert, Select};
use tempfile::NamedTempFile;
use tokio::{fs, task};
use tracerr::Traced;

use crate::infra::{storage, Storage};

use super::Record;

/// [`Storage`] persisting every [`Record`] as a JSON file in a directory.
#[derive(Clone, Debug)]
pub struct File {
    /// Directory the files are stored in.
    dir: PathBuf,
}

impl File {
    /// Creates a new [`File`] storage in the provided directory.
    ///
    /// The directory is created lazily on the first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the path of the file holding the [`Record`] of type `R`.
    fn path<R: Record>(&self) -> PathBuf {
        self.dir.join(format!("{}.json", R::KEY))
    }
}

impl<R: Record> Storage<Select<By<Option<R>, ()>>> for File {
    type Ok = Option<R>;
    type Err = Traced<storage::Error>;

    async fn execute(
        &self,
        _: Select<By<Option<R>, ()>>,
    ) -> Result<Self::Ok, Self::Err> {
        let raw = match fs::read(self.path::<R>()).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(tracerr::new!(storage::Error::from(e))),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(tracerr::from_and_wrap!(=> storage::Error))
    }
}

impl<R: Record> Storage<Insert<R>> for File {
    type Ok = ();
    type Err = Traced<storage::Error>;

    async fn execute(
        &self,
        Insert(record): Insert<R>,
    ) -> Result<Self::Ok, Self::Err> {
        let raw = serde_json::to_vec(&record)
            .map_err(tracerr::from_and_wrap!(=> storage::Error))?;

        // Every write goes through its own temporary file, and the rename is
        // atomic, so readers never observe a partial write.
        let dir = self.dir.clone();
        let path = self.path::<R>();
        task::spawn_blocking(move || -> io::Result<()> {
            std::fs::create_dir_all(&dir)?;
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&raw)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map(drop).map_err(|e| e.error)
        })
        .await
        .map_err(|e| tracerr::new!(storage::Error::from(io::Error::other(e))))?
        .map_err(tracerr::from_and_wrap!(=> storage::Error))
    }
}

impl<R: Record> Storage<Delete<By<R, ()>>> for File {
    type Ok = ();
    type Err = Traced<storage::Error>;

    async fn execute(
        &self,
        _: Delete<By<R, ()>>,
    ) -> Result<Self::Ok, Self::Err> {
        match fs::remove_file(self.path::<R>()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(tracerr::new!(storage::Error::from(e))),
        }
    }
}

#[cfg(test)]
mod spec {
    use common::{
        operations::{By, Delete, Insert, Select},
        DateTime,
    };
    use futures::future;

    use crate::{
        domain::user::{self, Identity, Metadata, ResolvedSession, Snapshot},
        infra::Storage as _,
    };

    use super::File;

    fn snapshot() -> Snapshot {
        let identity = Identity {
            auth_id: "auth-1".to_owned().into(),
            email: user::Email::new("a@x.com").unwrap(),
            metadata: Metadata::default(),
        };
        let now = DateTime::from_unix_timestamp(1_700_000_000).unwrap();
        ResolvedSession::fallback(identity, now).into()
    }

    #[tokio::test]
    async fn persists_records_under_their_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = File::new(dir.path().join("state"));

        let missing: Option<Snapshot> =
            storage.execute(Select(By::single())).await.unwrap();
        assert_eq!(missing, None);

        storage.execute(Insert(snapshot())).await.unwrap();
        assert!(dir.path().join("state/user.json").exists());

        let stored: Option<Snapshot> =
            storage.execute(Select(By::single())).await.unwrap();
        assert_eq!(stored, Some(snapshot()));

        storage
            .execute(Delete(By::<Snapshot, ()>::single()))
            .await
            .unwrap();
        assert!(!dir.path().join("state/user.json").exists());

        // Deleting a missing record is not an error.
        storage
            .execute(Delete(By::<Snapshot, ()>::single()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reports_corrupted_record() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("user.json"), "{\"id\":").unwrap();
        let storage = File::new(dir.path());

        let err = storage
            .execute(Select(By::<Option<Snapshot>, ()>::single()))
            .await
            .unwrap_err();

        assert!(err.as_ref().is_corrupted());
    }

    #[tokio::test]
    async fn survives_concurrent_writes_of_same_record() {
        let dir = tempfile::tempdir().unwrap();
        let storage = File::new(dir.path());

        let writes = (0..16).map(|_| storage.execute(Insert(snapshot())));
        for written in future::join_all(writes).await {
            written.unwrap();
        }

        let stored: Option<Snapshot> =
            storage.execute(Select(By::single())).await.unwrap();
        assert_eq!(stored, Some(snapshot()));
        let files = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 1, "no temporary files are left behind");
    }
}
