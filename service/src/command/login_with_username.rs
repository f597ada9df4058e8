//! [`Command`] for logging in with a [`Username`].

use common::operations::{By, Select};
use derive_more::{Display, Error, From};
use secrecy::SecretBox;
use tracerr::Traced;

#[cfg(doc)]
use crate::domain::user::{Password, Username};
use crate::{
    domain::{
        user::{self, ResolvedSession},
        User,
    },
    infra::{database, Database},
    Service,
};

use super::{login, Command, Login};

/// [`Command`] for logging in with a [`Username`] and a [`Password`].
///
/// The [`Username`] is resolved into the [`User`]'s email, which is then used
/// to [`Login`].
#[derive(Debug)]
pub struct LoginWithUsername {
    /// [`Username`] to log in with.
    pub username: user::Username,

    /// [`Password`] to log in with.
    pub password: SecretBox<user::Password>,
}

impl<Db, Auth, Store> Command<LoginWithUsername> for Service<Db, Auth, Store>
where
    Db: Database<
        Select<By<Option<User>, user::Username>>,
        Ok = Option<User>,
        Err = Traced<database::Error>,
    >,
    Self: Command<
        Login,
        Ok = ResolvedSession,
        Err = Traced<login::ExecutionError>,
    >,
{
    type Ok = ResolvedSession;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        LoginWithUsername { username, password }: LoginWithUsername,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let user = self
            .database()
            .execute(Select(By::<Option<User>, _>::new(username)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or_else(|| {
                E::WrongCredentials("Invalid login credentials".into())
            })
            .map_err(tracerr::wrap!())?;

        self.execute(Login {
            email: user.email,
            password,
        })
        .await
        .map_err(tracerr::map_from_and_wrap!(=> E))
    }
}

/// Error of [`LoginWithUsername`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    Db(database::Error),

    /// [`Login`] error.
    #[display("Login failed: {_0}")]
    Login(login::ExecutionError),

    /// No [`User`] with the provided [`Username`] exists.
    #[display("Wrong credentials: {_0}")]
    #[from(ignore)]
    WrongCredentials(#[error(not(source))] String),
}

#[cfg(test)]
mod spec {
    use crate::{
        command::login,
        domain::user::{NewUser, Password, Username},
        infra::database,
        testing::{identity, Harness},
        Command as _, Config,
    };

    use super::{ExecutionError, LoginWithUsername};

    fn login(username: &str, password: &str) -> LoginWithUsername {
        LoginWithUsername {
            username: Username::new(username).unwrap(),
            password: Box::new(Password::new(password).unwrap()).into(),
        }
    }

    fn harness() -> Harness {
        let mut profile = NewUser::from_identity(&identity("jane@x.com"));
        profile.username = Username::new("cashier1").unwrap();
        let h = Harness::with_database(
            Config::default(),
            database::Memory::with_users([profile]),
        );
        _ = h.register("jane@x.com", "secret123");
        h
    }

    #[tokio::test]
    async fn logs_in_by_profile_email() {
        let h = harness();

        let session =
            h.service.execute(login("cashier1", "secret123")).await.unwrap();

        assert_eq!(session.identity.email.as_ref(), "jane@x.com");
        assert_eq!(session.user.username.as_ref(), "cashier1");
        assert_eq!(h.database.inserts(), 0);
    }

    #[tokio::test]
    async fn rejects_unknown_username() {
        let h = harness();

        let err = h
            .service
            .execute(login("cashier2", "secret123"))
            .await
            .unwrap_err();

        assert!(matches!(err.as_ref(), ExecutionError::WrongCredentials(_)));
        assert_eq!(h.provider.sign_ins(), 0);
    }

    #[tokio::test]
    async fn rejects_wrong_password() {
        let h = harness();

        let err = h
            .service
            .execute(login("cashier1", "wrong-one"))
            .await
            .unwrap_err();

        assert!(matches!(
            err.as_ref(),
            ExecutionError::Login(login::ExecutionError::WrongCredentials(_)),
        ));
    }
}
