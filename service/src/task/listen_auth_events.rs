//! [`ListenAuthEvents`] [`Task`].

use std::{convert::Infallible, sync::atomic::Ordering};

use common::operations::Start;
use futures::future;
use tokio::sync::broadcast::{self, error::RecvError};
use tracerr::Traced;
use tracing as log;

use crate::{
    command::{HandleAuthEvent, ResolveCurrentUser},
    domain::user::{AuthEvent, ResolvedSession},
    infra::{auth, Provider},
    Command, Service,
};

use super::Task;

/// [`Task`] keeping the cached session in sync with [`AuthEvent`]s of the
/// auth [`Provider`].
///
/// Runs the initial [`ResolveCurrentUser`] once started. [`AuthEvent`]s
/// arriving while it's in progress are ignored. The rest are handled one at
/// a time, in the order they arrive.
#[derive(Clone, Copy, Debug)]
pub struct ListenAuthEvents;

impl<Db, Auth, Store> Task<Start<ListenAuthEvents>>
    for Service<Db, Auth, Store>
where
    Auth: Provider<
        auth::Subscribe,
        Ok = broadcast::Receiver<AuthEvent>,
        Err = Traced<auth::Error>,
    >,
    Self: Command<
            ResolveCurrentUser,
            Ok = Option<ResolvedSession>,
            Err = Infallible,
        > + Command<HandleAuthEvent, Ok = (), Err = Infallible>,
{
    type Ok = ();
    type Err = Traced<auth::Error>;

    async fn execute(
        &self,
        _: Start<ListenAuthEvents>,
    ) -> Result<Self::Ok, Self::Err> {
        let mut events = self
            .provider()
            .execute(auth::Subscribe)
            .await
            .map_err(tracerr::wrap!())?;

        self.state.initializing.store(true, Ordering::SeqCst);
        let init = async {
            let session = self
                .execute(ResolveCurrentUser)
                .await
                .unwrap_or_else(|e| match e {});
            self.state.initializing.store(false, Ordering::SeqCst);
            match session {
                Some(s) => log::info!(
                    "initial session resolved for `User(id: {})`",
                    s.user.id,
                ),
                None => log::info!("no initial session"),
            }
        };

        let listen = async {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        self.execute(HandleAuthEvent(event))
                            .await
                            .unwrap_or_else(|e| match e {});
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("skipped {skipped} auth events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        };

        _ = future::join(init, listen).await;
        Ok(())
    }
}

#[cfg(test)]
mod spec {
    use std::{
        future::IntoFuture as _,
        sync::{atomic::Ordering, Arc},
    };

    use crate::{
        command::Login,
        domain::user::{self, Password},
        infra::{auth, Provider as _},
        query::session::Changes,
        testing::Harness,
        Command as _, Config, Query as _, Service,
    };

    #[tokio::test(start_paused = true)]
    async fn resolves_initial_session_and_follows_sign_ins() {
        let h = Harness::new();
        _ = h.register("a@x.com", "secret123");
        _ = h.register("b@x.com", "secret123");
        _ = h
            .service
            .execute(Login {
                email: user::Email::new("a@x.com").unwrap(),
                password: Box::new(Password::new("secret123").unwrap()).into(),
            })
            .await
            .unwrap();
        let (service, background) = Service::new(
            Config::default(),
            h.database.clone(),
            h.provider.clone(),
            h.storage.clone(),
            Arc::new(h.clock.clone()),
        );
        let mut changes = service.execute(Changes).await.unwrap();

        let follow = async {
            let initial = changes
                .wait_for(Option::is_some)
                .await
                .unwrap()
                .clone()
                .unwrap();
            assert_eq!(initial.identity.email.as_ref(), "a@x.com");
            while service.state.initializing.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }

            _ = h
                .provider
                .execute(auth::SignIn {
                    email: user::Email::new("b@x.com").unwrap(),
                    password: Box::new(Password::new("secret123").unwrap())
                        .into(),
                })
                .await
                .unwrap();
            let switched = changes
                .wait_for(|s| {
                    s.as_ref()
                        .is_some_and(|s| s.identity.email.as_ref() == "b@x.com")
                })
                .await
                .unwrap()
                .clone()
                .unwrap();
            assert_eq!(switched.user.username.as_ref(), "b");
        };

        tokio::select! {
            res = background.into_future() => {
                panic!("background finished unexpectedly: {res:?}");
            }
            () = follow => {}
        }
    }
}
