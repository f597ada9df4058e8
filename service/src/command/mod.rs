//! [`Command`] definition.

pub mod delete_user;
pub mod fetch_profile;
pub mod forget_session;
pub mod handle_auth_event;
pub mod login;
pub mod login_with_username;
pub mod logout;
pub mod remember_session;
pub mod resolve_current_user;
pub mod send_password_reset;
pub mod update_password;
pub mod update_user;

/// [`Command`] of the [`Service`].
///
/// [`Service`]: crate::Service
pub use common::Handler as Command;

pub use self::{
    delete_user::DeleteUser, fetch_profile::FetchProfile,
    forget_session::ForgetSession, handle_auth_event::HandleAuthEvent,
    login::Login, login_with_username::LoginWithUsername, logout::Logout,
    remember_session::RememberSession,
    resolve_current_user::ResolveCurrentUser,
    send_password_reset::SendPasswordReset, update_password::UpdatePassword,
    update_user::UpdateUser,
};
