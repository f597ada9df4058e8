//! Background [`Task`]s definitions.

mod background;
pub mod listen_auth_events;

pub use common::Handler as Task;

pub use self::{
    background::Background, listen_auth_events::ListenAuthEvents,
};
