//! [`Handler`] abstractions.

use std::{future::Future, time::Duration};

use tokio::time::{self, error::Elapsed};

/// Executable handler.
pub trait Handler<Args = ()> {
    /// Type of successful [`Handler`] result.
    type Ok;

    /// Type of this [`Handler`] error.
    type Err;

    /// Executes this [`Handler`] with the provided arguments.
    fn execute(
        &self,
        args: Args,
    ) -> impl Future<Output = Result<Self::Ok, Self::Err>>;
}

/// Extension of a [`Handler`] bounding its execution in time.
pub trait HandlerExt<Args>: Handler<Args> {
    /// Executes this [`Handler`] for no longer than the provided `timeout`.
    ///
    /// On timeout the execution future is dropped, so the operation is
    /// cancelled and cannot make any progress after [`Elapsed`] is returned.
    ///
    /// # Errors
    ///
    /// Errors with [`Elapsed`] if the `timeout` expires first.
    fn execute_within(
        &self,
        args: Args,
        timeout: Duration,
    ) -> impl Future<Output = Result<Result<Self::Ok, Self::Err>, Elapsed>>
    {
        time::timeout(timeout, self.execute(args))
    }
}

impl<H, Args> HandlerExt<Args> for H where H: Handler<Args> + ?Sized {}
