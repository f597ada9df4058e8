//! [`SingleFlight`] coordination of concurrent computations.

use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::OnceCell;

/// Coordinator sharing one in-flight computation between all its concurrent
/// callers.
///
/// The first caller starts a flight, every caller arriving while it's still
/// running awaits the very same result. Once the flight lands, the next
/// caller starts a new one, so results are never cached beyond the flight.
///
/// If the caller driving the computation is dropped, one of the remaining
/// waiters takes over and restarts the computation.
#[derive(Debug)]
pub struct SingleFlight<T> {
    /// Currently running flight, if any.
    current: Mutex<Option<Arc<OnceCell<T>>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }
}

impl<T: Clone> SingleFlight<T> {
    /// Creates a new idle [`SingleFlight`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the running flight, or starts a new one with the provided
    /// computation.
    pub async fn run<F, Fut>(&self, computation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let flight = {
            let mut current =
                self.current.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                current.get_or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        let out = flight.get_or_init(computation).await.clone();

        let mut current =
            self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, &flight)) {
            *current = None;
        }

        out
    }

    /// Indicates whether a flight is currently running.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[cfg(test)]
mod spec {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use futures::future;

    use super::SingleFlight;

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_computation() {
        let flight = SingleFlight::new();
        let calls = &AtomicUsize::new(0);

        let compute = move || async move {
            _ = calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
            42
        };

        let (a, b, c) = future::join3(
            flight.run(compute),
            flight.run(compute),
            flight.run(compute),
        )
        .await;

        assert_eq!((a, b, c), (42, 42, 42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!flight.is_in_flight());
    }

    #[tokio::test]
    async fn sequential_callers_start_new_flights() {
        let flight = SingleFlight::new();
        let calls = &AtomicUsize::new(0);

        for expected in 1..=3 {
            let n = flight
                .run(move || async move {
                    calls.fetch_add(1, Ordering::SeqCst) + 1
                })
                .await;
            assert_eq!(n, expected);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
