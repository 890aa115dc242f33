//! One-shot result cells shared between producers and any number of waiters.
//!
//! A [`CompletionFuture`] starts pending and is resolved exactly once, either
//! with a value ([`CompletionFuture::result`]) or with a
//! [`CompletionError`] ([`CompletionFuture::failure`]). Clones share the
//! same cell; every waiter, current or future, observes the same outcome.
//!
//! Async callers use [`CompletionFuture::wait`] (or `.await` the future
//! directly). Threads outside the runtime use
//! [`CompletionFuture::wait_blocking`].

use std::{
    error::Error,
    fmt,
    future::IntoFuture,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures::future::{BoxFuture, FutureExt};
use thiserror::Error;
use tokio::sync::Notify;

/// Outcome reported when a [`CompletionFuture`] does not yield a value.
#[derive(Clone, Debug, Error)]
pub enum CompletionError {
    /// The wait gave up before the cell was resolved. The cell itself is
    /// unaffected.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The owning connection or transport closed before a result was
    /// produced.
    #[error("closed before completion")]
    Closed,

    /// The producer reported a failure.
    #[error("{0}")]
    Failed(Arc<dyn Error + Send + Sync>),
}

impl CompletionError {
    /// Wrap an arbitrary error as [`CompletionError::Failed`].
    pub fn failed(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::Failed(Arc::from(err.into()))
    }

    /// Attempt to view a [`CompletionError::Failed`] cause, or any error in
    /// its source chain, as `E`.
    #[must_use]
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Failed(cause) => {
                std::iter::successors(Some(&**cause as &(dyn Error + 'static)), |&err| err.source())
                    .find_map(|err| err.downcast_ref::<E>())
            }
            _ => None,
        }
    }
}

enum State<T> {
    Pending,
    Resolved(T),
    Failed(CompletionError),
}

impl<T: Clone> State<T> {
    fn outcome(&self) -> Option<Result<T, CompletionError>> {
        match self {
            Self::Pending => None,
            Self::Resolved(value) => Some(Ok(value.clone())),
            Self::Failed(err) => Some(Err(err.clone())),
        }
    }
}

struct Shared<T> {
    state: Mutex<State<T>>,
    notify: Notify,
    condvar: Condvar,
}

/// A result cell resolved exactly once.
///
/// # Examples
///
/// ```
/// use framechain::completion::CompletionFuture;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let done = CompletionFuture::new();
/// let producer = done.clone();
/// tokio::spawn(async move {
///     producer.result(42);
/// });
/// assert_eq!(done.wait().await.unwrap(), 42);
/// assert!(!done.result(7));
/// # }
/// ```
pub struct CompletionFuture<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for CompletionFuture<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone> Default for CompletionFuture<T> {
    fn default() -> Self { Self::new() }
}

impl<T> fmt::Debug for CompletionFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.lock() {
            State::Pending => "pending",
            State::Resolved(_) => "resolved",
            State::Failed(_) => "failed",
        };
        f.debug_struct("CompletionFuture").field("state", &state).finish()
    }
}

impl<T> CompletionFuture<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, next: State<T>) -> bool {
        {
            let mut state = self.lock();
            if !matches!(*state, State::Pending) {
                return false;
            }
            *state = next;
        }
        self.shared.notify.notify_waiters();
        self.shared.condvar.notify_all();
        true
    }

    /// Resolve with `value`. Returns `false` if already resolved.
    pub fn result(&self, value: T) -> bool { self.resolve(State::Resolved(value)) }

    /// Resolve with `err`. Returns `false` if already resolved.
    pub fn failure(&self, err: CompletionError) -> bool { self.resolve(State::Failed(err)) }

    /// Resolve with [`CompletionError::Closed`] unless already resolved.
    pub fn fail_closed(&self) -> bool { self.failure(CompletionError::Closed) }

    /// Returns `true` once resolved, successfully or not.
    #[must_use]
    pub fn is_done(&self) -> bool { !matches!(*self.lock(), State::Pending) }
}

impl<T: Clone> CompletionFuture<T> {
    /// Create a pending cell.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Pending),
                notify: Notify::new(),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Create a cell already resolved with `value`.
    #[must_use]
    pub fn ready(value: T) -> Self {
        let cell = Self::new();
        cell.result(value);
        cell
    }

    /// The outcome, if resolved, without waiting.
    #[must_use]
    pub fn try_get(&self) -> Option<Result<T, CompletionError>> { self.lock().outcome() }

    /// Wait asynchronously for the outcome.
    ///
    /// # Errors
    ///
    /// Returns the [`CompletionError`] the cell was failed with.
    pub async fn wait(&self) -> Result<T, CompletionError> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a resolution in between is not
            // missed.
            notified.as_mut().enable();
            if let Some(outcome) = self.try_get() {
                return outcome;
            }
            notified.await;
        }
    }

    /// Wait asynchronously for at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError::TimedOut`] if the cell is still pending
    /// after `timeout`, or the error the cell was failed with.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<T, CompletionError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .unwrap_or(Err(CompletionError::TimedOut(timeout)))
    }

    /// Block the current thread for at most `timeout`.
    ///
    /// Must not be called from a runtime worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError::TimedOut`] if the cell is still pending
    /// after `timeout`, or the error the cell was failed with.
    pub fn wait_blocking(&self, timeout: Duration) -> Result<T, CompletionError> {
        let guard = self.lock();
        let (guard, _) = self
            .shared
            .condvar
            .wait_timeout_while(guard, timeout, |state| matches!(state, State::Pending))
            .unwrap_or_else(PoisonError::into_inner);
        guard
            .outcome()
            .unwrap_or(Err(CompletionError::TimedOut(timeout)))
    }
}

impl<T: Clone + Send + 'static> IntoFuture for CompletionFuture<T> {
    type Output = Result<T, CompletionError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture { async move { self.wait().await }.boxed() }
}

#[cfg(test)]
mod tests {
    use std::{io, thread};

    use rstest::rstest;

    use super::*;

    #[test]
    fn resolution_happens_once() {
        let cell = CompletionFuture::new();
        assert!(!cell.is_done());
        assert!(cell.result(1));
        assert!(!cell.result(2));
        assert!(!cell.fail_closed());
        assert_eq!(cell.try_get().expect("resolved").expect("value"), 1);
    }

    #[test]
    fn failure_wins_over_later_value() {
        let cell = CompletionFuture::<u8>::new();
        assert!(cell.failure(CompletionError::failed(io::Error::other("boom"))));
        assert!(!cell.result(3));
        let err = cell.try_get().expect("resolved").expect_err("failed");
        assert_eq!(err.to_string(), "boom");
        assert!(err.downcast_ref::<io::Error>().is_some());
    }

    #[tokio::test]
    async fn all_waiters_observe_same_outcome() {
        let cell = CompletionFuture::<String>::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let cell = cell.clone();
                tokio::spawn(async move { cell.wait().await })
            })
            .collect();
        tokio::task::yield_now().await;
        cell.result("done".to_owned());
        for waiter in waiters {
            assert_eq!(waiter.await.expect("join").expect("value"), "done");
        }
        assert_eq!(cell.clone().await.expect("value"), "done");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_leaves_cell_pending() {
        let cell = CompletionFuture::<()>::new();
        let err = cell
            .wait_timeout(Duration::from_millis(20))
            .await
            .expect_err("still pending");
        assert!(matches!(err, CompletionError::TimedOut(d) if d == Duration::from_millis(20)));
        assert!(!cell.is_done());
        assert!(cell.result(()));
    }

    #[rstest]
    #[case(true)]
    #[case(false)]
    fn blocking_wait_from_plain_thread(#[case] resolve: bool) {
        let cell = CompletionFuture::<u32>::new();
        let producer = cell.clone();
        let handle = thread::spawn(move || {
            if resolve {
                producer.result(9);
            }
        });
        let outcome = cell.wait_blocking(Duration::from_millis(if resolve { 5_000 } else { 20 }));
        handle.join().expect("producer panicked");
        if resolve {
            assert_eq!(outcome.expect("value"), 9);
        } else {
            assert!(matches!(outcome, Err(CompletionError::TimedOut(_))));
        }
    }

    #[test]
    fn ready_cell_is_done() {
        let cell = CompletionFuture::ready("x");
        assert!(cell.is_done());
        assert_eq!(format!("{cell:?}"), "CompletionFuture { state: \"resolved\" }");
    }
}
