//! The caller's view of a submitted request.
//!
//! A [`CompletionHandle`] moves from `Pending` to exactly one terminal state
//! and never leaves it again. The request task owns the matching
//! [`Completer`]; the first of the completer and [`CompletionHandle::cancel`]
//! to act decides the outcome.

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use strum::Display;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{ErrorKind, Response, Result};

/// Observable state of a [`CompletionHandle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HandleState {
    /// The request has not finished yet
    Pending,
    /// A response was received
    Fulfilled,
    /// The request failed, including admission rejections
    Failed,
    /// The handle was cancelled before the request finished
    Cancelled,
}

impl HandleState {
    /// Returns `true` for every state except [`HandleState::Pending`]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug)]
enum Outcome {
    Fulfilled(Response),
    Failed(ErrorKind),
    Cancelled,
}

impl Outcome {
    const fn state(&self) -> HandleState {
        match self {
            Self::Fulfilled(_) => HandleState::Fulfilled,
            Self::Failed(_) => HandleState::Failed,
            Self::Cancelled => HandleState::Cancelled,
        }
    }

    fn to_result(&self) -> Result<Response> {
        match self {
            Self::Fulfilled(response) => Ok(response.clone()),
            Self::Failed(error) => Err(error.clone()),
            Self::Cancelled => Err(ErrorKind::Cancelled),
        }
    }
}

type Continuation = Box<dyn FnOnce(Result<Response>) + Send + 'static>;

#[derive(Default)]
struct Inner {
    outcome: Option<Outcome>,
    continuations: Vec<Continuation>,
}

struct Shared {
    inner: Mutex<Inner>,
    /// Wakes threads blocked in [`CompletionHandle::blocking_get`]
    ready: Condvar,
    /// Wakes tasks awaiting [`CompletionHandle::wait`]
    done: watch::Sender<bool>,
    /// Aborts the request task
    abort: CancellationToken,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> HandleState {
        self.lock()
            .outcome
            .as_ref()
            .map_or(HandleState::Pending, Outcome::state)
    }

    /// Move to a terminal state. Returns `false` if one was already reached.
    fn finish(&self, outcome: Outcome) -> bool {
        let (result, continuations) = {
            let mut inner = self.lock();
            if inner.outcome.is_some() {
                return false;
            }
            let result = outcome.to_result();
            inner.outcome = Some(outcome);
            (result, std::mem::take(&mut inner.continuations))
        };

        self.ready.notify_all();
        self.done.send_replace(true);

        // Continuations run outside the lock so they may use the handle
        for continuation in continuations {
            continuation(result.clone());
        }
        true
    }
}

/// A cloneable, cancellable handle to the outcome of a submitted request.
///
/// All clones observe the same outcome. Waiting never blocks other requests,
/// and dropping every handle does not cancel the request.
#[derive(Clone)]
pub struct CompletionHandle {
    shared: Arc<Shared>,
}

impl CompletionHandle {
    /// Create a pending handle and the completer that resolves it
    pub(crate) fn new() -> (Self, Completer) {
        let (done, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner::default()),
            ready: Condvar::new(),
            done,
            abort: CancellationToken::new(),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            Completer { shared },
        )
    }

    /// Create a handle that has already failed
    pub(crate) fn failed(error: ErrorKind) -> Self {
        let (handle, completer) = Self::new();
        completer.finish(Err(error));
        handle
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> HandleState {
        self.shared.state()
    }

    /// Returns `true` once the handle reached a terminal state
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// The outcome, if the handle is terminal. Never blocks.
    #[must_use]
    pub fn try_result(&self) -> Option<Result<Response>> {
        self.shared.lock().outcome.as_ref().map(Outcome::to_result)
    }

    /// Wait for the outcome
    ///
    /// # Errors
    ///
    /// Returns the request's error, or [`ErrorKind::Cancelled`] if the handle
    /// was cancelled.
    pub async fn wait(&self) -> Result<Response> {
        let mut done = self.shared.done.subscribe();
        // The sender lives in `shared`, which `self` keeps alive
        let _ = done.wait_for(|done| *done).await;
        self.try_result().unwrap_or(Err(ErrorKind::Abandoned))
    }

    /// Wait for the outcome, giving up after `timeout`.
    ///
    /// Giving up does not cancel the request; the handle can be waited on
    /// again later.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Timeout`] if no outcome arrived in time, otherwise
    /// the same errors as [`CompletionHandle::wait`].
    pub async fn get(&self, timeout: Duration) -> Result<Response> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .unwrap_or(Err(ErrorKind::Timeout(timeout)))
    }

    /// Block the current thread until the outcome arrives or `timeout` elapses.
    ///
    /// Meant for threads outside the Tokio runtime; calling it from an async
    /// task blocks that task's worker thread.
    ///
    /// # Errors
    ///
    /// Same as [`CompletionHandle::get`].
    pub fn blocking_get(&self, timeout: Duration) -> Result<Response> {
        let inner = self.shared.lock();
        let (inner, _) = self
            .shared
            .ready
            .wait_timeout_while(inner, timeout, |inner| inner.outcome.is_none())
            .unwrap_or_else(PoisonError::into_inner);

        inner
            .outcome
            .as_ref()
            .map_or(Err(ErrorKind::Timeout(timeout)), Outcome::to_result)
    }

    /// Cancel the request.
    ///
    /// Returns `true` if this call moved the handle to
    /// [`HandleState::Cancelled`], and `false` if it was already terminal.
    /// A successful cancel aborts the request task, which closes its
    /// connection and returns the admission slot.
    pub fn cancel(&self) -> bool {
        let cancelled = self.shared.finish(Outcome::Cancelled);
        if cancelled {
            self.shared.abort.cancel();
        }
        cancelled
    }

    /// Register a callback for the outcome.
    ///
    /// Runs immediately on the calling thread if the handle is already
    /// terminal, otherwise exactly once on the thread that completes it.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(Result<Response>) + Send + 'static,
    {
        let mut inner = self.shared.lock();
        let finished = inner.outcome.as_ref().map(Outcome::to_result);
        match finished {
            Some(result) => {
                drop(inner);
                callback(result);
            }
            None => inner.continuations.push(Box::new(callback)),
        }
    }
}

impl fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("state", &self.state())
            .finish()
    }
}

/// The request task's side of a [`CompletionHandle`].
///
/// Dropping a completer without calling [`Completer::finish`] fails the
/// handle with [`ErrorKind::Abandoned`].
pub(crate) struct Completer {
    shared: Arc<Shared>,
}

impl Completer {
    /// Resolve the handle. Returns `false` if it was already terminal.
    pub(crate) fn finish(self, result: Result<Response>) -> bool {
        let outcome = match result {
            Ok(response) => Outcome::Fulfilled(response),
            Err(error) => Outcome::Failed(error),
        };
        self.shared.finish(outcome)
    }

    /// Cancelled when the handle is cancelled
    pub(crate) fn abort_token(&self) -> CancellationToken {
        self.shared.abort.clone()
    }
}

impl Drop for Completer {
    fn drop(&mut self) {
        self.shared.finish(Outcome::Failed(ErrorKind::Abandoned));
    }
}

impl fmt::Debug for Completer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer")
            .field("state", &self.shared.state())
            .finish()
    }
}
