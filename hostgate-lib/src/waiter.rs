//! Tracking of in-flight request tasks for graceful shutdown.
//!
//! Every spawned request task holds a [`WaitGuard`]. Shutting down drops the
//! dispatcher's own guard and waits on the [`WaitGroup`], which resolves once
//! the last task has finished and dropped its guard.
//!
//! Under the hood this is a [`tokio::sync::mpsc::channel`] nobody ever sends
//! on: guards hold senders, the group holds the receiver and observes the
//! channel closing.

use futures::never::Never;
use tokio::sync::mpsc::{Receiver, Sender, channel};

/// Waits for all [`WaitGuard`]s created from it to be dropped.
///
/// Single-use: [`WaitGroup::wait`] consumes the group.
#[derive(Debug)]
pub(crate) struct WaitGroup {
    recv: Receiver<Never>,
}

/// Marks one piece of outstanding work. Clone it for every spawned task.
#[derive(Clone, Debug)]
pub(crate) struct WaitGuard {
    _send: Sender<Never>,
}

impl WaitGroup {
    /// Creates a new [`WaitGroup`] and its first [`WaitGuard`].
    ///
    /// Further guards are created by cloning the returned one.
    #[must_use]
    pub(crate) fn new() -> (Self, WaitGuard) {
        let (send, recv) = channel(1);
        (Self { recv }, WaitGuard { _send: send })
    }

    /// Waits until all associated [`WaitGuard`]s are gone
    pub(crate) async fn wait(mut self) {
        let None = self.recv.recv().await;
    }
}
