//! Cancellable one-shot timers that feed the controller loop.
//!
//! A timer never touches state itself. When it fires it posts a single
//! [`Input`] back to the controller, which decides what firing means at that
//! moment. Cancelling aborts the sleeping task so nothing is posted.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::controller::Input;

/// A pending delayed input. Dropping the timer does not cancel it; call
/// [`Timer::cancel`].
#[derive(Debug)]
pub struct Timer {
    id: u64,
    task: JoinHandle<()>,
}

impl Timer {
    /// Post `input` to `sink` after `delay`.
    pub fn start(id: u64, delay: Duration, sink: mpsc::UnboundedSender<Input>, input: Input) -> Self {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sink.send(input);
        });
        Self { id, task }
    }

    /// Identifier carried by the input this timer posts.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Abort the timer. Has no effect if it already fired.
    pub fn cancel(self) {
        self.task.abort();
    }
}
