//! Periodic background tasks
//!
//! A [`Ticker`] runs a closure on a dedicated thread at a fixed period. The
//! thread sleeps in `recv_timeout` on a stop channel, so dropping the sender
//! wakes it immediately and [`Ticker::stop`] returns only once the thread has
//! exited. No tick can fire after `stop` returns.

use std::io;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Handle to a periodic task thread
pub struct Ticker {
    name: String,
    tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Spawn a thread that calls `tick` every `period`
    ///
    /// The first call happens one period after spawning.
    pub fn spawn<F>(name: &str, period: Duration, mut tick: F) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new().name(name.to_string()).spawn(move || loop {
            match rx.recv_timeout(period) {
                Err(mpsc::RecvTimeoutError::Timeout) => tick(),
                // Sender dropped (or an explicit stop message)
                _ => break,
            }
        })?;

        tracing::trace!(task = name, period_ms = period.as_millis() as u64, "Ticker started");

        Ok(Self {
            name: name.to_string(),
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Stop the task and wait for its thread to exit
    ///
    /// Safe to call more than once. Called from the task's own thread it only
    /// signals, since a thread cannot join itself.
    pub fn stop(&mut self) {
        // Drop the sender first so recv_timeout returns Disconnected
        drop(self.tx.take());

        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::warn!(task = %self.name, "Ticker thread panicked");
            }
        }
    }

    /// Whether the task thread is still scheduled
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticker")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}
