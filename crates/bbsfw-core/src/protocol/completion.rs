//! Request/response correlation
//!
//! The link is half-duplex and the firmware answers requests in order, so a
//! single slot per request kind is enough. Registering a new waiter replaces
//! the old one; the replaced waiter is left to time out on its own deadline.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// How a request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestResult<T> {
    /// The response arrived before the deadline
    Completed(T),
    /// No response before the deadline
    TimedOut,
    /// The connection was closed while waiting
    Aborted,
}

impl<T> RequestResult<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, RequestResult::Completed(_))
    }

    /// The response value, if one arrived
    pub fn completed(self) -> Option<T> {
        match self {
            RequestResult::Completed(value) => Some(value),
            _ => None,
        }
    }
}

enum Resolution<T> {
    Completed(T),
    Aborted,
}

/// Single-slot, deadline-bounded correlator for one request kind
pub struct CompletionQueue<T> {
    slot: Mutex<Option<oneshot::Sender<Resolution<T>>>>,
}

impl<T> CompletionQueue<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Register a waiter whose deadline starts now
    ///
    /// Register before sending the request so a fast response can't slip
    /// in ahead of the waiter.
    pub fn register(&self, timeout: Duration) -> Waiter<T> {
        let (tx, rx) = oneshot::channel();
        *self.lock() = Some(tx);
        Waiter {
            rx,
            deadline: Instant::now() + timeout,
        }
    }

    /// Register a waiter and wait for it
    pub async fn wait(&self, timeout: Duration) -> RequestResult<T> {
        self.register(timeout).wait().await
    }

    /// Hand a response to the registered waiter
    ///
    /// Returns false if nobody was waiting; the value is dropped.
    pub fn complete(&self, value: T) -> bool {
        self.resolve(Resolution::Completed(value))
    }

    /// Resolve the registered waiter with [`RequestResult::Aborted`]
    pub fn abort(&self) -> bool {
        self.resolve(Resolution::Aborted)
    }

    /// Check whether a waiter is registered and still listening
    pub fn is_pending(&self) -> bool {
        self.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    fn resolve(&self, resolution: Resolution<T>) -> bool {
        match self.lock().take() {
            Some(tx) => tx.send(resolution).is_ok(),
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<oneshot::Sender<Resolution<T>>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for CompletionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered request waiting for its response
pub struct Waiter<T> {
    rx: oneshot::Receiver<Resolution<T>>,
    deadline: Instant,
}

impl<T> Waiter<T> {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub async fn wait(self) -> RequestResult<T> {
        match tokio::time::timeout_at(self.deadline, self.rx).await {
            Ok(Ok(Resolution::Completed(value))) => RequestResult::Completed(value),
            Ok(Ok(Resolution::Aborted)) => RequestResult::Aborted,
            Ok(Err(_)) => {
                // replaced by a newer waiter
                tokio::time::sleep_until(self.deadline).await;
                RequestResult::TimedOut
            }
            Err(_) => RequestResult::TimedOut,
        }
    }
}
