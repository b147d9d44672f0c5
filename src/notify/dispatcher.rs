//! Notification dispatcher task.
//!
//! The inbound reader hands `NotifyList` pushes to this task instead of
//! calling listeners itself, so a slow listener never stalls reply routing.

// ============================================================================
// Imports
// ============================================================================

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use crate::protocol::Response;

use super::registry::SubscriptionRegistry;

// ============================================================================
// DispatchCommand
// ============================================================================

/// Message to the dispatcher task.
#[derive(Debug)]
pub(crate) enum DispatchCommand {
    Deliver(Response),
    Shutdown,
}

// ============================================================================
// NotificationSender
// ============================================================================

/// Sending side of the dispatcher queue.
#[derive(Debug, Clone)]
pub struct NotificationSender {
    tx: mpsc::UnboundedSender<DispatchCommand>,
}

impl NotificationSender {
    /// Creates a sender and the queue it feeds.
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<DispatchCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues a notification. Returns `false` once the dispatcher has
    /// stopped.
    pub fn forward(&self, response: Response) -> bool {
        self.tx.send(DispatchCommand::Deliver(response)).is_ok()
    }
}

// ============================================================================
// NotificationDispatcher
// ============================================================================

/// Delivers notifications to registered listeners on its own task.
pub struct NotificationDispatcher {
    sender: NotificationSender,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationDispatcher {
    /// Spawns the dispatcher task.
    #[must_use]
    pub fn spawn(registry: Arc<SubscriptionRegistry>) -> Self {
        let (sender, rx) = NotificationSender::channel();
        let task = tokio::spawn(run_dispatcher(rx, registry));
        Self {
            sender,
            task: Mutex::new(Some(task)),
        }
    }

    /// Returns a sender feeding this dispatcher.
    #[inline]
    #[must_use]
    pub fn sender(&self) -> NotificationSender {
        self.sender.clone()
    }

    /// Asks the task to stop after the notifications already queued.
    pub fn signal_stop(&self) {
        let _ = self.sender.tx.send(DispatchCommand::Shutdown);
    }

    /// Stops the task and waits for it.
    pub async fn shutdown(&self) {
        self.signal_stop();

        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            error!(error = %e, "Notification dispatcher task failed");
        }
    }

    /// Collects notifications queued on `rx` without a running task.
    #[cfg(test)]
    pub(crate) fn drain_pending(
        mut rx: mpsc::UnboundedReceiver<DispatchCommand>,
    ) -> Vec<Response> {
        let mut delivered = Vec::new();
        while let Ok(command) = rx.try_recv() {
            if let DispatchCommand::Deliver(response) = command {
                delivered.push(response);
            }
        }
        delivered
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("running", &self.task.lock().is_some())
            .finish()
    }
}

// ============================================================================
// Dispatch Loop
// ============================================================================

async fn run_dispatcher(
    mut rx: mpsc::UnboundedReceiver<DispatchCommand>,
    registry: Arc<SubscriptionRegistry>,
) {
    debug!("Notification dispatcher started");

    while let Some(command) = rx.recv().await {
        match command {
            DispatchCommand::Deliver(response) => {
                let calls = deliver(&registry, &response);
                trace!(objects = response.object_list.len(), calls, "Notification delivered");
            }
            DispatchCommand::Shutdown => break,
        }
    }

    debug!("Notification dispatcher stopped");
}

/// Calls every listener registered for each object in `response`.
///
/// Listeners are snapshotted per object, so callbacks may subscribe or
/// unsubscribe freely. Returns the number of callbacks made.
pub(crate) fn deliver(registry: &SubscriptionRegistry, response: &Response) -> usize {
    let mut calls = 0;

    for object in &response.object_list {
        for listener in registry.listeners_for(&object.object_name) {
            calls += 1;
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_notify_list(object)));
            if outcome.is_err() {
                error!(object = %object.object_name, "Notification listener panicked");
            }
        }
    }

    calls
}

// ============================================================================
// Tests
// ============================================================================
