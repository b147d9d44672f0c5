//! Outbound writer task.
//!
//! A single task drains the submission queue in FIFO order, so requests reach
//! the wire in the order they were submitted. A write that fails because the
//! socket went stale triggers exactly one reconnect and one retry of the same
//! payload.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::error::Error;
use crate::protocol::{Request, WireCodec};

use super::connection::ConnectionManager;
use super::connector::is_stale_connection;

// ============================================================================
// OutboundWriter
// ============================================================================

/// Handle to the running writer task.
pub struct OutboundWriter {
    stop: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl OutboundWriter {
    /// Spawns the writer task draining `queue` into `connection`.
    #[must_use]
    pub fn spawn(
        queue: mpsc::UnboundedReceiver<Request>,
        connection: Arc<ConnectionManager>,
        codec: WireCodec,
    ) -> Self {
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_writer(queue, stop_rx, connection, codec));
        Self {
            stop,
            task: Mutex::new(Some(task)),
        }
    }

    /// Signals the task to stop without waiting for it.
    ///
    /// Requests still queued are failed with [`Error::ConnectionClosed`].
    pub fn signal_stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Stops the task and waits for it to finish.
    pub async fn shutdown(&self) {
        self.signal_stop();

        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Outbound writer task failed");
        }
    }
}

impl std::fmt::Debug for OutboundWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundWriter")
            .field("running", &self.task.lock().is_some())
            .finish()
    }
}

// ============================================================================
// Writer Loop
// ============================================================================

async fn run_writer(
    mut queue: mpsc::UnboundedReceiver<Request>,
    mut stop: watch::Receiver<bool>,
    connection: Arc<ConnectionManager>,
    codec: WireCodec,
) {
    debug!("Outbound writer started");

    loop {
        tokio::select! {
            biased;

            _ = stop.changed() => break,

            request = queue.recv() => match request {
                Some(request) => send_request(&connection, &codec, request).await,
                None => break,
            },
        }
    }

    queue.close();
    let mut abandoned = 0usize;
    while let Ok(request) = queue.try_recv() {
        if let Some(message_id) = request.message_id {
            connection
                .correlation()
                .fail(&message_id, Error::ConnectionClosed);
            abandoned += 1;
        }
    }

    debug!(abandoned, "Outbound writer stopped");
}

/// Writes one request, reconnecting once if the socket is stale.
async fn send_request(connection: &ConnectionManager, codec: &WireCodec, request: Request) {
    let Some(message_id) = request.message_id.clone() else {
        warn!(command = %request.command, "Dropping request without message ID");
        return;
    };
    let correlation = connection.correlation();

    let payload = match codec.encode(&request) {
        Ok(payload) => payload,
        Err(e) => {
            error!(%message_id, error = %e, "Cannot encode request");
            correlation.fail(&message_id, Error::send_failed(message_id.clone(), e.to_string()));
            return;
        }
    };

    let failure = match connection.write(&message_id, &payload).await {
        Ok(generation) => {
            trace!(%message_id, command = %request.command, generation, "Request written");
            return;
        }
        Err(failure) => failure,
    };

    if !is_stale_connection(&failure.source) {
        error!(%message_id, error = %failure.source, "Write failed");
        correlation.fail(
            &message_id,
            Error::send_failed(message_id.clone(), failure.source.to_string()),
        );
        return;
    }

    warn!(
        %message_id,
        generation = failure.generation,
        error = %failure.source,
        "Stale connection detected, reconnecting"
    );

    if let Err(e) = connection.reconnect_if_current(failure.generation).await {
        let err = match e {
            Error::ConnectionClosed => Error::ConnectionClosed,
            other => Error::send_failed(message_id.clone(), other.to_string()),
        };
        correlation.fail(&message_id, err);
        return;
    }

    match connection.write(&message_id, &payload).await {
        Ok(generation) => {
            debug!(%message_id, generation, "Request written after reconnect");
        }
        Err(retry) => {
            error!(%message_id, error = %retry.source, "Retry after reconnect failed");
            correlation.fail(
                &message_id,
                Error::send_failed(message_id.clone(), retry.source.to_string()),
            );
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
