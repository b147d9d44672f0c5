//! Request/response correlation and the submission API.
//!
//! Every submitted request gets a fresh [`MessageId`] and a pending entry in
//! the [`CorrelationTable`] before it is queued for the writer, so even a
//! reply that overtakes the write bookkeeping finds its caller.
//!
//! # Pending call lifecycle
//!
//! ```text
//! submit ─► registered ─► sent on generation N ─► completed (reply routed)
//!                │                 │
//!                │                 └─► failed: ConnectionClosed (reconnect/close)
//!                └─► failed: SendFailed (write + retry failed) / ConnectionClosed (close)
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result, saturating_millis};
use crate::identifiers::MessageId;
use crate::protocol::{Request, Response};

// ============================================================================
// Constants
// ============================================================================

/// Maximum outstanding calls before new submissions are rejected.
pub const MAX_PENDING_CALLS: usize = 1024;

// ============================================================================
// Types
// ============================================================================

/// Sender half of a pending call.
type ResponseSender = oneshot::Sender<Result<Response>>;

/// Bookkeeping for one outstanding call.
struct PendingCall {
    tx: ResponseSender,
    /// Connection generation the request was written on, `None` until sent.
    sent_on: Option<u64>,
}

// ============================================================================
// CorrelationTable
// ============================================================================

/// Concurrent map from message ID to the caller waiting for its reply.
///
/// Each entry is completed or failed at most once: every terminal operation
/// removes the entry under the lock before touching its sender.
#[derive(Default)]
pub struct CorrelationTable {
    pending: Mutex<FxHashMap<MessageId, PendingCall>>,
}

impl CorrelationTable {
    /// Creates an empty table.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending call and returns its receiver.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the ID is already registered
    /// - [`Error::Protocol`] if [`MAX_PENDING_CALLS`] is reached
    pub fn register(&self, message_id: MessageId) -> Result<oneshot::Receiver<Result<Response>>> {
        let mut pending = self.pending.lock();

        if pending.len() >= MAX_PENDING_CALLS {
            warn!(
                pending = pending.len(),
                max = MAX_PENDING_CALLS,
                "Too many pending calls"
            );
            return Err(Error::protocol(format!(
                "Too many pending calls: {}/{}",
                pending.len(),
                MAX_PENDING_CALLS
            )));
        }

        if pending.contains_key(&message_id) {
            return Err(Error::protocol(format!(
                "Duplicate message ID: {message_id}"
            )));
        }

        let (tx, rx) = oneshot::channel();
        pending.insert(message_id, PendingCall { tx, sent_on: None });
        Ok(rx)
    }

    /// Records that a request was written on the given connection generation.
    pub fn mark_sent(&self, message_id: &MessageId, generation: u64) {
        if let Some(call) = self.pending.lock().get_mut(message_id) {
            call.sent_on = Some(generation);
        }
    }

    /// Completes the call waiting on `message_id`.
    ///
    /// Returns the response back if no call is waiting for it.
    pub fn complete(&self, message_id: &MessageId, response: Response) -> Option<Response> {
        let call = self.pending.lock().remove(message_id);

        match call {
            Some(call) => {
                if call.tx.send(Ok(response)).is_err() {
                    trace!(%message_id, "Caller dropped handle before reply");
                }
                None
            }
            None => Some(response),
        }
    }

    /// Fails a single call.
    pub fn fail(&self, message_id: &MessageId, error: Error) {
        if let Some(call) = self.pending.lock().remove(message_id) {
            let _ = call.tx.send(Err(error));
        }
    }

    /// Removes a call without completing it.
    ///
    /// Returns `true` if an entry was removed.
    pub fn remove(&self, message_id: &MessageId) -> bool {
        self.pending.lock().remove(message_id).is_some()
    }

    /// Fails every call written on generation `generation` or earlier.
    ///
    /// Calls not yet written stay pending. Returns the number failed.
    pub fn fail_sent(&self, generation: u64) -> usize {
        let failed: Vec<_> = {
            let mut pending = self.pending.lock();
            let ids: Vec<_> = pending
                .iter()
                .filter(|(_, call)| call.sent_on.is_some_and(|g| g <= generation))
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id))
                .collect()
        };

        let count = failed.len();
        for call in failed {
            let _ = call.tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, generation, "Failed calls sent on dropped connection");
        }
        count
    }

    /// Fails every pending call with [`Error::ConnectionClosed`].
    ///
    /// Returns the number failed.
    pub fn fail_all(&self) -> usize {
        let pending: Vec<_> = self.pending.lock().drain().collect();
        let count = pending.len();

        for (_, call) in pending {
            let _ = call.tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending calls on close");
        }
        count
    }

    /// Returns the number of pending calls.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns `true` if no call is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

// ============================================================================
// ResponseHandle
// ============================================================================

/// Asynchronous result of a submitted request.
///
/// The engine never imposes a timeout of its own; callers pick one with
/// [`ResponseHandle::wait`]. Dropping the handle abandons the call and frees
/// its pending entry; a later reply is discarded.
#[must_use = "a response handle does nothing unless awaited"]
pub struct ResponseHandle {
    message_id: MessageId,
    rx: oneshot::Receiver<Result<Response>>,
    table: Weak<CorrelationTable>,
}

impl std::fmt::Debug for ResponseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseHandle")
            .field("message_id", &self.message_id)
            .finish_non_exhaustive()
    }
}

impl Drop for ResponseHandle {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade()
            && table.remove(&self.message_id)
        {
            trace!(message_id = %self.message_id, "Pending call abandoned");
        }
    }
}

impl ResponseHandle {
    /// Returns the message ID stamped on the request.
    #[inline]
    #[must_use]
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// Waits for the response, up to `wait_timeout`.
    ///
    /// A non-"200" response is still `Ok`; inspect
    /// [`Response::response_code`] or use [`Response::into_success`].
    ///
    /// # Errors
    ///
    /// - [`Error::RequestTimeout`] if no response arrived in time (the
    ///   pending entry is dropped, so a late reply is discarded)
    /// - [`Error::ConnectionClosed`] if the connection was closed or lost
    /// - [`Error::SendFailed`] if the request could not be written
    pub async fn wait(mut self, wait_timeout: Duration) -> Result<Response> {
        match timeout(wait_timeout, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                // Entry is released when `self` drops.
                debug!(message_id = %self.message_id, "Request timed out");
                Err(Error::request_timeout(
                    self.message_id.clone(),
                    saturating_millis(wait_timeout),
                ))
            }
        }
    }
}

// ============================================================================
// Submitter
// ============================================================================

/// Stamps, registers and queues requests for the outbound writer.
///
/// Cheap to clone; all clones feed the same FIFO queue.
#[derive(Clone)]
pub struct Submitter {
    correlation: Arc<CorrelationTable>,
    queue: mpsc::UnboundedSender<Request>,
}

impl Submitter {
    /// Creates a submitter feeding `queue`.
    #[inline]
    #[must_use]
    pub fn new(correlation: Arc<CorrelationTable>, queue: mpsc::UnboundedSender<Request>) -> Self {
        Self { correlation, queue }
    }

    /// Submits a request without blocking.
    ///
    /// Generates a fresh message ID, registers the pending call, then queues
    /// the request. Requests reach the wire in submission order.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the writer has shut down
    /// - [`Error::Protocol`] if too many calls are pending
    pub fn submit(&self, mut request: Request) -> Result<ResponseHandle> {
        let message_id = MessageId::generate();
        request.message_id = Some(message_id.clone());

        let rx = self.correlation.register(message_id.clone())?;

        if self.queue.send(request).is_err() {
            self.correlation.remove(&message_id);
            return Err(Error::ConnectionClosed);
        }

        trace!(%message_id, "Request queued");

        Ok(ResponseHandle {
            message_id,
            rx,
            table: Arc::downgrade(&self.correlation),
        })
    }

    /// Returns the shared correlation table.
    #[inline]
    #[must_use]
    pub fn correlation(&self) -> &Arc<CorrelationTable> {
        &self.correlation
    }
}

// ============================================================================
// Tests
// ============================================================================
