//! Connection manager and inbound reader.
//!
//! The manager owns the single live connection: its output stream (written
//! only by the outbound writer) and the reader task bound to its input
//! stream. Each successful connect bumps a generation counter, which lets
//! concurrent reconnect requests from the reader and the writer collapse into
//! one.
//!
//! # States
//!
//! ```text
//! Disconnected ─► Connecting ─► Connected ─► Reconnecting ─► Connected
//!                      │                          │
//!                      └──────► Disconnected ◄────┘
//! any ─► Closed (terminal)
//! ```
//!
//! # Inbound Routing
//!
//! For every decoded line the reader:
//!
//! 1. Completes the pending call with the same `messageID`, if any
//! 2. Otherwise forwards `NotifyList` pushes to the notification dispatcher
//! 3. Otherwise logs and discards the line (late reply to an abandoned call)

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::MessageId;
use crate::notify::NotificationSender;
use crate::protocol::{Response, WireCodec};

use super::connector::{BoxedReader, BoxedWriter, Connector};
use super::correlation::CorrelationTable;

// ============================================================================
// Constants
// ============================================================================

/// How long teardown waits for the reader task to observe its stop flag.
const READER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Types
// ============================================================================

/// Callback run after every successful (re)connect.
pub type ConnectedHook = Box<dyn Fn() + Send + Sync>;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live socket.
    Disconnected,
    /// First connect in progress.
    Connecting,
    /// Socket open, reader running.
    Connected,
    /// Replacing a stale socket.
    Reconnecting,
    /// Closed for good.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// ConnectionSettings
// ============================================================================

/// Tunables for the connection manager.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Upper bound for writing and flushing one record.
    pub write_timeout: Duration,
    /// Reconnect when the reader hits EOF or a read error.
    pub reconnect_on_read_failure: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(10),
            reconnect_on_read_failure: true,
        }
    }
}

// ============================================================================
// InboundRouter
// ============================================================================

/// Routes decoded responses to waiting callers or the dispatcher.
#[derive(Clone)]
pub struct InboundRouter {
    correlation: Arc<CorrelationTable>,
    notifications: NotificationSender,
}

impl InboundRouter {
    /// Creates a router.
    #[inline]
    #[must_use]
    pub fn new(correlation: Arc<CorrelationTable>, notifications: NotificationSender) -> Self {
        Self {
            correlation,
            notifications,
        }
    }

    /// Routes one response.
    pub fn route(&self, response: Response) {
        let response = match response.message_id().cloned() {
            Some(message_id) => match self.correlation.complete(&message_id, response) {
                None => {
                    trace!(%message_id, "Response delivered");
                    return;
                }
                Some(unmatched) => unmatched,
            },
            None => response,
        };

        if response.is_notification() {
            let objects = response.object_list.len();
            if self.notifications.forward(response) {
                trace!(objects, "Notification forwarded");
            } else {
                debug!(objects, "Dispatcher stopped, notification dropped");
            }
        } else {
            warn!(
                command = %response.command,
                message_id = ?response.message_id,
                "Discarding response with no pending call"
            );
        }
    }

    /// Returns the correlation table.
    #[inline]
    #[must_use]
    pub fn correlation(&self) -> &Arc<CorrelationTable> {
        &self.correlation
    }
}

// ============================================================================
// WriteFailure
// ============================================================================

/// A failed write and the connection generation it was attempted on.
#[derive(Debug)]
pub(crate) struct WriteFailure {
    pub(crate) generation: u64,
    pub(crate) source: io::Error,
}

// ============================================================================
// Slot
// ============================================================================

/// Handle to a running reader task.
struct ReaderTask {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// The live connection, if any.
#[derive(Default)]
struct Slot {
    generation: u64,
    writer: Option<BoxedWriter>,
    reader: Option<ReaderTask>,
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Owns the socket and the inbound reader.
///
/// Only one live connection exists at a time; `connect` and `reconnect`
/// replace the previous one under a single lock.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    codec: WireCodec,
    router: InboundRouter,
    settings: ConnectionSettings,
    state: Mutex<ConnectionState>,
    generation: AtomicU64,
    slot: AsyncMutex<Slot>,
    connected_hook: Mutex<Option<Arc<ConnectedHook>>>,
    me: Weak<Self>,
}

impl ConnectionManager {
    /// Creates a manager in the `Disconnected` state.
    #[must_use]
    pub fn new(
        connector: Arc<dyn Connector>,
        codec: WireCodec,
        router: InboundRouter,
        settings: ConnectionSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            connector,
            codec,
            router,
            settings,
            state: Mutex::new(ConnectionState::Disconnected),
            generation: AtomicU64::new(0),
            slot: AsyncMutex::new(Slot::default()),
            connected_hook: Mutex::new(None),
            me: me.clone(),
        })
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Returns the generation of the live (or last) connection.
    ///
    /// Zero before the first successful connect.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Returns the correlation table.
    #[inline]
    #[must_use]
    pub fn correlation(&self) -> &Arc<CorrelationTable> {
        self.router.correlation()
    }

    /// Sets the callback run after every successful (re)connect.
    pub fn set_connected_hook(&self, hook: ConnectedHook) {
        *self.connected_hook.lock() = Some(Arc::new(hook));
    }

    /// Opens a connection, replacing any previous one.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the manager was closed
    /// - Any connect error from the [`Connector`]
    pub async fn connect(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        self.ensure_open()?;
        self.transition(ConnectionState::Connecting);

        let result = self.replace(&mut slot).await;
        drop(slot);

        if result.is_ok() {
            self.run_connected_hook();
        }
        result
    }

    /// Drops the current connection and opens a new one.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the manager was closed
    /// - Any connect error from the [`Connector`]
    pub async fn reconnect(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        self.ensure_open()?;
        self.transition(ConnectionState::Reconnecting);
        info!(peer = %self.connector.peer(), generation = slot.generation, "Reconnecting");

        let result = self.replace(&mut slot).await;
        drop(slot);

        if result.is_ok() {
            self.run_connected_hook();
        }
        result
    }

    /// Reconnects unless the connection was already replaced since
    /// `generation`.
    pub(crate) async fn reconnect_if_current(&self, generation: u64) -> Result<()> {
        let mut slot = self.slot.lock().await;
        self.ensure_open()?;

        if slot.generation != generation {
            debug!(
                stale = generation,
                current = slot.generation,
                "Connection already replaced"
            );
            return if slot.writer.is_some() {
                Ok(())
            } else {
                Err(Error::connection("No live connection"))
            };
        }

        self.transition(ConnectionState::Reconnecting);
        info!(peer = %self.connector.peer(), generation, "Reconnecting stale connection");

        let result = self.replace(&mut slot).await;
        drop(slot);

        if result.is_ok() {
            self.run_connected_hook();
        }
        result
    }

    /// Closes the connection for good.
    ///
    /// Stops the reader, closes the output stream, lets the input stream
    /// drop with the reader, then fails every pending call. Individual close
    /// errors are logged and swallowed. Calling `close` again is a no-op.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock();
            if *state == ConnectionState::Closed {
                debug!("Connection already closed");
                return;
            }
            *state = ConnectionState::Closed;
        }

        info!(peer = %self.connector.peer(), "Closing connection");

        let mut slot = self.slot.lock().await;
        Self::teardown(&mut slot).await;
        drop(slot);

        let failed = self.correlation().fail_all();
        debug!(failed, "Connection closed");
    }

    /// Writes one encoded record to the live connection.
    ///
    /// On success the pending call for `message_id` is stamped with the
    /// connection generation before the slot is released, so a concurrent
    /// reconnect always sees it as sent. Returns that generation.
    pub(crate) async fn write(
        &self,
        message_id: &MessageId,
        payload: &[u8],
    ) -> std::result::Result<u64, WriteFailure> {
        let mut slot = self.slot.lock().await;
        let generation = slot.generation;

        let Some(writer) = slot.writer.as_mut() else {
            return Err(WriteFailure {
                generation,
                source: io::Error::new(ErrorKind::NotConnected, "no live connection"),
            });
        };

        match timeout(self.settings.write_timeout, write_record(writer, payload)).await {
            Ok(Ok(())) => {
                self.correlation().mark_sent(message_id, generation);
                Ok(generation)
            }
            Ok(Err(source)) => Err(WriteFailure { generation, source }),
            Err(_) => Err(WriteFailure {
                generation,
                source: io::Error::new(ErrorKind::TimedOut, "write timed out"),
            }),
        }
    }
}

// ============================================================================
// ConnectionManager - Internals
// ============================================================================

impl ConnectionManager {
    /// Fails fast once the manager is closed.
    fn ensure_open(&self) -> Result<()> {
        if self.state() == ConnectionState::Closed {
            Err(Error::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    /// Moves to `next` unless closed. Returns `false` if closed.
    fn transition(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if *state == ConnectionState::Closed {
            return false;
        }
        if *state != next {
            let previous = *state;
            debug!(from = %previous, to = %next, "Connection state change");
            *state = next;
        }
        true
    }

    /// Tears down the current connection and establishes a new one.
    async fn replace(&self, slot: &mut Slot) -> Result<()> {
        let previous = slot.generation;
        Self::teardown(slot).await;
        self.correlation().fail_sent(previous);

        match self.connector.connect().await {
            Ok((reader, writer)) => {
                slot.generation = previous + 1;
                self.generation.store(slot.generation, Ordering::SeqCst);
                slot.writer = Some(writer);
                slot.reader = Some(self.spawn_reader(reader, slot.generation));

                // close() may have run while the connect was in flight.
                if !self.transition(ConnectionState::Connected) {
                    Self::teardown(slot).await;
                    return Err(Error::ConnectionClosed);
                }

                info!(
                    peer = %self.connector.peer(),
                    generation = slot.generation,
                    "Connected"
                );
                Ok(())
            }
            Err(e) => {
                self.transition(ConnectionState::Disconnected);
                warn!(peer = %self.connector.peer(), error = %e, "Connect failed");
                Err(e)
            }
        }
    }

    /// Stops the reader and closes the output stream.
    async fn teardown(slot: &mut Slot) {
        if let Some(reader) = slot.reader.take() {
            let _ = reader.stop.send(true);
            match timeout(READER_STOP_TIMEOUT, reader.task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Reader task failed"),
                Err(_) => warn!("Reader task did not stop in time"),
            }
        }

        if let Some(mut writer) = slot.writer.take()
            && let Err(e) = writer.shutdown().await
        {
            debug!(error = %e, "Closing output stream failed");
        }
    }

    /// Spawns the reader task for a new connection.
    fn spawn_reader(&self, reader: BoxedReader, generation: u64) -> ReaderTask {
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_reader(
            reader,
            stop_rx,
            generation,
            self.codec,
            self.router.clone(),
            self.me.clone(),
        ));
        ReaderTask { stop, task }
    }

    /// Runs the connected hook outside any lock.
    fn run_connected_hook(&self) {
        let hook = self.connected_hook.lock().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Reacts to the reader losing its connection.
    fn on_reader_failure(&self, generation: u64) {
        if self.state() == ConnectionState::Closed {
            return;
        }

        // Nothing written on this connection will be answered now.
        self.correlation().fail_sent(generation);

        if !self.settings.reconnect_on_read_failure {
            self.transition(ConnectionState::Disconnected);
            return;
        }

        let Some(manager) = self.me.upgrade() else {
            return;
        };

        tokio::spawn(async move {
            if let Err(e) = manager.reconnect_if_current(generation).await {
                warn!(error = %e, generation, "Reconnect after read failure failed");
            }
        });
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("peer", &self.connector.peer())
            .field("state", &self.state())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Inbound Reader
// ============================================================================

/// Why the reader loop ended.
enum ReaderExit {
    Stopped,
    Eof,
    Failed(io::Error),
}

/// Outcome of one bounded line read.
#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    /// A line (possibly unterminated at end of stream) is in the buffer.
    Line,
    /// A line longer than the limit was skipped; carries its length.
    Oversized(usize),
    /// The stream ended with nothing buffered.
    Eof,
}

/// Reads up to and including the next `\n` into `line`.
///
/// Never buffers more than `max_bytes`: once a line outgrows the limit, the
/// rest of it is consumed and discarded up to the next terminator.
async fn read_bounded_line<R>(
    reader: &mut R,
    line: &mut Vec<u8>,
    max_bytes: usize,
) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let mut skipped = 0usize;

    loop {
        let (used, terminated) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(match (skipped, line.is_empty()) {
                    (0, true) => LineRead::Eof,
                    (0, false) => LineRead::Line,
                    (n, _) => LineRead::Oversized(n),
                });
            }

            let (used, terminated) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            };

            if skipped == 0 && line.len() + used <= max_bytes {
                line.extend_from_slice(&available[..used]);
            } else {
                skipped += line.len() + used;
                line.clear();
            }
            (used, terminated)
        };
        reader.consume(used);

        if terminated {
            return Ok(if skipped == 0 {
                LineRead::Line
            } else {
                LineRead::Oversized(skipped)
            });
        }
    }
}

/// Writes and flushes one record.
async fn write_record(writer: &mut BoxedWriter, payload: &[u8]) -> io::Result<()> {
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Reads one line at a time until stopped or the stream ends.
///
/// Undecodable and oversized lines are logged and dropped; the loop keeps
/// going.
pub(crate) async fn run_reader(
    reader: BoxedReader,
    mut stop: watch::Receiver<bool>,
    generation: u64,
    codec: WireCodec,
    router: InboundRouter,
    manager: Weak<ConnectionManager>,
) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    debug!(generation, "Inbound reader started");

    let exit = loop {
        line.clear();

        tokio::select! {
            biased;

            _ = stop.changed() => break ReaderExit::Stopped,

            read = read_bounded_line(&mut reader, &mut line, codec.max_line_bytes()) => match read {
                Ok(LineRead::Eof) => break ReaderExit::Eof,
                Ok(LineRead::Line) => match codec.decode_line(&line) {
                    Ok(Some(response)) => router.route(response),
                    Ok(None) => {}
                    Err(e) => warn!(
                        error = %e,
                        bytes = line.len(),
                        "Dropping undecodable line"
                    ),
                },
                Ok(LineRead::Oversized(bytes)) => warn!(
                    bytes,
                    max = codec.max_line_bytes(),
                    "Dropping oversized line"
                ),
                Err(e) => break ReaderExit::Failed(e),
            },
        }
    };

    // Input stream closes here.
    drop(reader);

    match exit {
        ReaderExit::Stopped => {
            debug!(generation, "Inbound reader stopped");
            return;
        }
        ReaderExit::Eof => warn!(generation, "Connection closed by controller"),
        ReaderExit::Failed(e) => warn!(generation, error = %e, "Read failed"),
    }

    if let Some(manager) = manager.upgrade() {
        manager.on_reader_failure(generation);
    }
}

// ============================================================================
// Tests
// ============================================================================
