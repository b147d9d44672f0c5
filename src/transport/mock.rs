//! In-memory controller stand-in for tests.
//!
//! [`MockConnector`] hands the client one end of a `tokio::io::duplex` pipe
//! per connect and publishes the other end as a [`StubPeer`], which tests use
//! to read requests and write replies or pushes.

use std::io::{self, ErrorKind};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, ReadBuf,
    ReadHalf, WriteHalf,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout};

use crate::error::{Error, Result};
use crate::protocol::{Request, Response};

use super::connector::{BoxedReader, BoxedWriter, Connector};
use super::correlation::{CorrelationTable, Submitter};

/// How long a stub peer waits for the next line before giving up.
const PEER_READ_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Tracing
// ============================================================================

/// Installs a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polls `condition` until it holds or two seconds pass.
pub(crate) async fn wait_until(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// ============================================================================
// StreamStats
// ============================================================================

/// Counters shared by every stream a [`MockConnector`] hands out.
#[derive(Debug, Default)]
pub(crate) struct StreamStats {
    pub(crate) output_shutdowns: AtomicUsize,
    pub(crate) input_drops: AtomicUsize,
    /// Payloads rejected by failing output streams, in order.
    pub(crate) failed_writes: Mutex<Vec<Vec<u8>>>,
}

// ============================================================================
// MockConnector
// ============================================================================

/// Connector producing in-memory connections.
pub(crate) struct MockConnector {
    peers: mpsc::UnboundedSender<StubPeer>,
    connects: AtomicUsize,
    refuse: AtomicBool,
    failing_connections: AtomicUsize,
    stats: Arc<StreamStats>,
}

impl MockConnector {
    /// Creates a connector and the channel its stub peers arrive on.
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<StubPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            peers,
            connects: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
            failing_connections: AtomicUsize::new(0),
            stats: Arc::new(StreamStats::default()),
        });
        (connector, rx)
    }

    /// Number of successful connects so far.
    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Makes every connect attempt fail.
    pub(crate) fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Makes every write on the first `count` connections fail with
    /// `BrokenPipe`.
    pub(crate) fn fail_writes_on_first(&self, count: usize) {
        self.failing_connections.store(count, Ordering::SeqCst);
    }

    pub(crate) fn stats(&self) -> &StreamStats {
        &self.stats
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<(BoxedReader, BoxedWriter)> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::connection("mock: connection refused"));
        }

        let index = self.connects.fetch_add(1, Ordering::SeqCst);
        let failing = index < self.failing_connections.load(Ordering::SeqCst);

        let (client, server) = tokio::io::duplex(256 * 1024);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);

        let _ = self.peers.send(StubPeer {
            reader: BufReader::new(server_read),
            writer: server_write,
        });

        let reader = CountingReader {
            inner: client_read,
            stats: Arc::clone(&self.stats),
        };
        let writer = CountingWriter {
            inner: client_write,
            failing,
            stats: Arc::clone(&self.stats),
        };
        Ok((Box::new(reader), Box::new(writer)))
    }

    fn peer(&self) -> String {
        "mock".to_string()
    }
}

// ============================================================================
// Counting Streams
// ============================================================================

struct CountingReader {
    inner: ReadHalf<DuplexStream>,
    stats: Arc<StreamStats>,
}

impl AsyncRead for CountingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl Drop for CountingReader {
    fn drop(&mut self) {
        self.stats.input_drops.fetch_add(1, Ordering::SeqCst);
    }
}

struct CountingWriter {
    inner: WriteHalf<DuplexStream>,
    failing: bool,
    stats: Arc<StreamStats>,
}

impl AsyncWrite for CountingWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.failing {
            this.stats.failed_writes.lock().push(buf.to_vec());
            return Poll::Ready(Err(io::Error::new(ErrorKind::BrokenPipe, "mock: broken pipe")));
        }
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let result = Pin::new(&mut this.inner).poll_shutdown(cx);
        if result.is_ready() {
            this.stats.output_shutdowns.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}

// ============================================================================
// StubPeer
// ============================================================================

/// Controller side of one in-memory connection.
///
/// Dropping it hangs up the connection.
pub(crate) struct StubPeer {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl StubPeer {
    /// Reads the next raw line, terminator included. `None` on EOF or
    /// timeout.
    pub(crate) async fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match timeout(PEER_READ_TIMEOUT, self.reader.read_line(&mut line)).await {
            Ok(Ok(n)) if n > 0 => Some(line),
            _ => None,
        }
    }

    /// Reads and parses the next request.
    ///
    /// # Panics
    ///
    /// Panics if no valid JSON line arrives in time.
    pub(crate) async fn next_request(&mut self) -> Value {
        let line = self.read_line().await.expect("stub peer: no request");
        serde_json::from_str(&line).expect("stub peer: request is not JSON")
    }

    /// Writes one raw line; a terminator is appended.
    pub(crate) async fn send_line(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("stub peer: write");
    }

    /// Writes one JSON record.
    pub(crate) async fn send(&mut self, record: Value) {
        self.send_line(&record.to_string()).await;
    }

    /// Answers `request` with `response_code`, merging `extra` fields.
    pub(crate) async fn reply(&mut self, request: &Value, response_code: &str, extra: Value) {
        let mut record = json!({
            "messageID": request["messageID"],
            "command": request["command"],
            "response": response_code,
        });
        if let (Some(record), Value::Object(extra)) = (record.as_object_mut(), extra) {
            record.extend(extra);
        }
        self.send(record).await;
    }
}

// ============================================================================
// Acking Submitter
// ============================================================================

/// A submitter whose queue is answered in-process with `response_code`.
///
/// Returns the submitter and a log of every request seen. Must be called
/// inside a Tokio runtime.
pub(crate) fn acking_submitter(response_code: &'static str) -> (Submitter, Arc<Mutex<Vec<Request>>>) {
    let correlation = Arc::new(CorrelationTable::new());
    let (tx, mut rx) = mpsc::unbounded_channel::<Request>();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let table = Arc::clone(&correlation);
    let log = Arc::clone(&seen);
    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            log.lock().push(request.clone());
            if let Some(message_id) = request.message_id.clone() {
                table.complete(&message_id, reply_to(&request, response_code));
            }
        }
    });

    (Submitter::new(correlation, tx), seen)
}

/// Builds a bare reply to `request`.
pub(crate) fn reply_to(request: &Request, response_code: &str) -> Response {
    Response {
        message_id: request.message_id.clone(),
        command: request.command.to_string(),
        response_code: response_code.to_string(),
        ..Response::default()
    }
}

/// A oneshot that resolves when a listener fires, for dispatcher tests.
pub(crate) fn signal() -> (Arc<Mutex<Option<oneshot::Sender<()>>>>, oneshot::Receiver<()>) {
    let (tx, rx) = oneshot::channel();
    (Arc::new(Mutex::new(Some(tx))), rx)
}
