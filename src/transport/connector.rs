//! Socket establishment.
//!
//! The [`Connector`] trait opens a fresh byte stream to the controller and
//! hands back its read and write halves. [`TcpConnector`] is the production
//! implementation; tests plug in in-memory streams.

// ============================================================================
// Imports
// ============================================================================

use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpSocket, lookup_host};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Error, Result, saturating_millis};

// ============================================================================
// Types
// ============================================================================

/// Input stream of a connection.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Output stream of a connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

// ============================================================================
// Connector
// ============================================================================

/// Opens byte streams to the controller.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a new connection and returns its input and output streams.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the peer cannot be reached.
    async fn connect(&self) -> Result<(BoxedReader, BoxedWriter)>;

    /// Describes the peer for log output.
    fn peer(&self) -> String;
}

// ============================================================================
// TcpConnector
// ============================================================================

/// Connects to the controller over TCP with keep-alive enabled.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
    keepalive: bool,
}

impl TcpConnector {
    /// Creates a connector for `host:port`.
    #[inline]
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        connect_timeout: Duration,
        keepalive: bool,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
            keepalive,
        }
    }

    /// Connects to one resolved address.
    async fn connect_addr(&self, addr: SocketAddr) -> io::Result<tokio::net::TcpStream> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_keepalive(self.keepalive)?;

        let stream = timeout(self.connect_timeout, socket.connect(addr))
            .await
            .map_err(|_| io::Error::new(ErrorKind::TimedOut, "connect timed out"))??;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<(BoxedReader, BoxedWriter)> {
        let addrs: Vec<SocketAddr> = lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| Error::connection(format!("Cannot resolve {}: {e}", self.peer())))?
            .collect();

        if addrs.is_empty() {
            return Err(Error::connection(format!(
                "No address found for {}",
                self.peer()
            )));
        }

        let mut last_error = None;
        for addr in addrs {
            match self.connect_addr(addr).await {
                Ok(stream) => {
                    debug!(%addr, keepalive = self.keepalive, "TCP connection established");
                    let (reader, writer) = stream.into_split();
                    return Ok((Box::new(reader), Box::new(writer)));
                }
                Err(e) => {
                    warn!(%addr, error = %e, "TCP connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if e.kind() == ErrorKind::TimedOut => Err(Error::connection_timeout(
                saturating_millis(self.connect_timeout),
            )),
            Some(e) => Err(Error::connection(format!("{}: {e}", self.peer()))),
            None => Err(Error::connection(format!("{}: no attempt made", self.peer()))),
        }
    }

    fn peer(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Error Classification
// ============================================================================

/// Returns `true` if a write error means the socket is stale.
///
/// A stale socket looks open locally but its peer is gone; it is usually
/// only detected on write. Such failures are worth one reconnect.
#[must_use]
pub fn is_stale_connection(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
            | ErrorKind::TimedOut
            | ErrorKind::WriteZero
    )
}

// ============================================================================
// Tests
// ============================================================================
