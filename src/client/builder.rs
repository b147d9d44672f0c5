//! Builder pattern for client configuration.
//!
//! # Example
//!
//! ```no_run
//! use intellicenter::Client;
//!
//! # async fn example() -> intellicenter::Result<()> {
//! let client = Client::builder()
//!     .host("192.168.1.20")
//!     .port(6681)
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::Result;

use super::config::ClientConfig;
use super::core::Client;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`].
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct ClientBuilder {
    config: ClientConfig,
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a builder with default settings and no host.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the controller host name or address.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the controller port.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the socket connect timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the default timeout for requests and subscription
    /// acknowledgements.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Sets the write timeout.
    #[inline]
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Enables or disables TCP keep-alive.
    #[inline]
    #[must_use]
    pub fn keepalive(mut self, enabled: bool) -> Self {
        self.config.keepalive = enabled;
        self
    }

    /// Enables or disables reconnecting after a read failure.
    #[inline]
    #[must_use]
    pub fn reconnect_on_read_failure(mut self, enabled: bool) -> Self {
        self.config.reconnect_on_read_failure = enabled;
        self
    }

    /// Enables or disables the system information fetch at startup.
    #[inline]
    #[must_use]
    pub fn fetch_system_info(mut self, enabled: bool) -> Self {
        self.config.fetch_system_info = enabled;
        self
    }

    /// Sets the longest accepted inbound line.
    #[inline]
    #[must_use]
    pub fn max_line_bytes(mut self, bytes: usize) -> Self {
        self.config.max_line_bytes = bytes;
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if validation fails.
    pub fn build(self) -> Result<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Validates the configuration and connects.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) if validation fails
    /// - Any error from [`Client::connect`]
    pub async fn connect(self) -> Result<Client> {
        Client::connect(self.build()?).await
    }
}

// ============================================================================
// Tests
// ============================================================================
