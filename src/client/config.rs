//! Client configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use intellicenter::ClientConfig;
//!
//! let config = ClientConfig::new("192.168.1.20")
//!     .with_request_timeout(Duration::from_secs(5))
//!     .without_system_info();
//! config.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::DEFAULT_MAX_LINE_BYTES;
use crate::transport::ConnectionSettings;

// ============================================================================
// Constants
// ============================================================================

/// Default controller port.
pub const DEFAULT_PORT: u16 = 6681;

/// Default socket connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for [`Client::request`](super::Client::request) and
/// subscription acknowledgements.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound for writing one record.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// ClientConfig
// ============================================================================

/// Connection parameters and tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Controller host name or address.
    pub host: String,

    /// Controller port.
    pub port: u16,

    /// Socket connect timeout.
    pub connect_timeout: Duration,

    /// Default wait for replies and subscription acknowledgements.
    pub request_timeout: Duration,

    /// Upper bound for writing one record.
    pub write_timeout: Duration,

    /// Enable TCP keep-alive.
    pub keepalive: bool,

    /// Reconnect when the reader hits EOF or a read error.
    pub reconnect_on_read_failure: bool,

    /// Fetch [`SystemInfo`](super::SystemInfo) right after connecting.
    pub fetch_system_info: bool,

    /// Longest accepted inbound line in bytes.
    pub max_line_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            keepalive: true,
            reconnect_on_read_failure: true,
            fetch_system_info: true,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientConfig {
    /// Creates a configuration for `host` with default settings.
    #[inline]
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientConfig {
    /// Sets the controller port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the default request timeout.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the write timeout.
    #[inline]
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Enables or disables TCP keep-alive.
    #[inline]
    #[must_use]
    pub fn with_keepalive(mut self, enabled: bool) -> Self {
        self.keepalive = enabled;
        self
    }

    /// Enables or disables reconnecting after a read failure.
    #[inline]
    #[must_use]
    pub fn with_reconnect_on_read_failure(mut self, enabled: bool) -> Self {
        self.reconnect_on_read_failure = enabled;
        self
    }

    /// Skips the system information fetch at startup.
    #[inline]
    #[must_use]
    pub fn without_system_info(mut self) -> Self {
        self.fetch_system_info = false;
        self
    }

    /// Sets the longest accepted inbound line.
    #[inline]
    #[must_use]
    pub fn with_max_line_bytes(mut self, bytes: usize) -> Self {
        self.max_line_bytes = bytes;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty host, port zero, a zero
    /// timeout or a zero line limit.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config(
                "Controller host is required. Use ClientConfig::new(host) or .host()",
            ));
        }

        if self.port == 0 {
            return Err(Error::config("Port must be greater than zero"));
        }

        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("request_timeout", self.request_timeout),
            ("write_timeout", self.write_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::config(format!("{name} must be greater than zero")));
            }
        }

        if self.max_line_bytes == 0 {
            return Err(Error::config("max_line_bytes must be greater than zero"));
        }

        Ok(())
    }

    /// Returns the connection manager settings.
    #[inline]
    #[must_use]
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            write_timeout: self.write_timeout,
            reconnect_on_read_failure: self.reconnect_on_read_failure,
        }
    }

    /// Returns `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("pool.local");

        assert_eq!(config.port, 6681);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.write_timeout, Duration::from_secs(10));
        assert!(config.keepalive);
        assert!(config.reconnect_on_read_failure);
        assert!(config.fetch_system_info);
        assert_eq!(config.max_line_bytes, 1024 * 1024);
        assert_eq!(config.address(), "pool.local:6681");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let config = ClientConfig::new("10.0.0.5")
            .with_port(7000)
            .with_keepalive(false)
            .with_reconnect_on_read_failure(false)
            .without_system_info();

        assert_eq!(config.port, 7000);
        assert!(!config.keepalive);
        assert!(!config.fetch_system_info);
        assert!(!config.connection_settings().reconnect_on_read_failure);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ClientConfig::default().validate().is_err());
        assert!(ClientConfig::new("h").with_port(0).validate().is_err());
        assert!(
            ClientConfig::new("h")
                .with_write_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );

        let err = ClientConfig::new("h")
            .with_max_line_bytes(0)
            .validate()
            .expect_err("zero limit");
        assert!(matches!(err, Error::Config { .. }));
    }
}
