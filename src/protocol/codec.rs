//! Line-framed wire codec.
//!
//! One JSON record per line in both directions. A codec value is constructed
//! per connection manager and passed in explicitly; it carries only its
//! limits, so cloning it is cheap.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{from_slice, to_vec};

use crate::error::{Error, Result};

use super::{Request, Response};

// ============================================================================
// Constants
// ============================================================================

/// Default upper bound for a single received line (1 MiB).
///
/// Hardware-definition answers on large installations run to a few hundred
/// kilobytes.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Record terminator.
const LINE_TERMINATOR: u8 = b'\n';

// ============================================================================
// WireCodec
// ============================================================================

/// Encodes requests to lines and decodes lines to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireCodec {
    max_line_bytes: usize,
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_BYTES)
    }
}

impl WireCodec {
    /// Creates a codec that rejects lines longer than `max_line_bytes`.
    #[inline]
    #[must_use]
    pub const fn new(max_line_bytes: usize) -> Self {
        Self { max_line_bytes }
    }

    /// Returns the line length limit.
    #[inline]
    #[must_use]
    pub const fn max_line_bytes(&self) -> usize {
        self.max_line_bytes
    }

    /// Serializes a request to a newline-terminated record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode(&self, request: &Request) -> Result<Vec<u8>> {
        let mut bytes = to_vec(request)?;
        bytes.push(LINE_TERMINATOR);
        Ok(bytes)
    }

    /// Decodes one received line.
    ///
    /// Trailing `\r\n` is ignored. Blank lines yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// - [`Error::Decode`] if the line exceeds the length limit
    /// - [`Error::Json`] if the line is not a valid response record
    pub fn decode_line(&self, line: &[u8]) -> Result<Option<Response>> {
        if line.len() > self.max_line_bytes {
            return Err(Error::decode(format!(
                "Line of {} bytes exceeds limit of {}",
                line.len(),
                self.max_line_bytes
            )));
        }

        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            return Ok(None);
        }

        Ok(Some(from_slice(trimmed)?))
    }
}

// ============================================================================
// Tests
// ============================================================================
