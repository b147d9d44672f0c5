//! Line-oriented TCP transport.
//!
//! This module owns the socket to the controller and everything that touches
//! it: connecting, writing requests in order, reading replies and pushes, and
//! matching replies to their callers.
//!
//! # Architecture
//!
//! ```text
//!  submit() ──► Submitter ──► FIFO queue ──► OutboundWriter ──┐
//!                  │                                          │ write
//!                  ▼                                          ▼
//!           CorrelationTable ◄── InboundRouter ◄── reader ◄── ConnectionManager ◄──► controller
//!                                     │
//!                                     └──► NotifyList ──► NotificationDispatcher
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `ConnectionManager::connect` - Open the socket, spawn the reader
//! 2. `OutboundWriter::spawn` - Start draining the submission queue
//! 3. Stale write or reader EOF - One reconnect, calls already sent fail
//! 4. `ConnectionManager::close` - Stop the reader, close the streams, fail
//!    everything pending
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Connection manager and inbound reader |
//! | `connector` | Socket establishment |
//! | `correlation` | Pending calls and submission |
//! | `writer` | Outbound writer task |

// ============================================================================
// Submodules
// ============================================================================

/// Connection manager and inbound reader.
pub mod connection;

/// Socket establishment.
pub mod connector;

/// Pending-call table and submission API.
pub mod correlation;

/// Outbound writer task.
pub mod writer;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{
    ConnectedHook, ConnectionManager, ConnectionSettings, ConnectionState, InboundRouter,
};
pub use connector::{BoxedReader, BoxedWriter, Connector, TcpConnector, is_stale_connection};
pub use correlation::{CorrelationTable, MAX_PENDING_CALLS, ResponseHandle, Submitter};
pub use writer::OutboundWriter;
