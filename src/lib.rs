//! IntelliCenter - Asynchronous protocol engine for Pentair pool controllers.
//!
//! This library speaks the controller's line-oriented JSON protocol over a
//! single persistent TCP connection: it correlates replies with requests,
//! keeps subscriptions alive across reconnects and fans change pushes out to
//! listeners.
//!
//! # Architecture
//!
//! The engine runs three kinds of Tokio tasks around one socket:
//!
//! - **Outbound writer**: drains the submission queue in FIFO order
//! - **Inbound reader**: one per connection, routes each decoded line
//! - **Notification dispatcher**: calls listeners off the reader's path
//!
//! Key design principles:
//!
//! - Every request carries a fresh `messageID`; replies may arrive in any order
//! - The pending entry is registered before the request is queued
//! - A stale socket is replaced once per failure, never in a loop
//! - Closing or losing the connection fails pending calls instead of
//!   leaving them hanging
//!
//! # Quick Start
//!
//! ```no_run
//! use intellicenter::{Client, Request, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder().host("192.168.1.20").connect().await?;
//!
//!     let circuits = client
//!         .request(Request::get_query("CircuitStatus", ""))
//!         .await?
//!         .into_success()?;
//!
//!     for circuit in &circuits.answer {
//!         println!("{}: {:?}", circuit.object_name, circuit.status());
//!     }
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`] facade and configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`notify`] | Subscriptions and notification delivery |
//! | [`protocol`] | Wire message types and codec |
//! | [`transport`] | TCP transport and request correlation |

// ============================================================================
// Modules
// ============================================================================

/// Client facade and configuration.
///
/// Use [`Client::builder()`] to connect.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Subscriptions and notification delivery.
pub mod notify;

/// Wire protocol message types.
///
/// Requests, responses, the attribute vocabulary and the line codec.
pub mod protocol;

/// TCP transport layer.
///
/// Connection management, the reader and writer tasks, and the pending-call
/// table.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientBuilder, ClientConfig, SystemInfo};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::MessageId;

// Notification types
pub use notify::{NotifyListener, SharedListener};

// Protocol types
pub use protocol::{
    Attribute, AttributeValue, Command, Request, RequestBody, RequestObject, Response,
    ResponseObject,
};

// Transport types
pub use transport::{ConnectionState, Connector, ResponseHandle};
