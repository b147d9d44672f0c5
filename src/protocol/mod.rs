//! Wire protocol message types.
//!
//! This module defines the records exchanged with the controller and the
//! codec that frames them.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Client → Controller | Command with a fresh `messageID` |
//! | `Response` | Controller → Client | Reply echoing the `messageID` |
//! | `Response` (`NotifyList`) | Controller → Client | Unsolicited change push |
//!
//! Records are JSON objects, one per line.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `attribute` | Attribute keys and typed values |
//! | `codec` | Line framing |
//! | `command` | Command vocabulary |
//! | `request` | Request types |
//! | `response` | Response types |

// ============================================================================
// Submodules
// ============================================================================

/// Attribute keys and typed values.
pub mod attribute;

/// Line-framed codec.
pub mod codec;

/// Command vocabulary.
pub mod command;

/// Request message types.
pub mod request;

/// Response message types.
pub mod response;

// ============================================================================
// Re-exports
// ============================================================================

pub use attribute::{Attribute, AttributeValue};
pub use codec::{DEFAULT_MAX_LINE_BYTES, WireCodec};
pub use command::Command;
pub use request::{Request, RequestBody, RequestObject};
pub use response::{RESPONSE_OK, Response, ResponseObject};
