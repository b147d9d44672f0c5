//! Client facade and configuration.
//!
//! # Example
//!
//! ```no_run
//! use intellicenter::Client;
//!
//! # async fn example() -> intellicenter::Result<()> {
//! let client = Client::builder().host("192.168.1.20").connect().await?;
//!
//! if let Some(info) = client.system_info() {
//!     println!("{} running {}", info.name, info.version);
//! }
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Builder pattern for client configuration.
pub mod builder;

/// Client configuration.
pub mod config;

/// Client implementation.
pub mod core;

/// Controller system information.
pub mod system_info;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use config::{
    ClientConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_WRITE_TIMEOUT,
};
pub use core::Client;
pub use system_info::{SYSTEM_OBJECT, SystemInfo};
