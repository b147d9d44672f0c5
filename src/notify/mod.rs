//! Change notifications.
//!
//! Listeners subscribe to remote objects by name. The registry keeps the
//! controller informed about which objects are watched; the dispatcher
//! fans incoming `NotifyList` pushes out to the listeners on its own task.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `dispatcher` | Delivery task |
//! | `listener` | Listener trait |
//! | `registry` | Object-name to listener map |

// ============================================================================
// Submodules
// ============================================================================

/// Notification delivery task.
pub mod dispatcher;

/// Listener trait.
pub mod listener;

/// Subscription registry.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatcher::{NotificationDispatcher, NotificationSender};
pub use listener::{NotifyListener, SharedListener, same_listener};
pub use registry::SubscriptionRegistry;
