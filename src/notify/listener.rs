//! Notification listener trait.

use std::sync::Arc;

use crate::protocol::ResponseObject;

// ============================================================================
// NotifyListener
// ============================================================================

/// Receives change pushes for subscribed objects.
///
/// Callbacks run on the dispatcher task, one object at a time. A listener
/// that panics is logged and skipped; delivery to the others continues.
///
/// Closures implement this trait:
///
/// ```ignore
/// let listener: SharedListener = Arc::new(|object: &ResponseObject| {
///     println!("{} changed", object.object_name);
/// });
/// ```
pub trait NotifyListener: Send + Sync {
    /// Called once per changed object the listener is subscribed to.
    fn on_notify_list(&self, object: &ResponseObject);
}

impl<F> NotifyListener for F
where
    F: Fn(&ResponseObject) + Send + Sync,
{
    fn on_notify_list(&self, object: &ResponseObject) {
        self(object);
    }
}

/// Shared listener handle. Identity is the allocation, not the value.
pub type SharedListener = Arc<dyn NotifyListener>;

/// Returns `true` if both handles point at the same listener.
#[inline]
#[must_use]
pub fn same_listener(a: &SharedListener, b: &SharedListener) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_closure_listener() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let listener: SharedListener = Arc::new(move |_: &ResponseObject| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        listener.on_notify_list(&ResponseObject::new("C0001"));
        listener.on_notify_list(&ResponseObject::new("C0002"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_identity() {
        let a: SharedListener = Arc::new(|_: &ResponseObject| {});
        let b: SharedListener = Arc::new(|_: &ResponseObject| {});
        let a2 = Arc::clone(&a);

        assert!(same_listener(&a, &a2));
        assert!(!same_listener(&a, &b));
    }
}
