//! Subscription registry.
//!
//! Maps remote object names to the listeners interested in them and to the
//! attribute keys the controller was asked to watch. The controller is only
//! told about an object when its first listener arrives (`RequestParamList`)
//! or its last listener leaves (`ReleaseParamList`).

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::protocol::{Attribute, Request, RequestObject, Response};
use crate::transport::{ResponseHandle, Submitter};

use super::listener::{SharedListener, same_listener};

// ============================================================================
// SubscriptionEntry
// ============================================================================

/// Listeners and watched keys for one object.
struct SubscriptionEntry {
    listeners: Vec<SharedListener>,
    /// Keys sent in the first `RequestParamList`, reused on resubscribe and
    /// release.
    keys: Vec<Attribute>,
}

impl SubscriptionEntry {
    fn contains(&self, listener: &SharedListener) -> bool {
        self.listeners.iter().any(|l| same_listener(l, listener))
    }
}

// ============================================================================
// SubscriptionRegistry
// ============================================================================

/// Object-name to listener map with controller-side subscription upkeep.
///
/// Mutations and the submission of their notify requests happen under one
/// lock, so concurrent subscribe/unsubscribe calls cannot reorder the
/// `RequestParamList`/`ReleaseParamList` pair for an object.
pub struct SubscriptionRegistry {
    entries: Mutex<FxHashMap<String, SubscriptionEntry>>,
    submitter: Submitter,
    ack_timeout: Duration,
}

impl SubscriptionRegistry {
    /// Creates an empty registry submitting through `submitter`.
    #[must_use]
    pub fn new(submitter: Submitter, ack_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
            submitter,
            ack_timeout,
        }
    }

    /// Registers `listener` for every object in `request` and asks the
    /// controller to watch the objects that had no listener yet.
    ///
    /// Subscribing the same listener twice to an object is a no-op. A
    /// non-"200" acknowledgement is logged; the local registration stays.
    ///
    /// # Errors
    ///
    /// Returns an error if the notify request could not be submitted or was
    /// not acknowledged in time. Local registration is kept either way.
    pub async fn subscribe(&self, listener: SharedListener, request: &Request) -> Result<()> {
        let handle = {
            let mut entries = self.entries.lock();
            let mut fresh = Vec::new();

            for object in &request.object_list {
                let entry = entries
                    .entry(object.object_name.clone())
                    .or_insert_with(|| SubscriptionEntry {
                        listeners: Vec::new(),
                        keys: object.keys(),
                    });

                if entry.listeners.is_empty() {
                    fresh.push(RequestObject::read(
                        object.object_name.clone(),
                        entry.keys.iter().cloned(),
                    ));
                }
                if !entry.contains(&listener) {
                    entry.listeners.push(Arc::clone(&listener));
                }
            }

            if fresh.is_empty() {
                None
            } else {
                debug!(objects = fresh.len(), "Requesting change notifications");
                Some(self.submitter.submit(Request::request_param_list(fresh))?)
            }
        };

        match handle {
            Some(handle) => self.await_ack(handle, "RequestParamList").await,
            None => {
                debug!("Objects already watched, no request sent");
                Ok(())
            }
        }
    }

    /// Removes `listener` from every object and asks the controller to stop
    /// watching objects left without listeners.
    ///
    /// # Errors
    ///
    /// Returns an error if the release request could not be submitted or was
    /// not acknowledged in time. Local removal happens either way.
    pub async fn unsubscribe(&self, listener: &SharedListener) -> Result<()> {
        let handle = {
            let mut entries = self.entries.lock();
            let mut released = Vec::new();

            entries.retain(|object_name, entry| {
                let before = entry.listeners.len();
                entry.listeners.retain(|l| !same_listener(l, listener));

                if entry.listeners.is_empty() && before > 0 {
                    released.push(RequestObject::read(
                        object_name.clone(),
                        entry.keys.iter().cloned(),
                    ));
                    false
                } else {
                    true
                }
            });

            if released.is_empty() {
                None
            } else {
                released.sort_by(|a, b| a.object_name.cmp(&b.object_name));
                debug!(objects = released.len(), "Releasing change notifications");
                Some(self.submitter.submit(Request::release_param_list(released))?)
            }
        };

        match handle {
            Some(handle) => self.await_ack(handle, "ReleaseParamList").await,
            None => Ok(()),
        }
    }

    /// Re-sends `RequestParamList` for every watched object.
    ///
    /// Called after a reconnect, since a new connection starts with no
    /// controller-side subscriptions. The acknowledgement is awaited on a
    /// background task. Must be called inside a Tokio runtime.
    pub fn resubscribe_all(&self) {
        let handle = {
            let entries = self.entries.lock();
            if entries.is_empty() {
                return;
            }

            let mut objects: Vec<_> = entries
                .iter()
                .map(|(name, entry)| RequestObject::read(name.clone(), entry.keys.iter().cloned()))
                .collect();
            objects.sort_by(|a, b| a.object_name.cmp(&b.object_name));

            info!(objects = objects.len(), "Restoring subscriptions");
            self.submitter.submit(Request::request_param_list(objects))
        };

        match handle {
            Ok(handle) => {
                let ack_timeout = self.ack_timeout;
                tokio::spawn(async move {
                    match handle.wait(ack_timeout).await {
                        Ok(response) => log_ack(&response, "RequestParamList"),
                        Err(e) => warn!(error = %e, "Restoring subscriptions failed"),
                    }
                });
            }
            Err(e) => warn!(error = %e, "Cannot submit subscription restore"),
        }
    }

    /// Returns a snapshot of the listeners for `object_name`.
    #[must_use]
    pub fn listeners_for(&self, object_name: &str) -> Vec<SharedListener> {
        self.entries
            .lock()
            .get(object_name)
            .map(|entry| entry.listeners.clone())
            .unwrap_or_default()
    }

    /// Returns the watched object names, sorted.
    #[must_use]
    pub fn object_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.entries.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns `true` if no object is watched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    async fn await_ack(&self, handle: ResponseHandle, command: &str) -> Result<()> {
        let response = handle.wait(self.ack_timeout).await?;
        log_ack(&response, command);
        Ok(())
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("objects", &self.object_names())
            .field("ack_timeout", &self.ack_timeout)
            .finish_non_exhaustive()
    }
}

fn log_ack(response: &Response, command: &str) {
    if response.is_success() {
        debug!(command, "Subscription change acknowledged");
    } else {
        warn!(
            command,
            code = %response.response_code,
            description = response.description.as_deref().unwrap_or(""),
            "Controller rejected subscription change"
        );
    }
}

// ============================================================================
// Tests
// ============================================================================
