//! Approval lifecycle events and listener fan-out.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::request::ApprovalRequest;

/// A lifecycle event emitted by the approval workflow.
///
/// Each variant carries a snapshot of the request as it stood when the
/// transition was recorded, so listeners never race the live table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "request", rename_all = "snake_case")]
pub enum ApprovalEvent {
    /// A new request entered the pending state.
    Created(ApprovalRequest),
    /// A pending request was approved.
    Approved(ApprovalRequest),
    /// A pending request was rejected.
    Rejected(ApprovalRequest),
    /// A pending request timed out.
    Expired(ApprovalRequest),
    /// A pending request was withdrawn.
    Cancelled(ApprovalRequest),
}

impl ApprovalEvent {
    /// Dotted event-type string for audit sinks.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Created(_) => "request.created",
            Self::Approved(_) => "request.approved",
            Self::Rejected(_) => "request.rejected",
            Self::Expired(_) => "request.expired",
            Self::Cancelled(_) => "request.cancelled",
        }
    }

    /// The request snapshot this event carries.
    #[must_use]
    pub fn request(&self) -> &ApprovalRequest {
        match self {
            Self::Created(r)
            | Self::Approved(r)
            | Self::Rejected(r)
            | Self::Expired(r)
            | Self::Cancelled(r) => r,
        }
    }
}

/// Handle returned by [`ListenerRegistry::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&ApprovalEvent) + Send + Sync>;

/// Synchronous fan-out of [`ApprovalEvent`]s to registered listeners.
///
/// Listeners are invoked in registration order on the emitting thread,
/// outside the registry lock, so a listener may subscribe or unsubscribe
/// (itself included) during delivery. A panicking listener is caught and
/// logged; it never interrupts delivery to the remaining listeners or the
/// state transition that emitted the event.
pub struct ListenerRegistry {
    next_id: AtomicU64,
    // Keyed by monotonically increasing id, so iteration follows
    // registration order.
    listeners: RwLock<BTreeMap<u64, Listener>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a listener, returning a handle for unsubscription.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ApprovalEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut listeners = self.listeners.write().unwrap_or_else(|e| {
            tracing::warn!("ListenerRegistry write lock poisoned, recovering");
            e.into_inner()
        });
        listeners.insert(id, Arc::new(listener));
        ListenerId(id)
    }

    /// Remove a listener. Returns `true` if it was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners
            .write()
            .map(|mut listeners| listeners.remove(&id.0).is_some())
            .unwrap_or(false)
    }

    /// The number of registered listeners.
    #[must_use]
    pub fn count(&self) -> usize {
        self.listeners.read().map(|l| l.len()).unwrap_or(0)
    }

    /// Deliver an event to every listener registered at the time of the
    /// call.
    pub fn emit(&self, event: &ApprovalEvent) {
        // Snapshot the listeners and drop the lock before invoking any of
        // them: a listener must be free to call back into the registry.
        let snapshot: Vec<(u64, Listener)> = {
            let listeners = self.listeners.read().unwrap_or_else(|e| {
                tracing::warn!("ListenerRegistry read lock poisoned, recovering");
                e.into_inner()
            });
            listeners
                .iter()
                .map(|(id, listener)| (*id, Arc::clone(listener)))
                .collect()
        };

        for (id, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::error!(
                    listener_id = id,
                    event = event.event_type(),
                    "approval listener panicked"
                );
            }
        }
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("count", &self.count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ApprovalMode, RequestId, RequestStatus};
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use warden_core::{RiskLevel, Timestamp, ToolParams};
    use warden_risk::RiskEvaluation;

    fn sample_request() -> ApprovalRequest {
        ApprovalRequest {
            id: RequestId::new(),
            tool: "exec".to_string(),
            params: ToolParams::new(),
            risk: RiskEvaluation {
                level: RiskLevel::High,
                score: 75,
                factors: Vec::new(),
            },
            created_at: Timestamp::now(),
            status: RequestStatus::Pending,
            mode: ApprovalMode::Interactive,
            expires_at: Timestamp::now(),
            resolved_at: None,
            resolved_by: None,
            rejection_reason: None,
            context: None,
        }
    }

    #[test]
    fn test_event_type_strings() {
        let req = sample_request();
        assert_eq!(
            ApprovalEvent::Created(req.clone()).event_type(),
            "request.created"
        );
        assert_eq!(
            ApprovalEvent::Approved(req.clone()).event_type(),
            "request.approved"
        );
        assert_eq!(
            ApprovalEvent::Rejected(req.clone()).event_type(),
            "request.rejected"
        );
        assert_eq!(
            ApprovalEvent::Expired(req.clone()).event_type(),
            "request.expired"
        );
        assert_eq!(
            ApprovalEvent::Cancelled(req).event_type(),
            "request.cancelled"
        );
    }

    #[test]
    fn test_subscribe_emit_unsubscribe() {
        let registry = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_inner = Arc::clone(&hits);

        let id = registry.subscribe(move |_| {
            hits_inner.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(registry.count(), 1);

        registry.emit(&ApprovalEvent::Created(sample_request()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        registry.emit(&ApprovalEvent::Created(sample_request()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_delivery() {
        let registry = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        registry.subscribe(|_| panic!("listener bug"));
        let hits_inner = Arc::clone(&hits);
        registry.subscribe(move |_| {
            hits_inner.fetch_add(1, Ordering::SeqCst);
        });

        registry.emit(&ApprovalEvent::Approved(sample_request()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_can_unsubscribe_itself_during_delivery() {
        let registry = Arc::new(ListenerRegistry::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let own_id = Arc::new(std::sync::OnceLock::new());

        let registry_inner = Arc::clone(&registry);
        let hits_inner = Arc::clone(&hits);
        let own_id_inner = Arc::clone(&own_id);
        let id = registry.subscribe(move |_| {
            hits_inner.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = own_id_inner.get() {
                registry_inner.unsubscribe(*id);
            }
        });
        own_id.set(id).unwrap();

        registry.emit(&ApprovalEvent::Created(sample_request()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.count(), 0);

        // The listener removed itself; a second emit reaches nobody.
        registry.emit(&ApprovalEvent::Created(sample_request()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_serialization_tags() {
        let event = ApprovalEvent::Approved(sample_request());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "approved");
        assert!(json["request"]["id"].is_string());
    }
}
