//! Event types for the staffsync event system
//!
//! Provides the SyncEvent enum and the EventBus that the cache and the status
//! store publish on. Events are informational: nothing in the cache waits on a
//! subscriber, so every emit is lossy.

use crate::models::{AssignmentId, StatusSource, StatusValue};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Staffsync event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// A fetch for one index key settled successfully
    AssignmentsLoaded {
        /// "person:<key>" or "project:<key>"
        key: String,
        count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Optimistic link inserted under a provisional id
    LinkPending {
        temp_id: AssignmentId,
        person_key: String,
        project_key: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Remote create confirmed; provisional record replaced by `id`
    LinkCommitted {
        temp_id: AssignmentId,
        id: AssignmentId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Remote create failed; provisional record removed
    LinkRolledBack {
        temp_id: AssignmentId,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Patch committed by the remote store
    AssignmentUpdated {
        id: AssignmentId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Delete committed by the remote store
    AssignmentUnlinked {
        id: AssignmentId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A status entry was set or cleared (`value == None`)
    StatusChanged {
        entity: String,
        value: Option<StatusValue>,
        source: StatusSource,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A rule engine run finished
    RulesEvaluated {
        evaluated: usize,
        set: usize,
        cleared: usize,
        skipped_manual: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SyncEvent {
    /// Event type name, matching the serde tag
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::AssignmentsLoaded { .. } => "AssignmentsLoaded",
            SyncEvent::LinkPending { .. } => "LinkPending",
            SyncEvent::LinkCommitted { .. } => "LinkCommitted",
            SyncEvent::LinkRolledBack { .. } => "LinkRolledBack",
            SyncEvent::AssignmentUpdated { .. } => "AssignmentUpdated",
            SyncEvent::AssignmentUnlinked { .. } => "AssignmentUnlinked",
            SyncEvent::StatusChanged { .. } => "StatusChanged",
            SyncEvent::RulesEvaluated { .. } => "RulesEvaluated",
        }
    }
}

/// Broadcast channel for SyncEvent
///
/// Cheap to clone; all clones share one channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Subscribers that fall more than `capacity` events behind lose the
    /// oldest events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = SyncEvent::LinkCommitted {
            temp_id: AssignmentId::new("tmp-1"),
            id: AssignmentId::new("a-1"),
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "LinkCommitted");
        assert_eq!(json["id"], "a-1");
        assert_eq!(event.event_type(), "LinkCommitted");
    }

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit_lossy(SyncEvent::AssignmentUnlinked {
            id: AssignmentId::new("a-2"),
            timestamp: chrono::Utc::now(),
        });

        match rx.recv().await.unwrap() {
            SyncEvent::AssignmentUnlinked { id, .. } => assert_eq!(id.as_str(), "a-2"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.emit_lossy(SyncEvent::RulesEvaluated {
            evaluated: 0,
            set: 0,
            cleared: 0,
            skipped_manual: 0,
            timestamp: chrono::Utc::now(),
        });
        assert_eq!(bus.capacity(), 256);
    }
}
