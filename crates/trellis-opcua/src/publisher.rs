// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Batched structural change notifications.
//!
//! Structural operations queue [`ModelChange`] records while they edit the
//! address space and flush once at the end. A flush swaps the pending list
//! out under a short lock and emits one [`ModelChangeNotification`] outside
//! it, so queueing never waits on delivery.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::types::{well_known, ModelChangeVerb, NodeId};

const NOTIFICATION_CAPACITY: usize = 256;

/// One structural change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelChange {
    /// Node the change applies to.
    pub affected: NodeId,
    /// Type definition of the affected node.
    pub affected_type: Option<NodeId>,
    /// What happened.
    pub verb: ModelChangeVerb,
}

/// A batch of structural changes delivered as one event.
#[derive(Debug, Clone, Serialize)]
pub struct ModelChangeNotification {
    /// Monotonic batch number.
    pub sequence_number: u32,
    /// Event id.
    pub event_id: Uuid,
    /// Event type (GeneralModelChangeEventType).
    pub event_type: NodeId,
    /// Source node (Server).
    pub source_node: NodeId,
    /// Emission time.
    pub time: DateTime<Utc>,
    /// Changes in queue order.
    pub changes: Vec<ModelChange>,
}

impl ModelChangeNotification {
    /// Returns `true` if some change for `node_id` carries `verb`.
    pub fn contains(&self, node_id: &NodeId, verb: ModelChangeVerb) -> bool {
        self.changes
            .iter()
            .any(|c| &c.affected == node_id && c.verb.contains(verb))
    }
}

/// Queues and flushes structural changes.
pub struct ChangePublisher {
    pending: Mutex<Vec<ModelChange>>,
    sequence: AtomicU32,
    sender: broadcast::Sender<Arc<ModelChangeNotification>>,
}

impl ChangePublisher {
    /// Creates a publisher with no subscribers.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            pending: Mutex::new(Vec::new()),
            sequence: AtomicU32::new(1),
            sender,
        }
    }

    /// Queues a change until the next flush.
    pub fn queue_change(&self, affected: NodeId, affected_type: Option<NodeId>, verb: ModelChangeVerb) {
        self.pending.lock().push(ModelChange {
            affected,
            affected_type,
            verb,
        });
    }

    /// Emits all queued changes as one notification.
    ///
    /// Returns `None` and emits nothing when the queue is empty.
    pub fn flush(&self) -> Option<Arc<ModelChangeNotification>> {
        let changes = std::mem::take(&mut *self.pending.lock());
        if changes.is_empty() {
            return None;
        }

        let notification = Arc::new(ModelChangeNotification {
            sequence_number: self.sequence.fetch_add(1, Ordering::Relaxed),
            event_id: Uuid::new_v4(),
            event_type: well_known::GENERAL_MODEL_CHANGE_EVENT_TYPE,
            source_node: NodeId::SERVER,
            time: Utc::now(),
            changes,
        });
        debug!(
            sequence = notification.sequence_number,
            changes = notification.changes.len(),
            "Model change notification"
        );
        let _ = self.sender.send(notification.clone());
        Some(notification)
    }

    /// Subscribes to notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ModelChangeNotification>> {
        self.sender.subscribe()
    }

    /// Returns the number of queued changes.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drops all queued changes.
    pub fn clear(&self) {
        self.pending.lock().clear();
    }
}

impl Default for ChangePublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangePublisher")
            .field("pending", &self.pending_len())
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_empty_emits_nothing() {
        let publisher = ChangePublisher::new();
        let mut rx = publisher.subscribe();
        assert!(publisher.flush().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_flush_batches_in_order() {
        let publisher = ChangePublisher::new();
        let mut rx = publisher.subscribe();
        let a = NodeId::string(2, "A");
        let b = NodeId::string(2, "B");
        publisher.queue_change(a.clone(), None, ModelChangeVerb::NODE_ADDED);
        publisher.queue_change(b.clone(), None, ModelChangeVerb::REFERENCE_DELETED);

        let sent = publisher.flush().unwrap();
        let received = rx.try_recv().unwrap();
        assert_eq!(sent.sequence_number, received.sequence_number);
        assert_eq!(received.changes.len(), 2);
        assert_eq!(received.changes[0].affected, a);
        assert!(received.contains(&b, ModelChangeVerb::REFERENCE_DELETED));
        assert_eq!(publisher.pending_len(), 0);
        assert!(publisher.flush().is_none());
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let publisher = ChangePublisher::new();
        publisher.queue_change(NodeId::string(2, "A"), None, ModelChangeVerb::NODE_ADDED);
        let first = publisher.flush().unwrap().sequence_number;
        publisher.queue_change(NodeId::string(2, "A"), None, ModelChangeVerb::NODE_DELETED);
        let second = publisher.flush().unwrap().sequence_number;
        assert!(second > first);
    }

    #[test]
    fn test_concurrent_queue_and_flush() {
        let publisher = Arc::new(ChangePublisher::new());
        let mut rx = publisher.subscribe();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let publisher = publisher.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        publisher.queue_change(
                            NodeId::string(2, format!("T{t}.{i}")),
                            None,
                            ModelChangeVerb::NODE_ADDED,
                        );
                        if i % 10 == 0 {
                            publisher.flush();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        publisher.flush();

        let mut total = 0;
        while let Ok(notification) = rx.try_recv() {
            assert!(!notification.changes.is_empty());
            total += notification.changes.len();
        }
        assert_eq!(total, 200);
    }
}
