use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::{BatchRequest, BatchUpdate};

/// The latest unsynced change for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    pub entity_id: String,
    pub payload: Value,
    pub queued_at: DateTime<Utc>,
}

/// Pending changes keyed by entity id. A new change for an id replaces the
/// previous one, so a drained batch never holds the same entity twice.
#[derive(Debug, Default)]
pub struct MutationQueue {
    pending: HashMap<String, PendingChange>,
}

impl MutationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or overwrite the pending change for `entity_id`.
    /// Returns the change it replaced, if any.
    pub fn enqueue(&mut self, entity_id: impl Into<String>, payload: Value) -> Option<PendingChange> {
        let entity_id = entity_id.into();
        let change = PendingChange {
            entity_id: entity_id.clone(),
            payload,
            queued_at: Utc::now(),
        };
        self.pending.insert(entity_id, change)
    }

    /// Remove and return every pending change. Ordered by entity id.
    pub fn drain(&mut self) -> Vec<PendingChange> {
        let mut changes: Vec<PendingChange> = std::mem::take(&mut self.pending).into_values().collect();
        changes.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        changes
    }

    pub fn get(&self, entity_id: &str) -> Option<&PendingChange> {
        self.pending.get(entity_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingChange> {
        self.pending.values()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl From<Vec<PendingChange>> for BatchRequest {
    fn from(changes: Vec<PendingChange>) -> Self {
        BatchRequest {
            updates: changes
                .into_iter()
                .map(|c| BatchUpdate {
                    id: c.entity_id,
                    data: c.payload,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_enqueue_replaces_existing_change() {
        let mut queue = MutationQueue::new();
        assert!(queue.enqueue("s1", json!({"status": "learning"})).is_none());
        let replaced = queue.enqueue("s1", json!({"status": "mastered"}));

        assert_eq!(replaced.map(|c| c.payload), Some(json!({"status": "learning"})));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get("s1").unwrap().payload, json!({"status": "mastered"}));
    }

    #[test]
    fn test_drain_empties_queue() {
        let mut queue = MutationQueue::new();
        queue.enqueue("b", json!(2));
        queue.enqueue("a", json!(1));

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].entity_id, "a");
        assert_eq!(drained[1].entity_id, "b");
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_enqueue_after_drain_survives_to_next_cycle() {
        let mut queue = MutationQueue::new();
        queue.enqueue("s1", json!(1));
        let first = queue.drain();
        queue.enqueue("s1", json!(2));

        assert_eq!(first.len(), 1);
        assert_eq!(queue.drain()[0].payload, json!(2));
    }

    #[test]
    fn test_batch_request_from_changes() {
        let mut queue = MutationQueue::new();
        queue.enqueue("s1", json!({"status": "learning"}));
        queue.enqueue("s2", json!({"status": "learning"}));
        let request = BatchRequest::from(queue.drain());
        let ids: Vec<&str> = request.updates.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
    }
}
