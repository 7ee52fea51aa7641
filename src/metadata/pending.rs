//! Pending-change queue
//!
//! One entry per identity. A later enqueue supersedes the earlier one, so a
//! save followed by a delete leaves only the delete. Every enqueue takes a
//! fresh sequence number; the push pipeline uses it to tell whether a row
//! was written again while a batch was in flight.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ordering::TopologicalOrder;
use crate::record::RecordIdentity;

/// What the remote must be told
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingKind {
    /// Create or update the remote record
    Save,
    /// Delete the remote record
    Delete,
}

impl PendingKind {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingKind::Save => "save",
            PendingKind::Delete => "delete",
        }
    }
}

impl fmt::Display for PendingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    /// Record the change applies to
    pub identity: RecordIdentity,
    /// Save or delete
    pub kind: PendingKind,
    /// When the change was queued
    pub enqueued_at: DateTime<Utc>,
    /// Monotonic enqueue sequence
    pub sequence: u64,
}

/// Deduplicated queue of pending changes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingQueue {
    entries: BTreeMap<RecordIdentity, PendingChange>,
    next_sequence: u64,
}

impl PendingQueue {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a change, superseding any earlier one for the same identity
    pub fn enqueue(&mut self, identity: RecordIdentity, kind: PendingKind) -> u64 {
        self.next_sequence += 1;
        let sequence = self.next_sequence;
        self.entries.insert(
            identity.clone(),
            PendingChange {
                identity,
                kind,
                enqueued_at: Utc::now(),
                sequence,
            },
        );
        sequence
    }

    /// Pending change for an identity
    pub fn get(&self, identity: &RecordIdentity) -> Option<&PendingChange> {
        self.entries.get(identity)
    }

    /// Kind of the pending change for an identity
    pub fn kind_of(&self, identity: &RecordIdentity) -> Option<PendingKind> {
        self.entries.get(identity).map(|p| p.kind)
    }

    /// Whether a save is pending
    pub fn has_save(&self, identity: &RecordIdentity) -> bool {
        self.kind_of(identity) == Some(PendingKind::Save)
    }

    /// Whether a delete is pending
    pub fn has_delete(&self, identity: &RecordIdentity) -> bool {
        self.kind_of(identity) == Some(PendingKind::Delete)
    }

    /// Remove the change for an identity
    pub fn remove(&mut self, identity: &RecordIdentity) -> Option<PendingChange> {
        self.entries.remove(identity)
    }

    /// Remove the change only if it has not been superseded since `sequence`
    pub fn remove_if_unchanged(&mut self, identity: &RecordIdentity, sequence: u64) -> bool {
        match self.entries.get(identity) {
            Some(p) if p.sequence == sequence => {
                self.entries.remove(identity);
                true
            }
            _ => false,
        }
    }

    /// Number of pending changes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pending changes in identity order
    pub fn iter(&self) -> impl Iterator<Item = &PendingChange> {
        self.entries.values()
    }

    /// Pending changes in push order
    ///
    /// Deletes first, children before parents; then saves, parents before
    /// children. Ties are broken by identity.
    pub fn ordered(&self, order: &TopologicalOrder) -> Vec<PendingChange> {
        let (mut deletes, mut saves): (Vec<_>, Vec<_>) = self
            .entries
            .values()
            .cloned()
            .partition(|p| p.kind == PendingKind::Delete);

        deletes.sort_by(|a, b| {
            order
                .rank(b.identity.table())
                .cmp(&order.rank(a.identity.table()))
                .then_with(|| a.identity.cmp(&b.identity))
        });
        saves.sort_by(|a, b| {
            order
                .rank(a.identity.table())
                .cmp(&order.rank(b.identity.table()))
                .then_with(|| a.identity.cmp(&b.identity))
        });

        deletes.extend(saves);
        deletes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> TopologicalOrder {
        let mut graph = BTreeMap::new();
        graph.insert("lists".to_string(), vec![]);
        graph.insert("items".to_string(), vec!["lists".to_string()]);
        TopologicalOrder::build(&graph).unwrap()
    }

    #[test]
    fn test_later_enqueue_supersedes() {
        let mut queue = PendingQueue::new();
        let id = RecordIdentity::new("lists", "1");
        queue.enqueue(id.clone(), PendingKind::Save);
        queue.enqueue(id.clone(), PendingKind::Delete);
        assert_eq!(queue.len(), 1);
        assert!(queue.has_delete(&id));
    }

    #[test]
    fn test_remove_if_unchanged() {
        let mut queue = PendingQueue::new();
        let id = RecordIdentity::new("lists", "1");
        let first = queue.enqueue(id.clone(), PendingKind::Save);
        let second = queue.enqueue(id.clone(), PendingKind::Save);
        assert!(!queue.remove_if_unchanged(&id, first));
        assert!(queue.has_save(&id));
        assert!(queue.remove_if_unchanged(&id, second));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_order() {
        let mut queue = PendingQueue::new();
        queue.enqueue(RecordIdentity::new("items", "b"), PendingKind::Save);
        queue.enqueue(RecordIdentity::new("lists", "2"), PendingKind::Delete);
        queue.enqueue(RecordIdentity::new("lists", "1"), PendingKind::Save);
        queue.enqueue(RecordIdentity::new("items", "x"), PendingKind::Delete);
        queue.enqueue(RecordIdentity::new("items", "a"), PendingKind::Save);

        let names: Vec<String> = queue
            .ordered(&order())
            .iter()
            .map(|p| format!("{} {}", p.kind, p.identity))
            .collect();
        assert_eq!(
            names,
            vec![
                "delete x:items",
                "delete 2:lists",
                "save 1:lists",
                "save a:items",
                "save b:items",
            ]
        );
    }
}
