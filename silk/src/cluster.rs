//! Cluster view: this node's local understanding of current membership.
//!
//! A dual index — id to peer record, and message type to the set of peer
//! ids advertising it — kept mutually consistent: removing a peer removes
//! all of its type memberships.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use bytes::Bytes;
use silk_core::descriptor::NodeDescriptor;

/// One cluster member as seen by this node.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    /// The peer's advertised descriptor.
    pub descriptor: NodeDescriptor,
    /// Transport-level routing identity used to address this peer on the
    /// router socket, captured from the first inbound frame.
    pub identity: Bytes,
    /// When this peer is considered dead absent a refresh.
    pub last_seen_deadline: Instant,
}

/// This node's local view of cluster membership.
#[derive(Debug, Default)]
pub struct ClusterView {
    by_id: HashMap<String, PeerRecord>,
    by_type: HashMap<String, HashSet<String>>,
}

impl ClusterView {
    /// Construct an empty cluster view.
    #[must_use]
    pub fn new() -> Self {
        Self { by_id: HashMap::new(), by_type: HashMap::new() }
    }

    /// Number of known peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the view has no known peers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Look up a peer by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&PeerRecord> {
        self.by_id.get(id)
    }

    /// Whether `id` is currently a known peer.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Insert or refresh a peer record, rebuilding its type memberships from
    /// the descriptor's currently advertised types.
    pub fn upsert(&mut self, identity: Bytes, descriptor: NodeDescriptor, last_seen_deadline: Instant) {
        let id = descriptor.id.clone();
        if let Some(existing) = self.by_id.get(&id) {
            for ty in existing.descriptor.messages.keys() {
                if let Some(set) = self.by_type.get_mut(ty) {
                    set.remove(&id);
                }
            }
        }
        for ty in descriptor.messages.keys() {
            self.by_type.entry(ty.clone()).or_default().insert(id.clone());
        }
        self.by_id.insert(id, PeerRecord { descriptor, identity, last_seen_deadline });
    }

    /// Refresh only the liveness deadline of a known peer, leaving its
    /// descriptor and type memberships untouched. No-op if `id` is unknown.
    pub fn refresh_deadline(&mut self, id: &str, last_seen_deadline: Instant) {
        if let Some(record) = self.by_id.get_mut(id) {
            record.last_seen_deadline = last_seen_deadline;
        }
    }

    /// Remove a peer and every one of its type memberships.
    pub fn remove(&mut self, id: &str) -> Option<PeerRecord> {
        let record = self.by_id.remove(id)?;
        for ty in record.descriptor.messages.keys() {
            if let Some(set) = self.by_type.get_mut(ty) {
                set.remove(id);
            }
        }
        Some(record)
    }

    /// Peer ids currently advertising `ty`.
    #[must_use]
    pub fn peers_for_type(&self, ty: &str) -> Vec<&str> {
        self.by_type
            .get(ty)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Ids of peers whose `last_seen_deadline` has elapsed as of `now`.
    #[must_use]
    pub fn expired(&self, now: Instant) -> Vec<String> {
        self.by_id
            .iter()
            .filter(|(_, record)| now > record.last_seen_deadline)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Iterate over every known peer record.
    pub fn iter(&self) -> impl Iterator<Item = &PeerRecord> {
        self.by_id.values()
    }

    /// Remove every peer, clearing both indices.
    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_type.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silk_core::descriptor::{KeepaliveAdvert, MessagePolicy};
    use std::time::Duration;

    fn descriptor(id: &str, ty: &str) -> NodeDescriptor {
        let mut d = NodeDescriptor::new(id, "tcp://127.0.0.1:5000", "tcp://127.0.0.1:5001", KeepaliveAdvert::default());
        d.advertise(ty, MessagePolicy::default());
        d
    }

    #[test]
    fn upsert_then_lookup_by_type() {
        let mut view = ClusterView::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        view.upsert(Bytes::from_static(b"id-b"), descriptor("node-b", "work"), deadline);
        assert_eq!(view.peers_for_type("work"), vec!["node-b"]);
        assert!(view.contains("node-b"));
    }

    #[test]
    fn remove_clears_type_membership() {
        let mut view = ClusterView::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        view.upsert(Bytes::from_static(b"id-b"), descriptor("node-b", "work"), deadline);
        view.remove("node-b");
        assert!(view.peers_for_type("work").is_empty());
        assert!(!view.contains("node-b"));
    }

    #[test]
    fn expired_detects_elapsed_deadlines() {
        let mut view = ClusterView::new();
        let past = Instant::now() - Duration::from_secs(1);
        view.upsert(Bytes::from_static(b"id-b"), descriptor("node-b", "work"), past);
        assert_eq!(view.expired(Instant::now()), vec!["node-b".to_string()]);
    }

    #[test]
    fn upsert_rebuilds_type_membership_on_change() {
        let mut view = ClusterView::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        view.upsert(Bytes::from_static(b"id-b"), descriptor("node-b", "work"), deadline);
        view.upsert(Bytes::from_static(b"id-b"), descriptor("node-b", "check-temp"), deadline);
        assert!(view.peers_for_type("work").is_empty());
        assert_eq!(view.peers_for_type("check-temp"), vec!["node-b"]);
    }
}
