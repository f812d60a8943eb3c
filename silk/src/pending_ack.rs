//! Pending-ack table: messages awaiting an `_ack`, retried with backoff
//! until one arrives or the attempt budget runs out.
//!
//! An entry is dropped when `fulfilled` becomes true, or when its attempt
//! budget reaches zero after an expiry tick — whichever happens first.

use std::collections::HashMap;
use std::time::Instant;

use silk_core::envelope::Envelope;
use silk_core::retry::{RetryProfile, RetryState};

/// What to do with a pending-ack entry once its retry delay elapses.
pub enum ExpiryAction {
    /// Resend `envelope` to `dest_identity` and reschedule.
    Retry { envelope: Envelope, dest_identity: bytes::Bytes },
    /// Attempts are exhausted; deliver `DeliveryFailed` to the caller.
    GiveUp,
}

struct Entry {
    envelope: Envelope,
    dest_identity: bytes::Bytes,
    retry: RetryState,
    attempts_left: u32,
    next_attempt_at: Instant,
}

/// Tracks in-flight messages awaiting acknowledgement.
#[derive(Default)]
pub struct PendingAckTable {
    entries: HashMap<String, Entry>,
}

impl PendingAckTable {
    /// Construct an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Register a message sent to `dest_identity`, to be retried under
    /// `profile` up to `attempts` times total (the initial send counts as
    /// the first attempt).
    pub fn register(&mut self, envelope: Envelope, dest_identity: bytes::Bytes, profile: RetryProfile, attempts: u32) {
        let mut retry = profile.start();
        let next_attempt_at = Instant::now() + retry.next_delay();
        self.entries.insert(
            envelope.id.clone(),
            Entry { envelope, dest_identity, retry, attempts_left: attempts.saturating_sub(1), next_attempt_at },
        );
    }

    /// Mark the entry for `message_id` fulfilled and drop it. Returns
    /// `true` if an entry was actually pending.
    pub fn fulfill(&mut self, message_id: &str) -> bool {
        self.entries.remove(message_id).is_some()
    }

    /// Whether a message with this id is still awaiting acknowledgement.
    #[must_use]
    pub fn is_pending(&self, message_id: &str) -> bool {
        self.entries.contains_key(message_id)
    }

    /// Number of entries awaiting acknowledgement.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no pending entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry addressed to `peer_identity`, returning their ids so
    /// callers can fail the corresponding pending-reply entries with
    /// `PeerLost`.
    pub fn evict_peer(&mut self, peer_identity: &[u8]) -> Vec<String> {
        let ids: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.dest_identity.as_ref() == peer_identity)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            self.entries.remove(id);
        }
        ids
    }

    /// Process one expiry tick at `now`: entries whose `next_attempt_at` has
    /// elapsed either get retried (and rescheduled) or, if attempts are
    /// exhausted, reported as given up. The entry is removed from the table
    /// in the give-up case; retried entries remain, rescheduled.
    pub fn tick(&mut self, now: Instant) -> Vec<(String, ExpiryAction)> {
        let due: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| now >= e.next_attempt_at)
            .map(|(id, _)| id.clone())
            .collect();

        let mut actions = Vec::with_capacity(due.len());
        for id in due {
            let Some(entry) = self.entries.get_mut(&id) else { continue };
            if entry.attempts_left == 0 {
                let entry = self.entries.remove(&id).expect("just looked up");
                actions.push((id, ExpiryAction::GiveUp));
                drop(entry);
            } else {
                entry.attempts_left -= 1;
                entry.next_attempt_at = now + entry.retry.next_delay();
                actions.push((
                    id,
                    ExpiryAction::Retry { envelope: entry.envelope.clone(), dest_identity: entry.dest_identity.clone() },
                ));
            }
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;

    fn envelope(id: &str) -> Envelope {
        Envelope::new(id, "node-a", "node-b", "check-temp")
    }

    #[test]
    fn fulfill_drops_entry() {
        let mut table = PendingAckTable::new();
        table.register(envelope("msg-1"), Bytes::from_static(b"id-b"), RetryProfile::fast(), 3);
        assert!(table.is_pending("msg-1"));
        assert!(table.fulfill("msg-1"));
        assert!(!table.is_pending("msg-1"));
    }

    #[test]
    fn exhausted_attempts_give_up() {
        let mut table = PendingAckTable::new();
        table.register(envelope("msg-1"), Bytes::from_static(b"id-b"), RetryProfile::new(Duration::ZERO, Duration::ZERO), 1);
        let actions = table.tick(Instant::now() + Duration::from_millis(1));
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0].1, ExpiryAction::GiveUp));
        assert!(!table.is_pending("msg-1"));
    }

    #[test]
    fn retries_reschedule_and_stay_pending() {
        let mut table = PendingAckTable::new();
        table.register(envelope("msg-1"), Bytes::from_static(b"id-b"), RetryProfile::new(Duration::ZERO, Duration::ZERO), 3);
        let actions = table.tick(Instant::now() + Duration::from_millis(1));
        assert!(matches!(actions[0].1, ExpiryAction::Retry { .. }));
        assert!(table.is_pending("msg-1"));
    }

    #[test]
    fn evict_peer_drops_matching_entries() {
        let mut table = PendingAckTable::new();
        table.register(envelope("msg-1"), Bytes::from_static(b"id-b"), RetryProfile::fast(), 3);
        table.register(envelope("msg-2"), Bytes::from_static(b"id-c"), RetryProfile::fast(), 3);
        let evicted = table.evict_peer(b"id-b");
        assert_eq!(evicted, vec!["msg-1".to_string()]);
        assert!(!table.is_pending("msg-1"));
        assert!(table.is_pending("msg-2"));
    }
}
