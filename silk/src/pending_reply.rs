//! Pending-reply table: request/reply continuations keyed by message id.
//!
//! Modelled as a registry of completion channels rather than raw
//! callback lists: a direct `sendTo` registers a one-shot slot that fires
//! once; a `sendAll` registers a streaming slot that stays open for
//! `period` and can fire any number of times, once per responder, in
//! arrival order.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use silk_core::envelope::Envelope;
use silk_core::error::SilkError;

/// Outcome delivered to a pending-reply's callback.
#[derive(Debug, Clone)]
pub enum ReplyOutcome {
    /// A `_reply` envelope arrived.
    Reply(Envelope),
    /// The request failed: no ack before the retry budget was exhausted,
    /// the destination was evicted from the cluster view, or the node
    /// stopped with the request still outstanding.
    Error(SilkErrorKind),
}

/// The subset of [`SilkError`] variants a pending-reply callback can see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilkErrorKind {
    DeliveryFailed,
    PeerLost,
    NodeStopped,
}

impl From<SilkErrorKind> for SilkError {
    fn from(kind: SilkErrorKind) -> Self {
        match kind {
            SilkErrorKind::DeliveryFailed => Self::DeliveryFailed { attempts: 0 },
            SilkErrorKind::PeerLost => Self::peer_lost(""),
            SilkErrorKind::NodeStopped => Self::NodeStopped,
        }
    }
}

enum Slot {
    /// Delivers exactly one outcome, then the entry is dropped.
    Single(flume::Sender<ReplyOutcome>),
    /// Delivers every outcome until `deadline`, then the entry is dropped.
    Stream { sender: flume::Sender<ReplyOutcome>, deadline: Instant },
}

/// Tracks in-flight requests awaiting their reply.
#[derive(Default)]
pub struct PendingReplyTable {
    slots: HashMap<String, Slot>,
}

impl PendingReplyTable {
    /// Construct an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self { slots: HashMap::new() }
    }

    /// Register a single-fire slot for `message_id`.
    pub fn register_single(&mut self, message_id: impl Into<String>, sender: flume::Sender<ReplyOutcome>) {
        self.slots.insert(message_id.into(), Slot::Single(sender));
    }

    /// Register a streaming slot for `message_id`, open for `period`.
    pub fn register_stream(&mut self, message_id: impl Into<String>, sender: flume::Sender<ReplyOutcome>, period: Duration) {
        self.slots.insert(message_id.into(), Slot::Stream { sender, deadline: Instant::now() + period });
    }

    /// Deliver a `_reply` for `parent` to its registered slot. Single slots
    /// are dropped after firing; stream slots remain until their deadline.
    /// No-op if no slot is registered for `parent`.
    pub fn deliver_reply(&mut self, parent: &str, envelope: Envelope) {
        match self.slots.get(parent) {
            Some(Slot::Single(_)) => {
                if let Some(Slot::Single(sender)) = self.slots.remove(parent) {
                    let _ = sender.send(ReplyOutcome::Reply(envelope));
                }
            }
            Some(Slot::Stream { sender, .. }) => {
                let _ = sender.send(ReplyOutcome::Reply(envelope));
            }
            None => {}
        }
    }

    /// Fail the slot for `message_id` with `kind` and drop it. No-op if no
    /// slot is registered.
    pub fn fail(&mut self, message_id: &str, kind: SilkErrorKind) {
        if let Some(slot) = self.slots.remove(message_id) {
            let sender = match slot {
                Slot::Single(sender) | Slot::Stream { sender, .. } => sender,
            };
            let _ = sender.send(ReplyOutcome::Error(kind));
        }
    }

    /// Drop every stream slot whose deadline has elapsed as of `now`.
    pub fn sweep_expired_streams(&mut self, now: Instant) {
        self.slots.retain(|_, slot| match slot {
            Slot::Stream { deadline, .. } => now < *deadline,
            Slot::Single(_) => true,
        });
    }

    /// Fail and drop every remaining slot; called at node stop.
    pub fn fail_all(&mut self, kind: SilkErrorKind) {
        for (_, slot) in self.slots.drain() {
            let sender = match slot {
                Slot::Single(sender) | Slot::Stream { sender, .. } => sender,
            };
            let _ = sender.send(ReplyOutcome::Error(kind));
        }
    }

    /// Whether a slot is registered for `message_id`.
    #[must_use]
    pub fn is_pending(&self, message_id: &str) -> bool {
        self.slots.contains_key(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_slot_fires_once_then_drops() {
        let mut table = PendingReplyTable::new();
        let (tx, rx) = flume::unbounded();
        table.register_single("req-1", tx);
        table.deliver_reply("req-1", Envelope::new("r1", "node-b", "node-a", "_reply"));
        assert!(matches!(rx.try_recv().unwrap(), ReplyOutcome::Reply(_)));
        assert!(!table.is_pending("req-1"));
    }

    #[test]
    fn stream_slot_fires_multiple_times() {
        let mut table = PendingReplyTable::new();
        let (tx, rx) = flume::unbounded();
        table.register_stream("req-1", tx, Duration::from_secs(1));
        table.deliver_reply("req-1", Envelope::new("r1", "node-b", "node-a", "_reply"));
        table.deliver_reply("req-1", Envelope::new("r2", "node-c", "node-a", "_reply"));
        assert!(table.is_pending("req-1"));
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn expired_stream_is_swept() {
        let mut table = PendingReplyTable::new();
        let (tx, _rx) = flume::unbounded();
        table.register_stream("req-1", tx, Duration::ZERO);
        table.sweep_expired_streams(Instant::now() + Duration::from_millis(1));
        assert!(!table.is_pending("req-1"));
    }

    #[test]
    fn fail_delivers_error_outcome() {
        let mut table = PendingReplyTable::new();
        let (tx, rx) = flume::unbounded();
        table.register_single("req-1", tx);
        table.fail("req-1", SilkErrorKind::PeerLost);
        assert!(matches!(rx.try_recv().unwrap(), ReplyOutcome::Error(SilkErrorKind::PeerLost)));
    }
}
