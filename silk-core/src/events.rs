//! Node lifecycle events.
//!
//! Provides an event stream for observing cluster membership changes and
//! delivery outcomes from outside the node's own callback surface — useful
//! for logging, metrics, and tests that assert on `peer:removed` timing.

use std::fmt;

use crate::descriptor::NodeDescriptor;

/// Node and cluster lifecycle events.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// This node finished binding its sockets and entered `STARTED`.
    Started,

    /// A peer was added to the cluster view, via `_join`, `_connect`, or a
    /// keepalive from a previously unknown sender.
    PeerAdded(NodeDescriptor),

    /// A peer was removed from the cluster view, gracefully (`_leave`) or by
    /// keepalive expiry.
    PeerRemoved { id: String, reason: PeerRemovedReason },

    /// This node's initial `join` completed; the cluster view now includes
    /// the seed and every peer reachable from it.
    Joined,

    /// This node transitioned to `STOPPED`.
    Stopped,
}

/// Why a peer was removed from the cluster view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRemovedReason {
    /// The peer published `_leave` before closing its sockets.
    Graceful,
    /// The peer's keepalive deadline elapsed without a refresh.
    KeepaliveExpired,
    /// This node is stopping and clearing its cluster view.
    NodeStopped,
}

impl fmt::Display for NodeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "node started"),
            Self::PeerAdded(d) => write!(f, "peer added: {}", d.id),
            Self::PeerRemoved { id, reason } => write!(f, "peer removed: {id} ({reason})"),
            Self::Joined => write!(f, "join completed"),
            Self::Stopped => write!(f, "node stopped"),
        }
    }
}

impl fmt::Display for PeerRemovedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graceful => write!(f, "graceful leave"),
            Self::KeepaliveExpired => write!(f, "keepalive expired"),
            Self::NodeStopped => write!(f, "node stopped"),
        }
    }
}

/// Handle for receiving node lifecycle events.
pub type NodeEventReceiver = flume::Receiver<NodeEvent>;

/// Internal sender for node lifecycle events.
pub type NodeEventSender = flume::Sender<NodeEvent>;

/// Creates a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (NodeEventSender, NodeEventReceiver) {
    flume::unbounded()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::KeepaliveAdvert;

    #[test]
    fn peer_removed_display_includes_reason() {
        let event = NodeEvent::PeerRemoved {
            id: "node-b".to_string(),
            reason: PeerRemovedReason::KeepaliveExpired,
        };
        assert_eq!(event.to_string(), "peer removed: node-b (keepalive expired)");
    }

    #[test]
    fn event_channel_round_trips() {
        let (tx, rx) = create_event_channel();
        let descriptor = NodeDescriptor::new(
            "node-a",
            "tcp://127.0.0.1:5000",
            "tcp://127.0.0.1:5001",
            KeepaliveAdvert::default(),
        );
        tx.send(NodeEvent::PeerAdded(descriptor)).unwrap();
        let event = rx.recv().unwrap();
        assert!(matches!(event, NodeEvent::PeerAdded(_)));
    }
}
