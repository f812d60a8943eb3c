//! Envelope factory: stamps `id`/`src` defaults onto outbound envelopes so
//! call sites never hand-assemble the bookkeeping fields.

use std::sync::Arc;

use serde_json::Value;

use crate::envelope::{protocol_type, Envelope, DEST_ALL};
use crate::id::IdGenerator;

/// Builds outbound envelopes on behalf of one node.
///
/// # Examples
///
/// ```
/// use silk_core::factory::EnvelopeFactory;
/// use silk_core::id::UuidGenerator;
/// use std::sync::Arc;
///
/// let factory = EnvelopeFactory::new("node-a", Arc::new(UuidGenerator));
/// let env = factory.application("node-b", "check-temp", None);
/// assert_eq!(env.src, "node-a");
/// assert_eq!(env.dest, "node-b");
/// ```
#[derive(Clone)]
pub struct EnvelopeFactory {
    node_id: String,
    ids: Arc<dyn IdGenerator>,
}

impl EnvelopeFactory {
    /// Construct a factory stamping `node_id` as the source of every
    /// envelope it builds.
    #[must_use]
    pub fn new(node_id: impl Into<String>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { node_id: node_id.into(), ids }
    }

    fn fresh_id(&self) -> String {
        self.ids.next_id()
    }

    /// Build an application-level envelope addressed to `dest`.
    #[must_use]
    pub fn application(&self, dest: impl Into<String>, ty: impl Into<String>, data: Option<Value>) -> Envelope {
        let mut env = Envelope::new(self.fresh_id(), self.node_id.clone(), dest, ty);
        if let Some(data) = data {
            env = env.with_data(data);
        }
        env
    }

    /// Build a broadcast envelope (`dest = _all`).
    #[must_use]
    pub fn broadcast(&self, ty: impl Into<String>, data: Option<Value>) -> Envelope {
        self.application(DEST_ALL, ty, data)
    }

    /// Build a `_join` envelope carrying this node's descriptor as `data`.
    #[must_use]
    pub fn join(&self, seed_id: impl Into<String>, descriptor: Value) -> Envelope {
        self.application(seed_id, protocol_type::JOIN, Some(descriptor))
    }

    /// Build a `_connect` envelope carrying this node's descriptor as `data`.
    #[must_use]
    pub fn connect(&self, peer_id: impl Into<String>, descriptor: Value) -> Envelope {
        self.application(peer_id, protocol_type::CONNECT, Some(descriptor))
    }

    /// Build a `_leave` envelope broadcast on graceful stop.
    #[must_use]
    pub fn leave(&self) -> Envelope {
        self.broadcast(protocol_type::LEAVE, None)
    }

    /// Build a `_ka` keepalive envelope broadcast on the publish socket.
    #[must_use]
    pub fn keepalive(&self) -> Envelope {
        self.broadcast(protocol_type::KEEPALIVE, None)
    }

    /// Build an `_ack` envelope answering `parent`.
    #[must_use]
    pub fn ack(&self, dest: impl Into<String>, parent: impl Into<String>) -> Envelope {
        Envelope::new(self.fresh_id(), self.node_id.clone(), dest, protocol_type::ACK)
            .with_parent(parent)
    }

    /// Build a `_reply` envelope answering `parent`, addressed back to the
    /// original sender.
    #[must_use]
    pub fn reply(&self, dest: impl Into<String>, parent: impl Into<String>, data: Option<Value>) -> Envelope {
        let mut env = Envelope::new(self.fresh_id(), self.node_id.clone(), dest, protocol_type::REPLY)
            .with_parent(parent);
        if let Some(data) = data {
            env = env.with_data(data);
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::test_support::SequentialGenerator;

    #[test]
    fn application_envelope_stamps_src_and_fresh_id() {
        let factory = EnvelopeFactory::new("node-a", Arc::new(SequentialGenerator::default()));
        let first = factory.application("node-b", "check-temp", None);
        let second = factory.application("node-b", "check-temp", None);
        assert_eq!(first.src, "node-a");
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn reply_carries_parent_and_destination() {
        let factory = EnvelopeFactory::new("node-b", Arc::new(SequentialGenerator::default()));
        let env = factory.reply("node-a", "req-1", Some(serde_json::json!({ "temp": 42 })));
        assert_eq!(env.parent, Some("req-1".to_string()));
        assert_eq!(env.dest, "node-a");
        assert_eq!(env.ty, crate::envelope::protocol_type::REPLY);
    }

    #[test]
    fn broadcast_targets_the_all_sentinel() {
        let factory = EnvelopeFactory::new("node-a", Arc::new(SequentialGenerator::default()));
        let env = factory.keepalive();
        assert!(env.is_broadcast());
    }
}
