//! Membership handshake payloads: the data carried on `_join` and
//! `_connect` envelopes, and the seed's view reply.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use silk_core::descriptor::NodeDescriptor;
use silk_core::error::{Result, SilkError};

/// The `data` payload of a `_join` reply: the seed's current cluster view
/// plus its own descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinReply {
    /// Every member the seed currently knows about, including itself.
    pub cluster: Vec<NodeDescriptor>,
    /// The seed's own descriptor (also present in `cluster`, repeated for
    /// callers that only care about the seed).
    pub me: NodeDescriptor,
}

/// Serialize a descriptor to the `data` payload carried on `_join` and
/// `_connect` requests.
#[must_use]
pub fn descriptor_payload(descriptor: &NodeDescriptor) -> Value {
    serde_json::to_value(descriptor).expect("NodeDescriptor always serializes")
}

/// Parse a peer descriptor out of a `_join`/`_connect` request's `data`.
///
/// # Errors
///
/// Returns [`SilkError::BadPayload`] if `data` is missing or does not
/// deserialize as a [`NodeDescriptor`].
pub fn parse_descriptor(data: Option<&Value>) -> Result<NodeDescriptor> {
    let data = data.ok_or_else(|| SilkError::bad_payload("missing descriptor in handshake data"))?;
    serde_json::from_value(data.clone()).map_err(|e| SilkError::bad_payload(e.to_string()))
}

/// Build the `data` payload for a `_join` reply from this node's known
/// cluster membership and its own descriptor.
#[must_use]
pub fn join_reply_payload(cluster: Vec<NodeDescriptor>, me: NodeDescriptor) -> Value {
    serde_json::to_value(JoinReply { cluster, me }).expect("JoinReply always serializes")
}

/// Parse a `_join` reply's `data` into its cluster snapshot and seed
/// descriptor.
///
/// # Errors
///
/// Returns [`SilkError::BadPayload`] if `data` is missing or malformed.
pub fn parse_join_reply(data: Option<&Value>) -> Result<JoinReply> {
    let data = data.ok_or_else(|| SilkError::bad_payload("missing join reply data"))?;
    serde_json::from_value(data.clone()).map_err(|e| SilkError::bad_payload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use silk_core::descriptor::KeepaliveAdvert;

    fn sample(id: &str) -> NodeDescriptor {
        NodeDescriptor::new(id, "tcp://127.0.0.1:5000", "tcp://127.0.0.1:5001", KeepaliveAdvert::default())
    }

    #[test]
    fn descriptor_round_trips_through_payload() {
        let d = sample("node-a");
        let payload = descriptor_payload(&d);
        let parsed = parse_descriptor(Some(&payload)).unwrap();
        assert_eq!(parsed, d);
    }

    #[test]
    fn join_reply_round_trips() {
        let seed = sample("node-a");
        let payload = join_reply_payload(vec![seed.clone()], seed.clone());
        let parsed = parse_join_reply(Some(&payload)).unwrap();
        assert_eq!(parsed.me, seed);
        assert_eq!(parsed.cluster.len(), 1);
    }

    #[test]
    fn missing_descriptor_is_rejected() {
        assert!(parse_descriptor(None).is_err());
    }
}
