//! Node descriptors: the identity and advertised capabilities a node
//! publishes to the rest of the cluster.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Reply deadline and retry budget a node advertises for one message type.
///
/// When two peers advertise conflicting policies for the same type, the
/// *receiver's* advertised policy wins: the receiver knows its own latency,
/// and senders track per-peer policy rather than a single global one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePolicy {
    /// Milliseconds to wait for an `_ack` before retrying.
    pub period_ms: u64,
    /// Number of send attempts before giving up with `DeliveryFailed`.
    pub attempts: u32,
}

impl MessagePolicy {
    /// Construct a policy from a period and an attempt budget.
    #[must_use]
    pub const fn new(period_ms: u64, attempts: u32) -> Self {
        Self { period_ms, attempts }
    }
}

impl Default for MessagePolicy {
    fn default() -> Self {
        Self { period_ms: 1_000, attempts: 3 }
    }
}

/// Keepalive cadence a node advertises to the rest of the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepaliveAdvert {
    /// Milliseconds between `_ka` broadcasts.
    pub period_ms: u64,
}

impl Default for KeepaliveAdvert {
    fn default() -> Self {
        Self { period_ms: 5_000 }
    }
}

/// Identity and capability advertisement for one cluster member.
///
/// Created at node construction and immutable except for `messages`
/// (extended as subscriptions are registered) and the two endpoint
/// strings (resolved once at `start`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Opaque unique node id, typically a random 128-bit id in textual form.
    pub id: String,
    /// Optional human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Router endpoint for direct and handshake traffic, e.g. `tcp://host:port`.
    pub router: String,
    /// Publish endpoint for broadcasts and keepalives.
    #[serde(rename = "pub")]
    pub pub_endpoint: String,
    /// This node's keepalive cadence.
    pub keepalive: KeepaliveAdvert,
    /// Advertised message types mapped to their reply policy.
    #[serde(default)]
    pub messages: HashMap<String, MessagePolicy>,
}

impl NodeDescriptor {
    /// Construct a descriptor with empty advertised messages.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        router: impl Into<String>,
        pub_endpoint: impl Into<String>,
        keepalive: KeepaliveAdvert,
    ) -> Self {
        Self {
            id: id.into(),
            name: None,
            router: router.into(),
            pub_endpoint: pub_endpoint.into(),
            keepalive,
            messages: HashMap::new(),
        }
    }

    /// Advertise a message type with the given policy, replacing any prior
    /// policy for that type.
    pub fn advertise(&mut self, ty: impl Into<String>, policy: MessagePolicy) {
        self.messages.insert(ty.into(), policy);
    }

    /// Withdraw a message type from the advertisement.
    pub fn withdraw(&mut self, ty: &str) {
        self.messages.remove(ty);
    }

    /// Whether this descriptor advertises the given message type.
    #[must_use]
    pub fn advertises(&self, ty: &str) -> bool {
        self.messages.contains_key(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertise_and_withdraw_round_trip() {
        let mut d = NodeDescriptor::new(
            "node-a",
            "tcp://127.0.0.1:5000",
            "tcp://127.0.0.1:5001",
            KeepaliveAdvert::default(),
        );
        assert!(!d.advertises("check-temp"));
        d.advertise("check-temp", MessagePolicy::new(500, 2));
        assert!(d.advertises("check-temp"));
        d.withdraw("check-temp");
        assert!(!d.advertises("check-temp"));
    }

    #[test]
    fn serializes_pub_field_without_underscore() {
        let d = NodeDescriptor::new(
            "node-a",
            "tcp://127.0.0.1:5000",
            "tcp://127.0.0.1:5001",
            KeepaliveAdvert::default(),
        );
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["pub"], "tcp://127.0.0.1:5001");
    }
}
