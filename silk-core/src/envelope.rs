//! The wire envelope: the single JSON-framed message type carried over both
//! the router and publish/subscribe sockets.
//!
//! An envelope is built and inspected as a structured value, then
//! serialized to bytes only when it actually crosses the wire (lazily, via
//! [`Envelope::to_bytes`]) — mirroring the way the transport layer treats
//! frames as opaque until something needs to look inside them.

use std::io;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Destination sentinel for a cluster-wide broadcast.
pub const DEST_ALL: &str = "_all";

/// Reserved message types implementing the membership and delivery protocol.
pub mod protocol_type {
    pub const JOIN: &str = "_join";
    pub const CONNECT: &str = "_connect";
    pub const LEAVE: &str = "_leave";
    pub const KEEPALIVE: &str = "_ka";
    pub const REPLY: &str = "_reply";
    pub const ACK: &str = "_ack";
    pub const HANDSHAKE: &str = "_handshake";
}

/// Whether a message type name is reserved for the protocol (starts with `_`).
#[must_use]
pub fn is_reserved_type(ty: &str) -> bool {
    ty.starts_with('_')
}

/// The wire envelope.
///
/// # Examples
///
/// ```
/// use silk_core::envelope::Envelope;
/// use serde_json::json;
///
/// let env = Envelope::new("msg-1", "node-a", "node-b", "check-temp")
///     .with_data(json!({ "gauge": "main" }));
/// assert_eq!(env.get("gauge"), Some(&json!("main")));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique message id, required on every envelope.
    pub id: String,
    /// Originating node id.
    pub src: String,
    /// Target node id, or [`DEST_ALL`] for a cluster broadcast.
    pub dest: String,
    /// Message type; a leading `_` identifies a protocol message.
    #[serde(rename = "type")]
    pub ty: String,
    /// Id of the message this one answers, present on `_reply` and `_ack`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Arbitrary structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    /// Construct an envelope with no payload.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        src: impl Into<String>,
        dest: impl Into<String>,
        ty: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            src: src.into(),
            dest: dest.into(),
            ty: ty.into(),
            parent: None,
            data: None,
        }
    }

    /// Attach a `parent` id, marking this envelope as an answer to another.
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Attach a structured payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Whether `ty` is one of the reserved protocol types.
    #[must_use]
    pub fn is_protocol(&self) -> bool {
        is_reserved_type(&self.ty)
    }

    /// Whether this envelope targets the cluster-wide broadcast sentinel.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.dest == DEST_ALL
    }

    /// Read a value out of `data` by dotted path, e.g. `"gauge"` or
    /// `"reading.unit"`. Returns `None` if any segment is missing or `data`
    /// is absent.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = self.data.as_ref()?;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current)
    }

    /// Write a value into `data` by dotted path, creating intermediate
    /// objects as needed. Replaces any non-object value found along the way.
    pub fn set(&mut self, path: &str, value: Value) {
        let root = self.data.get_or_insert_with(|| Value::Object(serde_json::Map::new()));
        let mut current = root;
        let segments: Vec<&str> = path.split('.').collect();
        for segment in &segments[..segments.len() - 1] {
            if !current.is_object() {
                *current = Value::Object(serde_json::Map::new());
            }
            let map = current.as_object_mut().expect("just ensured object");
            current = map
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
        }
        if !current.is_object() {
            *current = Value::Object(serde_json::Map::new());
        }
        let map = current.as_object_mut().expect("just ensured object");
        map.insert((*segments.last().expect("non-empty path")).to_string(), value);
    }

    /// Serialize this envelope to its wire bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload contains non-serializable data (never
    /// true for values built purely from `serde_json::Value`, but surfaced
    /// for callers who construct `data` programmatically).
    pub fn to_bytes(&self) -> io::Result<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Parse an envelope from wire bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not valid JSON, or the JSON object is
    /// missing a required field (`id`, `src`, `dest`, `type`).
    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_through_bytes() {
        let env = Envelope::new("msg-1", "node-a", "node-b", "check-temp")
            .with_data(json!({ "gauge": "main" }));
        let bytes = env.to_bytes().unwrap();
        let parsed = Envelope::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.id, env.id);
        assert_eq!(parsed.get("gauge"), Some(&json!("main")));
    }

    #[test]
    fn dotted_get_traverses_nested_objects() {
        let env = Envelope::new("msg-1", "node-a", "node-b", "reading")
            .with_data(json!({ "reading": { "unit": "C", "value": 23 } }));
        assert_eq!(env.get("reading.unit"), Some(&json!("C")));
        assert_eq!(env.get("reading.missing"), None);
    }

    #[test]
    fn dotted_set_creates_intermediate_objects() {
        let mut env = Envelope::new("msg-1", "node-a", "node-b", "reading");
        env.set("reading.unit", json!("C"));
        env.set("reading.value", json!(23));
        assert_eq!(env.get("reading.unit"), Some(&json!("C")));
        assert_eq!(env.get("reading.value"), Some(&json!(23)));
    }

    #[test]
    fn reserved_types_are_recognized() {
        let env = Envelope::new("msg-1", "node-a", "node-b", protocol_type::JOIN);
        assert!(env.is_protocol());
        let env = Envelope::new("msg-1", "node-a", "node-b", "check-temp");
        assert!(!env.is_protocol());
    }

    #[test]
    fn broadcast_dest_is_recognized() {
        let env = Envelope::new("msg-1", "node-a", DEST_ALL, "ping");
        assert!(env.is_broadcast());
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let result = Envelope::from_bytes(br#"{"id":"1","src":"a"}"#);
        assert!(result.is_err());
    }
}
