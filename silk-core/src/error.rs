/// Silk Error Types
///
/// Comprehensive error handling for all Silk operations.
use std::io;
use thiserror::Error;

/// Main error type for Silk operations
#[derive(Error, Debug)]
pub enum SilkError {
    /// IO error during socket or endpoint operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The underlying transport rejected a bind, connect, or send
    #[error("transport error: {0}")]
    Transport(String),

    /// Envelope (de)serialization failed
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Inbound bytes did not parse as a well-formed envelope.
    ///
    /// Logged and, where a reply path exists, the sender is notified; never
    /// raised to the embedder directly.
    #[error("bad payload: {0}")]
    BadPayload(String),

    /// `sendTo` targeted an id absent from the cluster view
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    /// `send(type, ...)` found no subscribers for `type`
    #[error("no subscribers for type: {0}")]
    NoSubscribers(String),

    /// No `_ack` arrived after all retry attempts were exhausted
    #[error("delivery failed after {attempts} attempt(s)")]
    DeliveryFailed { attempts: u32 },

    /// The destination of an in-flight request was evicted from the cluster view
    #[error("peer lost: {0}")]
    PeerLost(String),

    /// The node stopped while a callback was still outstanding
    #[error("node stopped")]
    NodeStopped,

    /// An endpoint failed to bind at start; fatal to that node
    #[error("bind failed on {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// Channel to the node's event loop was closed
    #[error("node channel closed")]
    ChannelClosed,
}

/// Result type alias for Silk operations
pub type Result<T> = std::result::Result<T, SilkError>;

impl SilkError {
    /// Create a bad-payload error with a message
    pub fn bad_payload(msg: impl Into<String>) -> Self {
        Self::BadPayload(msg.into())
    }

    /// Create an unknown-peer error for the given id
    pub fn unknown_peer(id: impl Into<String>) -> Self {
        Self::UnknownPeer(id.into())
    }

    /// Create a no-subscribers error for the given message type
    pub fn no_subscribers(ty: impl Into<String>) -> Self {
        Self::NoSubscribers(ty.into())
    }

    /// Create a peer-lost error for the given id
    pub fn peer_lost(id: impl Into<String>) -> Self {
        Self::PeerLost(id.into())
    }

    /// Check if this error is local/transient: it is handled where it
    /// occurred and never surfaced to a pending-reply callback
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::BadPayload(_))
    }

    /// Check if this error indicates the destination is no longer reachable
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::UnknownPeer(_) | Self::PeerLost(_) | Self::NodeStopped)
    }
}
