//! Protocol dispatcher: the single entry point both the router and
//! subscribe sockets feed inbound envelopes through.
//!
//! | type | action |
//! |---|---|
//! | `_join` | merge sender's descriptor; reply with `{cluster, me}`; ack |
//! | `_connect` | merge sender's descriptor; reply with self descriptor; ack |
//! | `_leave` | remove sender from cluster view; no reply, no ack |
//! | `_ka` | refresh sender's liveness deadline |
//! | `_ack` | fulfill the pending-ack entry for `parent` |
//! | `_reply` | deliver to the pending-reply entry for `parent` |
//! | _other_ | deliver to every subscribed handler; ack per policy |
//!
//! This module only classifies; the node engine performs the actual state
//! mutation and I/O, so the classification itself stays unit-testable
//! without a running transport.

use silk_core::envelope::{protocol_type, Envelope};

/// What the node engine should do with one inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Join,
    Connect,
    Leave,
    Keepalive,
    Ack,
    Reply,
    Application,
}

/// Classify an already-validated envelope (required fields present).
#[must_use]
pub fn classify(envelope: &Envelope) -> Decision {
    match envelope.ty.as_str() {
        protocol_type::JOIN => Decision::Join,
        protocol_type::CONNECT => Decision::Connect,
        protocol_type::LEAVE => Decision::Leave,
        protocol_type::KEEPALIVE => Decision::Keepalive,
        protocol_type::ACK => Decision::Ack,
        protocol_type::REPLY => Decision::Reply,
        _ => Decision::Application,
    }
}
