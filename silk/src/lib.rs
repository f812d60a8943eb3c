//! # Silk
//!
//! A brokerless peer-to-peer messaging fabric.
//!
//! Nodes gossip membership directly over ZeroMQ ROUTER and PUB/SUB sockets —
//! there is no broker, no discovery service, and no central registry. A node
//! joins a cluster by reaching any one existing member; from there it learns
//! the rest of the cluster directly from its peers.
//!
//! ## Sends
//!
//! - [`NodeHandle::send_to`] / [`NodeHandle::request_to`] — direct, addressed
//!   to one known peer id
//! - [`NodeHandle::send`] / [`NodeHandle::request`] — load-balanced, to one
//!   peer chosen at random among those advertising a message type
//! - [`NodeHandle::send_all`] / [`NodeHandle::request_all`] — broadcast to
//!   every peer
//!
//! Every variant has a fire-and-forget form and a request form that returns
//! a reply channel; broadcasts' request form collects replies from however
//! many peers respond within a window.
//!
//! ## Delivery
//!
//! Sends to a specific destination (direct or load-balanced) are
//! acknowledged and retried with backoff until an `_ack` arrives or the
//! attempt budget is exhausted, at which point the caller sees
//! [`silk_core::error::SilkError::DeliveryFailed`]. Broadcasts are
//! fire-and-forget at the transport level: PUB/SUB has no per-subscriber
//! acknowledgement.
//!
//! ## Membership
//!
//! Failure detection is via periodic `_ka` keepalives: a peer not heard
//! from within `period * missed_periods` is pruned from the cluster view.
//! A graceful [`NodeHandle::stop`] publishes `_leave` first, so well-behaved
//! peers are removed immediately rather than waiting out the keepalive
//! deadline.
//!
//! ```no_run
//! use silk::node::NodeHandle;
//! use silk_core::options::NodeOptions;
//!
//! # #[compio::main]
//! # async fn main() -> silk_core::error::Result<()> {
//! let (node, _events) = NodeHandle::new(NodeOptions::new("tcp://127.0.0.1:5000", "tcp://127.0.0.1:5001"));
//! node.start().await?;
//! node.on("check-temp", Default::default(), std::sync::Arc::new(|_env, ctx| {
//!     ctx.reply(serde_json::json!({ "temp": 21.5 }));
//! })).await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::future_not_send)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

pub mod cluster;
pub mod dispatch;
pub mod handshake;
pub mod keepalive;
pub mod node;
pub mod pending_ack;
pub mod pending_reply;
pub mod subscription;

pub use node::{NodeHandle, NodeState};
pub use pending_reply::ReplyOutcome;
pub use silk_core::descriptor::{KeepaliveAdvert, MessagePolicy, NodeDescriptor};
pub use silk_core::envelope::Envelope;
pub use silk_core::error::{Result, SilkError};
pub use silk_core::events::{NodeEvent, NodeEventReceiver, PeerRemovedReason};
pub use silk_core::options::{KeepaliveOptions, NodeOptions};
pub use subscription::{Handler, HandlerId, ReplyContext};

/// Development helpers (tests and examples opt into structured logging).
pub mod dev_tracing;

/// Convenient bundle of the types most call sites need.
pub mod prelude {
    pub use crate::{
        Envelope, Handler, HandlerId, KeepaliveAdvert, KeepaliveOptions, MessagePolicy, NodeDescriptor, NodeEvent,
        NodeEventReceiver, NodeHandle, NodeOptions, NodeState, PeerRemovedReason, ReplyContext, ReplyOutcome, Result,
        SilkError,
    };
}
