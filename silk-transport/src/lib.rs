//! # Silk Transport
//!
//! **Internal transport adapter crate for Silk.**
//!
//! This crate wraps the ROUTER and PUB/SUB socket types from the `zmq`
//! crate (bindings to `libzmq`) behind a small async-friendly surface: a
//! dedicated OS thread owns each `libzmq` socket and bridges its blocking
//! `recv`/`send` calls onto [`flume`] channels the node engine can await
//! from its `compio` event loop with `futures::select!`.
//!
//! The ZMTP wire protocol, handshake, and security mechanisms are `libzmq`'s
//! concern; this crate never reimplements them. For application
//! development, use the `silk` crate's public API.
//!
//! ## Socket Types (Internal API)
//!
//! - **ROUTER**: identity-addressed duplex socket for direct messages and
//!   the membership handshake ([`router_socket::RouterSocket`])
//! - **PUB** / **SUB**: one-to-many fan-out for broadcasts and keepalives
//!   ([`pubsub_socket::PubSocket`], [`pubsub_socket::SubSocket`])
//!
//! ## Features
//!
//! - **Zero-copy framing**: frames use `Bytes` for efficient sharing
//! - **Interoperable**: backed by `libzmq`, interoperates with any ZMTP peer
//! - **Slow-joiner mitigation**: a short publish buffer at startup
//!   ([`slow_joiner::SlowJoinerBuffer`])

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod frame;
pub mod pubsub_socket;
pub mod router_socket;
pub mod slow_joiner;

pub use frame::RouterFrame;
pub use pubsub_socket::{PubSocket, SubSocket};
pub use router_socket::{RouterParams, RouterSocket};
pub use slow_joiner::SlowJoinerBuffer;

/// Prelude module for convenient imports.
///
/// ```rust
/// use silk_transport::prelude::*;
/// ```
pub mod prelude {
    pub use super::{PubSocket, RouterFrame, RouterParams, RouterSocket, SlowJoinerBuffer, SubSocket};
    pub use bytes::Bytes;
}
