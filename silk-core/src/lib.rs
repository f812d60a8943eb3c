//! Silk Core
//!
//! Runtime-agnostic building blocks shared by the transport adapter and the
//! node engine:
//! - The wire envelope with lazy (de)serialization (`envelope`)
//! - The envelope factory that stamps defaults onto outbound envelopes (`factory`)
//! - The node descriptor and per-type message policy (`descriptor`)
//! - Constructor-only configuration (`options`)
//! - Retry/backoff profiles for pending acknowledgements (`retry`)
//! - Transport endpoint parsing (`endpoint`)
//! - Error types (`error`)
//! - Lifecycle event types (`events`)
//! - Fresh-id generation, injected rather than a hidden global (`id`)

#![allow(clippy::module_name_repetitions)]

pub mod descriptor;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod events;
pub mod factory;
pub mod id;
pub mod options;
pub mod retry;

pub mod prelude {
    pub use crate::descriptor::{MessagePolicy, NodeDescriptor};
    pub use crate::endpoint::Endpoint;
    pub use crate::envelope::Envelope;
    pub use crate::error::{Result, SilkError};
    pub use crate::events::NodeEvent;
    pub use crate::factory::EnvelopeFactory;
    pub use crate::id::{IdGenerator, UuidGenerator};
    pub use crate::options::{KeepaliveOptions, NodeOptions};
    pub use crate::retry::{RetryProfile, RetryState};
}
