//! Subscription table: per message type, the ordered handlers registered
//! with `on`, plus the reply policy this node advertises for that type.
//!
//! This replaces an event-emitter-as-router: the type is the key, and
//! handlers are stored together with their policy metadata rather than in a
//! separate structure a dispatcher would have to cross-reference.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use silk_core::descriptor::MessagePolicy;
use silk_core::envelope::Envelope;

/// A registered message handler.
///
/// Takes the inbound envelope and a [`ReplyContext`] used to answer it, if
/// the caller chooses to.
pub type Handler = Arc<dyn Fn(&Envelope, &ReplyContext) + Send + Sync>;

/// Handle returned by [`SubscriptionTable::register`], used to remove one
/// specific handler via `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

impl HandlerId {
    fn fresh() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Lets a handler emit a `_reply` without reaching back into the node.
///
/// Constructed by the dispatcher for the duration of one handler
/// invocation; cloning is cheap and keeping it past that invocation is
/// harmless but pointless since the originating envelope is gone.
#[derive(Clone)]
pub struct ReplyContext {
    sender: flume::Sender<(Envelope, serde_json::Value)>,
    original: Envelope,
}

impl ReplyContext {
    /// Construct a reply context for `original`, delivering replies to
    /// `sender` for the dispatcher to forward on the wire.
    #[must_use]
    pub fn new(original: Envelope, sender: flume::Sender<(Envelope, serde_json::Value)>) -> Self {
        Self { sender, original }
    }

    /// Emit a `_reply` carrying `data`, addressed back to the sender of the
    /// message this context answers.
    pub fn reply(&self, data: serde_json::Value) {
        let _ = self.sender.send((self.original.clone(), data));
    }
}

struct TypeEntry {
    policy: MessagePolicy,
    handlers: Vec<(HandlerId, Handler)>,
}

/// Per-type ordered handler lists plus this node's advertised reply policy.
#[derive(Default)]
pub struct SubscriptionTable {
    types: HashMap<String, TypeEntry>,
}

impl SubscriptionTable {
    /// Construct an empty subscription table.
    #[must_use]
    pub fn new() -> Self {
        Self { types: HashMap::new() }
    }

    /// Register a handler for `ty`, recording `policy` as this node's
    /// advertised reply policy for the type (overwriting any prior policy).
    pub fn register(&mut self, ty: impl Into<String>, policy: MessagePolicy, handler: Handler) -> HandlerId {
        let id = HandlerId::fresh();
        let entry = self.types.entry(ty.into()).or_insert_with(|| TypeEntry { policy, handlers: Vec::new() });
        entry.policy = policy;
        entry.handlers.push((id, handler));
        id
    }

    /// Remove one handler by id. Returns the type it was withdrawn from, if
    /// that was the last handler registered for it.
    pub fn remove_handler(&mut self, id: HandlerId) -> Option<String> {
        let mut emptied = None;
        self.types.retain(|ty, entry| {
            entry.handlers.retain(|(hid, _)| *hid != id);
            if entry.handlers.is_empty() {
                emptied = Some(ty.clone());
                false
            } else {
                true
            }
        });
        emptied
    }

    /// Remove every handler for `ty`. The type is withdrawn.
    pub fn remove_type(&mut self, ty: &str) {
        self.types.remove(ty);
    }

    /// Remove every handler for every type.
    pub fn clear(&mut self) {
        self.types.clear();
    }

    /// Handlers currently registered for `ty`, in registration order.
    #[must_use]
    pub fn handlers_for(&self, ty: &str) -> Vec<Handler> {
        self.types.get(ty).map(|e| e.handlers.iter().map(|(_, h)| h.clone()).collect()).unwrap_or_default()
    }

    /// Whether any handler is registered for `ty`.
    #[must_use]
    pub fn has_handlers(&self, ty: &str) -> bool {
        self.types.get(ty).is_some_and(|e| !e.handlers.is_empty())
    }

    /// Currently advertised types and their reply policies, for stamping
    /// onto this node's descriptor.
    pub fn advertised(&self) -> impl Iterator<Item = (&str, MessagePolicy)> {
        self.types.iter().map(|(ty, e)| (ty.as_str(), e.policy))
    }
}
