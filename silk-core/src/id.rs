//! Fresh-id generation.
//!
//! Every node and every message needs a fresh unique id. Rather than a
//! hidden module-level generator, the generator is a small injectable trait:
//! production code uses [`UuidGenerator`], tests can substitute a
//! deterministic sequence.

use uuid::Uuid;

/// Produces fresh unique ids as textual strings.
pub trait IdGenerator: Send + Sync {
    /// Generate a new id.
    fn next_id(&self) -> String;
}

/// Generates random 128-bit ids rendered in hyphenated textual form.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::IdGenerator;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Deterministic sequential id generator for tests: `"id-0"`, `"id-1"`, ...
    #[derive(Debug, Default)]
    pub struct SequentialGenerator(AtomicU64);

    impl IdGenerator for SequentialGenerator {
        fn next_id(&self) -> String {
            format!("id-{}", self.0.fetch_add(1, Ordering::Relaxed))
        }
    }
}
