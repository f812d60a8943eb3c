//! Slow-joiner mitigation: a short startup buffer for outbound broadcasts.
//!
//! A PUB socket drops any message published before a given SUB socket's
//! connection handshake completes; there is no negative acknowledgement,
//! so a subscriber that connects a few milliseconds late silently misses
//! early keepalives and `_connect` replies. Buffering broadcasts for a
//! short warm-up window after bind and flushing them once it elapses is a
//! property of the PUB/SUB transport, kept verbatim rather than redesigned.

use std::time::{Duration, Instant};

use bytes::Bytes;

/// Buffers broadcasts published during a node's startup window, then
/// releases them in order once the window elapses.
#[derive(Debug)]
pub struct SlowJoinerBuffer {
    deadline: Instant,
    buffered: Vec<Bytes>,
}

impl SlowJoinerBuffer {
    /// Start a new buffering window of `delay` from now.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { deadline: Instant::now() + delay, buffered: Vec::new() }
    }

    /// Whether the warm-up window has elapsed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Submit a payload: buffered while the window is open, passed straight
    /// through once it has elapsed (the `Some` return value is the payload
    /// to publish immediately; `None` means it was buffered).
    pub fn submit(&mut self, payload: Bytes) -> Option<Bytes> {
        if self.is_open() {
            Some(payload)
        } else {
            self.buffered.push(payload);
            None
        }
    }

    /// Drain every buffered payload in arrival order. Call once the window
    /// has elapsed to flush what accumulated during warm-up.
    pub fn drain(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.buffered)
    }
}
