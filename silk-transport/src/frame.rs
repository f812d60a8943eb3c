//! ROUTER envelope framing: `[identity, empty-delimiter, payload]`.
//!
//! libzmq's ROUTER socket type prepends the sender's routing identity as an
//! implicit first frame on receive, and expects it back as the first frame
//! on send so it knows where to route the reply. The empty delimiter frame
//! separates that transport-level addressing from the application payload,
//! matching the wire shape libzmq's own DEALER/ROUTER pair produces.

use bytes::Bytes;

use silk_core::error::{Result, SilkError};

/// One ROUTER-framed message: the sender's identity plus its payload.
#[derive(Debug, Clone)]
pub struct RouterFrame {
    /// Transport-level routing identity of the peer this frame is to/from.
    pub identity: Bytes,
    /// Application payload: a serialized envelope.
    pub payload: Bytes,
}

impl RouterFrame {
    /// Construct a frame from an identity and a payload.
    #[must_use]
    pub const fn new(identity: Bytes, payload: Bytes) -> Self {
        Self { identity, payload }
    }

    /// Split raw multipart frames as received from a ROUTER socket into an
    /// identity and payload, dropping the empty delimiter between them.
    ///
    /// # Errors
    ///
    /// Returns [`SilkError::BadPayload`] if fewer than 3 frames arrived or
    /// the delimiter frame is non-empty.
    pub fn from_multipart(mut frames: Vec<Bytes>) -> Result<Self> {
        if frames.len() < 3 {
            return Err(SilkError::bad_payload(format!(
                "expected [identity, delimiter, payload], got {} frame(s)",
                frames.len()
            )));
        }
        let payload = frames.pop().expect("length checked above");
        let delimiter = frames.pop().expect("length checked above");
        if !delimiter.is_empty() {
            return Err(SilkError::bad_payload("non-empty delimiter frame"));
        }
        let identity = frames.pop().expect("length checked above");
        Ok(Self { identity, payload })
    }

    /// Render this frame as the multipart frames a ROUTER socket expects on
    /// send: `[identity, empty, payload]`.
    #[must_use]
    pub fn into_multipart(self) -> Vec<Bytes> {
        vec![self.identity, Bytes::new(), self.payload]
    }
}
