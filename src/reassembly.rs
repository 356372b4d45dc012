//! WebSocket frame reassembly.
//!
//! Joins payloads delivered across multiple fragments into a single message.
//! `tokio-tungstenite` (which `axum`'s WebSocket extractor is built on) already
//! defragments continuation frames before handing a complete [`Message::Text`]
//! to the application, so in production wiring every call arrives with
//! `final = true` in one shot. [`FrameReassembler`] is kept as an explicit,
//! independently testable component because its capacity-failure behavior is a
//! documented part of the protocol (see the crate's cloud-variable message
//! flow), not an implementation detail of whichever WebSocket crate is in use.

use crate::buffer::{BoundedBuffer, BufferError};
use crate::protocol::{MAX_VARIABLE_NAME_LENGTH, MAX_VARIABLE_VALUE_LENGTH};

/// Padding added to the largest legal single message to account for JSON
/// framing (`{"method":"set","name":"...","value":...}` overhead).
const FRAMING_PADDING: usize = 100;

/// The largest legal single protocol message.
pub const MAX_MESSAGE_LENGTH: usize = MAX_VARIABLE_NAME_LENGTH + MAX_VARIABLE_VALUE_LENGTH + FRAMING_PADDING;

/// Why a fragment could not be reassembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblyError {
    /// The accumulated payload would exceed [`MAX_MESSAGE_LENGTH`].
    Full,
    /// Allocation failed while growing the rx buffer.
    Oom,
}

impl From<BufferError> for ReassemblyError {
    fn from(e: BufferError) -> Self {
        match e {
            BufferError::Full => Self::Full,
            BufferError::Oom => Self::Oom,
        }
    }
}

/// Accumulates fragments for one connection until a final fragment completes
/// a message.
pub struct FrameReassembler {
    rx: BoundedBuffer,
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self {
            rx: BoundedBuffer::new(MAX_MESSAGE_LENGTH),
        }
    }

    /// Feed one fragment. Returns `Ok(Some(message))` when `final_fragment` is
    /// true and a complete message is available, `Ok(None)` if more fragments
    /// are needed. On error the rx buffer is cleared before returning, so the
    /// reassembler is immediately usable for the next message (though callers
    /// that hit an error pre-handshake should treat it as fatal per the
    /// protocol's error regime).
    pub fn push(
        &mut self,
        payload: &[u8],
        final_fragment: bool,
    ) -> Result<Option<Vec<u8>>, ReassemblyError> {
        if !final_fragment {
            if let Err(e) = self.rx.push(payload) {
                self.rx.clear();
                return Err(e.into());
            }
            return Ok(None);
        }

        if self.rx.is_empty() {
            return Ok(Some(payload.to_vec()));
        }

        if let Err(e) = self.rx.push(payload) {
            self.rx.clear();
            return Err(e.into());
        }

        let message = self.rx.as_slice().to_vec();
        self.rx.clear();
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_final_fragment_delivers_directly() {
        let mut r = FrameReassembler::new();
        let msg = r.push(b"hello", true).unwrap();
        assert_eq!(msg, Some(b"hello".to_vec()));
    }

    #[test]
    fn split_message_reassembles_to_same_bytes() {
        let full = br#"{"method":"handshake","user":"alice","project_id":"p1"}"#;
        let mid = full.len() / 2;

        let mut split = FrameReassembler::new();
        assert_eq!(split.push(&full[..mid], false).unwrap(), None);
        let reassembled = split.push(&full[mid..], true).unwrap().unwrap();

        let mut whole = FrameReassembler::new();
        let single_shot = whole.push(full, true).unwrap().unwrap();

        assert_eq!(reassembled, single_shot);
        assert_eq!(reassembled, full);
    }

    #[test]
    fn many_fragments_reassemble_correctly() {
        let full = b"the quick brown fox jumps over the lazy dog";
        let mut r = FrameReassembler::new();
        for chunk in full.chunks(3) {
            let is_last = std::ptr::eq(
                chunk.as_ptr_range().end,
                full.as_ptr_range().end,
            );
            let result = r.push(chunk, is_last).unwrap();
            if is_last {
                assert_eq!(result, Some(full.to_vec()));
            } else {
                assert_eq!(result, None);
            }
        }
    }

    #[test]
    fn oversize_partial_fails_full_and_clears_buffer() {
        let mut r = FrameReassembler::new();
        let chunk = vec![b'a'; MAX_MESSAGE_LENGTH + 1];
        assert_eq!(r.push(&chunk, false), Err(ReassemblyError::Full));
        // Buffer was cleared; a fresh small message still works.
        assert_eq!(r.push(b"ok", true), Ok(Some(b"ok".to_vec())));
    }

    #[test]
    fn delivery_failure_clears_rx_buffer() {
        let mut r = FrameReassembler::new();
        r.push(b"partial", false).unwrap();
        let huge = vec![b'b'; MAX_MESSAGE_LENGTH];
        assert_eq!(r.push(&huge, true), Err(ReassemblyError::Full));
        assert_eq!(r.push(b"next", true), Ok(Some(b"next".to_vec())));
    }
}
