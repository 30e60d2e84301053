//! Lock-free source-code channel between the audio and compile threads
//!
//! The audio thread intercepts patch-source property changes and must hand
//! the new source to the compile thread without blocking or allocating.
//! This channel frames the source bytes (length prefix + payload) over a
//! fixed-capacity SPSC byte ring sized for one maximum-length patch, so at
//! most one edit is in flight at a time. A full ring is a soft error: the
//! write fails, the edit is dropped, and the user retries by editing again.

use rtrb::{Consumer, Producer, RingBuffer};

use crate::error::{EngineError, EngineResult};
use crate::types::CODE_CAPACITY;

/// Length prefix stored before each frame's payload
const FRAME_HEADER: usize = std::mem::size_of::<u32>();

/// Create a code channel (producer/consumer pair)
///
/// Returns `(CodeWriter, CodeReader)` where the writer belongs to the
/// audio thread and the reader to the compile thread. Capacity covers
/// exactly one maximum-length patch.
pub fn code_channel() -> (CodeWriter, CodeReader) {
    let (producer, consumer) = RingBuffer::new(CODE_CAPACITY + FRAME_HEADER);
    (CodeWriter { ring: producer }, CodeReader { ring: consumer })
}

/// Audio-thread side: submits source bytes without blocking
pub struct CodeWriter {
    ring: Producer<u8>,
}

impl CodeWriter {
    /// Copy `source` into the channel
    ///
    /// Returns `false` when the channel has no room (a previous edit is
    /// still in flight or the source exceeds [`CODE_CAPACITY`]); nothing
    /// is enqueued in that case. Never blocks, never allocates.
    pub fn write(&mut self, source: &str) -> bool {
        let bytes = source.as_bytes();
        let needed = bytes.len() + FRAME_HEADER;

        let Ok(chunk) = self.ring.write_chunk_uninit(needed) else {
            return false;
        };

        let header = (bytes.len() as u32).to_le_bytes();
        let written = chunk.fill_from_iter(header.iter().copied().chain(bytes.iter().copied()));
        debug_assert_eq!(written, needed);
        true
    }
}

/// Compile-thread side: polls for submitted source
pub struct CodeReader {
    ring: Consumer<u8>,
}

impl CodeReader {
    /// Read the oldest complete frame, if any
    ///
    /// Frames are committed atomically by the writer, so a well-formed
    /// channel either has a whole frame or nothing. A frame whose declared
    /// length cannot be satisfied is malformed: the channel is drained and
    /// an error returned, leaving the stream clean for the next edit.
    pub fn try_read(&mut self) -> EngineResult<Option<String>> {
        if self.ring.slots() < FRAME_HEADER {
            return Ok(None);
        }

        let mut header = [0u8; FRAME_HEADER];
        let Ok(chunk) = self.ring.read_chunk(FRAME_HEADER) else {
            return Ok(None);
        };
        let (first, second) = chunk.as_slices();
        for (dst, src) in header.iter_mut().zip(first.iter().chain(second.iter())) {
            *dst = *src;
        }
        chunk.commit_all();

        let len = u32::from_le_bytes(header) as usize;
        if len > CODE_CAPACITY || self.ring.slots() < len {
            let available = self.ring.slots();
            self.drain();
            return Err(EngineError::MalformedFrame(format!(
                "frame declares {} bytes but {} are available",
                len, available
            )));
        }

        let Ok(chunk) = self.ring.read_chunk(len) else {
            return Ok(None);
        };
        let (first, second) = chunk.as_slices();
        let mut bytes = Vec::with_capacity(len);
        bytes.extend_from_slice(first);
        bytes.extend_from_slice(second);
        chunk.commit_all();

        match String::from_utf8(bytes) {
            Ok(source) => Ok(Some(source)),
            Err(e) => Err(EngineError::MalformedFrame(format!(
                "frame payload is not valid UTF-8: {}",
                e
            ))),
        }
    }

    /// Discard everything currently in the channel
    fn drain(&mut self) {
        let pending = self.ring.slots();
        if pending > 0 {
            if let Ok(chunk) = self.ring.read_chunk(pending) {
                chunk.commit_all();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_roundtrip() {
        let (mut tx, mut rx) = code_channel();

        assert!(tx.write("process = _;"));
        let read = rx.try_read().unwrap();
        assert_eq!(read.as_deref(), Some("process = _;"));

        // Channel is empty again
        assert!(rx.try_read().unwrap().is_none());
    }

    #[test]
    fn test_overflow_returns_false() {
        let (mut tx, mut rx) = code_channel();
        let big = "x".repeat(CODE_CAPACITY);

        assert!(tx.write(&big));
        // A second maximum-length edit cannot fit while the first is in flight
        assert!(!tx.write(&big));

        // Draining the first frees the slot
        assert_eq!(rx.try_read().unwrap().as_deref(), Some(big.as_str()));
        assert!(tx.write(&big));
    }

    #[test]
    fn test_oversized_source_rejected() {
        let (mut tx, _rx) = code_channel();
        let too_big = "x".repeat(CODE_CAPACITY + 1);
        assert!(!tx.write(&too_big));
    }

    #[test]
    fn test_small_edits_queue_in_order() {
        let (mut tx, mut rx) = code_channel();

        assert!(tx.write("a"));
        assert!(tx.write("b"));
        assert_eq!(rx.try_read().unwrap().as_deref(), Some("a"));
        assert_eq!(rx.try_read().unwrap().as_deref(), Some("b"));
        assert!(rx.try_read().unwrap().is_none());
    }

    #[test]
    fn test_empty_source() {
        let (mut tx, mut rx) = code_channel();
        assert!(tx.write(""));
        assert_eq!(rx.try_read().unwrap().as_deref(), Some(""));
    }
}
