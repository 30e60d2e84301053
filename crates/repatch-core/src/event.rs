//! Timestamped render-call events
//!
//! The host delivers property changes and performance input as an ordered
//! event list alongside each render call. Every event carries a frame
//! offset within the call; the processor renders up to that offset before
//! applying the event, which makes parameter changes and note triggers
//! sample-accurate.
//!
//! Payloads are borrowed so building an event never copies the patch
//! source or allocates on the audio thread.

/// Event payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventBody<'a> {
    /// The patch source changed; triggers a background recompilation
    Code(&'a str),
    /// One of the 16 indexed generic controls changed (normalized 0.0-1.0)
    Control { index: usize, value: f32 },
    /// The crossfade duration property changed; applies to the next swap
    CrossfadeDuration { ms: u32 },
    /// Note-on performance event
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Note-off performance event
    NoteOff { channel: u8, note: u8 },
}

/// An event with its frame offset within the current render call
///
/// Offsets must be non-decreasing across the event list and must not
/// exceed the call's frame count; offsets are clamped to the block length
/// by the processor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedEvent<'a> {
    pub frames: u32,
    pub body: EventBody<'a>,
}

impl<'a> TimedEvent<'a> {
    /// Create an event at the given frame offset
    pub fn new(frames: u32, body: EventBody<'a>) -> Self {
        Self { frames, body }
    }
}
