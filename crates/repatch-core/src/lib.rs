//! Repatch Core - real-time hosting for live-compiled DSP patches
//!
//! Patch source is compiled on a background thread by an opaque JIT
//! backend and hot-swapped into the audio path through a timed two-slot
//! crossfade, while a voice pool multiplexes note events onto per-voice
//! instances of the compiled program. The audio thread never allocates,
//! blocks, or touches the compiler.

pub mod code_channel;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod event;
pub mod state;
pub mod types;
pub mod voice;

pub use engine::{spawn, EngineConfig, EngineHandle, Notification, PatchProcessor};
pub use error::{EngineError, EngineResult};
pub use event::{EventBody, TimedEvent};
pub use state::PatchState;
pub use types::*;
