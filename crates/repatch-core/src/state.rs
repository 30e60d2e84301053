//! Host-visible property state
//!
//! The typed view of everything the host can automate or persist: the
//! patch source, the last compiler diagnostic, the crossfade duration,
//! and the 16 normalized generic controls. The processor keeps the live
//! copy; snapshots serialize through `serde_json` and restoring the
//! source re-triggers compilation exactly like a live edit.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::types::{CODE_CAPACITY, DEFAULT_CROSSFADE_MS, ERROR_CAPACITY, NUM_CONTROLS};

/// The property surface of one plugin instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatchState {
    /// Patch source; changing it triggers a background recompilation
    pub code: String,
    /// Last compiler diagnostic (read-only for the host, empty when the
    /// last compile succeeded)
    pub error: String,
    /// Crossfade duration in milliseconds; applies to the next swap
    pub crossfade_duration_ms: u32,
    /// Normalized generic control values
    pub controls: [f32; NUM_CONTROLS],
}

impl Default for PatchState {
    fn default() -> Self {
        Self {
            // Pre-allocated so live edits never grow these on the audio thread
            code: String::with_capacity(CODE_CAPACITY),
            error: String::with_capacity(ERROR_CAPACITY),
            crossfade_duration_ms: DEFAULT_CROSSFADE_MS,
            controls: [0.0; NUM_CONTROLS],
        }
    }
}

impl PatchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `source` into the code property, truncating at capacity
    pub(crate) fn set_code(&mut self, source: &str) {
        copy_truncated(&mut self.code, source, CODE_CAPACITY);
    }

    /// Copy `message` into the error property, truncating at capacity
    pub(crate) fn set_error(&mut self, message: &str) {
        copy_truncated(&mut self.error, message, ERROR_CAPACITY);
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Persist to a file as JSON
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Load a previously saved state
    pub fn load(path: &Path) -> EngineResult<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

/// Clear `dst` and refill it from `src`, keeping at most `capacity` bytes
/// on a character boundary
fn copy_truncated(dst: &mut String, src: &str, capacity: usize) {
    dst.clear();
    let mut end = src.len().min(capacity);
    while !src.is_char_boundary(end) {
        end -= 1;
    }
    dst.push_str(&src[..end]);
}
