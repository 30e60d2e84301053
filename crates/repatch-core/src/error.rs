//! Error types for the patch hosting core
//!
//! Every category here is a soft error: it is logged, the triggering
//! operation is dropped, and audio rendering continues. Nothing in this
//! taxonomy stops the render loop or crashes the process.

use thiserror::Error;

use crate::compiler::CompileError;

/// Errors that can occur while hosting patches
#[derive(Debug, Error)]
pub enum EngineError {
    /// The code channel had no room for the submitted source; the edit is
    /// dropped and the user must re-submit
    #[error("code channel overflow - edit dropped")]
    ChannelOverflow,

    /// A cross-thread frame did not match its declared size; the frame is
    /// dropped
    #[error("malformed cross-thread frame: {0}")]
    MalformedFrame(String),

    /// Compilation or instantiation of a patch failed
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Property state (de)serialization failed
    #[error("state serialization failed: {0}")]
    State(#[from] serde_json::Error),

    /// IO error while persisting or loading property state
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::ChannelOverflow;
        assert!(err.to_string().contains("overflow"));

        let err = EngineError::MalformedFrame("frame len 12 exceeds 4".into());
        assert!(err.to_string().contains("malformed"));
    }
}
