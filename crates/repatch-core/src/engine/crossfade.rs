//! Two-slot program bank and crossfade state machine
//!
//! Exactly two program slots exist; the renderer only ever dereferences
//! the active one, and the cross-thread handoff only ever writes the
//! standby one. A swap is a fixed-length linear envelope in two chained
//! legs: the old program fades out, the active index flips, then the new
//! program fades in. The flip is the only place the index changes.

use crate::voice::VoicePool;

/// Which leg of the envelope is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FadeDirection {
    FadeOut,
    FadeIn,
}

/// Per-sample crossfade envelope
///
/// While fading, the per-sample gain is `remaining / duration` on the way
/// out and its complement on the way in; `remaining == 0` terminates a
/// leg. Both legs of one swap use the duration captured when the swap was
/// armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Crossfader {
    Stable,
    Fading {
        direction: FadeDirection,
        remaining: u32,
        duration: u32,
    },
}

impl Crossfader {
    pub(crate) fn new() -> Self {
        Crossfader::Stable
    }

    pub(crate) fn is_stable(&self) -> bool {
        matches!(self, Crossfader::Stable)
    }

    /// Samples left in the current leg, if one is running
    pub(crate) fn remaining(&self) -> Option<u32> {
        match self {
            Crossfader::Stable => None,
            Crossfader::Fading { remaining, .. } => Some(*remaining),
        }
    }

    pub(crate) fn direction(&self) -> Option<FadeDirection> {
        match self {
            Crossfader::Stable => None,
            Crossfader::Fading { direction, .. } => Some(*direction),
        }
    }

    /// Arm the fade-out leg of a new swap
    ///
    /// `duration` of zero means an instant swap; callers must flip
    /// immediately instead of arming.
    pub(crate) fn arm_fade_out(&mut self, duration: u32) {
        debug_assert!(duration > 0);
        *self = Crossfader::Fading {
            direction: FadeDirection::FadeOut,
            remaining: duration,
            duration,
        };
    }

    /// Re-arm for the fade-in leg, reusing the captured duration
    pub(crate) fn arm_fade_in(&mut self) {
        if let Crossfader::Fading { direction, remaining, duration } = self {
            *direction = FadeDirection::FadeIn;
            *remaining = *duration;
        }
    }

    pub(crate) fn settle(&mut self) {
        *self = Crossfader::Stable;
    }

    /// Gain multiplier for the next sample; advances the envelope
    #[inline]
    pub(crate) fn step(&mut self) -> f32 {
        match self {
            Crossfader::Stable => 1.0,
            Crossfader::Fading { direction, remaining, duration } => {
                let gain = *remaining as f32 / *duration as f32;
                *remaining = remaining.saturating_sub(1);
                match direction {
                    FadeDirection::FadeOut => gain,
                    FadeDirection::FadeIn => 1.0 - gain,
                }
            }
        }
    }
}

/// The two program slots and the active index
pub(crate) struct ProgramSlots {
    slots: [Option<Box<VoicePool>>; 2],
    active: usize,
}

impl ProgramSlots {
    pub(crate) fn new() -> Self {
        Self {
            slots: [None, None],
            active: 0,
        }
    }

    pub(crate) fn active_mut(&mut self) -> Option<&mut VoicePool> {
        self.slots[self.active].as_deref_mut()
    }

    pub(crate) fn has_active(&self) -> bool {
        self.slots[self.active].is_some()
    }

    /// Install a freshly compiled pool into the standby slot
    ///
    /// Returns whatever the standby slot previously held so the caller
    /// can retire it; the active slot is untouched.
    pub(crate) fn install_standby(&mut self, pool: Box<VoicePool>) -> Option<Box<VoicePool>> {
        self.slots[1 - self.active].replace(pool)
    }

    /// Flip the active index, returning the displaced program for
    /// retirement
    pub(crate) fn flip(&mut self) -> Option<Box<VoicePool>> {
        self.active = 1 - self.active;
        self.slots[1 - self.active].take()
    }
}
