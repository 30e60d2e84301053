//! Shared harness for the end-to-end tests
//!
//! Runs the engine against the deterministic stub backend at a 1 kHz
//! sample rate so millisecond durations equal sample counts and every
//! envelope value is an exact binary fraction.

#![allow(dead_code)]

use std::time::Duration;

use repatch_core::compiler::stub::StubCompiler;
use repatch_core::{
    spawn, ChannelLayout, EngineConfig, EngineHandle, EventBody, Notification, PatchProcessor,
    TimedEvent,
};

/// 1 ms per sample keeps fade arithmetic integral
pub const RATE: u32 = 1000;

/// Fade legs of exactly 8 samples
pub const FADE_MS: u32 = 8;
pub const FADE_SAMPLES: usize = 8;

pub fn config() -> EngineConfig {
    EngineConfig {
        sample_rate: RATE,
        channels: ChannelLayout::Stereo,
        crossfade_ms: FADE_MS,
        max_block: 256,
    }
}

pub fn engine() -> (EngineHandle, PatchProcessor) {
    spawn(config(), Box::new(StubCompiler::new()))
}

pub fn engine_with(compiler: StubCompiler) -> (EngineHandle, PatchProcessor) {
    spawn(config(), Box::new(compiler))
}

/// Render `frames` of silence input; returns the left channel
pub fn render(processor: &mut PatchProcessor, frames: usize) -> Vec<f32> {
    render_events(processor, &[], frames)
}

/// Render `frames` with the given event list; returns the left channel
pub fn render_events(
    processor: &mut PatchProcessor,
    events: &[TimedEvent],
    frames: usize,
) -> Vec<f32> {
    let mut left = vec![0.0f32; frames];
    let mut right = vec![0.0f32; frames];
    {
        let mut outputs: [&mut [f32]; 2] = [&mut left, &mut right];
        processor.process(events, &[], &mut outputs);
    }
    left
}

/// Submit a code edit in a one-frame render call
pub fn submit_code(processor: &mut PatchProcessor, code: &str) -> Vec<f32> {
    render_events(processor, &[TimedEvent::new(0, EventBody::Code(code))], 1)
}

/// Render one frame at a time until a notification matches `pred`
///
/// Returns every sample rendered while waiting; the last one belongs to
/// the call in which the notification was produced.
pub fn pump_until(
    handle: &mut EngineHandle,
    processor: &mut PatchProcessor,
    pred: impl Fn(&Notification) -> bool,
) -> (Vec<f32>, Notification) {
    let mut collected = Vec::new();
    for _ in 0..10_000 {
        collected.extend(render(processor, 1));
        if let Some(notification) = handle.poll_notification() {
            if pred(&notification) {
                return (collected, notification);
            }
        }
        std::thread::sleep(Duration::from_micros(500));
    }
    panic!("timed out waiting for a notification");
}

pub fn pump_until_installed(
    handle: &mut EngineHandle,
    processor: &mut PatchProcessor,
) -> (Vec<f32>, Notification) {
    pump_until(handle, processor, |n| {
        matches!(n, Notification::ProgramInstalled { .. })
    })
}

/// Submit `code` and render through the whole swap to the stable state
pub fn install_and_settle(
    handle: &mut EngineHandle,
    processor: &mut PatchProcessor,
    code: &str,
) {
    submit_code(processor, code);
    pump_until_installed(handle, processor);
    // One fade sample was consumed by the install call; the rest of the
    // fade-out plus the full fade-in fits in 2 * FADE_SAMPLES - 1
    render(processor, 2 * FADE_SAMPLES);
}
