//! Engine assembly - configuration, spawning, and the control-side handle
//!
//! `spawn` wires up the whole core: the code channel, the job and
//! response rings, the notification ring, and the background compile
//! thread. It hands back two halves:
//! - [`PatchProcessor`] moves to the audio thread and is driven once per
//!   render call;
//! - [`EngineHandle`] stays on the control side, surfaces notifications,
//!   and shuts the worker down when dropped.

pub(crate) mod crossfade;
mod processor;
mod worker;

pub use processor::PatchProcessor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rtrb::{Consumer, RingBuffer};

use crate::code_channel::code_channel;
use crate::compiler::PatchCompiler;
use crate::types::{ChannelLayout, DEFAULT_CROSSFADE_MS, MAX_BLOCK_SIZE, SAMPLE_RATE};

/// Capacity of the audio→worker job ring
///
/// Holds doorbells and retirements; with swaps serialized at most a
/// handful are ever pending, 16 leaves generous headroom.
const JOB_QUEUE_CAPACITY: usize = 16;

/// Capacity of the worker→audio response ring
const RESPONSE_QUEUE_CAPACITY: usize = 4;

/// Capacity of the audio→control notification ring
const NOTIFY_QUEUE_CAPACITY: usize = 32;

/// Engine construction parameters
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub channels: ChannelLayout,
    /// Initial crossfade duration; the host property can change it later
    pub crossfade_ms: u32,
    /// Largest block one render call may carry
    pub max_block: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: ChannelLayout::Stereo,
            crossfade_ms: DEFAULT_CROSSFADE_MS,
            max_block: MAX_BLOCK_SIZE,
        }
    }
}

/// Events surfaced to the control side
#[derive(Debug)]
pub enum Notification {
    /// A new program was installed and its swap began
    ProgramInstalled { voices: usize, is_instrument: bool },
    /// Compilation or instantiation failed; the previous program keeps
    /// running untouched
    CompileFailed(String),
}

/// Build the engine and start its compile worker
pub fn spawn(config: EngineConfig, compiler: Box<dyn PatchCompiler>) -> (EngineHandle, PatchProcessor) {
    let (code_tx, code_rx) = code_channel();
    let (job_tx, job_rx) = RingBuffer::new(JOB_QUEUE_CAPACITY);
    let (response_tx, response_rx) = RingBuffer::new(RESPONSE_QUEUE_CAPACITY);
    let (notify_tx, notify_rx) = RingBuffer::new(NOTIFY_QUEUE_CAPACITY);
    let shutdown = Arc::new(AtomicBool::new(false));

    let context = worker::WorkerContext {
        compiler,
        code_rx,
        jobs: job_rx,
        responses: response_tx,
        shutdown: Arc::clone(&shutdown),
        sample_rate: config.sample_rate,
        max_block: config.max_block,
    };

    let worker = thread::Builder::new()
        .name("patch-compile".to_string())
        .spawn(move || worker::run(context))
        .expect("Failed to spawn patch compile thread");

    let processor = PatchProcessor::new(&config, code_tx, job_tx, response_rx, notify_tx);
    let handle = EngineHandle {
        notifications: notify_rx,
        shutdown,
        worker: Some(worker),
    };

    (handle, processor)
}

/// Control-side handle: notifications and worker lifetime
pub struct EngineHandle {
    notifications: Consumer<Notification>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl EngineHandle {
    /// Next pending notification from the audio thread, if any
    pub fn poll_notification(&mut self) -> Option<Notification> {
        self.notifications.pop().ok()
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("patch compile thread panicked");
            }
        }
    }
}
