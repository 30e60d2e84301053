//! Background compile worker
//!
//! The one thread allowed to call the compiler and to create or destroy
//! program instances. The audio thread rings a doorbell (`Job::Init`)
//! after writing source into the code channel; this thread drains the
//! channel, compiles, builds the voice pool, and sends it back. Displaced
//! pools come back as `Job::Retire` and are dropped here, never on the
//! audio thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rtrb::{Consumer, Producer, PushError};

use crate::code_channel::CodeReader;
use crate::compiler::{PatchCompiler, PatchOptions};
use crate::voice::VoicePool;

/// Jobs from the audio thread
pub(crate) enum Job {
    /// Doorbell: new source is waiting in the code channel
    Init,
    /// Destroy a displaced program on this thread
    Retire(Box<VoicePool>),
}

/// Responses back to the audio thread
pub(crate) enum WorkerResponse {
    /// A compiled, fully built pool ready to install as standby
    Installed(Box<VoicePool>),
    /// Compilation or instantiation failed; diagnostic for the host's
    /// `error` property
    Failed(String),
}

/// Everything the worker thread owns
pub(crate) struct WorkerContext {
    pub compiler: Box<dyn PatchCompiler>,
    pub code_rx: CodeReader,
    pub jobs: Consumer<Job>,
    pub responses: Producer<WorkerResponse>,
    pub shutdown: Arc<AtomicBool>,
    pub sample_rate: u32,
    pub max_block: usize,
}

/// Sleep between polls when the job ring is empty
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Worker thread entry point
pub(crate) fn run(mut ctx: WorkerContext) {
    log::info!("patch compile worker started");

    while !ctx.shutdown.load(Ordering::Relaxed) {
        let mut worked = false;

        while let Ok(job) = ctx.jobs.pop() {
            worked = true;
            match job {
                Job::Init => drain_code(&mut ctx),
                Job::Retire(pool) => {
                    log::debug!("destroying retired program ({} voices)", pool.voice_count());
                    drop(pool);
                }
            }
        }

        if !worked {
            thread::sleep(IDLE_SLEEP);
        }
    }

    // Destroy whatever is still queued before exiting
    while let Ok(job) = ctx.jobs.pop() {
        if let Job::Retire(pool) = job {
            drop(pool);
        }
    }

    log::info!("patch compile worker stopped");
}

/// Compile every source blob currently in the code channel, oldest first
fn drain_code(ctx: &mut WorkerContext) {
    loop {
        match ctx.code_rx.try_read() {
            Ok(Some(source)) => compile_one(ctx, &source),
            Ok(None) => break,
            Err(e) => log::warn!("dropping malformed code frame: {}", e),
        }
    }
}

fn compile_one(ctx: &mut WorkerContext, source: &str) {
    let built = ctx.compiler.compile(source).and_then(|program| {
        let options = PatchOptions::of(program.as_ref());
        VoicePool::build(program, &options, ctx.sample_rate, ctx.max_block)
    });

    let response = match built {
        Ok(pool) => {
            log::info!("compilation succeeded ({} voices)", pool.voice_count());
            WorkerResponse::Installed(Box::new(pool))
        }
        Err(e) => {
            log::error!("{}", e);
            WorkerResponse::Failed(e.to_string())
        }
    };

    send_response(ctx, response);
}

/// Push a response, waiting out a momentarily full ring
///
/// The renderer only pops installs once its current fade has settled, so
/// the ring can be full for up to one crossfade. This thread is allowed
/// to block; the audio thread is not.
fn send_response(ctx: &mut WorkerContext, mut response: WorkerResponse) {
    loop {
        match ctx.responses.push(response) {
            Ok(()) => return,
            Err(PushError::Full(r)) => {
                if ctx.shutdown.load(Ordering::Relaxed) {
                    return;
                }
                response = r;
                thread::sleep(IDLE_SLEEP);
            }
        }
    }
}
