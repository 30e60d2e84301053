//! Real-time render loop
//!
//! Everything here runs on the audio thread under a hard deadline: no
//! allocation, no locks, no compiler calls. The processor consumes the
//! host's timestamped events interleaved with rendering (event-bounded
//! sub-blocks), sums the active voice pool, applies the crossfade
//! envelope, and exchanges work with the compile thread only through the
//! non-blocking rings wired up at spawn time.

use rtrb::{Consumer, Producer, PushError};

use crate::code_channel::CodeWriter;
use crate::engine::crossfade::{Crossfader, FadeDirection, ProgramSlots};
use crate::engine::worker::{Job, WorkerResponse};
use crate::engine::{EngineConfig, Notification};
use crate::error::{EngineError, EngineResult};
use crate::event::{EventBody, TimedEvent};
use crate::state::PatchState;
use crate::types::{BlockBuffer, ChannelLayout, Sample, MAX_CHANNELS, NUM_CONTROLS};
use crate::voice::VoicePool;

/// The audio-thread half of the engine
pub struct PatchProcessor {
    state: PatchState,
    code_tx: CodeWriter,
    jobs: Producer<Job>,
    responses: Consumer<WorkerResponse>,
    notify: Producer<Notification>,
    slots: ProgramSlots,
    fade: Crossfader,
    accum: BlockBuffer,
    sample_rate: u32,
    channels: ChannelLayout,
    max_block: usize,
}

impl PatchProcessor {
    pub(crate) fn new(
        config: &EngineConfig,
        code_tx: CodeWriter,
        jobs: Producer<Job>,
        responses: Consumer<WorkerResponse>,
        notify: Producer<Notification>,
    ) -> Self {
        let mut state = PatchState::new();
        state.crossfade_duration_ms = config.crossfade_ms;

        Self {
            state,
            code_tx,
            jobs,
            responses,
            notify,
            slots: ProgramSlots::new(),
            fade: Crossfader::new(),
            accum: BlockBuffer::new(config.max_block),
            sample_rate: config.sample_rate,
            channels: config.channels,
            max_block: config.max_block,
        }
    }

    /// Render one call
    ///
    /// `events` must be ordered by frame offset; offsets are clamped to
    /// the block length. `inputs` and `outputs` carry one slice per
    /// engine channel, all of the same length. With no program installed
    /// the output is silence.
    pub fn process(
        &mut self,
        events: &[TimedEvent],
        inputs: &[&[Sample]],
        outputs: &mut [&mut [Sample]],
    ) {
        let frames = outputs.first().map_or(0, |o| o.len());
        debug_assert!(frames <= self.max_block);
        let frames = frames.min(self.max_block) as u32;

        self.poll_worker();

        let mut last = 0u32;
        for event in events {
            let t = event.frames.clamp(last, frames);
            self.render_span(inputs, outputs, last as usize, t as usize);
            self.apply_event(event);
            last = t;
        }
        self.render_span(inputs, outputs, last as usize, frames as usize);
    }

    /// Snapshot the property state for persistence
    pub fn snapshot(&self) -> PatchState {
        self.state.clone()
    }

    /// Current property state (diagnostics included)
    pub fn state(&self) -> &PatchState {
        &self.state
    }

    /// Restore a previously saved state
    ///
    /// Controls and crossfade duration apply at once; the code is
    /// re-submitted to the compile thread exactly like a live edit. Call
    /// from the thread driving [`Self::process`].
    pub fn restore(&mut self, saved: &PatchState) {
        self.state.crossfade_duration_ms = saved.crossfade_duration_ms;
        for (slot, value) in self.state.controls.iter_mut().zip(saved.controls.iter()) {
            *slot = value.clamp(0.0, 1.0);
        }

        let controls = self.state.controls;
        if let Some(pool) = self.slots.active_mut() {
            pool.apply_all_controls(&controls);
        }

        self.state.set_code(&saved.code);
        if let Err(e) = self.submit_code(&saved.code) {
            log::trace!("{}", e);
        }
    }

    /// Take finished work from the compile thread
    ///
    /// Runs once per call, at the block boundary. Failures are consumed
    /// immediately; a finished program is only popped while no fade is in
    /// progress, so back-to-back compiles swap one at a time.
    fn poll_worker(&mut self) {
        loop {
            match self.responses.peek() {
                Ok(WorkerResponse::Installed(_)) if !self.fade.is_stable() => break,
                Ok(_) => {}
                Err(_) => break,
            }

            match self.responses.pop() {
                Ok(WorkerResponse::Installed(pool)) => self.install(pool),
                Ok(WorkerResponse::Failed(message)) => self.report_failure(message),
                Err(_) => break,
            }
        }
    }

    /// Install a new program as standby and arm its swap
    fn install(&mut self, pool: Box<VoicePool>) {
        self.state.set_error("");
        let voices = pool.voice_count();
        let is_instrument = pool.is_instrument();

        if let Some(displaced) = self.slots.install_standby(pool) {
            self.retire(displaced);
        }

        let duration = self.crossfade_samples();
        if duration == 0 {
            self.flip();
        } else {
            self.fade.arm_fade_out(duration);
        }

        self.push_notification(Notification::ProgramInstalled { voices, is_instrument });
    }

    fn report_failure(&mut self, message: String) {
        self.state.set_error(&message);
        self.push_notification(Notification::CompileFailed(message));
    }

    /// Flip to the standby program: re-prime its controls with the
    /// current host values and retire the displaced one
    fn flip(&mut self) {
        let displaced = self.slots.flip();

        let controls = self.state.controls;
        if let Some(pool) = self.slots.active_mut() {
            pool.apply_all_controls(&controls);
        }

        if let Some(old) = displaced {
            self.retire(old);
        }
    }

    /// Hand a displaced program to the compile thread for destruction
    fn retire(&mut self, pool: Box<VoicePool>) {
        if let Err(PushError::Full(job)) = self.jobs.push(Job::Retire(pool)) {
            // Destroying compiler resources here would break the deadline;
            // leaking is the recoverable outcome
            log::error!("retire ring full - leaking displaced program");
            if let Job::Retire(pool) = job {
                std::mem::forget(pool);
            }
        }
    }

    /// Render `[from, to)`, splitting at fade-leg boundaries
    fn render_span(
        &mut self,
        inputs: &[&[Sample]],
        outputs: &mut [&mut [Sample]],
        from: usize,
        to: usize,
    ) {
        if from >= to {
            return;
        }
        let channels = self.channels.channels().min(outputs.len());

        let mut i = from;
        while i < to {
            let span = to - i;
            let n = match self.fade.remaining() {
                Some(remaining) => span.min(remaining as usize).max(1),
                None => span,
            };

            let mut span_inputs: [&[Sample]; MAX_CHANNELS] = [&[], &[]];
            for (k, input) in inputs.iter().take(channels).enumerate() {
                span_inputs[k] = &input[i..i + n];
            }

            if let Some(pool) = self.slots.active_mut() {
                pool.render(&span_inputs[..channels], &mut self.accum, n, channels);

                let acc = self.accum.slices(n);
                for k in 0..n {
                    let gain = self.fade.step();
                    for ch in 0..channels {
                        outputs[ch][i + k] = acc[ch][k] * gain;
                    }
                }
            } else {
                for out in outputs.iter_mut().take(channels) {
                    out[i..i + n].fill(0.0);
                }
                // The envelope clock keeps running over silence so a swap
                // armed before the first program still flips on time
                for _ in 0..n {
                    self.fade.step();
                }
            }

            i += n;

            if self.fade.remaining() == Some(0) {
                self.finish_leg();
            }
        }
    }

    /// One envelope leg ran out mid-span
    fn finish_leg(&mut self) {
        match self.fade.direction() {
            Some(FadeDirection::FadeOut) => {
                self.flip();
                self.fade.arm_fade_in();
            }
            Some(FadeDirection::FadeIn) => self.fade.settle(),
            None => {}
        }
    }

    fn apply_event(&mut self, event: &TimedEvent) {
        match event.body {
            EventBody::Code(source) => {
                self.state.set_code(source);
                if let Err(e) = self.submit_code(source) {
                    log::trace!("{}", e);
                }
            }
            EventBody::Control { index, value } => {
                if index >= NUM_CONTROLS {
                    log::warn!("control index {} out of range", index);
                    return;
                }
                let value = value.clamp(0.0, 1.0);
                self.state.controls[index] = value;
                if let Some(pool) = self.slots.active_mut() {
                    pool.apply_control(index, value);
                }
            }
            EventBody::CrossfadeDuration { ms } => {
                self.state.crossfade_duration_ms = ms;
            }
            EventBody::NoteOn { channel, note, velocity } => {
                if let Some(pool) = self.slots.active_mut() {
                    pool.note_on(channel, note, velocity);
                }
            }
            EventBody::NoteOff { channel, note } => {
                if let Some(pool) = self.slots.active_mut() {
                    pool.note_off(channel, note);
                }
            }
        }
    }

    /// Copy the source into the code channel and ring the doorbell
    fn submit_code(&mut self, source: &str) -> EngineResult<()> {
        if !self.code_tx.write(source) {
            return Err(EngineError::ChannelOverflow);
        }
        if self.jobs.push(Job::Init).is_err() {
            // The source is committed; the next doorbell drains it too
            log::trace!("job ring full - compile deferred");
        }
        Ok(())
    }

    fn push_notification(&mut self, notification: Notification) {
        if self.notify.push(notification).is_err() {
            log::trace!("notification ring full - notification dropped");
        }
    }

    fn crossfade_samples(&self) -> u32 {
        (self.state.crossfade_duration_ms as u64 * self.sample_rate as u64 / 1000) as u32
    }
}
