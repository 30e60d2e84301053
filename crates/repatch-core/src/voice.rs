//! Voice pool - per-voice program instances and control bindings
//!
//! A compiled program is multiplexed into N independent instances
//! ("voices"). Each voice discovers the program's named controls once at
//! build time and classifies them:
//! - names ending in `freq`, `gain` or `gate` (case-sensitive) are the
//!   voice's expressive inputs, driven by note events;
//! - everything else takes the next free generic slot (up to 16), shared
//!   across voices and driven by the host's indexed control properties.
//!
//! Pools are built on the compile thread (instantiation allocates) and
//! then handed to the audio thread, where all operations are
//! allocation-free.

use crate::compiler::{
    ControlScan, PatchInstance, PatchOptions, PatchProgram, CompileResult, Zone,
};
use crate::types::{BlockBuffer, Sample, MAX_VOICES, NUM_CONTROLS};

/// Reserved control-name suffixes, matched in this order
const RESERVED_SUFFIXES: [&str; 3] = ["freq", "gain", "gate"];

/// The kind of a discovered control, with its numeric range where one exists
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlKind {
    Button,
    Toggle,
    LinearSlider { init: f32, min: f32, max: f32, step: f32 },
    SteppedSlider { init: f32, min: f32, max: f32, step: f32 },
    Meter,
}

impl ControlKind {
    /// Convert a normalized host value in [0, 1] to the absolute value to
    /// write into the control's zone
    ///
    /// Returns `None` for output-only kinds, which ignore host writes.
    pub fn from_normalized(&self, value: f32) -> Option<Sample> {
        let value = value.clamp(0.0, 1.0);
        match *self {
            ControlKind::Button | ControlKind::Toggle => {
                Some(if value > 0.5 { 1.0 } else { 0.0 })
            }
            ControlKind::LinearSlider { min, max, .. }
            | ControlKind::SteppedSlider { min, max, .. } => Some(min + value * (max - min)),
            ControlKind::Meter => None,
        }
    }
}

/// One discovered control of one voice instance
#[derive(Debug, Clone)]
pub struct ControlBinding {
    pub name: String,
    pub kind: ControlKind,
    pub zone: Zone,
}

/// Collects a voice's declared controls in discovery order
#[derive(Default)]
struct BindingTable {
    controls: Vec<ControlBinding>,
}

impl BindingTable {
    fn push(&mut self, name: &str, kind: ControlKind, zone: Zone) {
        self.controls.push(ControlBinding {
            name: name.to_string(),
            kind,
            zone,
        });
    }
}

impl ControlScan for BindingTable {
    fn button(&mut self, name: &str, zone: Zone) {
        self.push(name, ControlKind::Button, zone);
    }

    fn toggle(&mut self, name: &str, zone: Zone) {
        self.push(name, ControlKind::Toggle, zone);
    }

    fn slider(&mut self, name: &str, zone: Zone, init: f32, min: f32, max: f32, step: f32) {
        self.push(name, ControlKind::LinearSlider { init, min, max, step }, zone);
    }

    fn stepped(&mut self, name: &str, zone: Zone, init: f32, min: f32, max: f32, step: f32) {
        self.push(name, ControlKind::SteppedSlider { init, min, max, step }, zone);
    }

    fn meter(&mut self, name: &str, zone: Zone) {
        self.push(name, ControlKind::Meter, zone);
    }
}

/// One voice: an instance plus its classified bindings
struct Voice {
    instance: Box<dyn PatchInstance>,
    freq: Option<Zone>,
    gain: Option<Zone>,
    gate: Option<Zone>,
    /// Generic bindings; the vector position is the host slot index
    generics: Vec<ControlBinding>,
    active: bool,
    note: u8,
    channel: u8,
}

impl Voice {
    /// Discover and classify the instance's controls
    ///
    /// Reserved suffixes are recognized in both modes but bound as
    /// expressive inputs only for instruments; they never occupy a
    /// generic slot. Controls beyond the generic capacity are dropped
    /// with a warning.
    fn bind(mut instance: Box<dyn PatchInstance>, is_instrument: bool) -> Self {
        let mut table = BindingTable::default();
        instance.scan_controls(&mut table);

        let mut voice = Self {
            instance,
            freq: None,
            gain: None,
            gate: None,
            generics: Vec::with_capacity(NUM_CONTROLS),
            active: !is_instrument,
            note: 0,
            channel: 0,
        };

        for binding in table.controls {
            let reserved = RESERVED_SUFFIXES
                .iter()
                .find(|s| binding.name.ends_with(*s))
                .copied();

            match reserved {
                Some("freq") if voice.freq.is_none() => voice.freq = Some(binding.zone),
                Some("gain") if voice.gain.is_none() => voice.gain = Some(binding.zone),
                Some("gate") if voice.gate.is_none() => voice.gate = Some(binding.zone),
                Some(_) => {
                    // Duplicate reserved name; first declaration wins
                    log::warn!("duplicate reserved control '{}' ignored", binding.name);
                }
                None => {
                    if voice.generics.len() < NUM_CONTROLS {
                        voice.generics.push(binding);
                    } else {
                        log::warn!(
                            "control '{}' exceeds the {} generic slots and is dropped",
                            binding.name,
                            NUM_CONTROLS
                        );
                    }
                }
            }
        }

        if !is_instrument {
            voice.freq = None;
            voice.gain = None;
            voice.gate = None;
        }

        voice
    }

    /// Write a normalized host value into the generic slot `index`
    fn apply_generic(&mut self, index: usize, value: f32) {
        if let Some(binding) = self.generics.get(index) {
            if let Some(absolute) = binding.kind.from_normalized(value) {
                self.instance.set_zone(binding.zone, absolute);
            }
        }
    }

    fn trigger(&mut self, channel: u8, note: u8, velocity: u8) {
        if let Some(zone) = self.freq {
            let freq = 440.0 * (((note as f32) - 69.0) / 12.0).exp2();
            self.instance.set_zone(zone, freq);
        }
        if let Some(zone) = self.gain {
            self.instance.set_zone(zone, velocity as f32 / 127.0);
        }
        if let Some(zone) = self.gate {
            self.instance.set_zone(zone, 1.0);
        }
        self.note = note;
        self.channel = channel;
        self.active = true;
    }

    fn release(&mut self) {
        if let Some(zone) = self.gate {
            self.instance.set_zone(zone, 0.0);
        }
        self.active = false;
    }
}

/// All voices of one compiled program, plus the program itself
///
/// Owns the program handle and every instance made from it; the whole
/// pool travels between threads as a unit and is destroyed as a unit on
/// the compile thread.
pub struct VoicePool {
    program: Box<dyn PatchProgram>,
    voices: Vec<Voice>,
    is_instrument: bool,
    wants_midi: bool,
    scratch: BlockBuffer,
}

impl VoicePool {
    /// Instantiate and inspect `program`
    ///
    /// Builds one instance per resolved voice; more than one voice makes
    /// the pool an instrument whose voices start silent, while a
    /// single-voice pool is a filter whose one voice always renders.
    /// Runs on the compile thread only.
    pub fn build(
        program: Box<dyn PatchProgram>,
        options: &PatchOptions,
        sample_rate: u32,
        max_block: usize,
    ) -> CompileResult<VoicePool> {
        let count = options.voice_count(MAX_VOICES);
        let is_instrument = count > 1;

        let mut voices = Vec::with_capacity(count);
        for _ in 0..count {
            let instance = program.instantiate(sample_rate)?;
            voices.push(Voice::bind(instance, is_instrument));
        }

        log::info!(
            "voice pool built: {} voice(s), {} generic control(s), instrument={}",
            voices.len(),
            voices.first().map_or(0, |v| v.generics.len()),
            is_instrument
        );

        Ok(Self {
            program,
            voices,
            is_instrument,
            wants_midi: options.midi,
            scratch: BlockBuffer::new(max_block),
        })
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.active).count()
    }

    pub fn is_instrument(&self) -> bool {
        self.is_instrument
    }

    pub fn wants_midi(&self) -> bool {
        self.wants_midi
    }

    pub fn num_inputs(&self) -> usize {
        self.program.num_inputs()
    }

    /// Allocate a voice for a note-on event
    ///
    /// Scans in index order and takes the first free voice. With every
    /// voice busy the note is dropped; there is no voice stealing.
    pub fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        if !self.is_instrument {
            return;
        }

        match self.voices.iter_mut().find(|v| !v.active) {
            Some(voice) => voice.trigger(channel, note, velocity),
            None => log::trace!("no free voice for note {} ch {} - dropped", note, channel),
        }
    }

    /// Release every active voice matching `(channel, note)`
    ///
    /// The gate is cleared and the voice freed in the same event; the
    /// program's own release tail is cut short rather than ringing out.
    pub fn note_off(&mut self, channel: u8, note: u8) {
        for voice in &mut self.voices {
            if voice.active && voice.note == note && voice.channel == channel {
                voice.release();
            }
        }
    }

    /// Write one normalized host control to every voice
    pub fn apply_control(&mut self, index: usize, value: f32) {
        for voice in &mut self.voices {
            voice.apply_generic(index, value);
        }
    }

    /// Re-prime every generic control from the host's current values
    pub fn apply_all_controls(&mut self, values: &[f32; NUM_CONTROLS]) {
        for (index, value) in values.iter().enumerate() {
            self.apply_control(index, *value);
        }
    }

    /// Render all active voices, summed into `accum`
    ///
    /// `accum` is cleared first; each voice computes into the pool's
    /// pre-allocated scratch block and is added in. Allocation-free.
    pub fn render(
        &mut self,
        inputs: &[&[Sample]],
        accum: &mut BlockBuffer,
        frames: usize,
        channels: usize,
    ) {
        accum.clear(frames);

        for voice in self.voices.iter_mut().filter(|v| v.active) {
            {
                let mut outs = self.scratch.slices_mut(frames);
                voice.instance.compute(inputs, &mut outs[..channels]);
            }

            let src = self.scratch.slices(frames);
            let mut dst = accum.slices_mut(frames);
            for ch in 0..channels {
                for (d, s) in dst[ch].iter_mut().zip(src[ch].iter()) {
                    *d += *s;
                }
            }
        }
    }
}
