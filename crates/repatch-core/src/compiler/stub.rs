//! Deterministic stub backend
//!
//! A tiny line-oriented patch language with fully predictable output,
//! used by the test-suite wherever a real JIT would be opaque. Programs
//! declare controls and one emit rule:
//!
//! ```text
//! # instrument with four voices
//! options [nvoices:4][midi:on]
//! control slider freq 440 20 20000 1
//! control slider gain 0.5 0 1 0.01
//! control button gate
//! emit voice
//! ```
//!
//! Emit rules: `const <v>` (constant output), `echo <control>` (output the
//! control's current value), `voice` (gain * gate * freq / 440), `thru`
//! (copy inputs). `fail <msg>` makes compilation fail with that
//! diagnostic; `noinstance <msg>` compiles but refuses instantiation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{
    CompileError, CompileResult, ControlScan, MetadataVisitor, PatchCompiler, PatchInstance,
    PatchProgram, Zone,
};
use crate::types::Sample;

/// Reference pitch for the `voice` emit rule
const VOICE_REF_FREQ: f32 = 440.0;

/// The stub compiler; counts its invocations for scheduling tests
#[derive(Default)]
pub struct StubCompiler {
    invocations: Arc<AtomicUsize>,
}

impl StubCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared invocation counter, readable from any thread
    pub fn invocations(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.invocations)
    }
}

impl PatchCompiler for StubCompiler {
    fn compile(&mut self, source: &str) -> CompileResult<Box<dyn PatchProgram>> {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        let program = parse(source)?;
        Ok(Box::new(program))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum DeclKind {
    Button,
    Toggle,
    Slider { init: f32, min: f32, max: f32, step: f32 },
    Stepped { init: f32, min: f32, max: f32, step: f32 },
    Meter,
}

#[derive(Debug, Clone)]
struct Decl {
    name: String,
    kind: DeclKind,
}

impl Decl {
    fn init(&self) -> f32 {
        match self.kind {
            DeclKind::Slider { init, .. } | DeclKind::Stepped { init, .. } => init,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Emit {
    Silence,
    Const(f32),
    Echo(usize),
    Voice,
    Thru,
}

#[derive(Debug)]
struct StubProgram {
    decls: Vec<Decl>,
    emit: Emit,
    options: Option<String>,
    refuse_instance: Option<String>,
}

impl PatchProgram for StubProgram {
    fn num_inputs(&self) -> usize {
        match self.emit {
            Emit::Thru => 2,
            _ => 0,
        }
    }

    fn num_outputs(&self) -> usize {
        2
    }

    fn metadata(&self, visitor: &mut dyn MetadataVisitor) {
        if let Some(options) = &self.options {
            visitor.declare("options", options);
        }
    }

    fn instantiate(&self, _sample_rate: u32) -> CompileResult<Box<dyn PatchInstance>> {
        if let Some(msg) = &self.refuse_instance {
            return Err(CompileError::Instance(msg.clone()));
        }

        let zones: Vec<Sample> = self.decls.iter().map(Decl::init).collect();
        let find = |suffix: &str| {
            self.decls
                .iter()
                .position(|d| d.name.ends_with(suffix) && d.kind != DeclKind::Meter)
        };

        Ok(Box::new(StubInstance {
            decls: self.decls.clone(),
            zones,
            emit: self.emit,
            freq: find("freq"),
            gain: find("gain"),
            gate: find("gate"),
        }))
    }
}

#[derive(Debug)]
struct StubInstance {
    decls: Vec<Decl>,
    zones: Vec<Sample>,
    emit: Emit,
    freq: Option<usize>,
    gain: Option<usize>,
    gate: Option<usize>,
}

impl StubInstance {
    fn zone_or(&self, zone: Option<usize>, fallback: Sample) -> Sample {
        zone.map_or(fallback, |i| self.zones[i])
    }
}

impl PatchInstance for StubInstance {
    fn scan_controls(&mut self, scan: &mut dyn ControlScan) {
        for (i, decl) in self.decls.iter().enumerate() {
            let zone = Zone(i as u32);
            match decl.kind {
                DeclKind::Button => scan.button(&decl.name, zone),
                DeclKind::Toggle => scan.toggle(&decl.name, zone),
                DeclKind::Slider { init, min, max, step } => {
                    scan.slider(&decl.name, zone, init, min, max, step)
                }
                DeclKind::Stepped { init, min, max, step } => {
                    scan.stepped(&decl.name, zone, init, min, max, step)
                }
                DeclKind::Meter => scan.meter(&decl.name, zone),
            }
        }
    }

    fn set_zone(&mut self, zone: Zone, value: Sample) {
        if let Some(cell) = self.zones.get_mut(zone.0 as usize) {
            *cell = value;
        }
    }

    fn compute(&mut self, inputs: &[&[Sample]], outputs: &mut [&mut [Sample]]) {
        match self.emit {
            Emit::Silence => {
                for out in outputs.iter_mut() {
                    out.fill(0.0);
                }
            }
            Emit::Const(v) => {
                for out in outputs.iter_mut() {
                    out.fill(v);
                }
            }
            Emit::Echo(decl) => {
                let v = self.zones[decl];
                for out in outputs.iter_mut() {
                    out.fill(v);
                }
            }
            Emit::Voice => {
                let freq = self.zone_or(self.freq, VOICE_REF_FREQ);
                let gain = self.zone_or(self.gain, 1.0);
                let gate = self.zone_or(self.gate, 1.0);
                let v = gain * gate * (freq / VOICE_REF_FREQ);
                for out in outputs.iter_mut() {
                    out.fill(v);
                }
            }
            Emit::Thru => {
                for (i, out) in outputs.iter_mut().enumerate() {
                    let input = inputs.get(i).copied().unwrap_or(&[]);
                    let n = out.len().min(input.len());
                    out[..n].copy_from_slice(&input[..n]);
                    out[n..].fill(0.0);
                }
            }
        }
    }
}

fn parse(source: &str) -> CompileResult<StubProgram> {
    let mut decls = Vec::new();
    let mut emit = None;
    let mut options = None;
    let mut refuse_instance = None;

    for (lineno, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let err = |msg: String| CompileError::Compile(format!("line {}: {}", lineno + 1, msg));
        let mut words = line.split_whitespace();
        let directive = words.next().unwrap_or_default();

        match directive {
            "options" => {
                options = Some(line["options".len()..].trim().to_string());
            }
            "control" => {
                let kind = words.next().ok_or_else(|| err("missing control kind".into()))?;
                let name = words
                    .next()
                    .ok_or_else(|| err("missing control name".into()))?
                    .to_string();
                let kind = match kind {
                    "button" => DeclKind::Button,
                    "toggle" => DeclKind::Toggle,
                    "meter" => DeclKind::Meter,
                    "slider" | "stepped" => {
                        let mut num = || -> CompileResult<f32> {
                            let word = words
                                .next()
                                .ok_or_else(|| err(format!("{} needs init/min/max/step", kind)))?;
                            word.parse()
                                .map_err(|_| err(format!("bad number '{}'", word)))
                        };
                        let (init, min, max, step) = (num()?, num()?, num()?, num()?);
                        if kind == "slider" {
                            DeclKind::Slider { init, min, max, step }
                        } else {
                            DeclKind::Stepped { init, min, max, step }
                        }
                    }
                    other => return Err(err(format!("unknown control kind '{}'", other))),
                };
                decls.push(Decl { name, kind });
            }
            "emit" => {
                let rule = words.next().ok_or_else(|| err("missing emit rule".into()))?;
                emit = Some(match rule {
                    "voice" => Emit::Voice,
                    "thru" => Emit::Thru,
                    "const" => {
                        let word = words.next().ok_or_else(|| err("const needs a value".into()))?;
                        let v = word
                            .parse()
                            .map_err(|_| err(format!("bad number '{}'", word)))?;
                        Emit::Const(v)
                    }
                    "echo" => {
                        let name = words.next().ok_or_else(|| err("echo needs a control".into()))?;
                        let decl = decls
                            .iter()
                            .position(|d| d.name == name)
                            .ok_or_else(|| err(format!("echo of undeclared control '{}'", name)))?;
                        Emit::Echo(decl)
                    }
                    other => return Err(err(format!("unknown emit rule '{}'", other))),
                });
            }
            "fail" => {
                let msg = line["fail".len()..].trim();
                return Err(CompileError::Compile(msg.to_string()));
            }
            "noinstance" => {
                refuse_instance = Some(line["noinstance".len()..].trim().to_string());
            }
            other => return Err(err(format!("unknown directive '{}'", other))),
        }
    }

    Ok(StubProgram {
        decls,
        emit: emit.unwrap_or(Emit::Silence),
        options,
        refuse_instance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::PatchOptions;

    fn compile(source: &str) -> Box<dyn PatchProgram> {
        StubCompiler::new().compile(source).unwrap()
    }

    fn render_one(instance: &mut dyn PatchInstance) -> Sample {
        let mut left = [0.0f32; 4];
        let mut right = [0.0f32; 4];
        let mut outputs: [&mut [Sample]; 2] = [&mut left, &mut right];
        instance.compute(&[], &mut outputs);
        assert_eq!(left, right);
        left[0]
    }

    #[test]
    fn test_const_output() {
        let program = compile("emit const 0.25");
        let mut instance = program.instantiate(48000).unwrap();
        assert_eq!(render_one(instance.as_mut()), 0.25);
    }

    #[test]
    fn test_echo_follows_zone_writes() {
        let program = compile("control slider level 0.5 0 1 0.01\nemit echo level");
        let mut instance = program.instantiate(48000).unwrap();
        assert_eq!(render_one(instance.as_mut()), 0.5);

        instance.set_zone(Zone(0), 0.75);
        assert_eq!(render_one(instance.as_mut()), 0.75);
    }

    #[test]
    fn test_voice_math() {
        let source = "control slider freq 440 20 20000 1\n\
                      control slider gain 1 0 1 0.01\n\
                      control button gate\n\
                      emit voice";
        let program = compile(source);
        let mut instance = program.instantiate(48000).unwrap();

        // Gate starts at zero
        assert_eq!(render_one(instance.as_mut()), 0.0);

        instance.set_zone(Zone(2), 1.0);
        assert_eq!(render_one(instance.as_mut()), 1.0);

        // One octave up doubles the output
        instance.set_zone(Zone(0), 880.0);
        assert_eq!(render_one(instance.as_mut()), 2.0);
    }

    #[test]
    fn test_fail_directive() {
        let err = StubCompiler::new().compile("fail missing semicolon").unwrap_err();
        assert!(err.to_string().contains("missing semicolon"));
    }

    #[test]
    fn test_noinstance_directive() {
        let program = compile("noinstance out of memory");
        let err = program.instantiate(48000).unwrap_err();
        assert!(matches!(err, CompileError::Instance(_)));
    }

    #[test]
    fn test_echo_undeclared_control_rejected() {
        let err = StubCompiler::new().compile("emit echo nothing").unwrap_err();
        assert!(err.to_string().contains("undeclared"));
    }

    #[test]
    fn test_options_metadata() {
        let program = compile("options [nvoices:4][midi:on]\nemit voice");
        let options = PatchOptions::of(program.as_ref());
        assert_eq!(options.voices, Some(4));
        assert!(options.midi);
    }

    #[test]
    fn test_invocation_counter() {
        let mut compiler = StubCompiler::new();
        let count = compiler.invocations();
        compiler.compile("emit const 1").unwrap();
        compiler.compile("fail nope").unwrap_err();
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }
}
