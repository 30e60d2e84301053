//! Persistence: snapshot/restore reproduces installed-program behavior
//! bit-for-bit, and restoring code re-triggers compilation like a live
//! edit.

mod common;

use common::*;
use repatch_core::{EventBody, Notification, PatchState, TimedEvent};

const ECHO: &str = "control slider level 0.25 0 1 0.01\nemit echo level";

#[test]
fn snapshot_captures_live_property_values() {
    let (mut handle, mut processor) = engine();
    install_and_settle(&mut handle, &mut processor, ECHO);

    let events = [
        TimedEvent::new(0, EventBody::Control { index: 0, value: 0.7 }),
        TimedEvent::new(0, EventBody::Control { index: 15, value: 1.0 }),
        TimedEvent::new(0, EventBody::CrossfadeDuration { ms: 12 }),
    ];
    render_events(&mut processor, &events, 1);

    let snapshot = processor.snapshot();
    assert_eq!(snapshot.code, ECHO);
    assert_eq!(snapshot.controls[0], 0.7);
    assert_eq!(snapshot.controls[15], 1.0);
    assert_eq!(snapshot.crossfade_duration_ms, 12);
    assert!(snapshot.error.is_empty());
}

#[test]
fn restore_reproduces_rendered_output_bit_for_bit() {
    // First instance: edit live, then persist
    let (mut handle, mut processor) = engine();
    install_and_settle(&mut handle, &mut processor, ECHO);
    let control = TimedEvent::new(0, EventBody::Control { index: 0, value: 0.7 });
    render_events(&mut processor, &[control], 1);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    processor.snapshot().save(&path).unwrap();
    let reference = render(&mut processor, 8);

    // Second instance: restore and let the recompile land
    let (mut handle2, mut processor2) = engine();
    let saved = PatchState::load(&path).unwrap();
    processor2.restore(&saved);
    pump_until_installed(&mut handle2, &mut processor2);
    render(&mut processor2, 2 * FADE_SAMPLES);

    let restored = render(&mut processor2, 8);
    assert_eq!(restored, reference);
    assert_eq!(restored, vec![0.7; 8]);
}

#[test]
fn restore_triggers_recompilation() {
    let (mut handle, mut processor) = engine();

    let mut saved = PatchState::new();
    saved.code.push_str("emit const 1");

    processor.restore(&saved);
    let (_, note) = pump_until_installed(&mut handle, &mut processor);
    assert!(matches!(note, Notification::ProgramInstalled { voices: 1, .. }));
    assert_eq!(processor.state().code, "emit const 1");
}

#[test]
fn restore_clamps_control_values() {
    let (_handle, mut processor) = engine();

    let mut saved = PatchState::new();
    saved.controls[0] = 7.5;
    saved.controls[1] = -2.0;

    processor.restore(&saved);
    assert_eq!(processor.state().controls[0], 1.0);
    assert_eq!(processor.state().controls[1], 0.0);
}
