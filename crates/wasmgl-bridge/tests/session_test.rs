//! Integration tests driving a real guest module through a session.
//!
//! The guest is the WAT fixture in `tests/fixtures/guest.wat`. Every test runs
//! on a manual clock so timers and frames fire at exact times.

#![cfg(feature = "wasm")]

use std::sync::Arc;
use std::time::Duration;

use wasmgl_bridge::gl::{consts, GlCall, RecordingBackend};
use wasmgl_bridge::wasm::{BridgeConfig, BridgeRuntime, Session, TimerConfig};
use wasmgl_bridge::{BridgeError, Clock, InputEvent, ManualClock};

const GUEST_WAT: &str = include_str!("fixtures/guest.wat");
const PAYLOAD: &[u8] = b"<level/>";

fn config() -> BridgeConfig {
    BridgeConfig::development().timers(TimerConfig::default().measure_clock(false))
}

fn boot_with(config: BridgeConfig) -> (Session<RecordingBackend>, ManualClock) {
    let runtime = BridgeRuntime::new(config).expect("failed to create runtime");
    let module = runtime
        .load_module_bytes("guest", GUEST_WAT.as_bytes())
        .expect("failed to load guest");
    let clock = ManualClock::new();
    let session = runtime
        .boot_with_clock(&module, RecordingBackend::new(), PAYLOAD, Arc::new(clock.clone()))
        .expect("failed to boot guest");
    (session, clock)
}

fn boot() -> (Session<RecordingBackend>, ManualClock) {
    boot_with(config())
}

fn word(session: &mut Session<RecordingBackend>, offset: u32) -> i32 {
    let bytes = session.read_guest_memory(offset, 4).expect("state word out of bounds");
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

fn key_down(code: &str) -> InputEvent {
    InputEvent::KeyDown { code: code.to_string() }
}

#[test]
fn test_boot_hands_payload_to_guest() {
    let (mut session, _clock) = boot();

    assert_eq!(word(&mut session, 540), PAYLOAD.len() as i32);
    assert_eq!(word(&mut session, 544), i32::from(b'<'));
    let copied = session
        .read_guest_memory(session.payload_ptr(), PAYLOAD.len() as u32)
        .expect("payload out of bounds");
    assert_eq!(copied, PAYLOAD);

    // Boot resizes the guest to the configured viewport
    assert_eq!(word(&mut session, 528), 800);
    assert_eq!(word(&mut session, 532), 600);

    let lines: Vec<&str> = session.console().lines().collect();
    assert_eq!(lines, vec!["init 8 bytes", "resized"]);
}

#[test]
fn test_boot_issues_handles_and_uploads() {
    let (session, _clock) = boot();

    let calls = session.backend().calls();
    assert_eq!(calls[0], GlCall::CreateBuffer(1));
    assert_eq!(
        calls[1],
        GlCall::BindBuffer {
            target: consts::ARRAY_BUFFER,
            buffer: 1
        }
    );
    match &calls[2] {
        GlCall::BufferData { target, data, usage } => {
            assert_eq!(*target, consts::ARRAY_BUFFER);
            assert_eq!(data.len(), 24);
            assert_eq!(&data[4..8], &1.0f32.to_le_bytes());
            assert_eq!(*usage, consts::STATIC_DRAW);
        }
        other => panic!("expected BufferData, got {:?}", other),
    }
    assert_eq!(session.handles_issued(), 1);
    assert_eq!(session.handles_dead(), 0);
}

#[test]
fn test_frames_draw_at_refresh_rate() {
    let (mut session, clock) = boot();
    assert_eq!(session.frames(), 0);

    let report = session.run_frames(3);
    assert!(report.frame);
    assert_eq!(report.aborted, 0);
    assert_eq!(session.frames(), 3);
    assert_eq!(session.backend().draw_count(), 3);
    assert_eq!(session.frame_stats().count(), 3);

    // 60 Hz: the third frame lands at 50 ms
    let now = clock.now();
    assert!(now >= ms(49) && now <= ms(51), "clock at {:?}", now);
    println!("{}", session.frame_stats().summary());
}

#[test]
fn test_resize_applied_before_next_draw() {
    let (mut session, _clock) = boot();
    session.run_frames(1);
    session.backend_mut().drain();

    session.set_viewport(1024, 768);
    session.run_frames(1);

    let calls = session.backend().calls();
    assert_eq!(
        calls[0],
        GlCall::Viewport {
            x: 0,
            y: 0,
            width: 1024,
            height: 768
        }
    );
    assert!(matches!(calls.last(), Some(GlCall::DrawArrays { .. })));
    assert_eq!(word(&mut session, 528), 1024);
    assert_eq!(word(&mut session, 532), 768);

    // Unchanged size does not resize again
    session.backend_mut().drain();
    session.run_frames(1);
    assert!(!session
        .backend()
        .calls()
        .iter()
        .any(|c| matches!(c, GlCall::Viewport { .. })));
}

#[test]
fn test_interval_ticks_until_cleared() {
    let (mut session, _clock) = boot();

    session.push_event(key_down("Space"));
    let report = session.run_until(ms(100));
    assert_eq!(report.events, 1);
    assert_eq!(report.ticks, 10);
    assert_eq!(word(&mut session, 520), 10);
    assert_eq!(word(&mut session, 524), 7);
    assert_eq!(session.console().last(), Some("tick 10"));
    assert_eq!(session.context().pending_timers(), 1);

    session.push_event(key_down("KeyR"));
    let report = session.run_until(ms(200));
    assert_eq!(report.ticks, 0);
    assert_eq!(word(&mut session, 520), 10);
    assert_eq!(session.context().pending_timers(), 0);

    // Frames kept running the whole time
    assert!(session.frames() >= 11);
}

#[test]
fn test_invalid_handle_skips_call() {
    let (mut session, _clock) = boot();

    session.push_event(key_down("KeyD"));
    let report = session.pump();
    assert_eq!(report.events, 1);
    assert_eq!(report.aborted, 0);
    assert_eq!(session.aborted_calls(), 0);

    let binds = session
        .backend()
        .calls()
        .iter()
        .filter(|c| matches!(c, GlCall::BindBuffer { .. }))
        .count();
    assert_eq!(binds, 1);
}

#[test]
fn test_out_of_bounds_traps_handler_only() {
    let (mut session, _clock) = boot();

    session.push_event(key_down("KeyS"));
    let report = session.pump();
    assert_eq!(report.aborted, 1);
    assert_eq!(session.aborted_calls(), 1);

    // The store after the faulting call never ran
    assert_eq!(word(&mut session, 536), 0);

    // The session is still alive
    let report = session.run_frames(2);
    assert_eq!(report.aborted, 0);
    assert_eq!(session.backend().draw_count(), 2);
}

#[test]
fn test_suppressed_input_drops_keys() {
    let (mut session, _clock) = boot();
    session.set_input_suppressed(true);

    session.push_event(key_down("Space"));
    session.push_event(InputEvent::Move { x: 10, y: 20 });
    let report = session.pump();
    assert_eq!(report.events, 2);
    assert_eq!(report.aborted, 0);
    assert_eq!(session.context().pending_timers(), 0);

    session.set_input_suppressed(false);
    session.push_event(key_down("Space"));
    session.pump();
    assert_eq!(session.context().pending_timers(), 1);
}

#[test]
fn test_stop_frames_keeps_timers() {
    let (mut session, _clock) = boot();
    session.push_event(key_down("Space"));
    session.pump();
    session.stop_frames();

    let report = session.run_until(ms(50));
    assert!(!report.frame);
    assert_eq!(report.ticks, 5);
    assert_eq!(session.frames(), 0);
}

#[test]
fn test_clock_probe_reports_interval() {
    let config = BridgeConfig::development().timers(TimerConfig::default().clock_samples(5));
    let (mut session, _clock) = boot_with(config);

    session.push_event(key_down("Space"));
    session.run_until(ms(200));

    let report = session.clock_reports().first().cloned().expect("no clock report");
    assert_eq!(report.samples, 5);
    assert!((report.requested_ms - 10.0).abs() < 1e-9);
    assert!((report.measured_ms - 10.0).abs() < 0.01, "measured {}", report.measured_ms);
    assert!((report.measured_hz - 100.0).abs() < 0.1);
    println!("{}", report);

    let rate = session.tick_rate_hz().expect("no tick rate");
    assert!(rate > 90.0 && rate < 110.0, "tick rate {}", rate);
}

fn cstring_at(session: &mut Session<RecordingBackend>, ptr: u32) -> String {
    let bytes = session.read_guest_memory(ptr, 64).expect("string out of bounds");
    let end = bytes.iter().position(|&b| b == 0).expect("string not terminated");
    String::from_utf8(bytes[..end].to_vec()).expect("string not utf-8")
}

#[test]
fn test_export_design_passes_all_fields() {
    let (mut session, _clock) = boot();
    let xml = session
        .export_design("4242", "My design", "a description")
        .expect("export failed");
    assert_eq!(xml, "My design");

    let user = word(&mut session, 548) as u32;
    let description = word(&mut session, 552) as u32;
    assert_eq!(cstring_at(&mut session, user), "4242");
    assert_eq!(cstring_at(&mut session, description), "a description");
}

#[test]
fn test_fuel_budget_is_per_call() {
    let (mut session, _clock) = boot_with(config().fuel_limit(20_000));
    assert_eq!(session.fuel_per_call(), Some(20_000));

    // Far more frames than one shared budget would cover
    let report = session.run_frames(5_000);
    assert_eq!(report.aborted, 0);
    assert_eq!(session.aborted_calls(), 0);
    assert_eq!(session.backend().draw_count(), 5_000);

    let left = session.remaining_fuel().expect("fuel metering off");
    assert!(left > 0 && left < 20_000, "fuel left {}", left);

    // Export still gets a full budget afterwards
    assert_eq!(
        session.export_design("", "late", "").expect("export failed"),
        "late"
    );
}

#[test]
fn test_bounded_backend_in_long_session() {
    let runtime = BridgeRuntime::new(config()).expect("failed to create runtime");
    let module = runtime
        .load_module_bytes("guest", GUEST_WAT.as_bytes())
        .expect("failed to load guest");
    let clock = ManualClock::new();
    let mut session = runtime
        .boot_with_clock(&module, RecordingBackend::bounded(64), PAYLOAD, Arc::new(clock.clone()))
        .expect("failed to boot guest");

    session.run_frames(11_000);
    assert!(session.backend().calls().len() < 128);
    assert_eq!(session.backend().draw_count(), 11_000);
    // Boot made three calls, each frame three more
    assert_eq!(session.backend().total_calls(), 3 + 3 * 11_000);
}

#[test]
fn test_guest_memory_access() {
    let (mut session, _clock) = boot();
    let size = session.memory_size().expect("no memory");
    assert_eq!(size, 65536);

    session.write_guest_memory(2048, b"abc").expect("write failed");
    assert_eq!(session.read_guest_memory(2048, 3).expect("read failed"), b"abc");

    let err = session.read_guest_memory(65530, 16).unwrap_err();
    assert!(matches!(err, BridgeError::OutOfBounds { .. }));
}

#[test]
fn test_missing_required_export() {
    let runtime = BridgeRuntime::new(config()).expect("failed to create runtime");
    let module = runtime
        .load_module_bytes(
            "no-draw",
            br#"(module
                (memory (export "memory") 1)
                (func (export "strlen") (param i32) (result i32) i32.const 0)
                (func (export "malloc") (param i32) (result i32) i32.const 1024)
                (func (export "init") (param i32 i32))
                (func (export "resize") (param i32 i32))
                (func (export "call") (param i32 i32)))"#,
        )
        .expect("failed to load module");

    match runtime.boot(&module, RecordingBackend::new(), b"") {
        Err(BridgeError::MissingExport(name)) => assert_eq!(name, "draw"),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("boot should fail without a draw export"),
    }
}
