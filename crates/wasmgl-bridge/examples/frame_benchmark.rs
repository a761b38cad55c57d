//! Bridge frame and import benchmarks
//!
//! Run with: cargo run -p wasmgl-bridge --example frame_benchmark --release

use std::sync::Arc;
use std::time::{Duration, Instant};

use wasmgl_bridge::gl::RecordingBackend;
use wasmgl_bridge::wasm::{BridgeConfig, BridgeRuntime, TimerConfig};
use wasmgl_bridge::{FrameStats, InputEvent, ManualClock};

const GUEST_WAT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/guest.wat"));
const PAYLOAD: &[u8] = b"<level/>";

fn config() -> BridgeConfig {
    BridgeConfig::default().timers(TimerConfig::default().measure_clock(false))
}

fn main() {
    println!("=== Bridge Frame Benchmarks ===\n");

    bench_module_loading();
    bench_boot();
    bench_frames();
    bench_timer_ticks();
    bench_with_fuel_metering();

    println!("\n=== Benchmark Complete ===");
}

fn bench_module_loading() {
    println!("## Module Loading");

    let runtime = BridgeRuntime::new(config()).unwrap();
    let _ = runtime.load_module_bytes("guest", GUEST_WAT.as_bytes()).unwrap();

    let mut stats = FrameStats::new();
    for _ in 0..100 {
        let start = Instant::now();
        let _ = runtime.load_module_bytes("guest", GUEST_WAT.as_bytes()).unwrap();
        stats.record(start.elapsed().as_micros() as u64);
    }

    println!("  load_module: {}", stats.summary());
    println!();
}

fn bench_boot() {
    println!("## Boot (instantiate + init + resize)");

    let runtime = BridgeRuntime::new(config()).unwrap();
    let module = runtime.load_module_bytes("guest", GUEST_WAT.as_bytes()).unwrap();

    for _ in 0..5 {
        let _ = runtime.boot(&module, RecordingBackend::new(), PAYLOAD).unwrap();
    }

    for size in [64usize, 4096, 65536, 1 << 20] {
        let payload = vec![b'x'; size];
        let mut stats = FrameStats::new();
        for _ in 0..50 {
            let start = Instant::now();
            let _ = runtime.boot(&module, RecordingBackend::new(), &payload).unwrap();
            stats.record(start.elapsed().as_micros() as u64);
        }
        println!("  payload {:>8} bytes: {}", size, stats.summary());
    }
    println!();
}

fn bench_frames() {
    println!("## Frame Pump");

    let runtime = BridgeRuntime::new(config().refresh_hz(1000)).unwrap();
    let module = runtime.load_module_bytes("guest", GUEST_WAT.as_bytes()).unwrap();
    let clock = ManualClock::new();
    let mut session = runtime
        .boot_with_clock(&module, RecordingBackend::bounded(1024), PAYLOAD, Arc::new(clock.clone()))
        .unwrap();

    session.run_frames(100);

    let frames = 10_000;
    let start = Instant::now();
    session.run_frames(frames);
    let elapsed = start.elapsed();

    println!("  draw:       {}", session.frame_stats().summary());
    println!(
        "  wall time:  {:?} ({:.2} us/frame, {} GL calls)",
        elapsed,
        elapsed.as_micros() as f64 / frames as f64,
        session.backend().total_calls()
    );
    println!();
}

fn bench_timer_ticks() {
    println!("## Timer Ticks");

    let runtime = BridgeRuntime::new(config()).unwrap();
    let module = runtime.load_module_bytes("guest", GUEST_WAT.as_bytes()).unwrap();
    let clock = ManualClock::new();
    let mut session = runtime
        .boot_with_clock(&module, RecordingBackend::new(), PAYLOAD, Arc::new(clock.clone()))
        .unwrap();
    session.stop_frames();
    session.push_event(InputEvent::KeyDown {
        code: "Space".to_string(),
    });
    session.pump();

    let start = Instant::now();
    let report = session.run_until(Duration::from_secs(100));
    let elapsed = start.elapsed();

    println!(
        "  {} ticks in {:?} ({:.2} us/tick incl. printf)",
        report.ticks,
        elapsed,
        elapsed.as_micros() as f64 / report.ticks.max(1) as f64
    );
    if let Some(rate) = session.tick_rate_hz() {
        println!("  session-clock tick rate: {:.1} Hz", rate);
    }
    println!();
}

fn bench_with_fuel_metering() {
    println!("## Fuel Metering Overhead");

    let frames = 5_000;
    for (label, config) in [
        ("no fuel", config().refresh_hz(1000)),
        ("fuel", config().refresh_hz(1000).fuel_limit(u64::MAX / 2)),
    ] {
        let runtime = BridgeRuntime::new(config).unwrap();
        let module = runtime.load_module_bytes("guest", GUEST_WAT.as_bytes()).unwrap();
        let clock = ManualClock::new();
        let mut session = runtime
            .boot_with_clock(&module, RecordingBackend::new(), PAYLOAD, Arc::new(clock.clone()))
            .unwrap();

        let start = Instant::now();
        session.run_frames(frames);
        let elapsed = start.elapsed();

        println!(
            "  {:>8}: {:?} ({:.2} us/frame)",
            label,
            elapsed,
            elapsed.as_micros() as f64 / frames as f64
        );
        // Each draw starts from a full budget, so what is left shows the last draw's cost
        if let (Some(budget), Some(left)) = (session.fuel_per_call(), session.remaining_fuel()) {
            println!("            fuel per draw: {}", budget - left);
        }
    }
    println!();
}
