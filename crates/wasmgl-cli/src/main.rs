//! wasmgl Command-Line Interface
//!
//! This CLI provides tools for:
//! - Running a guest module headless against the recording backend
//! - Downloading design and level payloads
//! - Logging in and uploading designs
//! - Measuring the achieved rate of the host timer

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use wasmgl_bridge::gl::RecordingBackend;
use wasmgl_bridge::remote::{design_link, LoginOutcome, PayloadId, RemoteClient, RemoteConfig, SaveOutcome};
use wasmgl_bridge::scheduler::{Clock, ClockProbe, Fired, MonotonicClock, TimerQueue, TimerTarget};
use wasmgl_bridge::wasm::{BridgeConfig, BridgeRuntime, PumpReport, Session};
use wasmgl_bridge::{InputEvent, ManualClock, SharedClock};

#[derive(Parser)]
#[command(name = "wasmgl")]
#[command(author, version, about = "Headless runner for wasmgl guests", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Bridge configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Level server base URL
    #[arg(long, global = true, default_value = "https://fantasticcontraption.com")]
    server: String,

    /// File holding the user id from the last login
    #[arg(long, global = true, default_value = ".wasmgl-user")]
    user_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot a guest module and drive it headless
    Run {
        /// Guest module (.wasm or .wat)
        #[arg(short, long)]
        module: PathBuf,

        /// Payload file handed to the guest's init
        #[arg(short, long, conflicts_with_all = ["design", "level"])]
        payload: Option<PathBuf>,

        /// Download this design id as the payload
        #[arg(long)]
        design: Option<String>,

        /// Download this level id as the payload
        #[arg(long)]
        level: Option<String>,

        /// Session length in seconds (0 = run until Ctrl+C)
        #[arg(short, long, default_value = "5.0")]
        seconds: f64,

        /// Stop after this many frames instead
        #[arg(long)]
        frames: Option<u64>,

        /// JSON array of input events delivered after boot
        #[arg(long)]
        events: Option<PathBuf>,

        /// Run on a simulated clock (as fast as possible)
        #[arg(long)]
        virtual_time: bool,

        /// Ask the guest for its design XML at the end and write it here
        #[arg(long)]
        export: Option<PathBuf>,

        /// Owner written into the exported design (default: last login)
        #[arg(long)]
        user_id: Option<String>,

        /// Design name written into the exported design
        #[arg(long, default_value = "")]
        name: String,

        /// Design description written into the exported design
        #[arg(long, default_value = "")]
        description: String,

        /// Recent graphics calls kept for the summary
        #[arg(long, default_value = "1024")]
        call_window: usize,

        /// Number of console lines to print at the end
        #[arg(long, default_value = "20")]
        console_tail: usize,
    },

    /// Download a design or level payload
    Fetch {
        /// Design id
        #[arg(long)]
        design: Option<String>,

        /// Level id
        #[arg(long)]
        level: Option<String>,

        /// Output file (or - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Log in to the level server
    Login {
        /// User name
        #[arg(short, long)]
        user: String,

        /// Password
        #[arg(short, long)]
        password: String,
    },

    /// Upload a design XML file
    Save {
        /// Design XML produced by `run --export`
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Measure the achieved host timer rate for a requested interval
    Clock {
        /// Requested interval in milliseconds
        #[arg(short, long, default_value = "33")]
        interval_ms: u64,

        /// Intervals to average
        #[arg(short, long, default_value = "50")]
        samples: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let remote = RemoteConfig {
        base_url: cli.server.clone(),
        ..Default::default()
    };

    match cli.command {
        Commands::Run {
            module,
            payload,
            design,
            level,
            seconds,
            frames,
            events,
            virtual_time,
            export,
            user_id,
            name,
            description,
            call_window,
            console_tail,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let payload = match payload {
                Some(path) => fs::read(&path).with_context(|| format!("Failed to read payload {}", path.display()))?,
                None => {
                    let id = PayloadId::from_ids(design.as_deref(), level.as_deref());
                    fetch(&remote, &id)?
                }
            };
            let user_id = match user_id {
                Some(id) => id,
                None => read_user_id(&cli.user_file)?.unwrap_or_default(),
            };
            let run = RunOptions {
                seconds,
                frames,
                events,
                virtual_time,
                export,
                design_info: DesignInfo {
                    user_id,
                    name,
                    description,
                },
                call_window,
                console_tail,
            };
            cmd_run(config, &module, &payload, run)
        }

        Commands::Fetch { design, level, output } => cmd_fetch(&remote, design, level, &output),

        Commands::Login { user, password } => cmd_login(&remote, &user, &password, &cli.user_file),

        Commands::Save { input } => cmd_save(&remote, &input),

        Commands::Clock { interval_ms, samples } => cmd_clock(interval_ms, samples),
    }
}

fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    let config = match path {
        Some(path) => BridgeConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    config.validate().context("Invalid bridge configuration")?;
    Ok(config)
}

fn fetch(remote: &RemoteConfig, id: &PayloadId) -> Result<Vec<u8>> {
    let client = RemoteClient::new(remote.clone());
    client
        .fetch_payload(id)
        .with_context(|| format!("Failed to fetch {:?} from {}", id, remote.base_url))
}

struct RunOptions {
    seconds: f64,
    frames: Option<u64>,
    events: Option<PathBuf>,
    virtual_time: bool,
    export: Option<PathBuf>,
    design_info: DesignInfo,
    call_window: usize,
    console_tail: usize,
}

/// Owner, name and description handed to the guest's `export`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct DesignInfo {
    user_id: String,
    name: String,
    description: String,
}

/// User id saved by `login`, or `None` when nobody has logged in.
fn read_user_id(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => {
            let id = text.trim();
            Ok((!id.is_empty()).then(|| id.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

fn write_user_id(path: &Path, user_id: &str) -> Result<()> {
    fs::write(path, format!("{}\n", user_id)).with_context(|| format!("Failed to write {}", path.display()))
}

fn export_design(session: &mut Session<RecordingBackend>, info: &DesignInfo, path: &Path) -> Result<()> {
    let xml = session
        .export_design(&info.user_id, &info.name, &info.description)
        .context("Guest failed to export its design")?;
    fs::write(path, xml.as_bytes()).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), bytes = xml.len(), "design exported");
    Ok(())
}

fn cmd_run(config: BridgeConfig, module_path: &Path, payload: &[u8], opts: RunOptions) -> Result<()> {
    if !(opts.seconds.is_finite() && opts.seconds >= 0.0) {
        bail!("--seconds must be a non-negative number, got {}", opts.seconds);
    }

    let events: Vec<InputEvent> = match &opts.events {
        Some(path) => {
            let text =
                fs::read_to_string(path).with_context(|| format!("Failed to read events {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("Failed to parse events {}", path.display()))?
        }
        None => Vec::new(),
    };

    let runtime = BridgeRuntime::new(config).context("Failed to create runtime")?;
    let module = runtime
        .load_module(module_path)
        .with_context(|| format!("Failed to load module {}", module_path.display()))?;

    let clock: SharedClock = if opts.virtual_time {
        Arc::new(ManualClock::new())
    } else {
        Arc::new(MonotonicClock::new())
    };

    let started = Instant::now();
    let mut session = runtime
        .boot_with_clock(&module, RecordingBackend::bounded(opts.call_window), payload, clock)
        .context("Failed to boot guest")?;
    info!(
        module = module.name(),
        payload = payload.len(),
        boot_ms = started.elapsed().as_secs_f64() * 1000.0,
        "guest booted"
    );

    for event in events {
        session.push_event(event);
    }

    let report = match opts.frames {
        Some(frames) => session.run_frames(frames),
        None if opts.seconds == 0.0 => run_until_interrupted(&mut session)?,
        None => {
            let deadline = session.clock().now() + Duration::from_secs_f64(opts.seconds);
            session.run_until(deadline)
        }
    };
    if report.aborted > 0 {
        warn!(aborted = report.aborted, "guest calls trapped during the run");
    }

    print_summary(&session, started.elapsed(), opts.console_tail);

    if let Some(path) = &opts.export {
        if opts.design_info.user_id.is_empty() {
            warn!("Exporting without a user id; run `wasmgl login` or pass --user-id");
        }
        export_design(&mut session, &opts.design_info, path)?;
        println!("Design written to {}", path.display());
    }

    Ok(())
}

fn run_until_interrupted(session: &mut Session<RecordingBackend>) -> Result<PumpReport> {
    // Setup Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    println!("Running guest... (Press Ctrl+C to stop)\n");

    // Wake at least this often to notice Ctrl+C
    let max_sleep = Duration::from_millis(100);
    let mut total = PumpReport::default();
    while running.load(Ordering::SeqCst) {
        let step = session.pump();
        total.events += step.events;
        total.ticks += step.ticks;
        total.frame |= step.frame;
        total.aborted += step.aborted;

        let now = session.clock().now();
        let next = session.next_wake().map_or(now + max_sleep, |t| t.min(now + max_sleep));
        session.clock().sleep_until(next);
    }
    Ok(total)
}

fn print_summary(session: &Session<RecordingBackend>, wall: Duration, console_tail: usize) {
    println!("=== Session Summary ===");
    println!();
    println!("Frames:");
    println!("  Drawn:             {}", session.frames());
    println!("  Draw calls:        {}", session.backend().draw_count());
    println!("  GL calls:          {}", session.backend().total_calls());
    println!("  Cost:              {}", session.frame_stats().summary());
    println!();
    println!("Guest:");
    println!("  Viewport:          {}x{}", session.viewport().width, session.viewport().height);
    println!("  Handles issued:    {}", session.handles_issued());
    println!("  Handles dead:      {}", session.handles_dead());
    println!("  Trapped calls:     {}", session.aborted_calls());
    println!("  Pending timers:    {}", session.context().pending_timers());
    match session.tick_rate_hz() {
        Some(rate) => println!("  Tick rate:         {:.1} Hz", rate),
        None => println!("  Tick rate:         -"),
    }
    if let Some(fuel) = session.fuel_per_call() {
        println!("  Fuel per call:     {}", fuel);
    }
    for report in session.clock_reports() {
        println!("  {} (requested {:.3} Hz)", report, report.requested_hz());
    }
    println!();
    println!("Timing:");
    println!("  Session clock:     {:.3} s", session.clock().now().as_secs_f64());
    println!("  Wall time:         {:.3} s", wall.as_secs_f64());

    let lines: Vec<&str> = session.console().lines().collect();
    if console_tail > 0 && !lines.is_empty() {
        println!();
        println!("Console (last {} of {}):", console_tail.min(lines.len()), lines.len());
        for line in &lines[lines.len().saturating_sub(console_tail)..] {
            println!("  {}", line);
        }
    }
}

fn cmd_fetch(remote: &RemoteConfig, design: Option<String>, level: Option<String>, output: &Path) -> Result<()> {
    let id = PayloadId::from_ids(design.as_deref(), level.as_deref());
    let body = fetch(remote, &id)?;

    if output.as_os_str() == "-" {
        use std::io::Write;
        std::io::stdout().write_all(&body).context("Failed to write payload")?;
    } else {
        fs::write(output, &body).with_context(|| format!("Failed to write {}", output.display()))?;
        println!("Wrote {} bytes to {}", body.len(), output.display());
    }
    Ok(())
}

fn cmd_login(remote: &RemoteConfig, user: &str, password: &str, user_file: &Path) -> Result<()> {
    let client = RemoteClient::new(remote.clone());
    match client.login(user, password).context("Login request failed")? {
        LoginOutcome::LoggedIn { user_id } => {
            write_user_id(user_file, &user_id)?;
            println!("Logged in as {} (user id {})", user, user_id);
            println!("User id saved to {}", user_file.display());
            Ok(())
        }
        LoginOutcome::Failed => bail!("Login failed"),
    }
}

fn cmd_save(remote: &RemoteConfig, input: &Path) -> Result<()> {
    let xml = fs::read_to_string(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let client = RemoteClient::new(remote.clone());
    match client.save_design(&xml).context("Save request failed")? {
        SaveOutcome::Saved { design_id } => {
            println!("Saved design {}", design_id);
            println!("{}", design_link(&remote.base_url, &design_id));
            Ok(())
        }
        SaveOutcome::Failed { response } => bail!("Save failed: {}", response),
    }
}

fn cmd_clock(interval_ms: u64, samples: u32) -> Result<()> {
    if interval_ms == 0 {
        bail!("--interval-ms must be at least 1");
    }
    let interval = Duration::from_millis(interval_ms);
    let clock = MonotonicClock::new();
    let mut timers = TimerQueue::new(Duration::from_millis(1));
    timers.request_periodic(clock.now(), interval, TimerTarget::Probe(ClockProbe::new(interval, samples)));

    println!(
        "Set clock to {} ms (expected {:.3} Hz), sampling {} ticks...",
        interval_ms,
        1000.0 / interval_ms as f64,
        samples
    );

    while let Some(next) = timers.next_deadline() {
        clock.sleep_until(next);
        while let Some(fired) = timers.pop_due(clock.now()) {
            if let Fired::Probe { report: Some(report), .. } = fired {
                println!("{}", report);
                let drift = (report.measured_ms - report.requested_ms) / report.requested_ms * 100.0;
                println!("Drift: {:+.2}%", drift);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUEST_WAT: &str = include_str!("../../wasmgl-bridge/tests/fixtures/guest.wat");

    #[test]
    fn test_user_id_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user");
        assert_eq!(read_user_id(&path).unwrap(), None);

        write_user_id(&path, "4242").unwrap();
        assert_eq!(read_user_id(&path).unwrap(), Some("4242".to_string()));

        fs::write(&path, "  \n").unwrap();
        assert_eq!(read_user_id(&path).unwrap(), None);
    }

    #[test]
    fn test_export_passes_design_info() {
        let runtime = BridgeRuntime::new(BridgeConfig::headless()).unwrap();
        let module = runtime.load_module_bytes("guest", GUEST_WAT.as_bytes()).unwrap();
        let mut session = runtime
            .boot_with_clock(&module, RecordingBackend::bounded(16), b"<level/>", Arc::new(ManualClock::new()))
            .unwrap();

        let info = DesignInfo {
            user_id: "4242".to_string(),
            name: "Bridge".to_string(),
            description: "Crosses the gap".to_string(),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("design.xml");
        export_design(&mut session, &info, &path).unwrap();

        // The fixture answers with the name and keeps the other two pointers
        assert_eq!(fs::read_to_string(&path).unwrap(), "Bridge");
        let cstring = |session: &mut Session<RecordingBackend>, slot: u32| {
            let ptr = session.read_guest_memory(slot, 4).unwrap();
            let ptr = u32::from_le_bytes([ptr[0], ptr[1], ptr[2], ptr[3]]);
            let bytes = session.read_guest_memory(ptr, 32).unwrap();
            let end = bytes.iter().position(|&b| b == 0).unwrap();
            String::from_utf8(bytes[..end].to_vec()).unwrap()
        };
        assert_eq!(cstring(&mut session, 548), "4242");
        assert_eq!(cstring(&mut session, 552), "Crosses the gap");
    }
}
