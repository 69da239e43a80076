//! # Tracking Receiver Demo Host
//! Connects to the vision producer and runs a fixed-rate consumer tick, the way a render loop would.
//!
//! ## Flow
//! - Build the config: JSON file (optional) then CLI overrides.
//! - Start the background receiver (connect → handshake → stream, retried with backoff).
//! - Each tick: take the freshest sample, decode its frame, replay every known target.
//! - Once per second: log the status counters.
//!
//! Logging goes through `env_logger` (default `info`, override with `RUST_LOG`).

use std::{
    path::PathBuf,
    process::ExitCode,
    time::{Duration, Instant},
};

use clap::Parser;
use image::DynamicImage;
use log::{debug, error, info};
use spin_sleep::{SpinSleeper, SpinStrategy};

use tracking_receiver::{
    ConnectionState, FrameSink, NormalizedPoint, PositionSink, ReceiverConfig, Role,
    TickDispatcher, TrackedPoint, TrackingReceiver, Viewport,
};

const STATUS_INTERVAL: Duration = Duration::from_secs(1);
const MAX_TICK_HZ: f64 = 1000.0;

#[derive(Parser, Debug)]
#[command(author, version, about = "Receive head/hand tracking data over TCP", long_about = None)]
struct Args {
    /// JSON config file; CLI flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Producer host
    #[arg(long)]
    host: Option<String>,

    /// Producer port
    #[arg(short, long)]
    port: Option<u16>,

    /// Tracking role: head or hands
    #[arg(short, long)]
    role: Option<Role>,

    /// Wait for START_TRANSMISSION after the ready exchange
    #[arg(long)]
    await_start: bool,

    /// Give up after this many consecutive failed attempts
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Consumer tick rate, up to 1000 Hz
    #[arg(long, default_value = "60.0", value_parser = parse_tick_hz)]
    tick_hz: f64,

    /// Stop after this many seconds (0 = run until the receiver gives up)
    #[arg(long, default_value = "0")]
    duration_secs: u64,

    /// Append the receiver event trace to this CSV file
    #[arg(long)]
    event_log: Option<PathBuf>,
}

/// Logs target positions, throttled to one line per point per second.
struct PositionLog {
    viewport: Viewport,
    last_logged: Vec<(TrackedPoint, Instant)>,
}

impl PositionSink for PositionLog {
    fn on_position(&mut self, point: TrackedPoint, position: NormalizedPoint) {
        let now = Instant::now();
        let due = match self.last_logged.iter_mut().find(|(p, _)| *p == point) {
            Some((_, last)) if now.duration_since(*last) < STATUS_INTERVAL => false,
            Some((_, last)) => {
                *last = now;
                true
            }
            None => {
                self.last_logged.push((point, now));
                true
            }
        };
        if due {
            let (wx, wy) = self.viewport.to_world(position);
            info!(
                "[Tick] {} → ({:.3}, {:.3}) world ({:.2}, {:.2})",
                point.name(),
                position.x,
                position.y,
                wx,
                wy
            );
        }
    }
}

#[derive(Default)]
struct FrameStats {
    frames: u64,
    last_size: Option<(u32, u32)>,
}

impl FrameSink for FrameStats {
    fn on_frame(&mut self, frame: DynamicImage) {
        self.frames += 1;
        let size = (frame.width(), frame.height());
        if self.last_size != Some(size) {
            info!("[Tick] camera frame {}x{}", size.0, size.1);
            self.last_size = Some(size);
        }
    }
}

fn parse_tick_hz(s: &str) -> Result<f64, String> {
    let hz: f64 = s.parse().map_err(|e| format!("{}", e))?;
    // The tick period must fit a Duration.
    if hz <= MAX_TICK_HZ && Duration::try_from_secs_f64(1.0 / hz).is_ok() {
        Ok(hz)
    } else {
        Err(format!("must be in (0, {}] (got {})", MAX_TICK_HZ, s))
    }
}

fn build_config(args: &Args) -> Result<ReceiverConfig, tracking_receiver::ConfigError> {
    let mut config = match &args.config {
        Some(path) => ReceiverConfig::from_json_file(path)?,
        None => ReceiverConfig::default(),
    };
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(role) = args.role {
        config.role = role;
    }
    if args.await_start {
        config.await_start_transmission = true;
    }
    if args.max_attempts.is_some() {
        config.max_attempts = args.max_attempts;
    }
    if args.event_log.is_some() {
        config.event_log = args.event_log.clone();
    }
    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("=== TRACKING RECEIVER START ({} @ {}) ===", config.role, config.address());
    let role = config.role;
    let receiver = TrackingReceiver::new(config);
    if let Err(e) = receiver.connect() {
        error!("Failed to start receiver: {}", e);
        return ExitCode::FAILURE;
    }

    let mut dispatcher = TickDispatcher::new(role);
    let mut positions = PositionLog {
        viewport: Viewport::new(0.0, 0.0, 16.0, 9.0),
        last_logged: Vec::new(),
    };
    let mut frames = FrameStats::default();

    let period = Duration::from_secs_f64(1.0 / args.tick_hz);
    let run_for = (args.duration_secs > 0).then(|| Duration::from_secs(args.duration_secs));
    let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);

    let start = Instant::now();
    let mut next_tick = start + period;
    let mut next_status = start + STATUS_INTERVAL;
    let mut ticks: u64 = 0;
    let mut late_ticks: u64 = 0;

    loop {
        let now = Instant::now();
        if now < next_tick {
            sleeper.sleep(next_tick - now);
        } else {
            late_ticks += 1;
        }
        next_tick += period;
        ticks += 1;

        let report = dispatcher.tick(receiver.mailbox(), &mut positions, &mut frames);
        if report.new_sample {
            debug!("[Tick] #{} {:?}", ticks, report);
        }

        if Instant::now() >= next_status {
            next_status += STATUS_INTERVAL;
            let status = receiver.status();
            info!(
                "[Status] state={} attempts={} published={} overwritten={} decode_errors={} framing_resets={} frames={} last_sample_age={:?}",
                status.state,
                status.attempts,
                status.samples_published,
                status.samples_overwritten,
                status.decode_errors,
                status.framing_resets,
                frames.frames,
                status.last_sample_age
            );
            if let Some(err) = &status.last_error {
                debug!("[Status] last_error={}", err);
            }
        }

        if run_for.is_some_and(|d| start.elapsed() >= d) {
            info!("Run duration reached");
            break;
        }
        if !receiver.is_running() {
            let status = receiver.status();
            if status.state == ConnectionState::Failed {
                error!(
                    "Receiver stopped: {}",
                    status.last_error.as_deref().unwrap_or("unknown error")
                );
            } else {
                info!("Receiver stopped");
            }
            break;
        }
    }

    receiver.shutdown();
    info!(
        "=== TRACKING RECEIVER FINISHED ({} ticks, {} late, {} frames, {} rejected) ===",
        ticks,
        late_ticks,
        dispatcher.frames_decoded(),
        dispatcher.frames_rejected()
    );
    ExitCode::SUCCESS
}
