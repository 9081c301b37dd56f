//! # Cadence Robot
//!
//! Demonstration robot program on the cadence framework: a drive base
//! with reset-to-zero operator inputs, two simulated motors, and a
//! flywheel shooter automated by a state machine (deploy → spin up →
//! fire).
//!
//! The program wires the component graph, runs a disabled → teleop
//! transition, then paces the control loop at the configured period
//! until Ctrl-C (or `--ticks` in simulation) and logs tick statistics
//! on the way out.

use std::cell::RefCell;
use std::path::PathBuf;
use std::process;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use cadence_core::clock::MonotonicClock;
use cadence_core::config::{CoreConfig, load_config};
use cadence_core::cycle::{CycleDriver, CycleDriverBuilder, Mode};
use cadence_core::fsm::StateMachine;
use cadence_core::report::TracingSink;
use cadence_core::telemetry::MemoryTelemetry;

mod robot;

use robot::{Drive, Operator, ShooterLogic, SimMotor};

/// Cadence Robot — demonstration control loop
#[derive(Parser, Debug)]
#[command(name = "cadence_robot")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Tick-driven demonstration robot program")]
struct Args {
    /// Path to the robot configuration TOML.
    #[arg(default_value = "config/robot.toml")]
    config: PathBuf,

    /// Run a fixed number of ticks and exit (0 = run until Ctrl-C).
    #[arg(long, default_value_t = 0)]
    ticks: u64,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("Cadence Robot v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Cadence Robot shutdown complete");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&args.config)?;
    info!(
        "Config OK: period={}s, telemetry_prefix='{}'",
        config.control_loop_period, config.telemetry_prefix,
    );

    let mut driver = build_robot(&config)?;
    driver.create_components()?;
    info!("Component graph wired, entering control loop");

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    // Startup sequence: a moment of disabled, then teleop.
    driver.publish_mode(Mode::Disabled);
    driver.run_mode_transition(true);
    driver.publish_mode(Mode::Teleop);

    let period = Duration::from_secs_f64(config.control_loop_period);
    let mut next_tick = Instant::now();

    while running.load(Ordering::SeqCst) {
        driver.run_tick();

        if args.ticks > 0 && driver.tick() >= args.ticks {
            break;
        }

        // Fixed-cadence pacing against absolute deadlines.
        next_tick += period;
        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        } else {
            next_tick = now;
        }
    }

    driver.run_mode_transition(false);
    driver.publish_mode(Mode::Disabled);

    let stats = driver.stats();
    info!(
        "Loop stats: {} ticks, avg={:.6}s, max={:.6}s, overruns={}",
        stats.tick_count,
        stats.avg_tick_s(),
        stats.max_tick_s,
        stats.overruns,
    );

    Ok(())
}

/// Declare the demonstration component graph.
fn build_robot(config: &CoreConfig) -> Result<CycleDriver, Box<dyn std::error::Error>> {
    let mut builder = CycleDriverBuilder::new();

    builder.provide_shared(
        "drive_left_motor",
        Rc::new(RefCell::new(SimMotor::default())),
    );
    builder.provide_shared(
        "drive_right_motor",
        Rc::new(RefCell::new(SimMotor::default())),
    );
    builder.provide_shared(
        "shooter_flywheel_motor",
        Rc::new(RefCell::new(SimMotor::default())),
    );

    builder.component("operator", Operator::default());
    builder.component("drive", Drive::default());
    builder.component("shooter", StateMachine::new(ShooterLogic::default())?);

    let driver = builder.build(
        Box::new(MonotonicClock::new()),
        Box::new(MemoryTelemetry::new()),
        Box::new(TracingSink),
        config.clone(),
    )?;
    Ok(driver)
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
