//! `rover` – runs the rover control loop against the built-in simulator.
//!
//! 1. Loads `~/.rover/config.toml` (or `--config PATH`), applying `ROVER_*`
//!    environment overrides; `--init` writes the defaults there first.
//! 2. Builds a [`SimRover`] for the configured scene and a [`ControlLoop`]
//!    around its camera, telemetry and drive.
//! 3. Runs for the configured number of cycles, or until **Ctrl-C**, which
//!    raises the shutdown flag so the loop stops between cycles.
//! 4. Prints a run summary and, with `--json`, the last cycle report.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use colored::Colorize;
use rover_hal::sim::{SimRover, SimScene};
use rover_runtime::{ControlLoop, RunSummary, telemetry};
use rover_types::RoverError;
use tracing::{info, warn};

/// Drive the rover control loop against the built-in simulator.
#[derive(Parser, Debug, Default, PartialEq)]
#[command(name = "rover", version, about, long_about = None)]
struct Args {
    /// Config file (default ~/.rover/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Simulator scene, overrides [sim].scene
    #[arg(long, value_parser = ["open", "wall", "sample"])]
    scene: Option<String>,

    /// Cycles to run (0 = until Ctrl-C), overrides [sim].cycles
    #[arg(long, value_name = "N")]
    cycles: Option<u64>,

    /// Write the effective config to the config path and continue
    #[arg(long)]
    init: bool,

    /// Print the final cycle report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let _otel = telemetry::init_tracing("rover");

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), RoverError> {
    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let path = args.config.clone().unwrap_or_else(config::config_path);
    let mut cfg = match config::load_from(&path)? {
        Some(cfg) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        None => {
            println!("  No config at {}; using defaults.", path.display().to_string().dimmed());
            config::load_or_default(&path)?
        }
    };
    if let Some(scene) = args.scene {
        cfg.sim.scene = scene;
    }
    if let Some(cycles) = args.cycles {
        cfg.sim.cycles = cycles;
    }
    if args.init {
        config::save_to(&cfg, &path)?;
        println!("  {} Config saved to {}", "✓".green().bold(), path.display().to_string().bold());
    }

    // ── Shutdown flag ─────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping after this cycle …".yellow().bold());
        flag.store(true, Ordering::Release);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; run until the cycle limit");
    }

    // ── Control loop ──────────────────────────────────────────────────────
    let scene: SimScene = cfg.sim.scene.parse()?;
    let rover = SimRover::new(scene);
    let mut control = ControlLoop::new(
        cfg.control_loop(),
        rover.camera(),
        rover.telemetry(),
        rover.drive(),
    );
    let max_cycles = (cfg.sim.cycles > 0).then_some(cfg.sim.cycles);
    info!(scene = %cfg.sim.scene, ?max_cycles, "starting control loop");
    println!(
        "  Driving scene {} for {} …\n",
        cfg.sim.scene.bold(),
        max_cycles.map_or("ever (Ctrl-C to stop)".to_string(), |n| format!("{n} cycles"))
    );

    let summary = control.run(max_cycles, &shutdown);
    print_summary(&control, &summary, &rover);

    if args.json
        && let Some(report) = control.last_report()
    {
        let json = serde_json::to_string_pretty(report)
            .map_err(|e| RoverError::Config(format!("failed to encode report: {e}")))?;
        println!("{json}");
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ________ _  _____ ____"#.bold().cyan());
    println!("{}", r#"  / __/ __ \ |/ / -_) __/"#.bold().cyan());
    println!("{}", r#" /_/  \____/___/\__/_/   "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "rover".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Autonomous ground-rover navigation");
    println!();
}

fn print_summary(control: &ControlLoop, summary: &RunSummary, rover: &SimRover) {
    let map = control.world_map();
    let state = control.state();
    println!("{}", "  Run summary".bold().underline());
    println!("    run id          {}", control.run_id().to_string().dimmed());
    println!(
        "    cycles          {} ({} failed)",
        summary.cycles,
        if summary.failed_cycles == 0 {
            "0".green()
        } else {
            summary.failed_cycles.to_string().red()
        }
    );
    println!("    final mode      {} (stall timer {})", state.mode.to_string().bold(), state.stall_timer);
    println!("    map accepted    {} cycles", summary.map_accepted);
    println!("    pickups         {}", summary.pickups_requested);
    println!(
        "    map cells       navigable {} / obstacle {} / sample {}",
        map.navigable_cells().to_string().green(),
        map.obstacle_cells().to_string().red(),
        map.sample_cells().to_string().yellow()
    );
    match rover.pose() {
        Ok(pose) => println!("    final pose      x={:.2} y={:.2} yaw={:.1}°", pose.x, pose.y, pose.yaw),
        Err(e) => println!("    final pose      {}", e.to_string().red()),
    }
    println!();
}
