//! The closed perception → decision → actuation loop.
//!
//! [`ControlLoop`] owns the three collaborator handles from `rover-hal`, the
//! [`PerceptionPipeline`] and the [`NavigationController`].  Each
//! [`tick`][ControlLoop::tick] runs exactly one cycle to completion:
//!
//! 1. **Sense** – capture a frame and sample telemetry.
//! 2. **Perceive** – warp, classify, project and fold into the world map.
//! 3. **Decide** – step the navigation state machine.
//! 4. **Act** – send the command to the drive.
//!
//! A cycle that fails in steps 1–2 still reaches step 4: the controller is
//! stepped with no navigable data and its fallback command replaces whatever
//! was last sent, so a stale throttle or steer is never left in effect.
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::AtomicBool;
//!
//! use rover_hal::sim::{SimRover, SimScene};
//! use rover_runtime::control_loop::{ControlLoop, ControlLoopConfig};
//!
//! let rover = SimRover::new(SimScene::Open);
//! let mut control = ControlLoop::new(
//!     ControlLoopConfig::default(),
//!     rover.camera(),
//!     rover.telemetry(),
//!     rover.drive(),
//! );
//! let summary = control.run(Some(3), &AtomicBool::new(false));
//! assert_eq!(summary.cycles, 3);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use rover_hal::{Camera, Drive, TelemetrySource};
use rover_perception::{CameraGeometry, ColorThresholds, MapConfig, WorldMap};
use rover_types::{ActuationCommand, CycleReport, Frame, RoverError, VehicleTelemetry};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::decision::{DecisionConfig, NavInputs, NavigationController, VehicleState};
use crate::pipeline::{PerceptionOutput, PerceptionPipeline};

/// Every tunable the loop hands to its components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlLoopConfig {
    pub camera: CameraGeometry,
    pub colors: ColorThresholds,
    pub map: MapConfig,
    pub decision: DecisionConfig,
}

/// Totals for a [`ControlLoop::run`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub map_accepted: u64,
    pub pickups_requested: u64,
}

pub struct ControlLoop {
    run_id: Uuid,
    cycle: u64,
    camera: Box<dyn Camera>,
    telemetry: Box<dyn TelemetrySource>,
    drive: Box<dyn Drive>,
    pipeline: PerceptionPipeline,
    controller: NavigationController,
    overlay: Option<Frame>,
    last_report: Option<CycleReport>,
}

impl ControlLoop {
    pub fn new(
        config: ControlLoopConfig,
        camera: Box<dyn Camera>,
        telemetry: Box<dyn TelemetrySource>,
        drive: Box<dyn Drive>,
    ) -> Self {
        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            camera = camera.id(),
            telemetry = telemetry.id(),
            drive = drive.id(),
            "control loop created"
        );
        Self {
            run_id,
            cycle: 0,
            camera,
            telemetry,
            drive,
            pipeline: PerceptionPipeline::new(config.camera, config.colors, config.map),
            controller: NavigationController::new(config.decision),
            overlay: None,
            last_report: None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Cycles attempted so far, failed ones included.
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    pub fn state(&self) -> VehicleState {
        self.controller.state()
    }

    pub fn world_map(&self) -> &WorldMap {
        self.pipeline.world_map()
    }

    /// Vision overlay from the most recent successful cycle.
    pub fn overlay(&self) -> Option<&Frame> {
        self.overlay.as_ref()
    }

    pub fn last_report(&self) -> Option<&CycleReport> {
        self.last_report.as_ref()
    }

    /// Run one full cycle.
    ///
    /// # Errors
    ///
    /// Returns the first error from capture, telemetry or perception after
    /// the fallback command has been applied, or a drive error when the
    /// command itself cannot be delivered.
    #[instrument(skip_all, fields(run_id = %self.run_id, cycle = self.cycle + 1))]
    pub fn tick(&mut self) -> Result<CycleReport, RoverError> {
        self.cycle += 1;

        // ── 1. Sense ──────────────────────────────────────────────────────────
        let telemetry = match self.telemetry.sample() {
            Ok(t) => t,
            Err(e) => return Err(self.fail_safe(0.0, e)),
        };
        let frame = match self.camera.capture() {
            Ok(f) => f,
            Err(e) => return Err(self.fail_safe(telemetry.velocity, e)),
        };

        // ── 2. Perceive ───────────────────────────────────────────────────────
        let perception = match self.pipeline.process(&frame, &telemetry.pose) {
            Ok(p) => p,
            Err(e) => return Err(self.fail_safe(telemetry.velocity, e)),
        };

        // ── 3. Decide ─────────────────────────────────────────────────────────
        let command = self.controller.step(&Self::inputs(&telemetry, Some(&perception)));

        // ── 4. Act ────────────────────────────────────────────────────────────
        self.drive.apply(&command)?;
        if command.pickup {
            info!(sample_pixels = perception.sample_pixels, "pickup requested");
        }

        let report = self.report(command, Some(&perception));
        self.overlay = Some(perception.overlay);
        self.last_report = Some(report.clone());
        Ok(report)
    }

    /// Tick until `max_cycles` have run or `shutdown` is raised.  Failed
    /// cycles are logged and the loop moves on to the next frame.
    pub fn run(&mut self, max_cycles: Option<u64>, shutdown: &AtomicBool) -> RunSummary {
        let mut summary = RunSummary::default();
        while max_cycles.is_none_or(|max| summary.cycles < max) {
            if shutdown.load(Ordering::Acquire) {
                info!(cycles = summary.cycles, "shutdown requested");
                break;
            }
            summary.cycles += 1;
            match self.tick() {
                Ok(report) => {
                    summary.map_accepted += u64::from(report.map_accepted);
                    summary.pickups_requested += u64::from(report.command.pickup);
                }
                Err(_) => summary.failed_cycles += 1,
            }
        }
        info!(
            cycles = summary.cycles,
            failed = summary.failed_cycles,
            navigable_cells = self.world_map().navigable_cells(),
            obstacle_cells = self.world_map().obstacle_cells(),
            sample_cells = self.world_map().sample_cells(),
            "run finished"
        );
        summary
    }

    /// Step the controller with no navigable data, send its command, and
    /// hand back `error` for the caller to report.
    fn fail_safe(&mut self, velocity: f32, error: RoverError) -> RoverError {
        warn!(error = %error, "cycle failed; applying fallback command");
        let command = self.controller.step(&NavInputs::dropout(velocity));
        if let Err(drive_err) = self.drive.apply(&command) {
            warn!(error = %drive_err, "fallback command could not be delivered");
        }
        self.last_report = Some(self.report(command, None));
        error
    }

    fn inputs<'a>(
        telemetry: &VehicleTelemetry,
        perception: Option<&'a PerceptionOutput>,
    ) -> NavInputs<'a> {
        NavInputs {
            navigable: perception.map(|p| &p.navigable),
            velocity: telemetry.velocity,
            near_sample: telemetry.near_sample,
            picking_up: telemetry.picking_up,
        }
    }

    fn report(&self, command: ActuationCommand, perception: Option<&PerceptionOutput>) -> CycleReport {
        let state = self.controller.state();
        CycleReport {
            run_id: self.run_id,
            cycle: self.cycle,
            timestamp: Utc::now(),
            mode: state.mode,
            stall_timer: state.stall_timer,
            command,
            navigable_points: perception.map(|p| p.navigable.len()),
            mean_angle_deg: perception.and_then(|p| p.navigable.mean_angle_deg()),
            map_accepted: perception.is_some_and(|p| p.map_accepted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_hal::sim::{SimRover, SimScene};
    use rover_types::VehicleMode;

    struct BrokenCamera;

    impl Camera for BrokenCamera {
        fn id(&self) -> &str {
            "broken"
        }

        fn capture(&mut self) -> Result<Frame, RoverError> {
            Err(RoverError::HardwareFault {
                component: "broken".to_string(),
                details: "lens cap on".to_string(),
            })
        }
    }

    fn sim_loop(scene: SimScene) -> (SimRover, ControlLoop) {
        let rover = SimRover::new(scene);
        let control = ControlLoop::new(
            ControlLoopConfig::default(),
            rover.camera(),
            rover.telemetry(),
            rover.drive(),
        );
        (rover, control)
    }

    #[test]
    fn tick_numbers_cycles_and_records_report() {
        let (_rover, mut control) = sim_loop(SimScene::Open);
        let first = control.tick().unwrap();
        let second = control.tick().unwrap();
        assert_eq!(first.cycle, 1);
        assert_eq!(second.cycle, 2);
        assert_eq!(first.run_id, control.run_id());
        assert_eq!(control.last_report().map(|r| r.cycle), Some(2));
        assert!(control.overlay().is_some());
    }

    #[test]
    fn failed_capture_applies_fallback() {
        let rover = SimRover::new(SimScene::Open);
        let mut control = ControlLoop::new(
            ControlLoopConfig::default(),
            Box::new(BrokenCamera),
            rover.telemetry(),
            rover.drive(),
        );
        let err = control.tick().unwrap_err();
        assert!(matches!(err, RoverError::HardwareFault { .. }));

        let sent = rover.last_command().unwrap().expect("fallback sent");
        assert_eq!(sent.throttle, DecisionConfig::default().throttle_set);
        assert_eq!(sent.brake, 0.0);
        assert_eq!(sent.steer, 0.0);

        let report = control.last_report().unwrap();
        assert_eq!(report.navigable_points, None);
        assert!(!report.map_accepted);
        assert_eq!(report.mode, VehicleMode::Forward);
    }

    #[test]
    fn run_stops_on_shutdown_flag() {
        let (_rover, mut control) = sim_loop(SimScene::Open);
        let summary = control.run(None, &AtomicBool::new(true));
        assert_eq!(summary.cycles, 0);
        assert_eq!(control.cycles(), 0);
    }

    #[test]
    fn run_counts_failures() {
        let rover = SimRover::new(SimScene::Open);
        let mut control = ControlLoop::new(
            ControlLoopConfig::default(),
            Box::new(BrokenCamera),
            rover.telemetry(),
            rover.drive(),
        );
        let summary = control.run(Some(4), &AtomicBool::new(false));
        assert_eq!(summary.cycles, 4);
        assert_eq!(summary.failed_cycles, 4);
        assert_eq!(rover.commands_applied().unwrap(), 4);
    }
}
