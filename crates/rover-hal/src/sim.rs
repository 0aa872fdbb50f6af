//! In-process simulated rover for headless runs and CI without a vehicle.
//!
//! [`SimRover`] owns one shared vehicle state and hands out a [`Camera`], a
//! [`TelemetrySource`] and a [`Drive`] that all act on it.  The drive
//! integrates a crude kinematic model so that throttle, brake and steer
//! commands feed back into the next telemetry sample.
//!
//! # Example
//!
//! ```rust
//! use rover_hal::sim::{SimRover, SimScene};
//! use rover_hal::{Camera, Drive, TelemetrySource};
//! use rover_types::ActuationCommand;
//!
//! let rover = SimRover::new(SimScene::Open);
//! let mut camera = rover.camera();
//! let mut telemetry = rover.telemetry();
//! let mut drive = rover.drive();
//!
//! assert_eq!(camera.capture().unwrap().width(), 320);
//! drive
//!     .apply(&ActuationCommand { throttle: 0.2, ..ActuationCommand::default() })
//!     .expect("sim drive must succeed");
//! assert!(telemetry.sample().unwrap().velocity > 0.0);
//! ```

use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use rover_types::{ActuationCommand, Frame, Pose, RoverError, VehicleTelemetry};
use tracing::trace;

use crate::camera::Camera;
use crate::drive::Drive;
use crate::vehicle::TelemetrySource;

/// Simulated frame size, matching the reference camera calibration.
pub const SIM_FRAME_WIDTH: usize = 320;
pub const SIM_FRAME_HEIGHT: usize = 160;

/// Seconds simulated per applied command.
const SIM_DT: f32 = 0.1;
const ACCEL_PER_THROTTLE: f32 = 10.0;
const DECEL_PER_BRAKE: f32 = 0.5;
const MAX_SPEED: f32 = 5.0;
/// Heading change per cycle per degree of steer.
const YAW_RATE: f32 = 0.2;

const GROUND: [u8; 3] = [200, 190, 180];
const ROCK: [u8; 3] = [70, 55, 40];
const SAMPLE: [u8; 3] = [180, 160, 20];

// ────────────────────────────────────────────────────────────────────────────
// Scene
// ────────────────────────────────────────────────────────────────────────────

/// What the simulated camera sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimScene {
    /// Bright open ground below the horizon, rock above.
    #[default]
    Open,
    /// Rock filling the whole view.
    Wall,
    /// Open ground with a sample right in front of the rover.
    Sample,
}

impl FromStr for SimScene {
    type Err = RoverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(SimScene::Open),
            "wall" => Ok(SimScene::Wall),
            "sample" => Ok(SimScene::Sample),
            other => Err(RoverError::Config(format!("unknown sim scene '{other}'"))),
        }
    }
}

impl SimScene {
    fn render(self) -> Frame {
        let (w, h) = (SIM_FRAME_WIDTH, SIM_FRAME_HEIGHT);
        let horizon = h / 2;
        let mut frame = Frame::filled(w, h, ROCK);
        if self == SimScene::Wall {
            return frame;
        }
        for y in horizon..h {
            for x in 0..w {
                frame.set_pixel(x, y, GROUND);
            }
        }
        if self == SimScene::Sample {
            for y in h - 40..h - 5 {
                for x in w / 2 - 40..w / 2 + 40 {
                    frame.set_pixel(x, y, SAMPLE);
                }
            }
        }
        frame
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Shared state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct SimState {
    scene: SimScene,
    pose: Pose,
    velocity: f32,
    last_command: Option<ActuationCommand>,
    commands_applied: u64,
}

impl SimState {
    fn step(&mut self, cmd: &ActuationCommand) {
        let mut v = self.velocity + cmd.throttle * ACCEL_PER_THROTTLE * SIM_DT;
        if cmd.brake > 0.0 {
            let slow = (cmd.brake * DECEL_PER_BRAKE * SIM_DT).min(v.abs());
            v -= slow * v.signum();
        }
        self.velocity = v.clamp(-MAX_SPEED, MAX_SPEED);

        self.pose.yaw = (self.pose.yaw + cmd.steer * YAW_RATE).rem_euclid(360.0);
        let (sin, cos) = self.pose.yaw.to_radians().sin_cos();
        self.pose.x += self.velocity * SIM_DT * cos;
        self.pose.y += self.velocity * SIM_DT * sin;

        self.last_command = Some(*cmd);
        self.commands_applied += 1;
    }
}

type Shared = Arc<Mutex<SimState>>;

fn lock<'a>(state: &'a Shared, component: &str) -> Result<MutexGuard<'a, SimState>, RoverError> {
    state.lock().map_err(|_| RoverError::HardwareFault {
        component: component.to_string(),
        details: "simulator state lock poisoned".to_string(),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// SimRover
// ────────────────────────────────────────────────────────────────────────────

/// A simulated vehicle shared by its camera, telemetry and drive handles.
#[derive(Debug, Clone)]
pub struct SimRover {
    state: Shared,
}

impl SimRover {
    /// Start at the centre of a 200-cell world, heading along +x, level.
    pub fn new(scene: SimScene) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                scene,
                pose: Pose {
                    x: 100.0,
                    y: 100.0,
                    ..Pose::default()
                },
                velocity: 0.0,
                last_command: None,
                commands_applied: 0,
            })),
        }
    }

    /// Override the initial pose (builder style).
    pub fn with_pose(self, pose: Pose) -> Result<Self, RoverError> {
        lock(&self.state, "sim")?.pose = pose;
        Ok(self)
    }

    pub fn set_scene(&self, scene: SimScene) -> Result<(), RoverError> {
        lock(&self.state, "sim")?.scene = scene;
        Ok(())
    }

    pub fn pose(&self) -> Result<Pose, RoverError> {
        Ok(lock(&self.state, "sim")?.pose)
    }

    pub fn last_command(&self) -> Result<Option<ActuationCommand>, RoverError> {
        Ok(lock(&self.state, "sim")?.last_command)
    }

    pub fn commands_applied(&self) -> Result<u64, RoverError> {
        Ok(lock(&self.state, "sim")?.commands_applied)
    }

    pub fn camera(&self) -> Box<SimCamera> {
        Box::new(SimCamera {
            state: Arc::clone(&self.state),
        })
    }

    pub fn telemetry(&self) -> Box<SimTelemetry> {
        Box::new(SimTelemetry {
            state: Arc::clone(&self.state),
        })
    }

    pub fn drive(&self) -> Box<SimDrive> {
        Box::new(SimDrive {
            state: Arc::clone(&self.state),
        })
    }
}

/// Camera handle of a [`SimRover`]; renders the current scene.
pub struct SimCamera {
    state: Shared,
}

impl Camera for SimCamera {
    fn id(&self) -> &str {
        "sim_camera"
    }

    fn capture(&mut self) -> Result<Frame, RoverError> {
        let scene = lock(&self.state, self.id())?.scene;
        Ok(scene.render())
    }
}

/// Telemetry handle of a [`SimRover`].
pub struct SimTelemetry {
    state: Shared,
}

impl TelemetrySource for SimTelemetry {
    fn id(&self) -> &str {
        "sim_telemetry"
    }

    fn sample(&mut self) -> Result<VehicleTelemetry, RoverError> {
        let s = lock(&self.state, self.id())?;
        Ok(VehicleTelemetry {
            pose: s.pose,
            velocity: s.velocity,
            near_sample: s.scene == SimScene::Sample,
            picking_up: false,
        })
    }
}

/// Drive handle of a [`SimRover`]; integrates each command.
pub struct SimDrive {
    state: Shared,
}

impl Drive for SimDrive {
    fn id(&self) -> &str {
        "sim_drive"
    }

    fn apply(&mut self, command: &ActuationCommand) -> Result<(), RoverError> {
        let mut s = lock(&self.state, self.id())?;
        s.step(command);
        trace!(velocity = s.velocity, x = s.pose.x, y = s.pose.y, "sim step");
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_parses_case_insensitively() {
        assert_eq!("Wall".parse::<SimScene>().unwrap(), SimScene::Wall);
        assert_eq!("sample".parse::<SimScene>().unwrap(), SimScene::Sample);
        assert!(matches!(
            "lava".parse::<SimScene>(),
            Err(RoverError::Config(_))
        ));
    }

    #[test]
    fn open_scene_has_ground_below_horizon() {
        let frame = SimScene::Open.render();
        assert_eq!(frame.pixel(160, 150), GROUND);
        assert_eq!(frame.pixel(160, 10), ROCK);
    }

    #[test]
    fn sample_scene_has_sample_in_front() {
        let frame = SimScene::Sample.render();
        assert_eq!(frame.pixel(160, 140), SAMPLE);
    }

    #[test]
    fn throttle_accelerates_and_brake_stops_exactly() {
        let rover = SimRover::new(SimScene::Open);
        let mut drive = rover.drive();
        let mut telemetry = rover.telemetry();

        drive
            .apply(&ActuationCommand {
                throttle: 0.2,
                ..ActuationCommand::default()
            })
            .unwrap();
        let v = telemetry.sample().unwrap().velocity;
        assert!((v - 0.2).abs() < 1e-5);

        drive
            .apply(&ActuationCommand {
                brake: 10.0,
                ..ActuationCommand::default()
            })
            .unwrap();
        assert_eq!(telemetry.sample().unwrap().velocity, 0.0);
        assert_eq!(rover.commands_applied().unwrap(), 2);
    }

    #[test]
    fn steering_changes_heading_and_wraps() {
        let rover = SimRover::new(SimScene::Open);
        let mut drive = rover.drive();
        drive
            .apply(&ActuationCommand {
                steer: -15.0,
                ..ActuationCommand::default()
            })
            .unwrap();
        let yaw = rover.pose().unwrap().yaw;
        assert!((yaw - 357.0).abs() < 1e-3, "yaw={yaw}");
    }

    #[test]
    fn near_sample_only_in_sample_scene() {
        let rover = SimRover::new(SimScene::Open);
        let mut telemetry = rover.telemetry();
        assert!(!telemetry.sample().unwrap().near_sample);
        rover.set_scene(SimScene::Sample).unwrap();
        assert!(telemetry.sample().unwrap().near_sample);
    }

    #[test]
    fn handles_share_one_vehicle() {
        let rover = SimRover::new(SimScene::Open).with_pose(Pose {
            x: 10.0,
            y: 20.0,
            ..Pose::default()
        })
        .unwrap();
        let mut drive = rover.drive();
        let cmd = ActuationCommand {
            throttle: 0.5,
            ..ActuationCommand::default()
        };
        drive.apply(&cmd).unwrap();
        assert_eq!(rover.last_command().unwrap(), Some(cmd));
        assert!(rover.pose().unwrap().x > 10.0);
    }

    #[test]
    fn poisoned_state_is_a_hardware_fault() {
        let rover = SimRover::new(SimScene::Open);
        let state = Arc::clone(&rover.state);
        let _ = std::thread::spawn(move || {
            let _guard = state.lock().unwrap();
            panic!("vehicle thread died holding the state");
        })
        .join();

        assert!(matches!(rover.pose(), Err(RoverError::HardwareFault { .. })));
        assert!(matches!(
            rover.with_pose(Pose::default()),
            Err(RoverError::HardwareFault { .. })
        ));
    }
}
