//! Navigation decision controller.
//!
//! A three-state machine over [`VehicleMode`]:
//!
//! ```text
//!             n < stop_forward                 v ≤ 0.2 ∧ n ≥ go_forward
//!   Forward ───────────────────▶ Stopped ─────────────────────────────▶ Forward
//!      │
//!      │ v < 0.1 for more than `stall_limit` cycles
//!      ▼
//!   Recovering ── reverse for `recovery_cycles` cycles ──▶ Forward
//! ```
//!
//! Each state has its own pure transition function taking the stall timer,
//! the navigable-terrain summary and the vehicle speed, and returning the
//! next [`VehicleState`] together with the [`ActuationCommand`].  The pickup
//! request is evaluated after the state transition, identically in every
//! state.
//!
//! # Example
//!
//! ```rust
//! use rover_perception::PolarSet;
//! use rover_runtime::decision::{DecisionConfig, NavInputs, NavigationController};
//! use rover_types::VehicleMode;
//!
//! let mut controller = NavigationController::new(DecisionConfig::default());
//!
//! // Nothing navigable in sight: stop.
//! let empty = PolarSet::default();
//! let cmd = controller.step(&NavInputs::with_navigable(&empty, 0.5));
//! assert_eq!(controller.mode(), VehicleMode::Stopped);
//! assert_eq!(cmd.brake, 10.0);
//! ```

use rover_perception::PolarSet;
use rover_types::{ActuationCommand, VehicleMode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Steering is always clamped to ±this many degrees.
pub const MAX_STEER_DEG: f32 = 15.0;
/// Below this speed a forward-moving vehicle counts as stalled.
const STALL_SPEED: f32 = 0.1;
/// At or below this speed a stopped vehicle may pivot or set off.
const STOPPED_SPEED: f32 = 0.2;
/// Fixed pivot direction while stopped without a way forward.
const PIVOT_STEER_DEG: f32 = -15.0;
/// Fixed steer while reversing out of a stall.
const RECOVERY_STEER_DEG: f32 = -5.0;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Tunable thresholds of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Fewer navigable pixels than this stops a forward-moving vehicle.
    pub stop_forward: usize,
    /// At least this many navigable pixels let a stopped vehicle set off.
    pub go_forward: usize,
    pub max_vel: f32,
    pub throttle_set: f32,
    pub brake_set: f32,
    /// Consecutive stalled cycles tolerated before recovering.
    pub stall_limit: u32,
    /// Cycles spent reversing during a recovery.
    pub recovery_cycles: u32,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            stop_forward: 50,
            go_forward: 500,
            max_vel: 2.0,
            throttle_set: 0.2,
            brake_set: 10.0,
            stall_limit: 100,
            recovery_cycles: 50,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Inputs / state
// ────────────────────────────────────────────────────────────────────────────

/// Everything the controller reads in one cycle.
#[derive(Debug, Clone, Copy)]
pub struct NavInputs<'a> {
    /// Rover-frame navigable pixels; `None` when perception produced nothing.
    pub navigable: Option<&'a PolarSet>,
    pub velocity: f32,
    pub near_sample: bool,
    pub picking_up: bool,
}

impl<'a> NavInputs<'a> {
    /// Inputs with navigable data and both sample flags cleared.
    pub fn with_navigable(navigable: &'a PolarSet, velocity: f32) -> Self {
        Self {
            navigable: Some(navigable),
            velocity,
            near_sample: false,
            picking_up: false,
        }
    }

    /// Inputs for a cycle with no navigable data at all.
    pub fn dropout(velocity: f32) -> Self {
        Self {
            navigable: None,
            velocity,
            near_sample: false,
            picking_up: false,
        }
    }
}

/// The part of the vehicle state carried from one cycle to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VehicleState {
    pub mode: VehicleMode,
    /// Stalled-cycle count in `Forward`; remaining reverse cycles in
    /// `Recovering`.
    pub stall_timer: u32,
}

/// Result of one transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub state: VehicleState,
    pub command: ActuationCommand,
}

impl Decision {
    fn new(mode: VehicleMode, stall_timer: u32, throttle: f32, brake: f32, steer: f32) -> Self {
        Self {
            state: VehicleState { mode, stall_timer },
            command: ActuationCommand {
                throttle,
                brake,
                steer,
                pickup: false,
            },
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transition functions
// ────────────────────────────────────────────────────────────────────────────

/// Advance the state machine by one cycle.
pub fn decide(config: &DecisionConfig, state: VehicleState, inputs: &NavInputs<'_>) -> Decision {
    let mut decision = match inputs.navigable {
        None => dropout(config, state),
        Some(nav) => match state.mode {
            VehicleMode::Forward => forward(config, state.stall_timer, nav, inputs.velocity),
            VehicleMode::Stopped => stopped(config, state.stall_timer, nav, inputs.velocity),
            VehicleMode::Recovering => recovering(config, state.stall_timer, nav),
        },
    };
    decision.command.pickup = pickup_requested(inputs);
    decision
}

/// Keep moving straight when there is no navigable data to act on.  Mode and
/// timer are left untouched.
pub fn dropout(config: &DecisionConfig, state: VehicleState) -> Decision {
    Decision {
        state,
        command: ActuationCommand {
            throttle: config.throttle_set,
            ..ActuationCommand::default()
        },
    }
}

/// `Forward`: pick a speed policy from the amount of navigable terrain, stop
/// when it runs out, and watch for stalls.
pub fn forward(config: &DecisionConfig, stall_timer: u32, nav: &PolarSet, velocity: f32) -> Decision {
    let n = nav.len();
    if n < config.stop_forward {
        return Decision::new(VehicleMode::Stopped, stall_timer, 0.0, config.brake_set, 0.0);
    }

    let steer = steer_toward(nav);
    let mut decision = if n >= 2 * config.stop_forward {
        let throttle = if velocity < config.max_vel {
            config.throttle_set
        } else {
            0.0
        };
        Decision::new(VehicleMode::Forward, stall_timer, throttle, 0.0, steer)
    } else if velocity < 0.5 * config.max_vel {
        Decision::new(VehicleMode::Forward, stall_timer, config.throttle_set, 0.0, steer)
    } else {
        Decision::new(VehicleMode::Forward, stall_timer, 0.0, config.brake_set, steer)
    };

    if velocity < STALL_SPEED {
        let timer = stall_timer.saturating_add(1);
        if timer > config.stall_limit {
            decision.command.throttle = -0.5 * config.throttle_set;
            decision.command.brake = 0.0;
            decision.state = VehicleState {
                mode: VehicleMode::Recovering,
                stall_timer: config.recovery_cycles,
            };
        } else {
            decision.state.stall_timer = timer;
        }
    } else {
        decision.state.stall_timer = 0;
    }
    decision
}

/// `Stopped`: brake to a standstill, then pivot until enough terrain opens up.
pub fn stopped(config: &DecisionConfig, stall_timer: u32, nav: &PolarSet, velocity: f32) -> Decision {
    if velocity > STOPPED_SPEED {
        Decision::new(VehicleMode::Stopped, stall_timer, 0.0, config.brake_set, 0.0)
    } else if nav.len() < config.go_forward {
        Decision::new(VehicleMode::Stopped, stall_timer, 0.0, 0.0, PIVOT_STEER_DEG)
    } else {
        Decision::new(
            VehicleMode::Forward,
            stall_timer,
            config.throttle_set,
            0.0,
            steer_toward(nav),
        )
    }
}

/// `Recovering`: reverse with a slight turn until the timer runs out.
pub fn recovering(config: &DecisionConfig, stall_timer: u32, nav: &PolarSet) -> Decision {
    if stall_timer > 0 {
        Decision::new(
            VehicleMode::Recovering,
            stall_timer - 1,
            -0.5 * config.throttle_set,
            0.0,
            RECOVERY_STEER_DEG,
        )
    } else {
        Decision::new(
            VehicleMode::Forward,
            0,
            config.throttle_set,
            0.0,
            steer_toward(nav),
        )
    }
}

/// Ask for a pickup when a sample is in reach, the vehicle is standing still,
/// and no pickup is already running.
pub fn pickup_requested(inputs: &NavInputs<'_>) -> bool {
    inputs.near_sample && inputs.velocity == 0.0 && !inputs.picking_up
}

/// Mean navigable angle in degrees, clamped to the steering range.
fn steer_toward(nav: &PolarSet) -> f32 {
    nav.mean_angle_deg()
        .unwrap_or(0.0)
        .clamp(-MAX_STEER_DEG, MAX_STEER_DEG)
}

// ────────────────────────────────────────────────────────────────────────────
// Controller
// ────────────────────────────────────────────────────────────────────────────

/// Owns the persistent [`VehicleState`] and the last command issued.
#[derive(Debug, Clone)]
pub struct NavigationController {
    config: DecisionConfig,
    state: VehicleState,
    velocity: f32,
    command: ActuationCommand,
}

impl NavigationController {
    /// Start in `Forward` with a zeroed stall timer.
    pub fn new(config: DecisionConfig) -> Self {
        Self {
            config,
            state: VehicleState::default(),
            velocity: 0.0,
            command: ActuationCommand::default(),
        }
    }

    pub fn state(&self) -> VehicleState {
        self.state
    }

    pub fn mode(&self) -> VehicleMode {
        self.state.mode
    }

    /// Speed seen on the most recent cycle.
    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    /// Command issued on the most recent cycle.
    pub fn command(&self) -> ActuationCommand {
        self.command
    }

    /// Run one transition and return the command to apply.
    pub fn step(&mut self, inputs: &NavInputs<'_>) -> ActuationCommand {
        let decision = decide(&self.config, self.state, inputs);
        if decision.state.mode != self.state.mode {
            info!(
                from = %self.state.mode,
                to = %decision.state.mode,
                velocity = inputs.velocity,
                navigable = inputs.navigable.map(PolarSet::len),
                "navigation mode change"
            );
        }
        debug!(command = ?decision.command, stall_timer = decision.state.stall_timer, "decided");
        self.state = decision.state;
        self.velocity = inputs.velocity;
        self.command = decision.command;
        decision.command
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
