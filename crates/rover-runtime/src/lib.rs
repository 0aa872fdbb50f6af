//! `rover-runtime` – the per-cycle control loop of the rover.
//!
//! # Modules
//!
//! - [`decision`] – [`NavigationController`][decision::NavigationController]:
//!   the `forward` / `stopped` / `recovering` state machine turning navigable
//!   terrain and vehicle speed into throttle, brake, steer and pickup commands.
//! - [`pipeline`] – [`PerceptionPipeline`][pipeline::PerceptionPipeline]:
//!   one frame through warp, classification, projection and the world map.
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]: wires a
//!   camera, a telemetry source and a drive from `rover-hal` around the two
//!   above, one synchronous cycle per [`tick`][control_loop::ControlLoop::tick].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with optional OTLP span export.

pub mod control_loop;
pub mod decision;
pub mod pipeline;
pub mod telemetry;

pub use control_loop::{ControlLoop, ControlLoopConfig, RunSummary};
pub use decision::{DecisionConfig, NavInputs, NavigationController, VehicleState};
pub use pipeline::{PerceptionOutput, PerceptionPipeline};
pub use telemetry::{TracerProviderGuard, init_tracing};
