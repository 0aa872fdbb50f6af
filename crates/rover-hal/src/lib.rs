//! `rover-hal` – collaborator seams of the rover control loop.
//!
//! The core never talks to hardware directly.  It reads frames through
//! [`Camera`], pose and kinematics through [`TelemetrySource`], and writes
//! commands through [`Drive`].  [`sim::SimRover`] implements all three over
//! one shared simulated vehicle for headless runs and tests.

pub mod camera;
pub mod drive;
pub mod sim;
pub mod vehicle;

pub use camera::Camera;
pub use drive::Drive;
pub use sim::{SimRover, SimScene};
pub use vehicle::TelemetrySource;
