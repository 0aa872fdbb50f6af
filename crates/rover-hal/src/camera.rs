//! `Camera` trait: the frame-acquisition seam of the control loop.

use rover_types::{Frame, RoverError};

/// A forward-facing RGB camera.
///
/// Drivers hand the control loop one [`Frame`] per cycle.  Frame validation
/// happens in [`Frame::new`], so a driver that receives a malformed buffer
/// from its transport surfaces [`RoverError::MalformedFrame`] here.
pub trait Camera: Send + Sync {
    /// Stable identifier for this camera, e.g. `"front_rgb"`.
    fn id(&self) -> &str;

    /// Capture and return the next available frame.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] if the frame cannot be captured,
    /// or [`RoverError::MalformedFrame`] if the captured buffer is unusable.
    fn capture(&mut self) -> Result<Frame, RoverError>;
}
