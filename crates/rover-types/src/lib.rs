//! `rover-types` – shared data model for the rover control stack.
//!
//! Everything that crosses a crate boundary lives here: the camera
//! [`Frame`], the externally supplied [`Pose`] and [`VehicleTelemetry`],
//! the controller's [`VehicleMode`] and [`ActuationCommand`] outputs, the
//! per-cycle [`CycleReport`], and the workspace-wide [`RoverError`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Number of interleaved colour channels in a camera [`Frame`].
pub const RGB_CHANNELS: usize = 3;

// ────────────────────────────────────────────────────────────────────────────
// Frame
// ────────────────────────────────────────────────────────────────────────────

/// A fixed-size RGB24 image, row-major, three bytes per pixel.
///
/// Row 0 is the top of the image.  Construct through [`Frame::new`] so that
/// the buffer length is validated against the declared dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap a raw pixel buffer.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::MalformedFrame`] when `channels` is not 3, either
    /// dimension is zero, or `data` does not hold exactly
    /// `width * height * 3` bytes.
    pub fn new(
        width: usize,
        height: usize,
        channels: usize,
        data: Vec<u8>,
    ) -> Result<Self, RoverError> {
        if channels != RGB_CHANNELS {
            return Err(RoverError::MalformedFrame(format!(
                "expected {RGB_CHANNELS} channels, got {channels}"
            )));
        }
        if width == 0 || height == 0 {
            return Err(RoverError::MalformedFrame(format!(
                "frame has zero extent ({width}x{height})"
            )));
        }
        let expected = width * height * RGB_CHANNELS;
        if data.len() != expected {
            return Err(RoverError::MalformedFrame(format!(
                "{width}x{height} RGB frame needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame with every pixel set to `rgb`.
    pub fn filled(width: usize, height: usize, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width * height * RGB_CHANNELS)
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Return the pixel at column `x`, row `y`.
    ///
    /// # Panics
    ///
    /// Panics when `(x, y)` lies outside the frame.
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = self.offset(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Overwrite the pixel at column `x`, row `y`.
    ///
    /// # Panics
    ///
    /// Panics when `(x, y)` lies outside the frame.
    pub fn set_pixel(&mut self, x: usize, y: usize, rgb: [u8; 3]) {
        let i = self.offset(x, y);
        self.data[i..i + RGB_CHANNELS].copy_from_slice(&rgb);
    }

    /// The raw interleaved buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn offset(&self, x: usize, y: usize) -> usize {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) outside {}x{} frame",
            self.width,
            self.height
        );
        (y * self.width + x) * RGB_CHANNELS
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Vehicle state supplied by collaborators
// ────────────────────────────────────────────────────────────────────────────

/// Vehicle pose in world-grid units; all angles in degrees.
///
/// Supplied externally every cycle, never estimated by the core.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub yaw: f32,
    pub roll: f32,
    pub pitch: f32,
}

/// One telemetry sample: pose plus the kinematic flags the controller reads.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleTelemetry {
    pub pose: Pose,
    /// Forward speed; negative while reversing.
    pub velocity: f32,
    /// A point-of-interest is within pickup reach.
    pub near_sample: bool,
    /// A pickup manoeuvre is already under way.
    pub picking_up: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Controller outputs
// ────────────────────────────────────────────────────────────────────────────

/// Navigation mode of the decision controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleMode {
    #[default]
    Forward,
    Stopped,
    /// Reversing out of a stall.
    Recovering,
}

impl std::fmt::Display for VehicleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VehicleMode::Forward => write!(f, "forward"),
            VehicleMode::Stopped => write!(f, "stopped"),
            VehicleMode::Recovering => write!(f, "recovering"),
        }
    }
}

/// Actuation command written to the drive once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ActuationCommand {
    /// Signed throttle; negative drives in reverse.
    pub throttle: f32,
    /// Non-negative brake effort.
    pub brake: f32,
    /// Steering angle in degrees, within `[-15, 15]`.
    pub steer: f32,
    /// Request a sample pickup this cycle.
    pub pickup: bool,
}

/// Summary of one completed control cycle, for logging and display
/// collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub run_id: Uuid,
    pub cycle: u64,
    pub timestamp: DateTime<Utc>,
    pub mode: VehicleMode,
    pub stall_timer: u32,
    pub command: ActuationCommand,
    /// Navigable pixels seen this cycle; `None` when perception failed.
    pub navigable_points: Option<usize>,
    /// Mean navigable angle in degrees, before steering clamp.
    pub mean_angle_deg: Option<f32>,
    /// Whether the attitude gate let this cycle into the world map.
    pub map_accepted: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Global error type for the rover stack.
///
/// Missing navigable data and excessive tilt are deliberately absent: both are
/// handled in-band (controller fallback and map gate respectively).
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoverError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Degenerate projection: {0}")]
    DegenerateProjection(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_new_accepts_matching_buffer() {
        let frame = Frame::new(4, 2, 3, vec![7u8; 24]).unwrap();
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.pixel(3, 1), [7, 7, 7]);
    }

    #[test]
    fn frame_new_rejects_wrong_channel_count() {
        let err = Frame::new(2, 2, 4, vec![0u8; 16]).unwrap_err();
        assert!(matches!(err, RoverError::MalformedFrame(_)));
        assert!(err.to_string().contains("channels"));
    }

    #[test]
    fn frame_new_rejects_short_buffer() {
        let err = Frame::new(2, 2, 3, vec![0u8; 11]).unwrap_err();
        assert!(matches!(err, RoverError::MalformedFrame(_)));
    }

    #[test]
    fn frame_new_rejects_zero_extent() {
        assert!(Frame::new(0, 5, 3, Vec::new()).is_err());
    }

    #[test]
    fn frame_set_pixel_only_touches_target() {
        let mut frame = Frame::filled(3, 3, [1, 2, 3]);
        frame.set_pixel(1, 2, [9, 8, 7]);
        assert_eq!(frame.pixel(1, 2), [9, 8, 7]);
        assert_eq!(frame.pixel(0, 2), [1, 2, 3]);
        assert_eq!(frame.pixel(2, 2), [1, 2, 3]);
        assert_eq!(frame.as_bytes().len(), 27);
    }

    #[test]
    #[should_panic]
    fn frame_pixel_out_of_range_panics() {
        Frame::filled(2, 2, [0, 0, 0]).pixel(2, 0);
    }

    #[test]
    fn vehicle_mode_serialises_lowercase() {
        let json = serde_json::to_string(&VehicleMode::Recovering).unwrap();
        assert_eq!(json, "\"recovering\"");
        assert_eq!(VehicleMode::default(), VehicleMode::Forward);
        assert_eq!(VehicleMode::Stopped.to_string(), "stopped");
    }

    #[test]
    fn cycle_report_roundtrip() {
        let report = CycleReport {
            run_id: Uuid::new_v4(),
            cycle: 12,
            timestamp: Utc::now(),
            mode: VehicleMode::Stopped,
            stall_timer: 3,
            command: ActuationCommand {
                throttle: 0.0,
                brake: 10.0,
                steer: -15.0,
                pickup: false,
            },
            navigable_points: Some(42),
            mean_angle_deg: Some(-3.5),
            map_accepted: true,
        };
        let json = serde_json::to_string(&report).unwrap();
        let back: CycleReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.run_id, report.run_id);
        assert_eq!(back.mode, VehicleMode::Stopped);
        assert_eq!(back.command, report.command);
        assert_eq!(back.navigable_points, Some(42));
    }

    #[test]
    fn rover_error_display() {
        let err = RoverError::HardwareFault {
            component: "front_camera".to_string(),
            details: "disconnected".to_string(),
        };
        assert!(err.to_string().contains("front_camera"));

        let err2 = RoverError::DegenerateProjection("collinear".to_string());
        assert!(err2.to_string().contains("Degenerate projection"));
    }
}
