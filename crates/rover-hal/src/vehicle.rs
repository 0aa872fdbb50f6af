//! `TelemetrySource` trait: pose and kinematic flags supplied each cycle.

use rover_types::{RoverError, VehicleTelemetry};

/// Source of per-cycle vehicle telemetry.
///
/// Pose is supplied, never estimated: whatever localisation the platform has
/// sits behind this trait.
pub trait TelemetrySource: Send + Sync {
    /// Stable identifier, e.g. `"sim_telemetry"`.
    fn id(&self) -> &str;

    /// Return the latest telemetry sample.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] when no sample is available.
    fn sample(&mut self) -> Result<VehicleTelemetry, RoverError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_types::Pose;

    struct FixedTelemetry(VehicleTelemetry);

    impl TelemetrySource for FixedTelemetry {
        fn id(&self) -> &str {
            "fixed"
        }

        fn sample(&mut self) -> Result<VehicleTelemetry, RoverError> {
            Ok(self.0)
        }
    }

    #[test]
    fn fixed_source_returns_its_sample() {
        let t = VehicleTelemetry {
            pose: Pose {
                x: 1.0,
                y: 2.0,
                ..Pose::default()
            },
            velocity: 0.5,
            ..VehicleTelemetry::default()
        };
        let mut src = FixedTelemetry(t);
        assert_eq!(src.id(), "fixed");
        assert_eq!(src.sample().unwrap(), t);
    }
}
