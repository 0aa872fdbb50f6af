//! `Drive` trait: the actuation seam of the control loop.
//!
//! The controller writes exactly one [`ActuationCommand`] per cycle.  The
//! transport that delivers it (serial link, simulator socket, …) lives behind
//! this trait so the decision logic never depends on it.

use rover_types::{ActuationCommand, RoverError};

/// Receives throttle / brake / steer / pickup commands.
pub trait Drive: Send + Sync {
    /// Stable identifier for this drive, e.g. `"drive_base"`.
    fn id(&self) -> &str;

    /// Apply `command`, replacing whatever was in effect.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] if the command cannot be
    /// delivered.
    fn apply(&mut self, command: &ActuationCommand) -> Result<(), RoverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal in-process drive used only for tests.
    struct RecordingDrive {
        id: String,
        applied: Vec<ActuationCommand>,
    }

    impl Drive for RecordingDrive {
        fn id(&self) -> &str {
            &self.id
        }

        fn apply(&mut self, command: &ActuationCommand) -> Result<(), RoverError> {
            if command.brake < 0.0 {
                return Err(RoverError::HardwareFault {
                    component: self.id.clone(),
                    details: "negative brake".to_string(),
                });
            }
            self.applied.push(*command);
            Ok(())
        }
    }

    #[test]
    fn recording_drive_keeps_commands_in_order() {
        let mut drive = RecordingDrive {
            id: "drive_base".to_string(),
            applied: Vec::new(),
        };
        let go = ActuationCommand {
            throttle: 0.2,
            ..ActuationCommand::default()
        };
        let stop = ActuationCommand {
            brake: 10.0,
            ..ActuationCommand::default()
        };
        drive.apply(&go).unwrap();
        drive.apply(&stop).unwrap();
        assert_eq!(drive.id(), "drive_base");
        assert_eq!(drive.applied, vec![go, stop]);
    }

    #[test]
    fn drive_can_reject_commands() {
        let mut drive = RecordingDrive {
            id: "drive_base".to_string(),
            applied: Vec::new(),
        };
        let bad = ActuationCommand {
            brake: -1.0,
            ..ActuationCommand::default()
        };
        assert!(drive.apply(&bad).is_err());
        assert!(drive.applied.is_empty());
    }
}
