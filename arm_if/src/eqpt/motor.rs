//! Motor family definitions and unit conversions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of slots in a telemetry snapshot returned by the transport.
pub const MOTOR_MSG_COUNT: usize = 10;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The motor families found on the bus.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
pub enum MotorKind {
    EcA4310,
    DmJ4310,
    DmJ4340,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// One motor's slot in the telemetry snapshot.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct MotorMsg {
    /// Measured shaft angle.
    ///
    /// Units: radians
    pub angle_actual_rad: f64,

    /// Measured shaft speed.
    ///
    /// Units: radians/second
    pub speed_actual_rad: f64,

    /// Measured winding current.
    ///
    /// Units: amperes
    pub current_actual_float: f64,

    /// Driver board temperature.
    ///
    /// Units: degrees Celsius
    pub temperature: u8,

    /// Driver error code, zero when nominal.
    pub error: u8,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MotorKind {
    /// Torque constant of the family.
    ///
    /// Units: newton-metres/ampere
    pub fn torque_constant(&self) -> f64 {
        match self {
            MotorKind::EcA4310 => 1.4,
            MotorKind::DmJ4310 => 0.424,
            MotorKind::DmJ4340 => 1.0,
        }
    }

    /// Convert a commanded torque into the current to put on the wire.
    pub fn command_current(&self, torque_nm: f64) -> f64 {
        torque_nm / self.torque_constant()
    }

    /// Convert a telemetry current readout into a torque.
    ///
    /// The EC_A4310 conversion applies the torque constant twice. That does
    /// not match the datasheet units, but it is what the deployed units
    /// report against, so it is kept for readback parity.
    /// TODO: chase the EC driver firmware for the real current scaling.
    pub fn feedback_torque(&self, current_a: f64) -> f64 {
        match self {
            MotorKind::EcA4310 => {
                current_a * self.torque_constant() * self.torque_constant()
            }
            _ => current_a * self.torque_constant(),
        }
    }

    /// True for the DM families, which need an explicit enable frame before
    /// accepting commands.
    pub fn is_dm(&self) -> bool {
        matches!(self, MotorKind::DmJ4310 | MotorKind::DmJ4340)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_command_current_round_trip_dm() {
        let kind = MotorKind::DmJ4310;
        let torque = 2.5;
        let current = kind.command_current(torque);
        assert!((kind.feedback_torque(current) - torque).abs() < 1e-12);
    }

    #[test]
    fn test_ec_feedback_applies_constant_twice() {
        let kind = MotorKind::EcA4310;
        assert!((kind.feedback_torque(1.0) - 1.4 * 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_dm_enable_flag() {
        assert!(!MotorKind::EcA4310.is_dm());
        assert!(MotorKind::DmJ4310.is_dm());
        assert!(MotorKind::DmJ4340.is_dm());
    }
}
