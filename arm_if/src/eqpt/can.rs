//! CAN transport interface

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use thiserror::Error;

use super::motor::{MotorMsg, MOTOR_MSG_COUNT};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised by a CAN transport implementation.
#[derive(Error, Debug)]
pub enum CanError {
    #[error("Transmit to motor {0} failed")]
    Tx(u8),

    #[error("Telemetry read failed")]
    Rx,

    #[error("Motor {0} failed to enable")]
    Enable(u8),

    #[error("CAN bus I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Trait to provide a unified API for the arm's CAN bus.
///
/// An implementation owns the bus handle and the motor-specific frame
/// encoding. Command values are passed in motor units: radians,
/// radians/second and amperes (torque is converted to a current by the
/// caller using the motor family's torque constant).
///
/// Implementations are not required to be thread safe; after construction
/// exactly one thread may drive the transport.
pub trait CanTransport {
    /// Send the enable frame to a DM-family motor.
    fn enable_dm_motor(&mut self, id: u8) -> Result<(), CanError>;

    /// Send an impedance command to an EC-family motor.
    fn send_ec_motor_cmd(
        &mut self,
        id: u8,
        kp: f64,
        kd: f64,
        pos: f64,
        vel: f64,
        current: f64,
    ) -> Result<(), CanError>;

    /// Send an impedance command to a DM-family motor.
    fn send_dm_motor_cmd(
        &mut self,
        id: u8,
        kp: f64,
        kd: f64,
        pos: f64,
        vel: f64,
        current: f64,
    ) -> Result<(), CanError>;

    /// Command a DM-family motor to treat its current position as zero.
    fn reset_zero_readout(&mut self, id: u8) -> Result<(), CanError>;

    /// Send a raw configuration command to an EC-family motor (used for
    /// zero-point calibration).
    fn ec_cmd_init(&mut self, id: u8, cmd: u8) -> Result<(), CanError>;

    /// Snapshot the latest telemetry for every motor on the bus.
    ///
    /// The array is indexed by motor-message index, not motor id; the
    /// index-to-joint mapping is part of the robot's static configuration.
    fn get_motor_msg(&mut self) -> Result<[MotorMsg; MOTOR_MSG_COUNT], CanError>;
}
