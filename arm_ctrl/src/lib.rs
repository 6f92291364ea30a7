//! # Arm control core
//!
//! Real-time control core for a 6-DoF arm with a single-DoF gripper whose
//! motors sit on a CAN bus. Each joint is driven as an impedance-controlled
//! actuator (position + velocity + feed-forward torque with per-joint
//! stiffness and damping).
//!
//! Two controller variants are provided:
//!
//! - [`JointController`] accepts joint-space targets directly.
//! - [`CartesianController`] accepts end-effector pose targets, which are
//!   time-interpolated and resolved to joint space through the installed
//!   kinematics solver.
//!
//! Both run a background loop at a fixed period which rate-limits and clips
//! every command against the robot's static limits before it reaches the
//! bus, ingests motor telemetry, and trips into a terminal damping state if
//! the safety monitor detects over-current or implausible data.
//!
//! The CAN transport and the kinematics/dynamics solver are consumed through
//! the traits in `arm_if`; this crate contains no hardware or numerics code.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod cartesian;
mod facade;
mod joint;
pub mod params;
mod planner;
mod safety;
mod shaper;
mod shared;
mod worker;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use cartesian::CartesianController;
pub use joint::JointController;
pub use params::{ctrl_params, robot_params, ControllerKind, CtrlParams, RobotParams};

// Re-export the interface crate so clients get the command and equipment
// types from one place
pub use arm_if;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use arm_if::eqpt::CanError;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised by the control core.
#[derive(Error, Debug)]
pub enum ArmCtrlError {
    #[error("Unknown robot model: {0}. Available models: X5, L5")]
    UnknownModel(String),

    #[error(
        "None of the motors reported a non-zero position. Check the \
         connection and power of the arm"
    )]
    MotorsNotResponding,

    #[error(
        "Cannot raise kp from zero while the position command is \
         {max_pos_error:.3} rad away from the measured position \
         (threshold {threshold:.3} rad)"
    )]
    GainJumpGuard {
        max_pos_error: f64,
        threshold: f64,
    },

    #[error("No kinematics solver is installed")]
    SolverMissing,

    #[error("The controller is in the emergency damping state")]
    EmergencyActive,

    #[error("Joint index {0} is out of range")]
    InvalidJoint(usize),

    #[error("The background loop must be disabled first")]
    LoopRunning,

    #[error("The control loop worker is no longer reachable")]
    WorkerGone,

    #[error(transparent)]
    Can(#[from] CanError),
}
