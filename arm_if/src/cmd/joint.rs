//! Joint-space command/state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector6;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A joint-space command or telemetry snapshot for the 6 arm joints and the
/// gripper.
///
/// Units: radians and radians/second for the joints, metres and
/// metres/second for the gripper, newton-metres for torques. `timestamp` is
/// seconds since the controller started; on a command a non-zero value is
/// the time the target should be reached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointState {
    /// Seconds since controller start.
    pub timestamp: f64,

    /// Joint positions.
    ///
    /// Units: radians
    pub pos: Vector6<f64>,

    /// Joint velocities.
    ///
    /// Units: radians/second
    pub vel: Vector6<f64>,

    /// Joint torques.
    ///
    /// Units: newton-metres
    pub torque: Vector6<f64>,

    /// Gripper opening; 0 for closed, the configured width for fully open.
    ///
    /// Units: metres
    pub gripper_pos: f64,

    /// Gripper opening rate.
    ///
    /// Units: metres/second
    pub gripper_vel: f64,

    /// Gripper motor torque.
    ///
    /// Units: newton-metres
    pub gripper_torque: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for JointState {
    fn default() -> Self {
        Self {
            timestamp: 0.0,
            pos: Vector6::zeros(),
            vel: Vector6::zeros(),
            torque: Vector6::zeros(),
            gripper_pos: 0.0,
            gripper_vel: 0.0,
            gripper_torque: 0.0,
        }
    }
}

impl Add for JointState {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            timestamp: self.timestamp + other.timestamp,
            pos: self.pos + other.pos,
            vel: self.vel + other.vel,
            torque: self.torque + other.torque,
            gripper_pos: self.gripper_pos + other.gripper_pos,
            gripper_vel: self.gripper_vel + other.gripper_vel,
            gripper_torque: self.gripper_torque + other.gripper_torque,
        }
    }
}

impl Mul<f64> for JointState {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self {
        Self {
            timestamp: self.timestamp * scalar,
            pos: self.pos * scalar,
            vel: self.vel * scalar,
            torque: self.torque * scalar,
            gripper_pos: self.gripper_pos * scalar,
            gripper_vel: self.gripper_vel * scalar,
            gripper_torque: self.gripper_torque * scalar,
        }
    }
}
