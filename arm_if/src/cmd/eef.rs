//! End-effector-space command/state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul};

use super::Pose6d;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An end-effector command or state: the tool pose plus the gripper.
///
/// On a command, a non-zero `timestamp` schedules the target: the controller
/// interpolates linearly from the pose it was outputting when the command
/// arrived, reaching the target at `timestamp`. A zero `timestamp` applies
/// the target immediately.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EefState {
    /// Seconds since controller start.
    pub timestamp: f64,

    /// Tool pose `(x, y, z, roll, pitch, yaw)`.
    ///
    /// Units: metres / radians
    pub pose_6d: Pose6d,

    /// Gripper opening; 0 for closed.
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

impl Default for EefState {
    fn default() -> Self {
        Self {
            timestamp: 0.0,
            pose_6d: Pose6d::zeros(),
            gripper_pos: 0.0,
            gripper_vel: 0.0,
            gripper_torque: 0.0,
        }
    }
}

impl Add for EefState {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            timestamp: self.timestamp + other.timestamp,
            pose_6d: self.pose_6d + other.pose_6d,
            gripper_pos: self.gripper_pos + other.gripper_pos,
            gripper_vel: self.gripper_vel + other.gripper_vel,
            gripper_torque: self.gripper_torque + other.gripper_torque,
        }
    }
}

impl Mul<f64> for EefState {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self {
        Self {
            timestamp: self.timestamp * scalar,
            pose_6d: self.pose_6d * scalar,
            gripper_pos: self.gripper_pos * scalar,
            gripper_vel: self.gripper_vel * scalar,
            gripper_torque: self.gripper_torque * scalar,
        }
    }
}
