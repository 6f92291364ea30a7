//! Impedance gain structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector6;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Per-joint impedance gains plus the gripper pair.
///
/// Each motor realises `torque = kp * (pos_des - pos) + kd * (vel_des - vel)
/// + torque_ff`. A gain of `kp = 0, kd > 0` is the damping (viscous brake)
/// profile used as the safe hand-over state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gain {
    /// Joint stiffness gains.
    pub kp: Vector6<f64>,

    /// Joint damping gains.
    pub kd: Vector6<f64>,

    /// Gripper stiffness gain.
    pub gripper_kp: f64,

    /// Gripper damping gain.
    pub gripper_kd: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Gain {
    /// True if every joint stiffness gain is zero.
    ///
    /// The gripper gain is not considered: the jump protection on raising
    /// stiffness applies to the arm joints only.
    pub fn kp_is_zero(&self) -> bool {
        self.kp.iter().all(|&kp| kp == 0.0)
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self {
            kp: Vector6::zeros(),
            kd: Vector6::zeros(),
            gripper_kp: 0.0,
            gripper_kd: 0.0,
        }
    }
}

impl Add for Gain {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            kp: self.kp + other.kp,
            kd: self.kd + other.kd,
            gripper_kp: self.gripper_kp + other.gripper_kp,
            gripper_kd: self.gripper_kd + other.gripper_kd,
        }
    }
}

impl Mul<f64> for Gain {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self {
        Self {
            kp: self.kp * scalar,
            kd: self.kd * scalar,
            gripper_kp: self.gripper_kp * scalar,
            gripper_kd: self.gripper_kd * scalar,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_kp_is_zero() {
        let mut gain = Gain::default();
        gain.gripper_kp = 30.0;
        assert!(gain.kp_is_zero());

        gain.kp[3] = 0.1;
        assert!(!gain.kp_is_zero());
    }
}
