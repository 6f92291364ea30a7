//! Safety monitoring for the control loop
//!
//! Runs at the head of every tick, before any command is shaped or sent:
//! persistent over-current trips the arm into the emergency damping state,
//! as does any telemetry or command value implausible enough to indicate a
//! corrupted bus, a mis-calibrated encoder or a client bug.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::error;
use std::f64::consts::PI;

// Internal
use arm_if::cmd::JointState;

use crate::params::{RobotParams, JOINT_DOF};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Tolerance on the gripper position band during sanity checking.
///
/// Units: metres
const GRIPPER_WIDTH_TOLERANCE_M: f64 = 0.005;

/// Torque readings beyond this multiple of the limit are data errors, not
/// real loads.
const TORQUE_SANITY_FACTOR: f64 = 100.0;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Outcome of a safety check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SafetyVerdict {
    Nominal,
    Emergency,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Over-current counter and sanity checks.
#[derive(Debug)]
pub(crate) struct SafetyMonitor {
    over_current_cnt: u32,
    over_current_cnt_max: u32,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SafetyMonitor {
    pub fn new(over_current_cnt_max: u32) -> Self {
        Self {
            over_current_cnt: 0,
            over_current_cnt_max,
        }
    }

    /// Run all per-tick checks.
    pub fn check(
        &mut self,
        robot: &RobotParams,
        joint_state: &JointState,
        input_cmd: &JointState,
    ) -> SafetyVerdict {
        if self.over_current_protection(robot, joint_state) == SafetyVerdict::Emergency {
            return SafetyVerdict::Emergency;
        }
        self.check_joint_state_sanity(robot, joint_state, input_cmd)
    }

    /// Count consecutive ticks with any motor over its torque limit.
    fn over_current_protection(
        &mut self,
        robot: &RobotParams,
        joint_state: &JointState,
    ) -> SafetyVerdict {
        let mut over_current = false;

        for i in 0..JOINT_DOF {
            if joint_state.torque[i].abs() > robot.joint_torque_max_nm[i] {
                over_current = true;
                error!(
                    "Over current detected once on joint {}, torque: {:.3}",
                    i, joint_state.torque[i]
                );
                break;
            }
        }
        if joint_state.gripper_torque.abs() > robot.gripper_torque_max_nm {
            over_current = true;
            error!(
                "Over current detected once on gripper, torque: {:.3}",
                joint_state.gripper_torque
            );
        }

        if over_current {
            self.over_current_cnt += 1;
            if self.over_current_cnt > self.over_current_cnt_max {
                error!("Over current persisted, robot is set to damping. Please restart the program.");
                return SafetyVerdict::Emergency;
            }
        }
        else {
            self.over_current_cnt = 0;
        }

        SafetyVerdict::Nominal
    }

    /// Reject telemetry and commands that cannot be physically real.
    fn check_joint_state_sanity(
        &self,
        robot: &RobotParams,
        joint_state: &JointState,
        input_cmd: &JointState,
    ) -> SafetyVerdict {
        for i in 0..JOINT_DOF {
            let lo = robot.joint_pos_min_rad[i] - PI;
            let hi = robot.joint_pos_max_rad[i] + PI;

            if joint_state.pos[i] < lo || joint_state.pos[i] > hi {
                error!(
                    "Joint {} pos data error: {:.3}. Please restart the program.",
                    i, joint_state.pos[i]
                );
                return SafetyVerdict::Emergency;
            }
            if input_cmd.pos[i] < lo || input_cmd.pos[i] > hi {
                error!(
                    "Joint {} command data error: {:.3}. Please restart the program.",
                    i, input_cmd.pos[i]
                );
                return SafetyVerdict::Emergency;
            }
            if joint_state.torque[i].abs()
                > TORQUE_SANITY_FACTOR * robot.joint_torque_max_nm[i]
            {
                error!(
                    "Joint {} torque data error: {:.3}. Please restart the program.",
                    i, joint_state.torque[i]
                );
                return SafetyVerdict::Emergency;
            }
        }

        if joint_state.gripper_pos < -GRIPPER_WIDTH_TOLERANCE_M
            || joint_state.gripper_pos > robot.gripper_width_m + GRIPPER_WIDTH_TOLERANCE_M
        {
            error!(
                "Gripper position error: got {:.3} but should be in 0~{:.3} (m). \
                 Please close the gripper before turning the arm on or recalibrate \
                 gripper home and width.",
                joint_state.gripper_pos, robot.gripper_width_m
            );
            return SafetyVerdict::Emergency;
        }

        SafetyVerdict::Nominal
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
