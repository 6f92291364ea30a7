//! Per-tick shaping of the output command
//!
//! Turns the raw client command into the command actually sent on the bus:
//! rate-limits position changes against the joint velocity limits, holds the
//! gripper when it is already torque-saturated, and clamps positions and
//! torques into the robot's static envelope. The shaped command is the only
//! thing that ever reaches the transport.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;

// Internal
use arm_if::cmd::{Gain, JointState};
use util::maths::sign;

use crate::params::{RobotParams, JOINT_DOF};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Gripper clipping below this size is not worth a log line.
///
/// Units: metres
const GRIPPER_CLIP_LOG_TOLERANCE_M: f64 = 0.005;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Shape the next output command.
///
/// `prev_output` is the command sent on the previous tick, `input` the
/// current client command (with any feed-forward torque already folded in),
/// `joint_state` the latest telemetry. The returned command satisfies the
/// position, velocity and torque envelopes of `robot`.
pub(crate) fn shape_output_cmd(
    robot: &RobotParams,
    dt: f64,
    gain: &Gain,
    input: &JointState,
    prev_output: &JointState,
    joint_state: &JointState,
) -> JointState {
    let mut output = *input;

    // Joint velocity clipping. With stiffness off the motor ignores the
    // position demand, so track the measured position instead; this keeps
    // the command close to the arm and makes re-enabling stiffness safe.
    for i in 0..JOINT_DOF {
        if gain.kp[i] > 0.0 {
            let delta_pos = input.pos[i] - prev_output.pos[i];
            let max_step = robot.joint_vel_max_rads[i] * dt;
            if delta_pos.abs() > max_step {
                output.pos[i] = prev_output.pos[i] + sign(delta_pos) * max_step;
                debug!(
                    "Joint {} pos {:.3} pos cmd clipped: {:.3} to {:.3}",
                    i, joint_state.pos[i], input.pos[i], output.pos[i]
                );
            }
        }
        else {
            output.pos[i] = joint_state.pos[i];
        }
    }

    // Gripper velocity clipping
    if gain.gripper_kp > 0.0 {
        let delta_pos = input.gripper_pos - prev_output.gripper_pos;
        let max_step = robot.gripper_vel_max_ms * dt;
        if delta_pos.abs() > max_step {
            output.gripper_pos = prev_output.gripper_pos + sign(delta_pos) * max_step;
            if (input.gripper_pos - output.gripper_pos).abs() >= 0.001 {
                debug!(
                    "Gripper pos cmd clipped: {:.3} to {:.3}",
                    input.gripper_pos, output.gripper_pos
                );
            }
        }
    }
    else {
        output.gripper_pos = joint_state.gripper_pos;
    }

    // Gripper torque hold: once the gripper is pushing at more than half its
    // torque limit, refuse to command it further in the blocked direction
    if joint_state.gripper_torque.abs() > robot.gripper_torque_max_nm / 2.0 {
        // Torque sign: negative while closing is blocked, positive while
        // opening is blocked. Motion sign: negative closing, positive
        // opening.
        let blocked_dir = sign(joint_state.gripper_torque);
        let delta_pos = output.gripper_pos - prev_output.gripper_pos;
        if delta_pos * blocked_dir > 0.0 {
            debug!("Gripper torque is too large, gripper pos cmd is not updated");
            output.gripper_pos = prev_output.gripper_pos;
        }
    }

    // Joint position clipping
    for i in 0..JOINT_DOF {
        let clamped = output.pos[i]
            .clamp(robot.joint_pos_min_rad[i], robot.joint_pos_max_rad[i]);
        if clamped != output.pos[i] {
            debug!(
                "Joint {} pos {:.3} pos cmd clipped from {:.3} to limit {:.3}",
                i, joint_state.pos[i], output.pos[i], clamped
            );
            output.pos[i] = clamped;
        }
    }

    // Gripper position clipping
    if output.gripper_pos < 0.0 {
        if output.gripper_pos < -GRIPPER_CLIP_LOG_TOLERANCE_M {
            debug!(
                "Gripper pos cmd clipped from {:.3} to min: 0.000",
                output.gripper_pos
            );
        }
        output.gripper_pos = 0.0;
    }
    else if output.gripper_pos > robot.gripper_width_m {
        if output.gripper_pos > robot.gripper_width_m + GRIPPER_CLIP_LOG_TOLERANCE_M {
            debug!(
                "Gripper pos cmd clipped from {:.3} to max: {:.3}",
                output.gripper_pos, robot.gripper_width_m
            );
        }
        output.gripper_pos = robot.gripper_width_m;
    }

    // Torque clipping
    for i in 0..JOINT_DOF {
        let limit = robot.joint_torque_max_nm[i];
        let clamped = output.torque[i].clamp(-limit, limit);
        if clamped != output.torque[i] {
            debug!(
                "Joint {} torque cmd clipped from {:.3} to limit {:.3}",
                i, output.torque[i], clamped
            );
            output.torque[i] = clamped;
        }
    }

    output
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::{ctrl_params, robot_params, ControllerKind};
    use nalgebra::Vector6;

    fn setup() -> (RobotParams, f64, Gain) {
        let robot = robot_params("X5").unwrap();
        let ctrl = ctrl_params(ControllerKind::Joint);
        let mut gain = ctrl.default_gain();
        gain.kp = Vector6::repeat(70.0);
        (robot, ctrl.dt_s, gain)
    }

    #[test]
    fn test_velocity_clip_per_joint() {
        let (robot, dt, gain) = setup();
        let mut input = JointState::default();
        input.pos = Vector6::repeat(1.0);
        let prev = JointState::default();
        let state = JointState::default();

        let output = shape_output_cmd(&robot, dt, &gain, &input, &prev, &state);

        // vel_max = [3, 2, 2, 2, 3, 3] and dt = 0.002
        assert!((output.pos[0] - 0.006).abs() <= f64::EPSILON);
        assert!((output.pos[1] - 0.004).abs() <= f64::EPSILON);
        assert!((output.pos[5] - 0.006).abs() <= f64::EPSILON);
    }

    #[test]
    fn test_small_steps_pass_unclipped() {
        let (robot, dt, gain) = setup();
        let mut input = JointState::default();
        input.pos[0] = 0.003;
        let prev = JointState::default();
        let state = JointState::default();

        let output = shape_output_cmd(&robot, dt, &gain, &input, &prev, &state);

        assert_eq!(output.pos[0], 0.003);
    }

    #[test]
    fn test_zero_kp_follows_measured_position() {
        let (robot, dt, _) = setup();
        let gain = Gain::default();
        let mut input = JointState::default();
        input.pos = Vector6::repeat(1.0);
        let prev = JointState::default();
        let mut state = JointState::default();
        state.pos = Vector6::repeat(0.37);
        state.gripper_pos = 0.02;

        let output = shape_output_cmd(&robot, dt, &gain, &input, &prev, &state);

        assert_eq!(output.pos, state.pos);
        assert_eq!(output.gripper_pos, state.gripper_pos);
    }

    #[test]
    fn test_position_clamped_to_limits() {
        let (robot, dt, gain) = setup();
        let mut input = JointState::default();
        input.pos[0] = 3.0;
        let mut prev = JointState::default();
        // Previous output already at the limit, so the velocity clip alone
        // would allow a step past it
        prev.pos[0] = robot.joint_pos_max_rad[0];
        let state = JointState::default();

        let output = shape_output_cmd(&robot, dt, &gain, &input, &prev, &state);

        assert_eq!(output.pos[0], 2.618);

        // And it stays there on the following tick
        let output2 = shape_output_cmd(&robot, dt, &gain, &input, &output, &state);
        assert_eq!(output2.pos[0], 2.618);
    }

    #[test]
    fn test_gripper_torque_hold_blocks_closing() {
        let (robot, dt, gain) = setup();
        let mut prev = JointState::default();
        prev.gripper_pos = 0.05;
        let mut input = JointState::default();
        input.gripper_pos = 0.04995; // closing, well inside one tick's step
        let mut state = JointState::default();
        state.gripper_torque = -1.0; // closing is blocked (> 1.5 / 2)
        state.gripper_pos = 0.05;

        let output = shape_output_cmd(&robot, dt, &gain, &input, &prev, &state);

        assert_eq!(output.gripper_pos, prev.gripper_pos);
    }

    #[test]
    fn test_gripper_torque_hold_allows_retreat() {
        let (robot, dt, gain) = setup();
        let mut prev = JointState::default();
        prev.gripper_pos = 0.05;
        let mut input = JointState::default();
        input.gripper_pos = 0.05005; // opening away from the blockage
        let mut state = JointState::default();
        state.gripper_torque = -1.0;
        state.gripper_pos = 0.05;

        let output = shape_output_cmd(&robot, dt, &gain, &input, &prev, &state);

        assert_eq!(output.gripper_pos, 0.05005);
    }

    #[test]
    fn test_gripper_position_clamped() {
        let (robot, dt, mut gain) = setup();
        gain.gripper_kp = 30.0;
        let mut prev = JointState::default();
        prev.gripper_pos = robot.gripper_width_m;
        let mut input = JointState::default();
        input.gripper_pos = robot.gripper_width_m + 0.00005;
        let state = JointState::default();

        let output = shape_output_cmd(&robot, dt, &gain, &input, &prev, &state);

        assert_eq!(output.gripper_pos, robot.gripper_width_m);
    }

    #[test]
    fn test_torque_clamped_to_limits() {
        let (robot, dt, gain) = setup();
        let mut input = JointState::default();
        input.torque[1] = 100.0;
        input.torque[4] = -55.0;
        let prev = JointState::default();
        let state = JointState::default();

        let output = shape_output_cmd(&robot, dt, &gain, &input, &prev, &state);

        assert_eq!(output.torque[1], robot.joint_torque_max_nm[1]);
        assert_eq!(output.torque[4], -robot.joint_torque_max_nm[4]);
    }

    #[test]
    fn test_velocity_envelope_over_many_ticks() {
        let (robot, dt, gain) = setup();
        let mut input = JointState::default();
        input.pos = Vector6::repeat(0.5);
        let state = JointState::default();

        let mut prev = JointState::default();
        for _ in 0..500 {
            let output = shape_output_cmd(&robot, dt, &gain, &input, &prev, &state);
            for i in 0..JOINT_DOF {
                let step = (output.pos[i] - prev.pos[i]).abs();
                assert!(step <= robot.joint_vel_max_rads[i] * dt + 1e-12);
                assert!(output.pos[i] >= robot.joint_pos_min_rad[i]);
                assert!(output.pos[i] <= robot.joint_pos_max_rad[i]);
            }
            prev = output;
        }

        // The ramp must actually arrive
        assert!((prev.pos[0] - 0.5).abs() < 1e-9);
    }
}
