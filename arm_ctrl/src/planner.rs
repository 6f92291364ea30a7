//! Cartesian target planning
//!
//! Runs once per tick on the Cartesian variant: interpolates the output pose
//! towards the client's (possibly future-timestamped) target, resolves it to
//! joint space through the solver, and optionally attaches a
//! gravity-compensation feed-forward torque. The result is written into the
//! joint-space input command, which the shaper then treats exactly like a
//! client command.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::error;

// Internal
use arm_if::cmd::{blend, JointState};
use arm_if::eqpt::Solver;
use util::filter::MovingAverage6;

use crate::params::{RobotParams, JOINT_DOF};
use crate::shared::EefBuffers;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Poses with a norm below this are treated as a client bug: no reachable
/// target sits on top of the base frame origin.
const ZERO_POSE_NORM_THRESHOLD: f64 = 0.01;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Outcome of a planning step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlanVerdict {
    Nominal,
    /// The interpolated target collapsed onto the origin; emergency.
    ZeroPose,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Per-controller planning state: the smoothing filters applied to the IK
/// solution and the gravity feed-forward.
#[derive(Debug)]
pub(crate) struct CartesianPlanner {
    joint_pos_filter: MovingAverage6,
    joint_torque_filter: MovingAverage6,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CartesianPlanner {
    pub fn new(moving_window_size: usize) -> Self {
        Self {
            joint_pos_filter: MovingAverage6::new(moving_window_size),
            joint_torque_filter: MovingAverage6::new(moving_window_size),
        }
    }

    /// Advance the output pose and derive the joint-space input command.
    ///
    /// Caller holds the command mutex for the duration; `now` is the current
    /// controller timestamp. On IK failure `input_joint_cmd` is left
    /// untouched so the arm keeps steering to the last solvable target.
    pub fn step(
        &mut self,
        robot: &RobotParams,
        solver: &dyn Solver,
        now: f64,
        gravity_comp: bool,
        joint_state: &JointState,
        eef: &mut EefBuffers,
        input_joint_cmd: &mut JointState,
    ) -> PlanVerdict {
        // Interpolation towards the client target
        if eef.input.timestamp == 0.0 {
            // Client opted out of interpolation
            eef.output = eef.input;
            eef.output.timestamp = now;
        }
        else if now > eef.input.timestamp {
            // Target time has passed: hold the target pose
            eef.output = eef.input;
            eef.output.timestamp = now;
        }
        else {
            // Anchor and target coinciding in time degenerates to a jump
            let span = eef.input.timestamp - eef.interp_start.timestamp;
            let alpha = if span > 0.0 {
                ((now - eef.interp_start.timestamp) / span).clamp(0.0, 1.0)
            }
            else {
                1.0
            };
            eef.output.pose_6d =
                blend(&eef.interp_start.pose_6d, &eef.input.pose_6d, alpha);
            eef.output.gripper_pos =
                blend(&eef.interp_start.gripper_pos, &eef.input.gripper_pos, alpha);
            eef.output.timestamp = now;
        }

        // A target at the base frame origin is almost certainly an
        // uninitialised client command
        if eef.output.pose_6d.norm() < ZERO_POSE_NORM_THRESHOLD {
            error!(
                "EEF command should not be set close to zero. To start from \
                 the home pose, query the home pose first."
            );
            return PlanVerdict::ZeroPose;
        }

        match solver.inverse_kinematics(&eef.output.pose_6d, &joint_state.pos) {
            Some(mut joint_pos) => {
                for i in 0..JOINT_DOF {
                    joint_pos[i] = joint_pos[i]
                        .clamp(robot.joint_pos_min_rad[i], robot.joint_pos_max_rad[i]);
                }
                input_joint_cmd.pos = self.joint_pos_filter.filter(joint_pos);
                input_joint_cmd.gripper_pos = eef.output.gripper_pos;

                if gravity_comp {
                    // Feed-forward against gravity at the measured
                    // configuration, not the commanded one
                    let gravity_torque = solver.inverse_dynamics(
                        &joint_state.pos,
                        &nalgebra::Vector6::zeros(),
                        &nalgebra::Vector6::zeros(),
                    );
                    input_joint_cmd.torque =
                        self.joint_torque_filter.filter(gravity_torque);
                }
            }
            None => {
                // No solution this tick; keep the previous joint command
            }
        }

        PlanVerdict::Nominal
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use arm_if::cmd::{EefState, Pose6d};
    use arm_if::eqpt::mock::IdentitySolver;
    use crate::params::robot_params;
    use nalgebra::Vector6;

    fn setup() -> (RobotParams, CartesianPlanner, EefBuffers, JointState, JointState) {
        let robot = robot_params("X5").unwrap();
        let planner = CartesianPlanner::new(1);
        let mut eef = EefBuffers::default();
        let pose = Pose6d::new(0.3, 0.0, 0.2, 0.0, 0.0, 0.0);
        eef.input = EefState { pose_6d: pose, ..EefState::default() };
        eef.output = eef.input;
        eef.interp_start = eef.input;
        let joint_state = JointState::default();
        let input_joint_cmd = JointState::default();
        (robot, planner, eef, joint_state, input_joint_cmd)
    }

    #[test]
    fn test_zero_timestamp_applies_target_directly() {
        let (robot, mut planner, mut eef, state, mut cmd) = setup();
        let solver = IdentitySolver::new();
        eef.input.pose_6d = Pose6d::new(0.4, 0.1, 0.2, 0.0, 0.0, 0.0);
        eef.input.timestamp = 0.0;

        let verdict =
            planner.step(&robot, &solver, 2.5, false, &state, &mut eef, &mut cmd);

        assert_eq!(verdict, PlanVerdict::Nominal);
        assert_eq!(eef.output.pose_6d, eef.input.pose_6d);
        assert_eq!(eef.output.timestamp, 2.5);
        assert_eq!(cmd.pos, eef.input.pose_6d);
    }

    #[test]
    fn test_future_target_interpolates() {
        let (robot, mut planner, mut eef, state, mut cmd) = setup();
        let solver = IdentitySolver::new();
        eef.interp_start.pose_6d = Pose6d::new(0.25, 0.0, 0.5, 0.0, 0.0, 0.0);
        eef.interp_start.timestamp = 1.0;
        eef.input.pose_6d = Pose6d::new(0.75, 0.25, 0.5, 0.0, 0.0, 0.0);
        eef.input.timestamp = 2.0;

        planner.step(&robot, &solver, 1.5, false, &state, &mut eef, &mut cmd);

        assert_eq!(
            eef.output.pose_6d,
            Pose6d::new(0.5, 0.125, 0.5, 0.0, 0.0, 0.0)
        );
        assert_eq!(eef.output.timestamp, 1.5);
    }

    #[test]
    fn test_expired_target_is_held() {
        let (robot, mut planner, mut eef, state, mut cmd) = setup();
        let solver = IdentitySolver::new();
        eef.input.pose_6d = Pose6d::new(0.4, 0.2, 0.2, 0.0, 0.0, 0.0);
        eef.input.timestamp = 2.0;
        eef.interp_start.timestamp = 1.0;

        planner.step(&robot, &solver, 3.0, false, &state, &mut eef, &mut cmd);

        assert_eq!(eef.output.pose_6d, eef.input.pose_6d);
        assert_eq!(eef.output.timestamp, 3.0);
    }

    #[test]
    fn test_zero_pose_guard() {
        let (robot, mut planner, mut eef, state, mut cmd) = setup();
        let solver = IdentitySolver::new();
        eef.input = EefState::default();

        let verdict =
            planner.step(&robot, &solver, 1.0, false, &state, &mut eef, &mut cmd);

        assert_eq!(verdict, PlanVerdict::ZeroPose);
    }

    #[test]
    fn test_ik_solution_clipped_to_joint_limits() {
        let (robot, mut planner, mut eef, state, mut cmd) = setup();
        let solver = IdentitySolver::new();
        // Identity IK maps the pose straight to joint space; axis 1 exceeds
        // its 3.14 rad limit
        eef.input.pose_6d = Pose6d::new(0.0, 5.0, 0.2, 0.0, 0.0, 0.0);
        eef.input.timestamp = 0.0;

        planner.step(&robot, &solver, 1.0, false, &state, &mut eef, &mut cmd);

        assert_eq!(cmd.pos[1], robot.joint_pos_max_rad[1]);
    }

    #[test]
    fn test_ik_failure_leaves_command_unchanged() {
        let (robot, mut planner, mut eef, state, mut cmd) = setup();
        let mut solver = IdentitySolver::new();
        solver.ik_fails = true;
        cmd.pos = Vector6::repeat(0.25);
        cmd.gripper_pos = 0.03;

        planner.step(&robot, &solver, 1.0, false, &state, &mut eef, &mut cmd);

        assert_eq!(cmd.pos, Vector6::repeat(0.25));
        assert_eq!(cmd.gripper_pos, 0.03);
    }

    #[test]
    fn test_gravity_compensation_sets_feed_forward_torque() {
        let (robot, mut planner, mut eef, state, mut cmd) = setup();
        let mut solver = IdentitySolver::new();
        solver.id_torque = Vector6::repeat(1.5);

        planner.step(&robot, &solver, 1.0, true, &state, &mut eef, &mut cmd);
        assert_eq!(cmd.torque, Vector6::repeat(1.5));

        // Disabled: torque untouched
        let mut cmd2 = JointState::default();
        planner.step(&robot, &solver, 1.1, false, &state, &mut eef, &mut cmd2);
        assert_eq!(cmd2.torque, Vector6::zeros());
    }

    #[test]
    fn test_filter_smooths_ik_output() {
        let (robot, _, mut eef, state, mut cmd) = setup();
        let mut planner = CartesianPlanner::new(2);
        let solver = IdentitySolver::new();

        eef.input.pose_6d = Pose6d::new(0.25, 0.0, 0.2, 0.0, 0.0, 0.0);
        eef.input.timestamp = 0.0;
        planner.step(&robot, &solver, 1.0, false, &state, &mut eef, &mut cmd);
        assert_eq!(cmd.pos[0], 0.25);

        eef.input.pose_6d = Pose6d::new(0.75, 0.0, 0.2, 0.0, 0.0, 0.0);
        planner.step(&robot, &solver, 1.1, false, &state, &mut eef, &mut cmd);
        // Mean of the two IK solutions
        assert_eq!(cmd.pos[0], 0.5);
    }
}
