//! Cartesian-space controller facade

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use nalgebra::Vector6;
use std::sync::Arc;
use std::time::Duration;

// Internal
use arm_if::cmd::{blend, EefState, Gain, JointState, Pose6d};
use arm_if::eqpt::{CanTransport, Solver};
use util::time;

use crate::facade::ControllerBase;
use crate::params::{ctrl_params, robot_params, ControllerKind, CtrlParams, RobotParams};
use crate::ArmCtrlError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Controller driven with end-effector pose targets.
///
/// Targets carry an optional future timestamp; the controller interpolates
/// the output pose linearly from wherever it was when the target arrived,
/// reaching the target at that time, and resolves each interpolated pose to
/// joint space through the solver. The background loop runs at 5 ms and is
/// started by construction.
pub struct CartesianController {
    base: ControllerBase,
    solver: Arc<dyn Solver + Send + Sync>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CartesianController {
    /// Build a controller for a known robot model. A solver is mandatory.
    pub fn new<C>(
        model: &str,
        transport: C,
        solver: Arc<dyn Solver + Send + Sync>,
    ) -> Result<Self, ArmCtrlError>
    where
        C: CanTransport + Send + 'static,
    {
        Self::with_params(
            robot_params(model)?,
            ctrl_params(ControllerKind::Cartesian),
            transport,
            solver,
        )
    }

    /// Build a controller from explicit parameter tables.
    pub fn with_params<C>(
        robot: RobotParams,
        ctrl: CtrlParams,
        transport: C,
        solver: Arc<dyn Solver + Send + Sync>,
    ) -> Result<Self, ArmCtrlError>
    where
        C: CanTransport + Send + 'static,
    {
        let base = ControllerBase::bring_up(
            true,
            robot,
            ctrl,
            transport,
            Some(Arc::clone(&solver)),
        )?;
        Ok(Self { base, solver })
    }

    // ---- COMMANDS AND STATE ----

    /// Store a new end-effector target.
    ///
    /// A non-zero timestamp in the past is rejected with a warning and the
    /// previous target kept. Gripper velocity and torque demands are zeroed
    /// with a warning. Ignored entirely once the emergency state is active.
    pub fn set_eef_cmd(&self, new_cmd: EefState) {
        if self.base.is_emergency() {
            warn!("Controller is in emergency state, command ignored");
            return;
        }

        let mut new_cmd = new_cmd;
        if new_cmd.gripper_vel != 0.0 || new_cmd.gripper_torque != 0.0 {
            warn!("Gripper vel and torque control is not supported yet.");
            new_cmd.gripper_vel = 0.0;
            new_cmd.gripper_torque = 0.0;
        }

        let now = self.base.timestamp();
        let mut cmd = self.base.shared.cmd.lock().unwrap();
        if new_cmd.timestamp != 0.0 && new_cmd.timestamp < now {
            warn!(
                "EEF command timestamp is in the past (current timestamp: \
                 {:.3}s). New EEF command is ignored.",
                now
            );
            return;
        }

        if let Some(eef) = cmd.eef.as_mut() {
            // Anchor the interpolation at the pose currently being output
            eef.interp_start = eef.output;
            eef.input = new_cmd;
        }
    }

    /// `(input, output)` snapshot of the end-effector command.
    pub fn get_eef_cmd(&self) -> (EefState, EefState) {
        let cmd = self.base.shared.cmd.lock().unwrap();
        match &cmd.eef {
            Some(eef) => (eef.input, eef.output),
            None => (EefState::default(), EefState::default()),
        }
    }

    /// `(input, output)` snapshot of the derived joint-space command.
    pub fn get_joint_cmd(&self) -> (JointState, JointState) {
        self.base.joint_cmd()
    }

    /// End-effector state derived from the latest telemetry via forward
    /// kinematics.
    pub fn get_eef_state(&self) -> EefState {
        let joint_state = self.base.joint_state();
        let solver = self.solver();
        EefState {
            timestamp: joint_state.timestamp,
            pose_6d: solver.forward_kinematics(&joint_state.pos),
            gripper_pos: joint_state.gripper_pos,
            gripper_vel: joint_state.gripper_vel,
            gripper_torque: joint_state.gripper_torque,
        }
    }

    /// Latest telemetry snapshot. Never blocks for fresh data.
    pub fn get_joint_state(&self) -> JointState {
        self.base.joint_state()
    }

    /// Seconds since the controller started.
    pub fn get_timestamp(&self) -> f64 {
        self.base.timestamp()
    }

    /// Pose of the home (all-zero) joint configuration.
    pub fn get_home_pose(&self) -> Pose6d {
        self.solver().forward_kinematics(&Vector6::zeros())
    }

    /// Copy of the robot parameter table.
    pub fn get_robot_params(&self) -> RobotParams {
        self.base.robot.clone()
    }

    /// Copy of the controller parameter table.
    pub fn get_ctrl_params(&self) -> CtrlParams {
        self.base.ctrl.clone()
    }

    // ---- GAINS ----

    pub fn get_gain(&self) -> Gain {
        self.base.gain()
    }

    pub fn set_gain(&self, new_gain: Gain) -> Result<(), ArmCtrlError> {
        self.base.set_gain(new_gain)
    }

    // ---- MOTION MACROS ----

    /// Blend gains and target to the home configuration, converting each
    /// intermediate joint-space point to a pose via forward kinematics.
    /// Returns once the blend is complete.
    pub fn reset_to_home(&self) -> Result<(), ArmCtrlError> {
        if self.base.is_emergency() {
            warn!("Controller is in emergency state, reset_to_home ignored");
            return Ok(());
        }

        let mut init_state = self.get_joint_state();
        init_state.gripper_vel = 0.0;
        init_state.gripper_torque = 0.0;
        let init_gain = self.get_gain();

        let target_gain = if init_gain.kp_is_zero() {
            info!("Current kp is zero. Setting to default kp kd");
            self.base.ctrl.default_gain()
        }
        else {
            init_gain
        };
        let target_state = JointState::default();

        if init_state.pos == Vector6::zeros() {
            self.base.set_running(false);
            return Err(ArmCtrlError::MotorsNotResponding);
        }

        let max_pos_error = init_state
            .pos
            .amax()
            .max(init_state.gripper_pos * 2.0 / self.base.robot.gripper_width_m);
        let duration_s = (2.0 * max_pos_error).max(0.5);
        let step_num = (duration_s / self.base.ctrl.dt_s).ceil() as usize;
        info!(
            "Start reset to home in {:.3}s, max_pos_error: {:.3}",
            duration_s + 0.5,
            max_pos_error
        );

        let prev_running = self.base.is_running();
        self.base.set_running(true);
        let solver = self.solver();

        for i in 0..=step_num {
            let alpha = i as f64 / step_num as f64;
            let joint_cmd = blend(&init_state, &target_state, alpha);
            let gain = blend(&init_gain, &target_gain, alpha);
            self.set_gain(gain)?;

            let mut eef_cmd = EefState::default();
            eef_cmd.pose_6d = solver.forward_kinematics(&joint_cmd.pos);
            eef_cmd.gripper_pos = joint_cmd.gripper_pos;
            self.set_eef_cmd(eef_cmd);

            time::sleep_at_least(Duration::from_secs_f64(self.base.ctrl.dt_s));
        }

        time::sleep_ms(500);
        info!("Finish reset to home");
        self.base.set_running(prev_running);
        Ok(())
    }

    /// Snap the gains to the damping profile while holding the measured
    /// pose. Returns after a settle period.
    pub fn set_to_damping(&self) -> Result<(), ArmCtrlError> {
        if self.base.is_emergency() {
            warn!("Controller is in emergency state, set_to_damping ignored");
            return Ok(());
        }

        info!("Start set to damping");

        let joint_state = self.get_joint_state();
        let mut eef_cmd = EefState::default();
        eef_cmd.pose_6d = self.solver().forward_kinematics(&joint_state.pos);
        eef_cmd.gripper_pos = joint_state.gripper_pos;

        self.set_gain(self.base.ctrl.damping_gain())?;
        self.set_eef_cmd(eef_cmd);

        time::sleep_ms(500);
        info!("Finish set to damping");
        Ok(())
    }

    // ---- LIFECYCLE ----

    pub fn enable_background_send_recv(&self) {
        self.base.set_running(true);
    }

    pub fn disable_background_send_recv(&self) {
        self.base.set_running(false);
    }

    pub fn enable_gravity_compensation(&self) -> Result<(), ArmCtrlError> {
        self.base.set_gravity_compensation(true)
    }

    pub fn disable_gravity_compensation(&self) -> Result<(), ArmCtrlError> {
        self.base.set_gravity_compensation(false)
    }

    fn solver(&self) -> &(dyn Solver + Send + Sync) {
        self.solver.as_ref()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use arm_if::eqpt::mock::{IdentitySolver, MockTransport};
    use std::time::Instant;

    fn make_controller() -> (CartesianController, MockTransport) {
        let transport = MockTransport::with_uniform_angle(0.3);
        let controller = CartesianController::new(
            "X5",
            transport.clone(),
            Arc::new(IdentitySolver::new()),
        )
        .unwrap();
        (controller, transport)
    }

    fn wait_for(check: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(1);
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_bring_up_seeds_buffers_from_measured_pose() {
        let (controller, _transport) = make_controller();

        // The loop starts running on this variant
        assert!(controller.base.is_running());

        let (input, output) = controller.get_eef_cmd();
        assert!((input.pose_6d[0] - 0.3).abs() < 1e-9);
        assert!((output.pose_6d[0] - 0.3).abs() < 1e-6);

        let eef_state = controller.get_eef_state();
        assert!((eef_state.pose_6d[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_immediate_target_is_applied() {
        let (controller, _transport) = make_controller();

        let mut target = EefState::default();
        target.pose_6d = Pose6d::new(0.35, 0.3, 0.3, 0.3, 0.3, 0.3);
        target.timestamp = 0.0;
        controller.set_eef_cmd(target);

        assert!(wait_for(|| {
            let (_, output) = controller.get_eef_cmd();
            (output.pose_6d[0] - 0.35).abs() < 1e-9
        }));

        // Identity IK: the joint-space input follows the pose
        assert!(wait_for(|| {
            let (input, _) = controller.get_joint_cmd();
            (input.pos[0] - 0.35).abs() < 1e-9
        }));
    }

    #[test]
    fn test_future_target_interpolates_convexly() {
        let (controller, _transport) = make_controller();

        let mut target = EefState::default();
        target.pose_6d = Pose6d::new(0.5, 0.3, 0.3, 0.3, 0.3, 0.3);
        target.timestamp = controller.get_timestamp() + 1.0;
        controller.set_eef_cmd(target);

        // Read back the exact anchor the controller snapshotted
        let (input, anchor) = {
            let cmd = controller.base.shared.cmd.lock().unwrap();
            let eef = cmd.eef.as_ref().unwrap();
            (eef.input, eef.interp_start)
        };

        std::thread::sleep(Duration::from_millis(500));

        let (_, output) = controller.get_eef_cmd();
        assert!(output.timestamp < input.timestamp);

        // Reconstruct alpha from the output timestamp; the blend must be
        // exact in every component
        let alpha = (output.timestamp - anchor.timestamp)
            / (input.timestamp - anchor.timestamp);
        assert!(alpha > 0.2 && alpha < 0.8);
        for i in 0..6 {
            let expected =
                anchor.pose_6d[i] * (1.0 - alpha) + input.pose_6d[i] * alpha;
            assert!((output.pose_6d[i] - expected).abs() < 1e-6);
        }

        // After the target time passes, the output holds the target
        std::thread::sleep(Duration::from_millis(600));
        let (_, output) = controller.get_eef_cmd();
        assert!((output.pose_6d[0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_past_timestamp_is_rejected() {
        let (controller, _transport) = make_controller();

        let (input_before, _) = controller.get_eef_cmd();

        let mut target = EefState::default();
        target.pose_6d = Pose6d::new(0.5, 0.3, 0.3, 0.3, 0.3, 0.3);
        target.timestamp = -1.0;
        controller.set_eef_cmd(target);

        let (input_after, _) = controller.get_eef_cmd();
        assert_eq!(input_before.pose_6d, input_after.pose_6d);
    }

    #[test]
    fn test_gripper_fields_zeroed_on_command() {
        let (controller, _transport) = make_controller();

        let mut target = EefState::default();
        target.pose_6d = Pose6d::new(0.32, 0.3, 0.3, 0.3, 0.3, 0.3);
        target.gripper_vel = 0.2;
        target.gripper_torque = 0.1;
        controller.set_eef_cmd(target);

        let (input, _) = controller.get_eef_cmd();
        assert_eq!(input.gripper_vel, 0.0);
        assert_eq!(input.gripper_torque, 0.0);
    }

    #[test]
    fn test_home_pose_is_fk_of_zero() {
        let (controller, _transport) = make_controller();
        assert_eq!(controller.get_home_pose(), Pose6d::zeros());
    }

    #[test]
    fn test_set_to_damping_holds_measured_pose() {
        let (controller, _transport) = make_controller();

        controller.set_to_damping().unwrap();

        let gain = controller.get_gain();
        assert!(gain.kp_is_zero());
        let (input, _) = controller.get_eef_cmd();
        let state = controller.get_joint_state();
        assert!((input.pose_6d[0] - state.pos[0]).abs() < 0.01);
    }

    #[test]
    fn test_gravity_compensation_toggle() {
        let (controller, _transport) = make_controller();
        controller.enable_gravity_compensation().unwrap();
        controller.disable_gravity_compensation().unwrap();
    }
}
