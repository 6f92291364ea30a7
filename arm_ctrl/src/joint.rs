//! Joint-space controller facade

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use nalgebra::Vector6;
use std::sync::Arc;
use std::time::Duration;

// Internal
use arm_if::cmd::{blend, Gain, JointState, Pose6d};
use arm_if::eqpt::{CanTransport, Solver};
use util::time;

use crate::facade::ControllerBase;
use crate::params::{ctrl_params, robot_params, ControllerKind, CtrlParams, RobotParams};
use crate::ArmCtrlError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Controller driven with joint-space targets.
///
/// Runs its background loop at 2 ms. The loop starts quiescent; call
/// [`JointController::enable_background_send_recv`] to begin streaming
/// commands and telemetry, or pace the exchange manually with
/// [`JointController::send_recv_once`].
pub struct JointController {
    base: ControllerBase,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl JointController {
    /// Build a controller for a known robot model.
    ///
    /// The solver is optional: without one, gravity compensation and tool
    /// pose queries are unavailable.
    pub fn new<C>(
        model: &str,
        transport: C,
        solver: Option<Arc<dyn Solver + Send + Sync>>,
    ) -> Result<Self, ArmCtrlError>
    where
        C: CanTransport + Send + 'static,
    {
        Self::with_params(
            robot_params(model)?,
            ctrl_params(ControllerKind::Joint),
            transport,
            solver,
        )
    }

    /// Build a controller from explicit parameter tables.
    pub fn with_params<C>(
        robot: RobotParams,
        ctrl: CtrlParams,
        transport: C,
        solver: Option<Arc<dyn Solver + Send + Sync>>,
    ) -> Result<Self, ArmCtrlError>
    where
        C: CanTransport + Send + 'static,
    {
        let base = ControllerBase::bring_up(false, robot, ctrl, transport, solver)?;
        Ok(Self { base })
    }

    // ---- COMMANDS AND STATE ----

    /// Store a new joint-space target.
    pub fn set_joint_cmd(&self, new_cmd: JointState) {
        self.base.set_joint_cmd(new_cmd);
    }

    /// `(input, output)` snapshot of the current command.
    pub fn get_joint_cmd(&self) -> (JointState, JointState) {
        self.base.joint_cmd()
    }

    /// Latest telemetry snapshot. Never blocks for fresh data.
    pub fn get_joint_state(&self) -> JointState {
        self.base.joint_state()
    }

    /// Seconds since the controller started.
    pub fn get_timestamp(&self) -> f64 {
        self.base.timestamp()
    }

    /// Tool pose of the current measured configuration.
    pub fn get_tool_pose(&self) -> Result<Pose6d, ArmCtrlError> {
        let solver = self.base.solver.as_ref().ok_or(ArmCtrlError::SolverMissing)?;
        Ok(solver.forward_kinematics(&self.get_joint_state().pos))
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

    /// Blend gains and joint target to the home (all-zero) configuration,
    /// then hold it briefly. Returns once the blend is complete.
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

        for i in 0..=step_num {
            let alpha = i as f64 / step_num as f64;
            let cmd = blend(&init_state, &target_state, alpha);
            let gain = blend(&init_gain, &target_gain, alpha);
            self.set_joint_cmd(cmd);
            time::sleep_at_least(Duration::from_secs_f64(self.base.ctrl.dt_s));
            self.set_gain(gain)?;
        }

        time::sleep_ms(500);
        info!("Finish reset to home");
        self.base.set_running(prev_running);
        Ok(())
    }

    /// Ramp down to the damping profile while holding the measured pose.
    /// Returns after a settle period.
    pub fn set_to_damping(&self) -> Result<(), ArmCtrlError> {
        if self.base.is_emergency() {
            warn!("Controller is in emergency state, set_to_damping ignored");
            return Ok(());
        }

        let init_gain = self.get_gain();
        let target_gain = self.base.ctrl.damping_gain();
        info!("Start set to damping");

        let prev_running = self.base.is_running();
        self.base.set_running(true);

        let step_num = 20;
        for i in 0..=step_num {
            let state = self.get_joint_state();
            let mut cmd = JointState::default();
            cmd.pos = state.pos;
            cmd.gripper_pos = state.gripper_pos;

            let alpha = i as f64 / step_num as f64;
            self.set_gain(blend(&init_gain, &target_gain, alpha))?;
            self.set_joint_cmd(cmd);
            time::sleep_ms(5);
        }

        time::sleep_ms(500);
        info!("Finish set to damping");
        self.base.set_running(prev_running);
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

    /// Single synchronous send/receive exchange; ignored while the
    /// background loop runs.
    pub fn send_recv_once(&self) -> Result<(), ArmCtrlError> {
        self.base.send_recv_once()
    }

    // ---- CALIBRATION ----

    /// Zero one joint's encoder at its current position. Hold the joint at
    /// its home position and disable the background loop first.
    pub fn calibrate_joint(&self, joint: usize) -> Result<(), ArmCtrlError> {
        self.base.calibrate_joint(joint)
    }

    /// Zero the gripper's encoder at its current (fully closed) position.
    /// Returns the raw angle readout after zeroing; re-open the gripper and
    /// read the reported position to measure a new fully-open readout.
    pub fn calibrate_gripper(&self) -> Result<f64, ArmCtrlError> {
        self.base.calibrate_gripper()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use arm_if::eqpt::mock::{IdentitySolver, MockTransport};
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    fn make_controller() -> (JointController, MockTransport) {
        let transport = MockTransport::with_uniform_angle(0.1);
        let controller = JointController::new("X5", transport.clone(), None).unwrap();
        (controller, transport)
    }

    /// Poll until `check` passes or the deadline expires.
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
    fn test_bring_up_and_state_snapshot() {
        let (controller, _transport) = make_controller();

        // Quiescent after construction
        assert!(!controller.base.is_running());

        let state = controller.get_joint_state();
        assert!((state.pos[0] - 0.1).abs() < 1e-9);

        // Gains start at damping
        let gain = controller.get_gain();
        assert!(gain.kp_is_zero());
        assert_eq!(gain.kd, Vector6::from([2.0, 2.0, 2.0, 1.0, 1.0, 1.0]));
    }

    #[test]
    fn test_unknown_model_fails_construction() {
        let transport = MockTransport::with_uniform_angle(0.1);
        assert!(matches!(
            JointController::new("Z1", transport, None),
            Err(ArmCtrlError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_background_loop_tracks_commands() {
        let (controller, transport) = make_controller();
        controller.enable_background_send_recv();

        let mut cmd = JointState::default();
        cmd.pos = Vector6::repeat(0.1);
        cmd.pos[0] = 0.15;
        controller.set_joint_cmd(cmd);
        controller.set_gain(ctrl_params(ControllerKind::Joint).default_gain()).unwrap();

        // The loop must walk the output command to the target and the echoed
        // telemetry must follow
        assert!(wait_for(|| {
            (controller.get_joint_state().pos[0] - 0.15).abs() < 1e-6
        }));
        let (_input, output) = controller.get_joint_cmd();
        assert!((output.pos[0] - 0.15).abs() < 1e-6);
        assert!(transport.last_cmd_for(1).is_some());
    }

    #[test]
    fn test_gripper_vel_and_torque_are_zeroed() {
        let (controller, _transport) = make_controller();

        let mut cmd = JointState::default();
        cmd.pos = Vector6::repeat(0.1);
        cmd.gripper_vel = 0.5;
        cmd.gripper_torque = 0.3;
        controller.set_joint_cmd(cmd);

        let (input, _) = controller.get_joint_cmd();
        assert_eq!(input.gripper_vel, 0.0);
        assert_eq!(input.gripper_torque, 0.0);
        assert_eq!(input.pos, cmd.pos);
    }

    #[test]
    fn test_gain_jump_guard_stops_loop() {
        let (controller, _transport) = make_controller();

        // Loop is quiescent, so the published snapshot stays put: pretend
        // the arm moved while stiffness was off
        {
            let mut state = controller.base.shared.state.lock().unwrap();
            state.pos[0] = 0.5;
        }

        let mut gain = controller.get_gain();
        gain.kp = Vector6::repeat(70.0);

        // Output command still sits at ~0.1, measured position claims 0.5
        let result = controller.set_gain(gain);
        assert!(matches!(result, Err(ArmCtrlError::GainJumpGuard { .. })));
        assert!(!controller.base.is_running());

        // The gain must not have been applied
        assert!(controller.get_gain().kp_is_zero());
    }

    #[test]
    fn test_timestamps_monotone_across_snapshots() {
        let (controller, _transport) = make_controller();
        controller.enable_background_send_recv();

        let mut prev = 0.0;
        for _ in 0..10 {
            let state = controller.get_joint_state();
            assert!(state.timestamp >= prev);
            prev = state.timestamp;
            std::thread::sleep(Duration::from_millis(4));
        }
    }

    #[test]
    fn test_emergency_ignores_client_writes() {
        let (controller, _transport) = make_controller();

        // Force the terminal state from the facade side
        controller.base.shared.emergency.store(true, Ordering::SeqCst);

        let (input_before, _) = controller.get_joint_cmd();
        let mut cmd = JointState::default();
        cmd.pos = Vector6::repeat(0.4);
        controller.set_joint_cmd(cmd);
        let (input_after, _) = controller.get_joint_cmd();
        assert_eq!(input_before, input_after);

        let gain_before = controller.get_gain();
        let mut gain = gain_before;
        gain.kp = Vector6::repeat(70.0);
        controller.set_gain(gain).unwrap();
        assert_eq!(controller.get_gain(), gain_before);
    }

    #[test]
    fn test_set_to_damping_is_idempotent() {
        let (controller, _transport) = make_controller();
        controller.enable_background_send_recv();
        controller
            .set_gain(ctrl_params(ControllerKind::Joint).default_gain())
            .unwrap();

        controller.set_to_damping().unwrap();
        let gain_once = controller.get_gain();
        let (input_once, _) = controller.get_joint_cmd();

        controller.set_to_damping().unwrap();
        let gain_twice = controller.get_gain();
        let (input_twice, _) = controller.get_joint_cmd();

        assert_eq!(gain_once, gain_twice);
        assert!((input_once.pos - input_twice.pos).amax() < 1e-6);
        assert!(gain_once.kp_is_zero());
    }

    #[test]
    fn test_reset_to_home_converges_to_zero() {
        let (controller, _transport) = make_controller();
        controller.enable_background_send_recv();

        controller.reset_to_home().unwrap();

        let (input, output) = controller.get_joint_cmd();
        assert!(input.pos.amax() < 1e-6);
        assert!(output.pos.amax() < 0.01);
        // Gains were raised to the variant defaults
        let gain = controller.get_gain();
        assert_eq!(
            gain.kp,
            Vector6::from(ctrl_params(ControllerKind::Joint).default_kp)
        );
    }

    #[test]
    fn test_calibration_requires_quiescent_loop() {
        let (controller, transport) = make_controller();
        controller.enable_background_send_recv();

        assert!(matches!(
            controller.calibrate_joint(0),
            Err(ArmCtrlError::LoopRunning)
        ));

        controller.disable_background_send_recv();
        controller.calibrate_joint(0).unwrap();
        assert!(transport.zeroed_ids().contains(&1));
    }

    #[test]
    fn test_send_recv_once_refreshes_telemetry_when_paused() {
        let (controller, transport) = make_controller();
        transport.set_echo(false);
        transport.set_angle(0, 0.25);

        controller.send_recv_once().unwrap();

        assert!(wait_for(|| {
            (controller.get_joint_state().pos[0] - 0.25).abs() < 1e-9
        }));
    }

    #[test]
    fn test_gravity_compensation_needs_solver() {
        let (controller, _transport) = make_controller();
        assert!(matches!(
            controller.enable_gravity_compensation(),
            Err(ArmCtrlError::SolverMissing)
        ));

        let transport = MockTransport::with_uniform_angle(0.1);
        let controller = JointController::new(
            "X5",
            transport,
            Some(Arc::new(IdentitySolver::new())),
        )
        .unwrap();
        controller.enable_gravity_compensation().unwrap();
        controller.disable_gravity_compensation().unwrap();
    }

    #[test]
    fn test_tool_pose_via_solver() {
        let transport = MockTransport::with_uniform_angle(0.2);
        let controller = JointController::new(
            "X5",
            transport,
            Some(Arc::new(IdentitySolver::new())),
        )
        .unwrap();

        let pose = controller.get_tool_pose().unwrap();
        assert!((pose[0] - 0.2).abs() < 1e-9);
    }
}
