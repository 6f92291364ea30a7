//! The background control loop
//!
//! One [`Worker`] runs on a dedicated OS thread per controller. Every tick
//! it runs the safety checks, advances the Cartesian plan (on that variant),
//! shapes the output command, puts it on the bus motor by motor, reads the
//! telemetry snapshot back and publishes it. The worker is the only code
//! that ever touches the transport after construction, so calibration
//! requests from the client thread arrive over a channel and are serviced
//! while the loop is quiescent.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, error, info};
use nalgebra::Vector6;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

// Internal
use arm_if::cmd::JointState;
use arm_if::eqpt::{CanError, CanTransport, Solver};
use util::maths::lin_map;
use util::time;

use crate::params::{CtrlParams, RobotParams, GRIPPER_MSG_IDX, JOINT_DOF, JOINT_MSG_IDX};
use crate::planner::{CartesianPlanner, PlanVerdict};
use crate::safety::{SafetyMonitor, SafetyVerdict};
use crate::shaper::shape_output_cmd;
use crate::shared::SharedState;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Per-motor send budget; each send is padded out to this so the bus sees a
/// steady frame cadence.
///
/// Units: microseconds
const COMMUNICATE_SLEEP_US: i64 = 150;

/// Tick overruns beyond this are logged.
///
/// Units: microseconds
const OVERRUN_LOG_THRESHOLD_US: i64 = 500;

/// Pause between the raw frames of a calibration sequence.
///
/// Units: microseconds
const CALIBRATION_FRAME_GAP_US: u64 = 400;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Requests routed from the client thread to the worker, which owns the
/// transport. Serviced only while the background loop is quiescent.
pub(crate) enum WorkerRequest {
    CalibrateJoint {
        joint: usize,
        done: Sender<Result<(), CanError>>,
    },
    CalibrateGripper {
        done: Sender<Result<f64, CanError>>,
    },
    SendRecvOnce {
        done: Sender<Result<(), CanError>>,
    },
}

/// Control flow outcome of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Emergency,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The control loop state owned by the loop thread.
pub(crate) struct Worker<C: CanTransport> {
    pub shared: Arc<SharedState>,
    pub transport: C,
    pub solver: Option<Arc<dyn Solver + Send + Sync>>,
    pub robot: RobotParams,
    pub ctrl: CtrlParams,
    pub planner: Option<CartesianPlanner>,
    pub safety: SafetyMonitor,
    pub requests: Receiver<WorkerRequest>,

    /// Latest telemetry, kept loop-local so the safety and shaping steps
    /// never need the state mutex.
    pub joint_state: JointState,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<C: CanTransport> Worker<C> {
    pub fn new(
        shared: Arc<SharedState>,
        transport: C,
        solver: Option<Arc<dyn Solver + Send + Sync>>,
        robot: RobotParams,
        ctrl: CtrlParams,
        planner: Option<CartesianPlanner>,
        requests: Receiver<WorkerRequest>,
    ) -> Self {
        let safety = SafetyMonitor::new(ctrl.over_current_cnt_max);
        Self {
            shared,
            transport,
            solver,
            robot,
            ctrl,
            planner,
            safety,
            requests,
            joint_state: JointState::default(),
        }
    }

    /// Bring the bus up: enable the DM motors, command damping, and settle
    /// until every encoder has reported in.
    ///
    /// Runs on the constructing thread, before the loop thread is spawned.
    pub fn init_robot(&mut self) -> Result<(), crate::ArmCtrlError> {
        for i in 0..JOINT_DOF {
            if self.robot.motor_kind[i].is_dm() {
                self.transport.enable_dm_motor(self.robot.motor_id[i])?;
                time::sleep_at_least(Duration::from_micros(1000));
            }
        }
        if self.robot.gripper_motor_kind.is_dm() {
            self.transport.enable_dm_motor(self.robot.gripper_motor_id)?;
            time::sleep_at_least(Duration::from_micros(1000));
        }

        {
            let mut cmd = self.shared.cmd.lock().unwrap();
            cmd.input_joint = JointState::default();
            cmd.gain = self.ctrl.damping_gain();
        }

        // Make sure all the motor positions are updated
        for _ in 0..=10 {
            if let Err(e) = self.shape_and_send() {
                error!("Send/receive failed during initialisation: {}", e);
            }
            time::sleep_ms(5);
        }

        if self.joint_state.pos == Vector6::zeros() {
            return Err(crate::ArmCtrlError::MotorsNotResponding);
        }

        Ok(())
    }

    /// The loop body. Consumes the worker; returns when `destroy` is raised.
    pub fn run(mut self) {
        info!("Background send/recv loop started");

        loop {
            if self.shared.is_destroyed() {
                break;
            }

            let tick_start_us = self.shared.clock.now_us();

            let flow = if self.shared.is_running() {
                self.tick()
            }
            else {
                self.service_requests()
            };

            if flow == Flow::Emergency {
                self.emergency_loop();
                break;
            }

            let elapsed_us = self.shared.clock.now_us() - tick_start_us;
            let sleep_us = (self.ctrl.dt_s * 1e6) as i64 - elapsed_us;
            if sleep_us > 0 {
                time::sleep_remainder_us(sleep_us);
            }
            else if sleep_us < -OVERRUN_LOG_THRESHOLD_US {
                debug!(
                    "Background send/recv loop is running too slow, tick took {} us",
                    elapsed_us
                );
            }
        }

        info!("Background send/recv loop stopped");
    }

    /// One active tick: safety, planning, shaping, bus exchange.
    pub fn tick(&mut self) -> Flow {
        // Safety first, against the telemetry from the previous exchange
        let input_cmd = self.shared.cmd.lock().unwrap().input_joint;
        if self.safety.check(&self.robot, &self.joint_state, &input_cmd)
            == SafetyVerdict::Emergency
        {
            return self.trip_emergency();
        }

        // Cartesian planning
        if self.planner.is_some() {
            let now = self.shared.timestamp();
            let gravity_comp = self.shared.gravity_comp_enabled();

            let zero_pose = {
                let mut cmd = self.shared.cmd.lock().unwrap();
                let cmd = &mut *cmd;
                match (&mut self.planner, &self.solver, &mut cmd.eef) {
                    (Some(planner), Some(solver), Some(eef)) => {
                        planner.step(
                            &self.robot,
                            solver.as_ref(),
                            now,
                            gravity_comp,
                            &self.joint_state,
                            eef,
                            &mut cmd.input_joint,
                        ) == PlanVerdict::ZeroPose
                    }
                    _ => false,
                }
            };

            if zero_pose {
                return self.trip_emergency();
            }
        }

        if let Err(e) = self.shape_and_send() {
            error!("Send/receive failed, dropping this tick: {}", e);
        }

        Flow::Continue
    }

    /// Shape the output command under the command mutex, then exchange with
    /// the bus outside any lock.
    fn shape_and_send(&mut self) -> Result<(), CanError> {
        let (output, gain) = {
            let mut cmd = self.shared.cmd.lock().unwrap();

            let mut input = cmd.input_joint;

            // Joint variant: fold the gravity feed-forward into the command
            // torque (the Cartesian planner sets it on input_joint itself)
            if self.planner.is_none() && self.shared.gravity_comp_enabled() {
                if let Some(solver) = &self.solver {
                    input.torque += solver.inverse_dynamics(
                        &self.joint_state.pos,
                        &Vector6::zeros(),
                        &Vector6::zeros(),
                    );
                }
            }

            let output = shape_output_cmd(
                &self.robot,
                self.ctrl.dt_s,
                &cmd.gain,
                &input,
                &cmd.output_joint,
                &self.joint_state,
            );
            cmd.output_joint = output;
            (output, cmd.gain)
        };

        self.transmit(&output, &gain)?;
        self.receive_and_publish()
    }

    /// Put the shaped command on the bus, one motor at a time, padding each
    /// send to the per-motor budget.
    fn transmit(
        &mut self,
        output: &JointState,
        gain: &arm_if::cmd::Gain,
    ) -> Result<(), CanError> {
        for i in 0..JOINT_DOF {
            let send_start_us = self.shared.clock.now_us();

            let kind = self.robot.motor_kind[i];
            let id = self.robot.motor_id[i];
            let current = kind.command_current(output.torque[i]);
            if kind.is_dm() {
                self.transport.send_dm_motor_cmd(
                    id,
                    gain.kp[i],
                    gain.kd[i],
                    output.pos[i],
                    output.vel[i],
                    current,
                )?;
            }
            else {
                self.transport.send_ec_motor_cmd(
                    id,
                    gain.kp[i],
                    gain.kd[i],
                    output.pos[i],
                    output.vel[i],
                    current,
                )?;
            }

            time::sleep_remainder_us(
                COMMUNICATE_SLEEP_US - (self.shared.clock.now_us() - send_start_us),
            );
        }

        // The gripper is always a DM motor; its command is in motor-side
        // radians
        let send_start_us = self.shared.clock.now_us();
        let gripper_motor_pos = lin_map(
            (0.0, self.robot.gripper_width_m),
            (0.0, self.robot.gripper_open_readout_rad),
            output.gripper_pos,
        );
        self.transport.send_dm_motor_cmd(
            self.robot.gripper_motor_id,
            gain.gripper_kp,
            gain.gripper_kd,
            gripper_motor_pos,
            0.0,
            0.0,
        )?;
        time::sleep_remainder_us(
            COMMUNICATE_SLEEP_US - (self.shared.clock.now_us() - send_start_us),
        );

        Ok(())
    }

    /// Read the bus telemetry snapshot, convert it to controller-space units
    /// and publish it.
    fn receive_and_publish(&mut self) -> Result<(), CanError> {
        let msgs = self.transport.get_motor_msg()?;

        let mut joint_state = JointState::default();
        for i in 0..JOINT_DOF {
            let msg = &msgs[JOINT_MSG_IDX[i]];
            joint_state.pos[i] = msg.angle_actual_rad;
            joint_state.vel[i] = msg.speed_actual_rad;
            joint_state.torque[i] =
                self.robot.motor_kind[i].feedback_torque(msg.current_actual_float);
        }

        let gripper_msg = &msgs[GRIPPER_MSG_IDX];
        joint_state.gripper_pos = lin_map(
            (0.0, self.robot.gripper_open_readout_rad),
            (0.0, self.robot.gripper_width_m),
            gripper_msg.angle_actual_rad,
        );
        joint_state.gripper_vel = lin_map(
            (0.0, self.robot.gripper_open_readout_rad),
            (0.0, self.robot.gripper_width_m),
            gripper_msg.speed_actual_rad,
        );
        joint_state.gripper_torque = self
            .robot
            .gripper_motor_kind
            .feedback_torque(gripper_msg.current_actual_float);

        joint_state.timestamp = self.shared.timestamp();

        self.joint_state = joint_state;
        *self.shared.state.lock().unwrap() = joint_state;

        Ok(())
    }

    /// Flip into the emergency damping profile. The facade-side flag makes
    /// every later client write a no-op.
    fn trip_emergency(&mut self) -> Flow {
        self.shared.emergency.store(true, Ordering::SeqCst);

        {
            let mut cmd = self.shared.cmd.lock().unwrap();
            cmd.gain = self.ctrl.emergency_damping_gain();
            cmd.input_joint.vel = Vector6::zeros();
            cmd.input_joint.torque = Vector6::zeros();
        }

        error!("Emergency state entered. Please restart the program.");
        Flow::Emergency
    }

    /// Terminal damping loop. Re-issues the damping command every period
    /// until the process tears the controller down; there is no way back to
    /// normal control.
    fn emergency_loop(&mut self) {
        let damping_gain = self.ctrl.emergency_damping_gain();

        while !self.shared.is_destroyed() {
            {
                let mut cmd = self.shared.cmd.lock().unwrap();
                cmd.gain = damping_gain;
                cmd.input_joint.vel = Vector6::zeros();
                cmd.input_joint.torque = Vector6::zeros();
            }
            if let Err(e) = self.shape_and_send() {
                error!("Send/receive failed in emergency damping: {}", e);
            }
            time::sleep_at_least(Duration::from_secs_f64(self.ctrl.dt_s));
        }
    }

    /// Handle client requests that need the transport. Only reachable while
    /// the loop is quiescent.
    fn service_requests(&mut self) -> Flow {
        while let Ok(request) = self.requests.try_recv() {
            match request {
                WorkerRequest::CalibrateJoint { joint, done } => {
                    let result = self.calibrate_joint(joint);
                    let _ = done.send(result);
                }
                WorkerRequest::CalibrateGripper { done } => {
                    let result = self.calibrate_gripper();
                    let _ = done.send(result);
                }
                WorkerRequest::SendRecvOnce { done } => {
                    let result = self.shape_and_send();
                    let _ = done.send(result);

                    let input_cmd = self.shared.cmd.lock().unwrap().input_joint;
                    if self.safety.check(&self.robot, &self.joint_state, &input_cmd)
                        == SafetyVerdict::Emergency
                    {
                        return self.trip_emergency();
                    }
                }
            }
        }
        Flow::Continue
    }

    /// Zero a joint's encoder at its current position.
    ///
    /// The joint must be physically held at its home position; the motor is
    /// released (zero gains) around the reset so the readout is not biased
    /// by a holding torque.
    fn calibrate_joint(&mut self, joint: usize) -> Result<(), CanError> {
        let id = self.robot.motor_id[joint];
        let is_dm = self.robot.motor_kind[joint].is_dm();

        self.send_release_frames(id, is_dm)?;
        if is_dm {
            self.transport.reset_zero_readout(id)?;
        }
        else {
            self.transport.ec_cmd_init(id, 0x03)?;
        }
        time::sleep_at_least(Duration::from_micros(CALIBRATION_FRAME_GAP_US));
        self.send_release_frames(id, is_dm)?;

        info!("Joint {} zero point set", joint);
        Ok(())
    }

    /// Zero the gripper's encoder at its current (fully closed) position and
    /// report the raw angle readout afterwards.
    ///
    /// To measure a new fully-open readout, open the gripper after this call
    /// and read back the reported raw angle.
    fn calibrate_gripper(&mut self) -> Result<f64, CanError> {
        let id = self.robot.gripper_motor_id;

        self.send_release_frames(id, true)?;
        self.transport.reset_zero_readout(id)?;
        time::sleep_at_least(Duration::from_micros(CALIBRATION_FRAME_GAP_US));
        self.send_release_frames(id, true)?;

        let msgs = self.transport.get_motor_msg()?;
        let readout = msgs[GRIPPER_MSG_IDX].angle_actual_rad;
        info!("Gripper zero point set, current readout: {:.3}", readout);
        Ok(readout)
    }

    /// Burst of zero-gain frames releasing a motor before/after a zero
    /// reset.
    fn send_release_frames(&mut self, id: u8, is_dm: bool) -> Result<(), CanError> {
        for _ in 0..10 {
            if is_dm {
                self.transport.send_dm_motor_cmd(id, 0.0, 0.0, 0.0, 0.0, 0.0)?;
            }
            else {
                self.transport.send_ec_motor_cmd(id, 0.0, 0.0, 0.0, 0.0, 0.0)?;
            }
            time::sleep_at_least(Duration::from_micros(CALIBRATION_FRAME_GAP_US));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
