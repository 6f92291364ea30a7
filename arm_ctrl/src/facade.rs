//! Shared internals of the two controller facades
//!
//! [`ControllerBase`] owns everything both variants have in common: bring-up
//! of the bus and the loop thread, the thread-safe getters and setters, the
//! gain jump protection, gravity compensation and lifecycle control, and the
//! damping teardown on drop. The public [`crate::JointController`] and
//! [`crate::CartesianController`] are thin wrappers over it.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{error, info, warn};
use nalgebra::Vector6;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

// Internal
use arm_if::cmd::{EefState, Gain, JointState};
use arm_if::eqpt::{CanError, CanTransport, Solver};
use util::time;

use crate::params::{CtrlParams, RobotParams};
use crate::planner::CartesianPlanner;
use crate::shared::{EefBuffers, SharedState};
use crate::worker::{Worker, WorkerRequest};
use crate::ArmCtrlError;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Largest tolerated command/measurement gap when raising kp from zero.
///
/// Units: radians
const GAIN_JUMP_THRESHOLD_RAD: f64 = 0.2;

/// Settle time granted to the damping command before the loop thread is
/// asked to stop at teardown.
const TEARDOWN_SETTLE: Duration = Duration::from_secs(2);

/// Upper bound on waiting for the loop thread to service a request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Internals shared by both controller variants.
pub(crate) struct ControllerBase {
    pub shared: Arc<SharedState>,
    pub robot: RobotParams,
    pub ctrl: CtrlParams,
    pub solver: Option<Arc<dyn Solver + Send + Sync>>,
    req_tx: Sender<WorkerRequest>,
    handle: Option<JoinHandle<()>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ControllerBase {
    /// Initialise the bus, seed the shared state and spawn the loop thread.
    ///
    /// For the Cartesian variant (`cartesian = true`) a solver must be
    /// supplied; the end-effector buffers are seeded from the arm's measured
    /// pose and the loop starts running. The joint variant starts quiescent.
    pub fn bring_up<C>(
        cartesian: bool,
        robot: RobotParams,
        ctrl: CtrlParams,
        transport: C,
        solver: Option<Arc<dyn Solver + Send + Sync>>,
    ) -> Result<Self, ArmCtrlError>
    where
        C: CanTransport + Send + 'static,
    {
        if cartesian && solver.is_none() {
            return Err(ArmCtrlError::SolverMissing);
        }

        let shared = Arc::new(SharedState::new(cartesian));
        let (req_tx, req_rx) = mpsc::channel();
        let planner = if cartesian {
            Some(CartesianPlanner::new(ctrl.moving_window_size))
        }
        else {
            None
        };

        let mut worker = Worker::new(
            Arc::clone(&shared),
            transport,
            solver.clone(),
            robot.clone(),
            ctrl.clone(),
            planner,
            req_rx,
        );
        worker.init_robot()?;

        if cartesian {
            // Anchor the planner on the pose the arm is actually in, so the
            // first ticks hold position instead of lurching somewhere
            let solver_ref = solver.as_ref().ok_or(ArmCtrlError::SolverMissing)?;
            let seed = EefState {
                timestamp: worker.joint_state.timestamp,
                pose_6d: solver_ref.forward_kinematics(&worker.joint_state.pos),
                gripper_pos: worker.joint_state.gripper_pos,
                gripper_vel: worker.joint_state.gripper_vel,
                gripper_torque: worker.joint_state.gripper_torque,
            };
            let mut cmd = shared.cmd.lock().unwrap();
            cmd.eef = Some(EefBuffers {
                input: seed,
                output: seed,
                interp_start: seed,
            });
            drop(cmd);
            shared.running.store(true, Ordering::SeqCst);
        }

        let handle = std::thread::spawn(move || worker.run());
        info!("Background send/recv loop thread spawned");

        Ok(Self {
            shared,
            robot,
            ctrl,
            solver,
            req_tx,
            handle: Some(handle),
        })
    }

    // ---- SNAPSHOTS ----

    /// Seconds since the controller started.
    pub fn timestamp(&self) -> f64 {
        self.shared.timestamp()
    }

    /// Latest telemetry snapshot.
    ///
    /// Never blocks for fresh data: with the background loop disabled this
    /// returns whatever was captured last.
    pub fn joint_state(&self) -> JointState {
        *self.shared.state.lock().unwrap()
    }

    /// `(input, output)` pair of the joint-space command.
    pub fn joint_cmd(&self) -> (JointState, JointState) {
        let cmd = self.shared.cmd.lock().unwrap();
        (cmd.input_joint, cmd.output_joint)
    }

    /// Current impedance gains.
    pub fn gain(&self) -> Gain {
        self.shared.cmd.lock().unwrap().gain
    }

    // ---- MUTATORS ----

    /// Store a new joint-space client command.
    ///
    /// Gripper velocity and torque demands are not supported and are zeroed
    /// with a warning. Ignored entirely once the emergency state is active.
    pub fn set_joint_cmd(&self, new_cmd: JointState) {
        if self.shared.is_emergency() {
            warn!("Controller is in emergency state, command ignored");
            return;
        }

        let mut new_cmd = new_cmd;
        if new_cmd.gripper_vel != 0.0 || new_cmd.gripper_torque != 0.0 {
            warn!("Gripper vel and torque control is not supported yet.");
            new_cmd.gripper_vel = 0.0;
            new_cmd.gripper_torque = 0.0;
        }

        self.shared.cmd.lock().unwrap().input_joint = new_cmd;
    }

    /// Install new gains.
    ///
    /// Raising any joint kp from zero to non-zero is refused while the
    /// position command is far from the measured position, because the step
    /// change in restoring torque would make the arm jump. On refusal the
    /// background loop is stopped and an error returned.
    pub fn set_gain(&self, new_gain: Gain) -> Result<(), ArmCtrlError> {
        if self.shared.is_emergency() {
            warn!("Controller is in emergency state, gain change ignored");
            return Ok(());
        }

        let joint_state = self.joint_state();
        let mut cmd = self.shared.cmd.lock().unwrap();

        if cmd.gain.kp_is_zero() && !new_gain.kp_is_zero() {
            let max_pos_error = (joint_state.pos - cmd.output_joint.pos).amax();
            if max_pos_error > GAIN_JUMP_THRESHOLD_RAD {
                error!(
                    "Cannot set kp to non-zero when the joint pos cmd is far \
                     from current pos (max error {:.3} rad, threshold {:.3} rad)",
                    max_pos_error, GAIN_JUMP_THRESHOLD_RAD
                );
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(ArmCtrlError::GainJumpGuard {
                    max_pos_error,
                    threshold: GAIN_JUMP_THRESHOLD_RAD,
                });
            }
        }

        cmd.gain = new_gain;
        Ok(())
    }

    // ---- LIFECYCLE ----

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn set_running(&self, running: bool) {
        if running {
            info!("Enable background send_recv");
        }
        else {
            info!("Disable background send_recv");
        }
        self.shared.running.store(running, Ordering::SeqCst);
    }

    pub fn is_emergency(&self) -> bool {
        self.shared.is_emergency()
    }

    /// Toggle the gravity compensation feed-forward. Enabling requires a
    /// solver.
    pub fn set_gravity_compensation(&self, enabled: bool) -> Result<(), ArmCtrlError> {
        if enabled && self.solver.is_none() {
            return Err(ArmCtrlError::SolverMissing);
        }
        if enabled {
            info!("Enable gravity compensation");
        }
        else {
            info!("Disable gravity compensation");
        }
        self.shared.gravity_comp.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    // ---- WORKER REQUESTS ----

    /// Zero one joint's encoder; the background loop must be disabled and
    /// the joint held at its home position.
    pub fn calibrate_joint(&self, joint: usize) -> Result<(), ArmCtrlError> {
        if joint >= crate::params::JOINT_DOF {
            return Err(ArmCtrlError::InvalidJoint(joint));
        }

        let (done_tx, done_rx) = mpsc::channel();
        self.submit_request(WorkerRequest::CalibrateJoint {
            joint,
            done: done_tx,
        })?;
        let result: Result<(), CanError> = done_rx
            .recv_timeout(REQUEST_TIMEOUT)
            .map_err(|_| ArmCtrlError::WorkerGone)?;
        Ok(result?)
    }

    /// Zero the gripper's encoder (gripper fully closed) and return the raw
    /// angle readout afterwards.
    pub fn calibrate_gripper(&self) -> Result<f64, ArmCtrlError> {
        let (done_tx, done_rx) = mpsc::channel();
        self.submit_request(WorkerRequest::CalibrateGripper { done: done_tx })?;
        let result: Result<f64, CanError> = done_rx
            .recv_timeout(REQUEST_TIMEOUT)
            .map_err(|_| ArmCtrlError::WorkerGone)?;
        Ok(result?)
    }

    /// Drive a single synchronous send/receive exchange, for clients that
    /// pace the loop themselves. Ignored while the background loop runs.
    pub fn send_recv_once(&self) -> Result<(), ArmCtrlError> {
        if self.shared.is_running() {
            warn!("send_recv task is already running in background, send_recv_once is ignored");
            return Ok(());
        }
        if self.shared.is_emergency() {
            return Err(ArmCtrlError::EmergencyActive);
        }

        let (done_tx, done_rx) = mpsc::channel();
        self.req_tx
            .send(WorkerRequest::SendRecvOnce { done: done_tx })
            .map_err(|_| ArmCtrlError::WorkerGone)?;
        let result: Result<(), CanError> = done_rx
            .recv_timeout(REQUEST_TIMEOUT)
            .map_err(|_| ArmCtrlError::WorkerGone)?;
        Ok(result?)
    }

    fn submit_request(&self, request: WorkerRequest) -> Result<(), ArmCtrlError> {
        if self.shared.is_running() {
            return Err(ArmCtrlError::LoopRunning);
        }
        if self.shared.is_emergency() {
            return Err(ArmCtrlError::EmergencyActive);
        }
        self.req_tx.send(request).map_err(|_| ArmCtrlError::WorkerGone)
    }
}

impl Drop for ControllerBase {
    /// Release the arm safely: command reinforced damping, give it time to
    /// settle, then stop and join the loop thread.
    fn drop(&mut self) {
        info!("Set to damping before exit");

        {
            let mut cmd = self.shared.cmd.lock().unwrap();
            cmd.gain = self.ctrl.emergency_damping_gain();
            cmd.input_joint.vel = Vector6::zeros();
            cmd.input_joint.torque = Vector6::zeros();
        }
        self.shared.gravity_comp.store(false, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);

        time::sleep_at_least(TEARDOWN_SETTLE);

        self.shared.destroy.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Background send/recv loop thread panicked");
            }
            else {
                info!("Background send/recv loop thread joined");
            }
        }
    }
}
