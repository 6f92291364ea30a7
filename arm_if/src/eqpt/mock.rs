//! Loopback equipment for bench testing without hardware
//!
//! [`MockTransport`] is a cloneable handle over a shared in-memory bus, so a
//! test can keep one handle while the controller's loop thread drives the
//! other. In echo mode the telemetry angle of each motor tracks the last
//! commanded position, which is enough to bring a controller through its
//! start-up sequence; tests that need hand-crafted telemetry switch echo off
//! and script the slots directly.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector6;
use std::sync::{Arc, Mutex};

use super::can::{CanError, CanTransport};
use super::motor::{MotorMsg, MOTOR_MSG_COUNT};
use super::solver::Solver;
use crate::cmd::Pose6d;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// One recorded command frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentCmd {
    pub id: u8,
    pub kp: f64,
    pub kd: f64,
    pub pos: f64,
    pub vel: f64,
    pub current: f64,
}

/// Shared state behind a [`MockTransport`] handle.
#[derive(Debug)]
struct MockBus {
    msgs: [MotorMsg; MOTOR_MSG_COUNT],
    echo: bool,
    fail_sends: bool,
    sent: Vec<SentCmd>,
    enabled: Vec<u8>,
    zeroed: Vec<u8>,
}

/// In-memory CAN transport.
#[derive(Debug, Clone)]
pub struct MockTransport {
    bus: Arc<Mutex<MockBus>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MockTransport {
    /// New transport with echo enabled and all-zero telemetry.
    pub fn new() -> Self {
        Self {
            bus: Arc::new(Mutex::new(MockBus {
                msgs: [MotorMsg::default(); MOTOR_MSG_COUNT],
                echo: true,
                fail_sends: false,
                sent: Vec::new(),
                enabled: Vec::new(),
                zeroed: Vec::new(),
            })),
        }
    }

    /// New transport whose motors already report the given angle.
    ///
    /// A freshly powered arm never reads exactly zero on every encoder, and
    /// controllers refuse to start against all-zero telemetry, so most tests
    /// want this constructor.
    pub fn with_uniform_angle(angle_rad: f64) -> Self {
        let transport = Self::new();
        for index in 0..MOTOR_MSG_COUNT {
            transport.set_angle(index, angle_rad);
        }
        transport
    }

    /// Enable or disable echoing of commanded positions into telemetry.
    pub fn set_echo(&self, echo: bool) {
        self.bus.lock().unwrap().echo = echo;
    }

    /// Make every subsequent command send fail, as a dead bus would.
    pub fn set_fail_sends(&self, fail: bool) {
        self.bus.lock().unwrap().fail_sends = fail;
    }

    /// Script the telemetry angle of one motor-message slot.
    pub fn set_angle(&self, msg_index: usize, angle_rad: f64) {
        self.bus.lock().unwrap().msgs[msg_index].angle_actual_rad = angle_rad;
    }

    /// Script the telemetry speed of one motor-message slot.
    pub fn set_speed(&self, msg_index: usize, speed_rads: f64) {
        self.bus.lock().unwrap().msgs[msg_index].speed_actual_rad = speed_rads;
    }

    /// Script the telemetry current of one motor-message slot.
    pub fn set_current(&self, msg_index: usize, current_a: f64) {
        self.bus.lock().unwrap().msgs[msg_index].current_actual_float = current_a;
    }

    /// All commands sent so far, oldest first.
    pub fn sent(&self) -> Vec<SentCmd> {
        self.bus.lock().unwrap().sent.clone()
    }

    /// Most recent command sent to the given motor id.
    pub fn last_cmd_for(&self, id: u8) -> Option<SentCmd> {
        self.bus
            .lock()
            .unwrap()
            .sent
            .iter()
            .rev()
            .find(|cmd| cmd.id == id)
            .copied()
    }

    /// Forget all recorded commands.
    pub fn clear_sent(&self) {
        self.bus.lock().unwrap().sent.clear();
    }

    /// Ids that have received a DM enable frame.
    pub fn enabled_ids(&self) -> Vec<u8> {
        self.bus.lock().unwrap().enabled.clone()
    }

    /// Ids that have received a zero-readout reset.
    pub fn zeroed_ids(&self) -> Vec<u8> {
        self.bus.lock().unwrap().zeroed.clone()
    }

    fn record(&mut self, cmd: SentCmd) -> Result<(), CanError> {
        let mut bus = self.bus.lock().unwrap();
        if bus.fail_sends {
            return Err(CanError::Tx(cmd.id));
        }
        if bus.echo {
            // Motor ids map onto message slots as id - 1 (slot 2 is the
            // unpopulated id 3 position on the bus)
            let index = (cmd.id - 1) as usize;
            if index < MOTOR_MSG_COUNT {
                bus.msgs[index].angle_actual_rad = cmd.pos;
                bus.msgs[index].speed_actual_rad = cmd.vel;
            }
        }
        bus.sent.push(cmd);
        Ok(())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl CanTransport for MockTransport {
    fn enable_dm_motor(&mut self, id: u8) -> Result<(), CanError> {
        self.bus.lock().unwrap().enabled.push(id);
        Ok(())
    }

    fn send_ec_motor_cmd(
        &mut self,
        id: u8,
        kp: f64,
        kd: f64,
        pos: f64,
        vel: f64,
        current: f64,
    ) -> Result<(), CanError> {
        self.record(SentCmd { id, kp, kd, pos, vel, current })
    }

    fn send_dm_motor_cmd(
        &mut self,
        id: u8,
        kp: f64,
        kd: f64,
        pos: f64,
        vel: f64,
        current: f64,
    ) -> Result<(), CanError> {
        self.record(SentCmd { id, kp, kd, pos, vel, current })
    }

    fn reset_zero_readout(&mut self, id: u8) -> Result<(), CanError> {
        let mut bus = self.bus.lock().unwrap();
        let index = (id - 1) as usize;
        if index < MOTOR_MSG_COUNT {
            bus.msgs[index].angle_actual_rad = 0.0;
        }
        bus.zeroed.push(id);
        Ok(())
    }

    fn ec_cmd_init(&mut self, id: u8, _cmd: u8) -> Result<(), CanError> {
        let mut bus = self.bus.lock().unwrap();
        let index = (id - 1) as usize;
        if index < MOTOR_MSG_COUNT {
            bus.msgs[index].angle_actual_rad = 0.0;
        }
        bus.zeroed.push(id);
        Ok(())
    }

    fn get_motor_msg(&mut self) -> Result<[MotorMsg; MOTOR_MSG_COUNT], CanError> {
        Ok(self.bus.lock().unwrap().msgs)
    }
}

/// Solver whose FK is the identity map from joint vectors to poses.
///
/// IK hands the target pose straight back as joint positions, FK hands the
/// joint positions back as a pose, and ID returns a fixed torque vector.
/// With this solver the Cartesian pipeline becomes exactly observable from
/// the joint side.
#[derive(Debug, Clone)]
pub struct IdentitySolver {
    /// Torque returned by every inverse dynamics query.
    pub id_torque: Vector6<f64>,

    /// When set, inverse kinematics reports failure.
    pub ik_fails: bool,
}

impl IdentitySolver {
    pub fn new() -> Self {
        Self {
            id_torque: Vector6::zeros(),
            ik_fails: false,
        }
    }
}

impl Default for IdentitySolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver for IdentitySolver {
    fn forward_kinematics(&self, joint_pos: &Vector6<f64>) -> Pose6d {
        *joint_pos
    }

    fn inverse_kinematics(
        &self,
        target_pose: &Pose6d,
        _seed_joint_pos: &Vector6<f64>,
    ) -> Option<Vector6<f64>> {
        if self.ik_fails {
            None
        }
        else {
            Some(*target_pose)
        }
    }

    fn inverse_dynamics(
        &self,
        _joint_pos: &Vector6<f64>,
        _joint_vel: &Vector6<f64>,
        _joint_acc: &Vector6<f64>,
    ) -> Vector6<f64> {
        self.id_torque
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_echo_tracks_commanded_pos() {
        let mut transport = MockTransport::new();

        transport.send_dm_motor_cmd(5, 30.0, 1.0, 0.7, 0.0, 0.0).unwrap();
        let msgs = transport.get_motor_msg().unwrap();

        assert_eq!(msgs[4].angle_actual_rad, 0.7);
    }

    #[test]
    fn test_scripted_telemetry_survives_with_echo_off() {
        let mut transport = MockTransport::new();
        transport.set_echo(false);
        transport.set_angle(0, 1.5);

        transport.send_ec_motor_cmd(1, 70.0, 2.0, 0.0, 0.0, 0.0).unwrap();
        let msgs = transport.get_motor_msg().unwrap();

        assert_eq!(msgs[0].angle_actual_rad, 1.5);
    }

    #[test]
    fn test_records_commands_in_order() {
        let mut transport = MockTransport::new();

        transport.send_ec_motor_cmd(1, 0.0, 0.0, 0.1, 0.0, 0.0).unwrap();
        transport.send_dm_motor_cmd(8, 0.0, 0.0, 0.2, 0.0, 0.0).unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].id, 1);
        assert_eq!(sent[1].id, 8);
        assert_eq!(transport.last_cmd_for(8).unwrap().pos, 0.2);
    }

    #[test]
    fn test_identity_solver_round_trip() {
        let solver = IdentitySolver::new();
        let pose = Pose6d::new(0.3, 0.1, 0.4, 0.0, 0.5, 0.0);

        let joints = solver.inverse_kinematics(&pose, &Vector6::zeros()).unwrap();
        assert_eq!(solver.forward_kinematics(&joints), pose);
    }

    #[test]
    fn test_identity_solver_failure_mode() {
        let mut solver = IdentitySolver::new();
        solver.ik_fails = true;

        assert!(solver
            .inverse_kinematics(&Pose6d::zeros(), &Vector6::zeros())
            .is_none());
    }
}
