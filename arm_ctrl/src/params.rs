//! Static parameter tables for the supported robot models and controller
//! variants
//!
//! Parameters are hard-coded per model and handed out by pure lookup
//! functions; there is no mutable process-wide registry. Bench setups with
//! non-standard limits can load overrides from a TOML file instead.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector6;
use serde::{Deserialize, Serialize};
use std::path::Path;

// Internal
use arm_if::cmd::Gain;
use arm_if::eqpt::MotorKind;
use crate::ArmCtrlError;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of arm joints.
pub const JOINT_DOF: usize = 6;

/// Motor-message index carrying each arm joint's telemetry.
///
/// The mapping is fixed by the bus geometry and non-contiguous: index 2 is
/// an unpopulated slot.
pub const JOINT_MSG_IDX: [usize; JOINT_DOF] = [0, 1, 3, 4, 5, 6];

/// Motor-message index carrying the gripper's telemetry.
pub const GRIPPER_MSG_IDX: usize = 7;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The controller variants, used to select a default parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerKind {
    Joint,
    Cartesian,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Static description of one robot model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotParams {
    /// Model name ("X5" or "L5").
    pub model: String,

    /// Minimum joint positions.
    ///
    /// Units: radians
    pub joint_pos_min_rad: [f64; JOINT_DOF],

    /// Maximum joint positions.
    ///
    /// Units: radians
    pub joint_pos_max_rad: [f64; JOINT_DOF],

    /// Maximum joint speeds.
    ///
    /// Units: radians/second
    pub joint_vel_max_rads: [f64; JOINT_DOF],

    /// Maximum joint torques.
    ///
    /// Units: newton-metres
    pub joint_torque_max_nm: [f64; JOINT_DOF],

    /// Maximum end-effector speed per pose axis.
    ///
    /// Units: metres/second for (x, y, z), radians/second for
    /// (roll, pitch, yaw)
    pub ee_vel_max: [f64; JOINT_DOF],

    /// Maximum gripper opening rate.
    ///
    /// Units: metres/second
    pub gripper_vel_max_ms: f64,

    /// Maximum gripper motor torque.
    ///
    /// Units: newton-metres
    pub gripper_torque_max_nm: f64,

    /// Gripper opening at fully open.
    ///
    /// Units: metres
    pub gripper_width_m: f64,

    /// Gripper motor angle readout corresponding to fully open.
    ///
    /// Units: radians
    pub gripper_open_readout_rad: f64,

    /// CAN ids of the six arm motors, base first.
    pub motor_id: [u8; JOINT_DOF],

    /// Motor family of each arm motor.
    pub motor_kind: [MotorKind; JOINT_DOF],

    /// CAN id of the gripper motor.
    pub gripper_motor_id: u8,

    /// Motor family of the gripper motor.
    pub gripper_motor_kind: MotorKind,

    /// Gravity vector used by inverse dynamics. Change this if the arm is
    /// not mounted on the ground.
    ///
    /// Units: metres/second^2
    pub gravity_vector_mss: [f64; 3],

    /// Name of the kinematic chain's base link in the robot description.
    pub base_link_name: String,

    /// Name of the kinematic chain's end-effector link.
    pub eef_link_name: String,
}

/// Static parameters of one controller variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CtrlParams {
    /// Control loop period.
    ///
    /// Units: seconds
    pub dt_s: f64,

    /// Default joint stiffness gains.
    pub default_kp: [f64; JOINT_DOF],

    /// Default joint damping gains.
    pub default_kd: [f64; JOINT_DOF],

    /// Default gripper stiffness gain.
    pub default_gripper_kp: f64,

    /// Default gripper damping gain.
    pub default_gripper_kd: f64,

    /// Consecutive over-current ticks tolerated before the emergency state
    /// is entered.
    pub over_current_cnt_max: u32,

    /// Window size for the planner's joint position and torque filters;
    /// 1 disables filtering.
    pub moving_window_size: usize,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Look up the static parameters for a robot model.
pub fn robot_params(model: &str) -> Result<RobotParams, ArmCtrlError> {
    // Both models share the arm geometry and differ only in the motor
    // families fitted on the three proximal joints
    let motor_kind = match model {
        "X5" => [
            MotorKind::EcA4310,
            MotorKind::EcA4310,
            MotorKind::EcA4310,
            MotorKind::DmJ4310,
            MotorKind::DmJ4310,
            MotorKind::DmJ4310,
        ],
        "L5" => [
            MotorKind::DmJ4340,
            MotorKind::DmJ4340,
            MotorKind::DmJ4340,
            MotorKind::DmJ4310,
            MotorKind::DmJ4310,
            MotorKind::DmJ4310,
        ],
        _ => return Err(ArmCtrlError::UnknownModel(model.to_string())),
    };

    Ok(RobotParams {
        model: model.to_string(),
        joint_pos_min_rad: [-3.14, -0.05, -0.1, -1.6, -1.57, -2.0],
        joint_pos_max_rad: [2.618, 3.14, 3.24, 1.55, 1.57, 2.0],
        joint_vel_max_rads: [3.0, 2.0, 2.0, 2.0, 3.0, 3.0],
        joint_torque_max_nm: [30.0, 40.0, 30.0, 15.0, 10.0, 10.0],
        ee_vel_max: [0.6, 0.6, 0.6, 1.8, 1.8, 1.8],
        gripper_vel_max_ms: 0.1,
        gripper_torque_max_nm: 1.5,
        gripper_width_m: 0.085,
        gripper_open_readout_rad: 4.8,
        motor_id: [1, 2, 4, 5, 6, 7],
        motor_kind,
        gripper_motor_id: 8,
        gripper_motor_kind: MotorKind::DmJ4310,
        gravity_vector_mss: [0.0, 0.0, -9.807],
        base_link_name: "base_link".to_string(),
        eef_link_name: "eef_link".to_string(),
    })
}

/// Look up the default parameters for a controller variant.
pub fn ctrl_params(kind: ControllerKind) -> CtrlParams {
    match kind {
        ControllerKind::Joint => CtrlParams {
            dt_s: 0.002,
            default_kp: [70.0, 70.0, 70.0, 30.0, 30.0, 20.0],
            default_kd: [2.0, 2.0, 2.0, 1.0, 1.0, 1.0],
            default_gripper_kp: 30.0,
            default_gripper_kd: 0.2,
            over_current_cnt_max: 20,
            moving_window_size: 1,
        },
        ControllerKind::Cartesian => CtrlParams {
            dt_s: 0.005,
            default_kp: [150.0, 150.0, 200.0, 60.0, 30.0, 30.0],
            default_kd: [5.0, 5.0, 5.0, 1.0, 1.0, 1.0],
            default_gripper_kp: 30.0,
            default_gripper_kd: 0.2,
            over_current_cnt_max: 20,
            moving_window_size: 1,
        },
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RobotParams {
    /// Load a parameter override file for bench setups with non-standard
    /// limits.
    pub fn from_file(path: &Path) -> Result<Self, util::params::LoadError> {
        util::params::load(path)
    }
}

impl CtrlParams {
    /// The default gain set of this variant.
    pub fn default_gain(&self) -> Gain {
        Gain {
            kp: Vector6::from(self.default_kp),
            kd: Vector6::from(self.default_kd),
            gripper_kp: self.default_gripper_kp,
            gripper_kd: self.default_gripper_kd,
        }
    }

    /// Pure damping: zero stiffness, default damping. The safe hand-over
    /// profile.
    pub fn damping_gain(&self) -> Gain {
        Gain {
            kp: Vector6::zeros(),
            kd: Vector6::from(self.default_kd),
            gripper_kp: 0.0,
            gripper_kd: self.default_gripper_kd,
        }
    }

    /// Damping reinforced on the proximal joints, used when tripping into
    /// the emergency state and when releasing the arm at teardown. The
    /// heavy links need more braking than the wrist.
    pub fn emergency_damping_gain(&self) -> Gain {
        let mut gain = self.damping_gain();
        gain.kd[0] *= 3.0;
        gain.kd[1] *= 3.0;
        gain.kd[2] *= 3.0;
        gain.kd[3] *= 1.5;
        gain
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_known_models() {
        let x5 = robot_params("X5").unwrap();
        assert_eq!(x5.motor_kind[0], MotorKind::EcA4310);
        assert_eq!(x5.motor_kind[5], MotorKind::DmJ4310);
        assert_eq!(x5.motor_id, [1, 2, 4, 5, 6, 7]);
        assert_eq!(x5.gripper_motor_id, 8);

        let l5 = robot_params("L5").unwrap();
        assert_eq!(l5.motor_kind[0], MotorKind::DmJ4340);
        assert_eq!(l5.gripper_width_m, x5.gripper_width_m);
    }

    #[test]
    fn test_unknown_model_is_rejected() {
        assert!(matches!(
            robot_params("X9"),
            Err(ArmCtrlError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_variant_periods() {
        assert_eq!(ctrl_params(ControllerKind::Joint).dt_s, 0.002);
        assert_eq!(ctrl_params(ControllerKind::Cartesian).dt_s, 0.005);
    }

    #[test]
    fn test_emergency_damping_reinforces_proximal_joints() {
        let params = ctrl_params(ControllerKind::Joint);
        let gain = params.emergency_damping_gain();

        assert!(gain.kp_is_zero());
        assert_eq!(gain.kd[0], params.default_kd[0] * 3.0);
        assert_eq!(gain.kd[2], params.default_kd[2] * 3.0);
        assert_eq!(gain.kd[3], params.default_kd[3] * 1.5);
        assert_eq!(gain.kd[4], params.default_kd[4]);
    }

    #[test]
    fn test_params_override_file() {
        let mut params = robot_params("X5").unwrap();
        params.joint_vel_max_rads[0] = 1.0;

        let path = std::env::temp_dir().join("arm_ctrl_test_robot_params.toml");
        std::fs::write(&path, toml::to_string(&params).unwrap()).unwrap();

        let loaded = RobotParams::from_file(&path).unwrap();
        assert_eq!(loaded.joint_vel_max_rads[0], 1.0);
        assert_eq!(loaded.model, "X5");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_params_toml_round_trip() {
        let params = robot_params("L5").unwrap();
        let toml_str = toml::to_string(&params).unwrap();
        let loaded: RobotParams = util::params::load_str(&toml_str).unwrap();

        assert_eq!(loaded.model, "L5");
        assert_eq!(loaded.joint_pos_max_rad, params.joint_pos_max_rad);
        assert_eq!(loaded.motor_kind, params.motor_kind);
    }
}
