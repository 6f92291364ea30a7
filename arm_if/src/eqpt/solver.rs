//! Kinematics and dynamics solver interface

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector6;

use crate::cmd::Pose6d;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Trait for the kinematics/dynamics solver consumed by the control core.
///
/// The solver is a pure collaborator: it holds the kinematic model (loaded
/// from a URDF or equivalent) and answers FK/IK/ID queries. Implementations
/// must be callable from multiple threads.
pub trait Solver {
    /// Pose of the end effector for the given joint positions.
    fn forward_kinematics(&self, joint_pos: &Vector6<f64>) -> Pose6d;

    /// Joint positions realising the target pose, seeded from the given
    /// current positions, or `None` if no solution was found.
    fn inverse_kinematics(
        &self,
        target_pose: &Pose6d,
        seed_joint_pos: &Vector6<f64>,
    ) -> Option<Vector6<f64>>;

    /// Joint torques balancing the given motion state (gravity and inertial
    /// terms). Called with zero velocity and acceleration this is the
    /// gravity compensation torque.
    fn inverse_dynamics(
        &self,
        joint_pos: &Vector6<f64>,
        joint_vel: &Vector6<f64>,
        joint_acc: &Vector6<f64>,
    ) -> Vector6<f64>;
}
