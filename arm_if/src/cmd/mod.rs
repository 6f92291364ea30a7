//! # Command and state data model
//!
//! Joint-space and end-effector-space commands, telemetry snapshots and
//! impedance gains. The same structures are used for commands and for state
//! snapshots; a command carries desired values, a snapshot carries measured
//! ones.
//!
//! All three structures implement element-wise `Add` and `Mul<f64>` over
//! every numeric field (including the timestamp), which is the algebra the
//! controller uses for linear blending; see [`blend`].

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod eef;
mod gain;
mod joint;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use eef::*;
pub use gain::*;
pub use joint::*;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector6;
use std::ops::{Add, Mul};

// ---------------------------------------------------------------------------
// TYPES
// ---------------------------------------------------------------------------

/// A 6D end-effector pose: `(x, y, z, roll, pitch, yaw)`.
///
/// Units: metres for the translation, radians for the rotation.
pub type Pose6d = Vector6<f64>;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Linearly blend between two values, `alpha = 0` giving `a` and `alpha = 1`
/// giving `b`.
pub fn blend<T>(a: &T, b: &T, alpha: f64) -> T
where
    T: Copy + Add<Output = T> + Mul<f64, Output = T>,
{
    *a * (1.0 - alpha) + *b * alpha
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
