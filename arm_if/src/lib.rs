//! # Arm Interface Crate
//!
//! This crate defines the data model and equipment interfaces shared between
//! the arm control core (`arm_ctrl`), its clients, and the hardware
//! implementations behind it:
//!
//! - [`cmd`] - command, state and gain structures exchanged with clients,
//!   together with the blend algebra used for interpolation.
//! - [`eqpt`] - equipment interfaces: motor families, the CAN transport
//!   trait and the kinematics/dynamics solver trait.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod cmd;
pub mod eqpt;
