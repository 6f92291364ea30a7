//! # Equipment interfaces
//!
//! Traits and types at the boundary between the control core and the
//! hardware it drives: the motor families on the CAN bus, the transport
//! itself, and the kinematics/dynamics solver.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod can;
#[cfg(feature = "mock")]
pub mod mock;
pub mod motor;
pub mod solver;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use can::*;
pub use motor::*;
pub use solver::*;
