//! Utility library for the arm control software
//!
//! Generic support code shared by the interface and control crates: logging,
//! maths helpers, monotonic timing, signal filtering and parameter loading.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod filter;
pub mod logger;
pub mod maths;
pub mod params;
pub mod time;
