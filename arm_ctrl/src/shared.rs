//! State shared between the client-facing controller and its loop thread
//!
//! Two disjoint mutex groups: `cmd` (everything the client writes and the
//! shaper reads/writes) and `state` (the published telemetry snapshot). The
//! loop thread is the only writer of the shaped output command and of the
//! telemetry snapshot, and never holds both locks at once. Lifecycle flags
//! are atomics so neither side needs a lock to consult them.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

// Internal
use arm_if::cmd::{EefState, Gain, JointState};
use util::time::Clock;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// End-effector command buffers, present on the Cartesian variant only.
#[derive(Debug, Clone, Default)]
pub(crate) struct EefBuffers {
    /// Last accepted client command.
    pub input: EefState,

    /// Pose the planner is currently steering to (the interpolated point).
    pub output: EefState,

    /// Snapshot of `output` taken when `input` was last set; the
    /// interpolation anchor.
    pub interp_start: EefState,
}

/// The command-side mutex group.
#[derive(Debug, Clone, Default)]
pub(crate) struct CmdState {
    /// Last client command, joint space.
    pub input_joint: JointState,

    /// Shaped command actually sent on the most recent tick.
    pub output_joint: JointState,

    /// Current impedance gains.
    pub gain: Gain,

    /// End-effector buffers (Cartesian variant).
    pub eef: Option<EefBuffers>,
}

/// All state shared between the controller facade and the loop thread.
#[derive(Debug)]
pub(crate) struct SharedState {
    /// Command group: input/output commands and gains.
    pub cmd: Mutex<CmdState>,

    /// Published telemetry snapshot.
    pub state: Mutex<JointState>,

    /// Background send/recv active.
    pub running: AtomicBool,

    /// Teardown requested; the loop thread exits at the next iteration head.
    pub destroy: AtomicBool,

    /// Gravity compensation feed-forward enabled.
    pub gravity_comp: AtomicBool,

    /// Emergency damping state entered; terminal.
    pub emergency: AtomicBool,

    /// Clock all timestamps are derived from.
    pub clock: Clock,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SharedState {
    pub fn new(cartesian: bool) -> Self {
        let mut cmd = CmdState::default();
        if cartesian {
            cmd.eef = Some(EefBuffers::default());
        }

        Self {
            cmd: Mutex::new(cmd),
            state: Mutex::new(JointState::default()),
            running: AtomicBool::new(false),
            destroy: AtomicBool::new(false),
            gravity_comp: AtomicBool::new(false),
            emergency: AtomicBool::new(false),
            clock: Clock::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroy.load(Ordering::SeqCst)
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency.load(Ordering::SeqCst)
    }

    pub fn gravity_comp_enabled(&self) -> bool {
        self.gravity_comp.load(Ordering::SeqCst)
    }

    /// Seconds since the controller started.
    pub fn timestamp(&self) -> f64 {
        self.clock.now_s()
    }
}
