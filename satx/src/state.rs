//! Miscellaneous solver state.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Satisfiability state.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SatState {
    Unknown,
    Sat,
    Unsat,
    UnsatUnderAssumptions,
    /// Search was aborted by [`crate::solver::Solver::interrupt`] before a result was found.
    Interrupted,
}

impl Default for SatState {
    fn default() -> SatState {
        SatState::Unknown
    }
}

/// Miscellaneous solver state.
///
/// Anything larger or any larger group of related state variables should be moved into a separate
/// part of [`Context`](crate::context::Context).
pub struct SolverState {
    pub sat_state: SatState,
    /// Flag polled at safe points (decisions, restarts) to abort an in-progress `solve` call.
    ///
    /// Shared with the handle returned by [`crate::solver::Solver::interrupt_handle`] so it can be
    /// set from another thread while `solve` runs.
    interrupt_requested: Arc<AtomicBool>,
}

impl Default for SolverState {
    fn default() -> SolverState {
        SolverState {
            sat_state: SatState::default(),
            interrupt_requested: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl SolverState {
    /// Handle that can be used to request an interrupt from another thread.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupt_requested.clone()
    }

    /// Whether an interrupt has been requested since the last reset.
    pub fn interrupt_requested(&self) -> bool {
        self.interrupt_requested.load(Ordering::Relaxed)
    }

    /// Clear a previously requested interrupt, e.g. before starting a new `solve` call.
    pub fn clear_interrupt(&mut self) {
        self.interrupt_requested.store(false, Ordering::Relaxed);
    }
}
