//! Per-variable elimination/replacement status.
//!
//! Tracks which variables are still live decision candidates versus which have been removed from
//! the formula by an inprocessor (variable elimination, equivalent-literal replacement, or a
//! component/XOR handler that fixed the variable some other way). Eliminated variables must never
//! be assigned by the core search; they are reintroduced only by model extension.
use partial_ref::{partial, PartialRef};

use satx_formula::lit::Var;

use crate::context::{Context, VarStatusesP, VsidsP};
use crate::decision::remove_var;

/// Why a variable is no longer a live decision candidate.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum VarStatus {
    /// The variable can still be assigned by search.
    Live,
    /// Removed by bounded variable elimination; resolvents replace its occurrences.
    EliminatedByResolution,
    /// Replaced by its canonical representative literal, see [`crate::replace`].
    EquivReplaced,
    /// Found equivalent to another literal but not yet rewritten into the clause database.
    QueuedForReplacement,
    /// Fixed by some other inprocessor (e.g. Gauss-Jordan elimination of a unit row).
    SetByComponentHandler,
}

/// Per-variable elimination/replacement status.
#[derive(Default)]
pub struct VarStatuses {
    statuses: Vec<VarStatus>,
}

impl Default for VarStatus {
    fn default() -> VarStatus {
        VarStatus::Live
    }
}

impl VarStatuses {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.statuses.resize(count, VarStatus::Live);
    }

    /// Current status of a variable.
    pub fn status(&self, var: Var) -> VarStatus {
        self.statuses[var.index()]
    }

    /// Whether a variable is still a live decision candidate.
    pub fn is_live(&self, var: Var) -> bool {
        self.statuses[var.index()] == VarStatus::Live
    }

    /// Directly set a variable's status without touching decision heuristic state.
    ///
    /// Callers that also need the variable removed from the decision heap should use
    /// [`remove_live_var`] instead.
    pub fn set_status(&mut self, var: Var, status: VarStatus) {
        self.statuses[var.index()] = status;
    }
}

/// Mark a variable as no longer live and remove it from the decision heuristic.
pub fn remove_live_var(
    mut ctx: partial!(Context, mut VarStatusesP, mut VsidsP),
    var: Var,
    status: VarStatus,
) {
    debug_assert_ne!(status, VarStatus::Live);
    ctx.part_mut(VarStatusesP).set_status(var, status);
    remove_var(ctx.borrow(), var);
}
