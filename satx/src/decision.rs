//! Decision heuristics.

pub mod vsids;

use partial_ref::{partial, PartialRef};

use crate::context::{AssignmentP, Context, ImplGraphP, TrailP, VarStatusesP, VsidsP};
use crate::prop::{enqueue_assignment, Reason};
use satx_formula::lit::{Lit, Var};

/// Make a decision and enqueue it.
///
/// Picks the variable with the highest VSIDS activity among the currently unassigned, live
/// variables and assigns it its last saved polarity (or `false` if it was never assigned).
///
/// Returns `false` if no decision was made because all variables are assigned.
pub fn make_decision(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut ImplGraphP,
        mut TrailP,
        mut VsidsP,
        VarStatusesP,
    ),
) -> bool {
    loop {
        let decision_var = match ctx.part_mut(VsidsP).next() {
            Some(var) => var,
            None => return false,
        };

        if ctx.part(AssignmentP).var_value(decision_var).is_some() {
            // Stale entry, the variable was assigned (e.g. as a unit) after it was last made
            // available. Skip it and keep looking.
            continue;
        }

        if !ctx.part(VarStatusesP).is_live(decision_var) {
            // Stale entry for a variable removed by an inprocessor since it was last available.
            continue;
        }

        let polarity = ctx.part(AssignmentP).last_var_value(decision_var);
        let decision = Lit::from_var(decision_var, !polarity);

        ctx.part_mut(TrailP).new_decision_level();

        enqueue_assignment(ctx.borrow(), decision, Reason::Unit);

        return true;
    }
}

/// Make a variable available for decisions again.
///
/// Called whenever a variable becomes unassigned, either by backtracking or by making a
/// previously removed solver variable usable again.
pub fn make_available(mut ctx: partial!(Context, mut VsidsP), var: Var) {
    ctx.part_mut(VsidsP).make_available(var);
}

/// Initialize the decision heuristic state for a newly allocated solver variable.
///
/// `available` is `false` when the variable already has a known (unit) value and thus should not
/// be considered for decisions.
pub fn initialize_var(mut ctx: partial!(Context, mut VsidsP), var: Var, available: bool) {
    if available {
        ctx.part_mut(VsidsP).make_available(var);
    }
}

/// Remove a solver variable from the decision heuristic's bookkeeping.
///
/// The variable's activity slot is left in place (it is reused once the variable count is grown
/// again), it is just no longer considered for decisions.
pub fn remove_var(_ctx: partial!(Context, mut VsidsP), _var: Var) {
    // Nothing to do: a removed variable is always either assigned (and thus already out of the
    // heap) or was never made available, so there is nothing to evict here.
}
