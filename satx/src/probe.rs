//! Failed literal probing.
//!
//! At decision level 0, tentatively assign each currently live, unassigned variable's positive
//! literal as if it were a decision, propagate, then undo it. A literal whose propagation reaches
//! a conflict is failed: its negation follows from the formula and is learned as a unit clause.
//! When both polarities of a variable propagate without conflict, any literal implied by both is
//! implied by the formula regardless of the variable's value and is learned as a unit too. This
//! mirrors CryptoMiniSat's `Prober`, including the double-lookahead "implied by both branches"
//! case — it does not implement transitive binary clause addition from the probe trail, since that
//! needs the same hypergraph bookkeeping `crate::vivify` already carries (see `DESIGN.md`).
use partial_ref::{partial, PartialRef};

use satx_formula::lit::{Lit, Var};

use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, Context, ImplGraphP, IncrementalP,
    ProofP, SolverStateP, TmpDataP, TrailP, VarStatusesP, VsidsP, WatchlistsP,
};
use crate::load::load_clause;
use crate::prop::{backtrack, enqueue_assignment, propagate, Reason};
use crate::state::SatState;

enum Probe {
    Conflict,
    Propagated(Vec<Lit>),
}

/// Tentatively assign `lit` at a fresh decision level, propagate, then backtrack back to level 0.
fn probe_lit(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut TrailP,
        mut VsidsP,
        mut WatchlistsP,
    ),
    lit: Lit,
) -> Probe {
    ctx.part_mut(TrailP).new_decision_level();
    enqueue_assignment(ctx.borrow(), lit, Reason::Unit);

    let before = ctx.part(TrailP).trail().len();

    match propagate(ctx.borrow()) {
        Err(_) => {
            backtrack(ctx.borrow(), 0);
            Probe::Conflict
        }
        Ok(()) => {
            let implied = ctx.part(TrailP).trail()[before..].to_vec();
            backtrack(ctx.borrow(), 0);
            Probe::Propagated(implied)
        }
    }
}

/// Probe one variable, learning whatever unit clauses its failed-literal and double-lookahead
/// checks find. Returns `true` if the formula was found unsatisfiable.
fn probe_var(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut IncrementalP,
        mut ProofP,
        mut SolverStateP,
        mut TmpDataP,
        mut TrailP,
        mut VsidsP,
        mut WatchlistsP,
    ),
    var: Var,
) -> bool {
    if ctx.part(AssignmentP).var_value(var).is_some() {
        return false;
    }

    let pos = probe_lit(ctx.borrow(), var.positive());
    if let Probe::Conflict = pos {
        load_clause(ctx.borrow(), &[var.negative()]);
        return ctx.part(SolverStateP).sat_state == SatState::Unsat;
    }

    if ctx.part(AssignmentP).var_value(var).is_some() {
        // A unit clause learned above (or concurrently queued) already fixed this variable.
        return false;
    }

    let neg = probe_lit(ctx.borrow(), var.negative());
    let neg_implied = match neg {
        Probe::Conflict => {
            load_clause(ctx.borrow(), &[var.positive()]);
            return ctx.part(SolverStateP).sat_state == SatState::Unsat;
        }
        Probe::Propagated(implied) => implied,
    };

    if let Probe::Propagated(pos_implied) = pos {
        for lit in neg_implied {
            if pos_implied.contains(&lit) && ctx.part(AssignmentP).lit_value(lit).is_none() {
                load_clause(ctx.borrow(), &[lit]);
            }
        }
    }

    ctx.part(SolverStateP).sat_state == SatState::Unsat
}

/// Run one round of failed literal probing over every live variable, up to `budget` probes.
///
/// Only safe to call at decision level 0.
pub fn run_probing(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut IncrementalP,
        mut ProofP,
        mut SolverStateP,
        mut TmpDataP,
        mut TrailP,
        mut VarStatusesP,
        mut VsidsP,
        mut WatchlistsP,
    ),
    budget: usize,
) {
    let var_count = ctx.part(BinaryClausesP).var_count();

    let mut probed = 0;
    for index in 0..var_count {
        if probed >= budget {
            break;
        }
        let var = Var::from_index(index);
        if !ctx.part(VarStatusesP).is_live(var) {
            continue;
        }
        probed += 1;
        if probe_var(ctx.borrow(), var) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use crate::context::set_var_count;

    #[test]
    fn failed_literal_is_learned_as_unit() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 3);

        // 1 -> 2, 1 -> -2: asserting 1 always conflicts, so -1 must be a unit.
        load_clause(ctx.borrow(), &[lit![-1], lit![2]]);
        load_clause(ctx.borrow(), &[lit![-1], lit![-2]]);

        run_probing(ctx.borrow(), 10);

        assert_eq!(ctx.part(AssignmentP).lit_value(lit![1]), Some(false));
    }

    #[test]
    fn common_implication_is_learned() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 3);

        // Both 1 and -1 imply 3.
        load_clause(ctx.borrow(), &[lit![-1], lit![3]]);
        load_clause(ctx.borrow(), &[lit![1], lit![3]]);

        run_probing(ctx.borrow(), 10);

        assert_eq!(ctx.part(AssignmentP).lit_value(lit![3]), Some(true));
    }
}
