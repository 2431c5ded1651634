//! Inprocessing orchestration.
//!
//! Runs, in order, at decision level 0: unit/clause simplification, equivalent literal
//! replacement, occurrence-based simplification (subsumption, blocked-clause elimination, bounded
//! variable elimination), XOR extraction and Gauss-Jordan elimination, failed-literal probing and
//! clause vivification. Each pass can tighten what the next one sees (e.g. replacement can reveal
//! new binary clauses for subsumption, variable elimination can reveal new XORs), so they run in a
//! fixed pipeline rather than independently scheduled passes.
use partial_ref::{partial, PartialRef};

use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, Context, EliminatedVarsP, ImplGraphP,
    IncrementalP, ProofP, ReplaceP, SolverConfigP, SolverStateP, StampP, TmpDataP, TrailP,
    VarStatusesP, VsidsP, WatchlistsP, XorClausesP,
};
use crate::gauss::run_gauss_jordan;
use crate::occur::run_occur_simplify;
use crate::probe::run_probing;
use crate::replace::replace_equivalences;
use crate::simplify::{prove_units, simplify};
use crate::state::SatState;
use crate::vivify::run_vivification;

/// Run one round of inprocessing.
///
/// Only called by [`crate::schedule`] at decision level 0 between conflicts, never mid-search.
pub fn run_inprocessing(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut EliminatedVarsP,
        mut ImplGraphP,
        mut IncrementalP,
        mut ProofP,
        mut ReplaceP,
        mut SolverStateP,
        mut StampP,
        mut TmpDataP,
        mut TrailP,
        mut VarStatusesP,
        mut VsidsP,
        mut WatchlistsP,
        mut XorClausesP,
        SolverConfigP,
    ),
) {
    if ctx.part(TrailP).current_level() != 0 {
        return;
    }
    if ctx.part(SolverStateP).sat_state != SatState::Unknown {
        return;
    }

    prove_units(ctx.borrow());
    simplify(ctx.borrow());

    if replace_equivalences(ctx.borrow()).is_none() {
        ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
        return;
    }

    run_occur_simplify(ctx.borrow());
    if ctx.part(SolverStateP).sat_state != SatState::Unknown {
        return;
    }

    run_gauss_jordan(ctx.borrow());
    if ctx.part(SolverStateP).sat_state != SatState::Unknown {
        return;
    }

    let probing_budget = ctx.part(SolverConfigP).probing_budget as usize;
    run_probing(ctx.borrow(), probing_budget);
    if ctx.part(SolverStateP).sat_state != SatState::Unknown {
        return;
    }

    let vivification_budget = ctx.part(SolverConfigP).vivification_budget as usize;
    run_vivification(ctx.borrow(), vivification_budget);
}
