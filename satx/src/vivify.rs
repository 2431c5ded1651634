//! Clause vivification.
//!
//! Two modes over every irredundant clause, matching CryptoMiniSat's `ClauseVivifier`:
//!
//! - Asymmetric shortening: assume the negation of each of a clause's literals one at a time and
//!   propagate. A conflict part way through means the clause is subsumed by the assumed prefix; a
//!   literal falsified by propagation before it is itself assumed is useless and can be dropped.
//! - Stamp-based shortening: for each literal `l` of a clause, if the binary implication DFS
//!   intervals (`crate::stamp`) show `l` dominates `!m` for some other literal `m` of the clause,
//!   `m` is a tautology-producing resolvent away and can be dropped.
use partial_ref::{partial, PartialRef};

use satx_formula::lit::Lit;

use crate::clause::db::Tier;
use crate::clause::ClauseRef;
use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, Context, ImplGraphP, IncrementalP,
    ProofP, SolverStateP, StampP, TmpDataP, TrailP, VsidsP, WatchlistsP,
};
use crate::load::load_clause;
use crate::proof::{clause_hash, DeleteClauseProof, ProofStep};
use crate::prop::{backtrack, enqueue_assignment, propagate, Reason};
use crate::stamp;

/// Replace `cref` with `new_lits`, unless they are unchanged, recording the necessary proof steps.
fn replace_clause(
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
    cref: ClauseRef,
    new_lits: &[Lit],
) {
    let old_lits = ctx.part(ClauseAllocP).clause(cref).lits().to_vec();
    if old_lits.as_slice() == new_lits {
        return;
    }

    let (proof, mut ctx) = ctx.split_part_mut(ProofP);
    if proof.is_active() {
        let hash = [clause_hash(&old_lits)];
        proof.add_step(&ProofStep::AtClause {
            redundant: false,
            clause: new_lits.into(),
            propagation_hashes: hash[..].into(),
        });
    }
    proof.add_step(&ProofStep::DeleteClause {
        clause: old_lits[..].into(),
        proof: DeleteClauseProof::Simplified,
    });

    crate::clause::db::delete_clause(ctx.borrow(), cref);
    load_clause(ctx.borrow(), new_lits);
}

/// Asymmetric shortening: try to shrink `lits` by assuming the negation of each literal in turn.
///
/// Returns the shortened literal set, or `lits` unchanged if nothing could be removed. Must be
/// called at decision level 0 with an empty propagation queue, and always returns to that state.
fn vivify_asymmetric(
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
    lits: &[Lit],
) -> Vec<Lit> {
    let mut kept = vec![];

    for &lit in lits {
        if let Some(value) = ctx.part(AssignmentP).lit_value(lit) {
            if value {
                // Already implied true by the assumed prefix: it must stay in the replacement
                // clause (kept so far plus this literal implies the rest), but nothing after it
                // is needed.
                kept.push(lit);
                backtrack(ctx.borrow(), 0);
                return kept;
            }
            // Falsified by propagation of an earlier assumption: useless literal, drop it.
            continue;
        }

        kept.push(lit);

        ctx.part_mut(TrailP).new_decision_level();
        enqueue_assignment(ctx.borrow(), !lit, Reason::Unit);

        if propagate(ctx.borrow()).is_err() {
            // The assumed prefix alone already conflicts: the clause is subsumed by it.
            backtrack(ctx.borrow(), 0);
            return kept;
        }
    }

    backtrack(ctx.borrow(), 0);
    kept
}

/// Stamp-based shortening: drop any literal `m` of `lits` for which some other literal `l` of
/// `lits` is known (via the binary implication DFS intervals) to imply `!m`.
fn vivify_stamped(ctx: partial!(Context, StampP), lits: &[Lit]) -> Vec<Lit> {
    let mut keep = vec![true; lits.len()];

    for (i, &l) in lits.iter().enumerate() {
        if !keep[i] {
            continue;
        }
        for (j, &m) in lits.iter().enumerate() {
            if i == j || !keep[j] {
                continue;
            }
            if ctx.part(StampP).dominates(l, !m) {
                keep[j] = false;
            }
        }
    }

    lits.iter()
        .zip(keep)
        .filter_map(|(&lit, keep)| keep.then(|| lit))
        .collect()
}

/// Run one round of clause vivification over every irredundant clause, up to `budget` clauses.
///
/// Only safe to call at decision level 0.
pub fn run_vivification(
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
        mut StampP,
        mut TmpDataP,
        mut TrailP,
        mut VsidsP,
        mut WatchlistsP,
    ),
    budget: usize,
) {
    stamp::refresh(ctx.borrow());

    let crefs: Vec<ClauseRef> = ctx.part(ClauseDbP).by_tier[Tier::Irred as usize].clone();

    for cref in crefs.into_iter().take(budget) {
        if ctx.part(ClauseAllocP).header(cref).deleted() {
            continue;
        }
        let lits = ctx.part(ClauseAllocP).clause(cref).lits().to_vec();
        if lits.len() < 3 {
            continue;
        }

        let stamped = vivify_stamped(ctx.borrow(), &lits);
        let shortened = vivify_asymmetric(ctx.borrow(), &stamped);

        replace_clause(ctx.borrow(), cref, &shortened);

        if ctx.part(SolverStateP).sat_state != crate::state::SatState::Unknown {
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
    fn useless_literal_is_dropped() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 4);

        // (1 v -2): assuming -1 (i.e. the negation of the candidate clause's first literal)
        // forces -2, so literal 2 is useless in (1, 2, 3, 4).
        load_clause(ctx.borrow(), &[lit![1], lit![-2]]);
        load_clause(ctx.borrow(), &lits![1, 2, 3, 4]);

        run_vivification(ctx.borrow(), 10);

        assert_eq!(ctx.part(ClauseDbP).count_by_tier(Tier::Irred), 1);
        let shortened = ctx.part(ClauseAllocP)
            .clause(ctx.part(ClauseDbP).by_tier[Tier::Irred as usize][0])
            .lits()
            .to_vec();
        assert_eq!(shortened, lits![1, 3, 4]);
    }
}
