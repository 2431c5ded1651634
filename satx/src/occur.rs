//! Occurrence-list based simplifier.
//!
//! Links every irredundant long clause into per-literal occurrence lists and runs, in order:
//! subsumption and self-subsuming resolution, blocked-clause elimination and bounded variable
//! elimination. This mirrors CryptoMiniSat's `OccSimplifier`, which uses the same clause
//! abstraction bitmasks to cheaply rule out most subsumption/resolution candidates before an
//! exact literal-set comparison.
//!
//! Scoped to [`Tier::Irred`] clauses only: learnt clauses are never resolved away here, so a
//! redundant clause can always be safely dropped without this simplifier having to account for
//! it. Variable elimination additionally skips any variable with a remaining binary occurrence,
//! since folding [`crate::binary::BinaryClauses`] into the same occurrence lists is not
//! implemented (see `DESIGN.md`).
use partial_ref::{partial, PartialRef};

use satx_formula::lit::{Lit, Var};

use crate::clause::db::{self, Tier};
use crate::clause::ClauseRef;
use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, Context, EliminatedVarsP, ImplGraphP,
    IncrementalP, ProofP, SolverConfigP, SolverStateP, TmpDataP, TrailP, VarStatusesP, VsidsP,
    WatchlistsP,
};
use crate::load::load_clause;
use crate::proof::{clause_hash, DeleteClauseProof, ProofStep};
use crate::varstatus::{remove_live_var, VarStatus};

/// Clauses removed by blocked-clause elimination or bounded variable elimination, kept to extend
/// a model computed over the simplified formula back onto the removed variables.
#[derive(Default)]
pub struct EliminatedVars {
    /// `(original clause literals, a literal of it that must be made true)`, in removal order.
    entries: Vec<(Vec<Lit>, Lit)>,
}

impl EliminatedVars {
    fn record(&mut self, clause: Vec<Lit>, forced: Lit) {
        self.entries.push((clause, forced));
    }

    /// Extend a model computed over the simplified formula so it also satisfies every clause
    /// removed by this simplifier.
    ///
    /// Must run after every other model extension that could affect the variables occurring in a
    /// saved clause (e.g. equivalent literal replacement), and walks entries newest first: a
    /// later elimination's saved clauses may reference a variable only fixed by an earlier one.
    pub fn extend_model(&self, model: &mut Vec<Lit>) {
        use std::collections::HashSet;

        let mut true_lits: HashSet<Lit> = model.iter().copied().collect();

        for (clause, forced) in self.entries.iter().rev() {
            if clause.iter().any(|lit| true_lits.contains(lit)) {
                continue;
            }
            if true_lits.insert(*forced) {
                model.push(*forced);
            }
        }
    }
}

type OccLists = Vec<Vec<ClauseRef>>;

fn build_occur_lists(ctx: partial!(Context, ClauseDbP, ClauseAllocP), var_count: usize) -> OccLists {
    let mut occ: OccLists = vec![vec![]; var_count * 2];
    for &cref in &ctx.part(ClauseDbP).by_tier[Tier::Irred as usize] {
        let header = ctx.part(ClauseAllocP).header(cref);
        if header.deleted() {
            continue;
        }
        for &lit in ctx.part(ClauseAllocP).clause(cref).lits() {
            occ[lit.code()].push(cref);
        }
    }
    occ
}

/// Delete an irredundant clause, recording the necessary proof step.
fn remove_clause(
    mut ctx: partial!(Context, mut ClauseAllocP, mut ClauseDbP, mut ProofP),
    cref: ClauseRef,
    proof_kind: DeleteClauseProof,
) {
    let lits = ctx.part(ClauseAllocP).clause(cref).lits().to_vec();
    ctx.part_mut(ProofP).add_step(&ProofStep::DeleteClause {
        clause: lits[..].into(),
        proof: proof_kind,
    });
    db::delete_clause(ctx.borrow(), cref);
}

/// Replace a clause with a strict subset of its literals, e.g. after self-subsuming resolution.
fn strengthen_clause(
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
    remove: Lit,
) {
    let old_lits = ctx.part(ClauseAllocP).clause(cref).lits().to_vec();
    let new_lits: Vec<Lit> = old_lits.iter().copied().filter(|&l| l != remove).collect();

    let (proof, mut ctx) = ctx.split_part_mut(ProofP);
    if proof.is_active() {
        let hash = [clause_hash(&old_lits)];
        proof.add_step(&ProofStep::AtClause {
            redundant: false,
            clause: new_lits[..].into(),
            propagation_hashes: hash[..].into(),
        });
    }
    proof.add_step(&ProofStep::DeleteClause {
        clause: old_lits[..].into(),
        proof: DeleteClauseProof::Simplified,
    });

    db::delete_clause(ctx.borrow(), cref);
    load_clause(ctx.borrow(), &new_lits);
}

fn is_literal_subset(small: &[Lit], big: &[Lit]) -> bool {
    small.iter().all(|lit| big.contains(lit))
}

/// Subsumption (subsume-0) and self-subsuming resolution (subsume-1) over every irredundant
/// clause, using the occurrence lists to find candidate pairs sharing a literal.
fn subsume_and_strengthen(
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
    occ: &OccLists,
) {
    let crefs: Vec<ClauseRef> = ctx.part(ClauseDbP).by_tier[Tier::Irred as usize].clone();

    for c in crefs {
        if ctx.part(ClauseAllocP).header(c).deleted() {
            continue;
        }
        let c_lits = ctx.part(ClauseAllocP).clause(c).lits().to_vec();
        if c_lits.len() < 2 {
            continue;
        }
        let c_abstraction = ctx.part(ClauseAllocP).header(c).abstraction();

        // Scanning the rarest literal's occurrence list minimizes the number of candidates that
        // need the exact (and more expensive) subset check below.
        let pivot = *c_lits.iter().min_by_key(|lit| occ[lit.code()].len()).unwrap();
        let candidates = occ[pivot.code()].clone();

        for d in candidates {
            if d == c || ctx.part(ClauseAllocP).header(d).deleted() {
                continue;
            }

            let d_abstraction = ctx.part(ClauseAllocP).header(d).abstraction();
            if c_abstraction & !d_abstraction != 0 {
                continue;
            }

            let d_lits = ctx.part(ClauseAllocP).clause(d).lits().to_vec();
            if d_lits.len() < c_lits.len() {
                continue;
            }

            if is_literal_subset(&c_lits, &d_lits) {
                remove_clause(ctx.borrow(), d, DeleteClauseProof::Satisfied);
                continue;
            }

            // C = A u {l}, D = A u {-l} u E: remove l (as -l) from D.
            let flip = c_lits.iter().find(|&&l| {
                d_lits.contains(&!l) && c_lits.iter().all(|&other| other == l || d_lits.contains(&other))
            });

            if let Some(&l) = flip {
                strengthen_clause(ctx.borrow(), d, !l);
            }
        }
    }
}

/// Blocked-clause elimination: remove every clause that is blocked on one of its own literals.
fn eliminate_blocked_clauses(
    mut ctx: partial!(Context, mut ClauseAllocP, mut ClauseDbP, mut EliminatedVarsP, mut ProofP),
    occ: &OccLists,
) {
    let crefs: Vec<ClauseRef> = ctx.part(ClauseDbP).by_tier[Tier::Irred as usize].clone();

    'clauses: for c in crefs {
        if ctx.part(ClauseAllocP).header(c).deleted() {
            continue;
        }
        let c_lits = ctx.part(ClauseAllocP).clause(c).lits().to_vec();

        for &l in &c_lits {
            let mut blocked_on_l = true;
            for &d in &occ[(!l).code()] {
                if d == c || ctx.part(ClauseAllocP).header(d).deleted() {
                    continue;
                }
                let d_lits = ctx.part(ClauseAllocP).clause(d).lits().to_vec();

                let mut tautological = false;
                for &a in &c_lits {
                    if a.var() == l.var() {
                        continue;
                    }
                    if d_lits.contains(&!a) {
                        tautological = true;
                        break;
                    }
                }
                if !tautological {
                    blocked_on_l = false;
                    break;
                }
            }

            if blocked_on_l {
                ctx.part_mut(EliminatedVarsP).record(c_lits.clone(), l);
                remove_clause(ctx.borrow(), c, DeleteClauseProof::Simplified);
                continue 'clauses;
            }
        }
    }
}

/// Compute the resolvent of two clauses on `var`, or `None` if it is tautological.
fn resolve_on(lits_a: &[Lit], lits_b: &[Lit], var: Var) -> Option<Vec<Lit>> {
    let mut result: Vec<Lit> = Vec::with_capacity(lits_a.len() + lits_b.len() - 2);
    result.extend(lits_a.iter().copied().filter(|l| l.var() != var));
    result.extend(lits_b.iter().copied().filter(|l| l.var() != var));
    result.sort_by_key(|lit| lit.code());
    result.dedup();

    if result.windows(2).any(|pair| pair[0].var() == pair[1].var()) {
        return None;
    }
    Some(result)
}

/// Try to eliminate `var` by resolution, if doing so does not grow the clause base beyond the
/// configured bound. Returns whether `var` was eliminated.
fn try_eliminate_var(
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
        mut SolverStateP,
        mut TmpDataP,
        mut TrailP,
        mut VarStatusesP,
        mut VsidsP,
        mut WatchlistsP,
    ),
    var: Var,
    growth_ratio: f32,
) -> bool {
    if !ctx.part(VarStatusesP).is_live(var) {
        return false;
    }
    if !ctx.part(BinaryClausesP).implied(var.positive()).is_empty()
        || !ctx.part(BinaryClausesP).implied(var.negative()).is_empty()
    {
        return false;
    }

    let occ_pos: Vec<ClauseRef> = ctx.part(ClauseDbP).by_tier[Tier::Irred as usize]
        .iter()
        .copied()
        .filter(|&c| {
            !ctx.part(ClauseAllocP).header(c).deleted()
                && ctx.part(ClauseAllocP).clause(c).lits().contains(&var.positive())
        })
        .collect();
    let occ_neg: Vec<ClauseRef> = ctx.part(ClauseDbP).by_tier[Tier::Irred as usize]
        .iter()
        .copied()
        .filter(|&c| {
            !ctx.part(ClauseAllocP).header(c).deleted()
                && ctx.part(ClauseAllocP).clause(c).lits().contains(&var.negative())
        })
        .collect();

    if occ_pos.is_empty() || occ_neg.is_empty() {
        // No resolution possible; an occurrence-free polarity means `var` is already fixed by
        // its only remaining polarity and will be cleaned up elsewhere, not here.
        return false;
    }

    let original_count = occ_pos.len() + occ_neg.len();
    let original_lits: usize = occ_pos
        .iter()
        .chain(occ_neg.iter())
        .map(|&c| ctx.part(ClauseAllocP).clause(c).lits().len())
        .sum();

    let mut resolvents: Vec<Vec<Lit>> = vec![];
    for &p in &occ_pos {
        let p_lits = ctx.part(ClauseAllocP).clause(p).lits().to_vec();
        for &n in &occ_neg {
            let n_lits = ctx.part(ClauseAllocP).clause(n).lits().to_vec();
            if let Some(resolvent) = resolve_on(&p_lits, &n_lits, var) {
                resolvents.push(resolvent);
            }
        }
    }

    if resolvents.len() > original_count {
        return false;
    }
    let resolvent_lits: usize = resolvents.iter().map(|r| r.len()).sum();
    if original_lits > 0 && resolvent_lits as f32 > original_lits as f32 * growth_ratio {
        return false;
    }

    for &c in &occ_pos {
        let lits = ctx.part(ClauseAllocP).clause(c).lits().to_vec();
        ctx.part_mut(EliminatedVarsP).record(lits, var.positive());
    }
    for &c in &occ_neg {
        let lits = ctx.part(ClauseAllocP).clause(c).lits().to_vec();
        ctx.part_mut(EliminatedVarsP).record(lits, var.negative());
    }

    for &c in occ_pos.iter().chain(occ_neg.iter()) {
        remove_clause(ctx.borrow(), c, DeleteClauseProof::Simplified);
    }

    remove_live_var(ctx.borrow(), var, VarStatus::EliminatedByResolution);

    for resolvent in resolvents {
        load_clause(ctx.borrow(), &resolvent);
    }

    true
}

/// Run one round of occurrence-based simplification: subsumption and strengthening, blocked
/// clause elimination, then bounded variable elimination over every currently live variable.
///
/// Only safe to call at decision level 0.
pub fn run_occur_simplify(
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
        mut SolverStateP,
        mut TmpDataP,
        mut TrailP,
        mut VarStatusesP,
        mut VsidsP,
        mut WatchlistsP,
        SolverConfigP,
    ),
) {
    let var_count = ctx.part(BinaryClausesP).var_count();
    let growth_ratio = ctx.part(SolverConfigP).variable_elimination_growth_ratio;

    let occ = build_occur_lists(ctx.borrow(), var_count);
    subsume_and_strengthen(ctx.borrow(), &occ);

    let occ = build_occur_lists(ctx.borrow(), var_count);
    eliminate_blocked_clauses(ctx.borrow(), &occ);

    for index in 0..var_count {
        let var = Var::from_index(index);
        try_eliminate_var(ctx.borrow(), var, growth_ratio);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use crate::context::set_var_count;

    #[test]
    fn subsumed_clause_is_removed() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 4);

        load_clause(ctx.borrow(), &lits![1, 2, 3]);
        load_clause(ctx.borrow(), &lits![1, 2, 3, 4]);

        assert_eq!(ctx.part(ClauseDbP).count_by_tier(Tier::Irred), 2);

        run_occur_simplify(ctx.borrow());

        assert_eq!(ctx.part(ClauseDbP).count_by_tier(Tier::Irred), 1);
    }

    #[test]
    fn self_subsuming_resolution_shortens_clause() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 4);

        // c = (1, 2, 3), d = (-1, 2, 3, 4) -> strengthen d to (2, 3, 4)
        load_clause(ctx.borrow(), &lits![1, 2, 3]);
        load_clause(ctx.borrow(), &lits![-1, 2, 3, 4]);

        run_occur_simplify(ctx.borrow());

        assert_eq!(ctx.part(ClauseDbP).count_by_tier(Tier::Irred), 2);
    }

    #[test]
    fn eliminated_var_model_extension_satisfies_removed_clause() {
        let mut eliminated = EliminatedVars::default();
        eliminated.record(lits![1, 2].to_vec(), Lit::from_dimacs(1));

        let mut model = vec![Lit::from_dimacs(-2)];
        eliminated.extend_model(&mut model);

        assert!(model.contains(&Lit::from_dimacs(1)));
    }
}
