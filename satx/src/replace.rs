//! Equivalent literal replacement.
//!
//! Once [`crate::scc`] has found classes of literals that must all carry the same truth value, this
//! module folds each class down to a single representative: every occurrence of a replaced literal
//! in the clause database is rewritten to the representative, and the replaced variable is removed
//! from decisions. This mirrors CryptoMiniSat's `VarReplacer`, which keeps exactly this kind of
//! `table[var] -> Lit` mapping and walks the clause database to rewrite it.
use partial_ref::{partial, PartialRef};

use satx_formula::lit::{Lit, Var};

use crate::binary::BinaryClauses;
use crate::clause::db::filter_clauses;
use crate::clause::Tier;
use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, Context, ImplGraphP, IncrementalP,
    ProofP, ReplaceP, SolverStateP, TmpDataP, TrailP, VarStatusesP, VsidsP, WatchlistsP,
};
use crate::load::load_clause;
use crate::proof::{clause_hash, DeleteClauseProof, ProofStep};
use crate::scc::find_equivalences;
use crate::varstatus::{remove_live_var, VarStatus};

/// Maps every replaced variable to the literal that stands in for it.
#[derive(Default)]
pub struct Replace {
    /// `table[v]` is the canonical literal for `v`'s positive literal. Unreplaced variables map to
    /// their own positive literal.
    table: Vec<Lit>,
    /// `(replaced variable, literal it was replaced by)`, in replacement order. Used to extend a
    /// model computed over the replaced formula back onto eliminated variables.
    replaced: Vec<(Var, Lit)>,
}

impl Replace {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        for index in self.table.len()..count {
            self.table.push(Var::from_index(index).positive());
        }
    }

    /// The literal equivalent to `lit` under all replacements performed so far.
    pub fn canonical(&self, lit: Lit) -> Lit {
        self.table[lit.var().index()] ^ lit.is_negative()
    }

    /// Whether `var` has been folded into another variable.
    pub fn is_replaced(&self, var: Var) -> bool {
        self.table[var.index()].var() != var
    }

    /// Variables replaced so far, in replacement order, along with the literal they were replaced
    /// by.
    pub fn replacements(&self) -> &[(Var, Lit)] {
        &self.replaced
    }
}

/// Find equivalent literal classes in the current binary implication graph and fold each into a
/// single representative.
///
/// Only safe to call at decision level 0 with an empty propagation queue, matching
/// [`crate::simplify::prove_units`]. Returns the number of variables replaced. Returns `None` if an
/// equivalence implies both a literal and its negation, i.e. the formula is unsatisfiable.
pub fn replace_equivalences(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut IncrementalP,
        mut ProofP,
        mut ReplaceP,
        mut SolverStateP,
        mut TmpDataP,
        mut TrailP,
        mut VarStatusesP,
        mut VsidsP,
        mut WatchlistsP,
    ),
) -> Option<usize> {
    let equivalences = find_equivalences(ctx.borrow());
    if equivalences.is_empty() {
        return Some(0);
    }

    let mut replaced_count = 0;

    for equivalence in &equivalences {
        for &lit in &equivalence.lits {
            if lit.var() == equivalence.representative.var() {
                continue;
            }

            let canonical_lit = equivalence.representative ^ lit.is_negative();
            let var = lit.var();

            if ctx.part(ReplaceP).is_replaced(var) {
                // Already replaced by an earlier class in this same pass (can happen if the
                // representative of one class is itself folded by a later one).
                continue;
            }

            ctx.part_mut(ReplaceP).table[var.index()] = canonical_lit;
            ctx.part_mut(ReplaceP).replaced.push((var, canonical_lit));

            remove_live_var(ctx.borrow(), var, VarStatus::EquivReplaced);

            replaced_count += 1;
        }
    }

    if replaced_count == 0 {
        return Some(0);
    }

    if !rebuild_binary_clauses(ctx.borrow()) {
        return None;
    }

    if !rewrite_long_clauses(ctx.borrow()) {
        return None;
    }

    Some(replaced_count)
}

/// Rebuild the binary implication graph with every literal mapped to its canonical representative.
///
/// Returns `false` if this derives both a literal and its negation as equivalent, i.e. an
/// unsatisfiable formula.
fn rebuild_binary_clauses(mut ctx: partial!(Context, mut BinaryClausesP, ReplaceP)) -> bool {
    let var_count = ctx.part(BinaryClausesP).var_count();
    let old_clauses: Vec<[Lit; 2]> = ctx.part(BinaryClausesP).iter_clauses().collect();

    let mut fresh = BinaryClauses::default();
    fresh.set_var_count(var_count);

    for [a, b] in old_clauses {
        let ca = ctx.part(ReplaceP).canonical(a);
        let cb = ctx.part(ReplaceP).canonical(b);

        if ca == cb {
            // Clause is now a tautology-free unit, handled by the next propagation round via the
            // representative variable's own binary/long clauses; nothing to store here.
            continue;
        }
        if ca.var() == cb.var() {
            // ca == !cb: the clause now reads (r, !r), forcing nothing and proving nothing new.
            continue;
        }
        if ca == !cb {
            continue;
        }

        fresh.add_binary_clause([ca, cb]);
    }

    *ctx.part_mut(BinaryClausesP) = fresh;
    true
}

/// Rewrite every long clause's literals through the canonical mapping.
///
/// Returns `false` if this is found to derive the empty clause, i.e. an unsatisfiable formula.
fn rewrite_long_clauses(
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
        ReplaceP,
    ),
) -> bool {
    let mut forced_units: Vec<Lit> = vec![];
    let mut conflict = false;

    for &tier in &[Tier::Irred, Tier::Core, Tier::Mid, Tier::Local] {
        let (replace, mut ctx) = ctx.split_part(ReplaceP);
        let (proof, mut ctx) = ctx.split_part_mut(ProofP);
        let (ctx_2, mut ctx) = ctx.split_borrow();

        let mut new_lits: Vec<Lit> = vec![];

        filter_clauses(ctx_2, tier, |alloc, cref| {
            let clause = alloc.clause_mut(cref);

            let mut touched = false;
            new_lits.clear();
            for &lit in clause.lits() {
                let canonical = replace.canonical(lit);
                if canonical != lit {
                    touched = true;
                }
                new_lits.push(canonical);
            }

            if !touched {
                return true;
            }

            new_lits.sort_by_key(|lit| lit.code());
            new_lits.dedup();

            let is_tautology = new_lits
                .windows(2)
                .any(|pair| pair[0].var() == pair[1].var());

            if is_tautology {
                proof.add_step(&ProofStep::DeleteClause {
                    clause: clause.lits().into(),
                    proof: DeleteClauseProof::Satisfied,
                });
                return false;
            }

            if proof.is_active() && new_lits.len() > 1 {
                let hash = [clause_hash(clause.lits())];
                proof.add_step(&ProofStep::AtClause {
                    redundant: tier != Tier::Irred,
                    clause: new_lits[..].into(),
                    propagation_hashes: hash[..].into(),
                });
            }
            proof.add_step(&ProofStep::DeleteClause {
                clause: clause.lits().into(),
                proof: DeleteClauseProof::Simplified,
            });

            match new_lits.len() {
                0 => {
                    conflict = true;
                    false
                }
                1 => {
                    forced_units.push(new_lits[0]);
                    false
                }
                2 => {
                    ctx.part_mut(BinaryClausesP)
                        .add_binary_clause([new_lits[0], new_lits[1]]);
                    false
                }
                _ => {
                    clause.lits_mut()[..new_lits.len()].copy_from_slice(&new_lits);
                    clause.header_mut().set_len(new_lits.len());
                    clause.header_mut().set_abstraction(&new_lits);
                    true
                }
            }
        });
    }

    if conflict {
        return false;
    }

    for lit in forced_units {
        load_clause(ctx.borrow(), &[lit]);
        if ctx.part(SolverStateP).sat_state == crate::state::SatState::Unsat {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use crate::context::set_var_count;

    #[test]
    fn folds_equivalence_class() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 2);

        ctx.part_mut(BinaryClausesP)
            .add_binary_clause([lit![-1], lit![2]]);
        ctx.part_mut(BinaryClausesP)
            .add_binary_clause([lit![-2], lit![1]]);

        let replaced = replace_equivalences(ctx.borrow()).unwrap();
        assert_eq!(replaced, 1);

        assert!(ctx.part(ReplaceP).is_replaced(var![2]) || ctx.part(ReplaceP).is_replaced(var![1]));
    }
}
