//! Binary clauses.

use partial_ref::{partial, PartialRef};

use crate::context::{AssignmentP, BinaryClausesP, Context};
use satx_formula::lit::{Lit, Var};

/// Binary clauses.
#[derive(Default)]
pub struct BinaryClauses {
    by_lit: Vec<Vec<Lit>>,
    count: usize,
}

impl BinaryClauses {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.by_lit.resize(count * 2, vec![]);
    }

    /// Number of variables these binary clauses are aware of.
    pub fn var_count(&self) -> usize {
        self.by_lit.len() / 2
    }

    /// Add a binary clause.
    pub fn add_binary_clause(&mut self, lits: [Lit; 2]) {
        for i in 0..2 {
            self.by_lit[(!lits[i]).code()].push(lits[i ^ 1]);
        }
        self.count += 1;
    }

    /// Implications of a given literal
    pub fn implied(&self, lit: Lit) -> &[Lit] {
        &self.by_lit[lit.code()]
    }

    /// Drop all implications recorded for a literal.
    pub fn clear_literal(&mut self, lit: Lit) {
        self.by_lit[lit.code()].clear();
    }

    /// Number of binary clauses.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Iterate over each stored binary clause exactly once.
    ///
    /// Every clause is present in the graph as two directed edges (`!a -> b` and `!b -> a`); this
    /// yields `[a, b]` only for the direction where `a`'s code is smaller, so callers rebuilding the
    /// graph (e.g. equivalent literal replacement) do not see each clause twice.
    pub fn iter_clauses(&self) -> impl Iterator<Item = [Lit; 2]> + '_ {
        self.by_lit.iter().enumerate().flat_map(move |(code, implied)| {
            let from = !Lit::from_code(code as satx_formula::lit::LitIdx);
            implied.iter().copied().filter_map(move |to| {
                if from.code() < to.code() {
                    Some([from, to])
                } else {
                    None
                }
            })
        })
    }
}

/// Drop binary clause watch entries for variables fixed at level 0.
///
/// Only safe to call right after [`crate::simplify::prove_units`] has cleared the trail, so every
/// currently assigned literal is a permanent, level-0 fact. Binary propagation never has to
/// reconsider such a literal again (it is never unassigned), so its watch lists can be dropped.
pub fn simplify_binary(mut ctx: partial!(Context, mut BinaryClausesP, AssignmentP)) {
    let var_count = ctx.part(BinaryClausesP).var_count();

    for index in 0..var_count {
        let var = Var::from_index(index);
        if ctx.part(AssignmentP).var_value(var).is_some() {
            ctx.part_mut(BinaryClausesP).clear_literal(var.positive());
            ctx.part_mut(BinaryClausesP).clear_literal(var.negative());
        }
    }
}
