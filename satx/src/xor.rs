//! Native XOR constraint storage, extraction from CNF clauses, and the public XOR-adding entry
//! point shared by the DIMACS extension and the solver's own API surface.
//!
//! A length-k XOR clause over variables `v1..vk` with parity bit `rhs` asserts `v1 xor v2 xor
//! ... xor vk == rhs`. Clauses of length below 3 are never stored as [`XorClause`]s: they reduce
//! to nothing, a conflict, a unit literal or two binary clauses, and [`add_xor_clause`] handles
//! those directly the same way [`satx_formula::cnf::ExtendFormula::add_xor_clause`]'s CNF
//! expansion would, just without ever materializing the `2^(n-1)` clauses.
use partial_ref::{partial, PartialRef};

use satx_formula::lit::{Lit, Var};

use crate::clause::db::Tier;
use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, Context, ImplGraphP, IncrementalP,
    ProofP, SolverStateP, TmpDataP, TrailP, VsidsP, WatchlistsP,
};
use crate::load::load_clause;
use crate::state::SatState;

/// A native XOR constraint: `vars[0] xor vars[1] xor ... == rhs`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct XorClause {
    vars: Vec<Var>,
    rhs: bool,
}

impl XorClause {
    /// Build a canonicalized XOR clause from a set of literals and a target parity.
    ///
    /// Each negative literal flips `rhs`: `(!v) xor rest == rhs` iff `v xor rest == !rhs`.
    /// Repeated variables cancel in pairs (`v xor v == 0`), so an even number of repeats of the
    /// same variable is dropped entirely and an odd number collapses to a single occurrence.
    pub fn from_lits(lits: impl IntoIterator<Item = Lit>, sum: bool) -> XorClause {
        let mut rhs = sum;
        let mut vars: Vec<Var> = lits
            .into_iter()
            .map(|lit| {
                if lit.is_negative() {
                    rhs = !rhs;
                }
                lit.var()
            })
            .collect();

        vars.sort_by_key(|var| var.index());

        let mut canonical = Vec::with_capacity(vars.len());
        let mut i = 0;
        while i < vars.len() {
            let mut j = i;
            while j < vars.len() && vars[j] == vars[i] {
                j += 1;
            }
            if (j - i) % 2 == 1 {
                canonical.push(vars[i]);
            }
            i = j;
        }

        XorClause { vars: canonical, rhs }
    }

    /// The XOR clause's variables, sorted and deduplicated.
    pub fn vars(&self) -> &[Var] {
        &self.vars
    }

    /// The required parity of the variables' truth values.
    pub fn rhs(&self) -> bool {
        self.rhs
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Storage for natively-kept XOR constraints (length >= 3).
#[derive(Default)]
pub struct XorClauses {
    clauses: Vec<XorClause>,
}

impl XorClauses {
    pub fn add(&mut self, xor: XorClause) {
        self.clauses.push(xor);
    }

    pub fn iter(&self) -> impl Iterator<Item = &XorClause> {
        self.clauses.iter()
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Remove every currently stored XOR clause, returning them.
    ///
    /// Used by Gauss-Jordan elimination, which consumes the whole set for one inprocessing pass
    /// and re-adds whatever it could not fully reduce.
    pub fn take(&mut self) -> Vec<XorClause> {
        std::mem::take(&mut self.clauses)
    }
}

/// Add an XOR constraint: `lits`, XORed using their current truth value, must sum to `sum`.
///
/// Mirrors [`satx_formula::cnf::ExtendFormula::add_xor_clause`]'s case analysis, but keeps
/// length >= 3 constraints native rather than expanding them into `2^(n-1)` CNF clauses.
pub fn add_xor_clause(
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
        mut crate::context::XorClausesP,
    ),
    lits: impl IntoIterator<Item = Lit>,
    sum: bool,
) {
    let xor = XorClause::from_lits(lits, sum);

    match xor.len() {
        0 => {
            if xor.rhs() {
                ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
            }
        }
        1 => {
            let unit = Lit::from_var(xor.vars()[0], xor.rhs());
            load_clause(ctx.borrow(), &[unit]);
        }
        2 => {
            let a = xor.vars()[0].positive();
            let b = xor.vars()[1].positive();
            if xor.rhs() {
                load_clause(ctx.borrow(), &[a, b]);
                load_clause(ctx.borrow(), &[!a, !b]);
            } else {
                load_clause(ctx.borrow(), &[a, !b]);
                load_clause(ctx.borrow(), &[!a, b]);
            }
        }
        _ => {
            ctx.part_mut(crate::context::XorClausesP).add(xor);
        }
    }
}

/// Companion clauses of a would-be XOR constraint over a fixed variable set: for `n` variables
/// there are `2^(n-1)` clauses, one per assignment banned by `vars[0] xor ... xor vars[n-1] ==
/// rhs`, all sharing the same variable set and the same parity of negated literals.
///
/// Scan [`Tier::Irred`] clauses up to `max_len`, group them by variable set, and emit an
/// [`XorClause`] for every group that has exactly `2^(n-1)` distinct members (i.e. every
/// required companion clause is present).
pub fn find_xors(
    ctx: partial!(Context, ClauseDbP, ClauseAllocP),
    max_len: usize,
) -> Vec<XorClause> {
    use std::collections::HashMap;

    // Key: sorted variable indices. Value: (set of seen popcount parities, count of clauses).
    let mut groups: HashMap<Vec<usize>, (u32, usize)> = HashMap::new();

    for &cref in &ctx.part(ClauseDbP).by_tier[Tier::Irred as usize] {
        let header = ctx.part(ClauseAllocP).header(cref);
        if header.deleted() {
            continue;
        }
        let lits = ctx.part(ClauseAllocP).clause(cref).lits();
        if lits.len() < 3 || lits.len() > max_len {
            continue;
        }

        let mut var_indices: Vec<usize> = lits.iter().map(|l| l.var().index()).collect();
        var_indices.sort_unstable();
        if var_indices.windows(2).any(|w| w[0] == w[1]) {
            continue;
        }

        let negative_count = lits.iter().filter(|l| l.is_negative()).count();
        let parity_bit = 1u32 << (negative_count % 2);

        let entry = groups.entry(var_indices).or_insert((0, 0));
        entry.0 |= parity_bit;
        entry.1 += 1;
    }

    let mut xors = vec![];
    for (var_indices, (parities, count)) in groups {
        let n = var_indices.len();
        if n > 31 {
            continue;
        }
        let expected = 1usize << (n - 1);
        // A real XOR's companion clauses all share the same parity of negated-literal count
        // (only one of the two possible parities should be present), and there must be exactly
        // one clause per banned assignment.
        if count != expected || (parities != 0b01 && parities != 0b10) {
            continue;
        }

        // Banned assignments have popcount(true vars) parity opposite `rhs`, and negative_count
        // in the banning clause equals that popcount, so an all-even negative_count means rhs.
        let rhs = parities == 0b01;
        let vars: Vec<Var> = var_indices.into_iter().map(Var::from_index).collect();
        xors.push(XorClause { vars, rhs });
    }

    xors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelling_vars_drop_out() {
        let xor = XorClause::from_lits(lits![1, 2, 1].iter().copied(), true);
        assert_eq!(xor.vars(), &[var!(2)]);
    }

    #[test]
    fn negative_literals_flip_rhs() {
        let xor = XorClause::from_lits(lits![-1, 2].iter().copied(), true);
        assert_eq!(xor.vars(), &[var!(1), var!(2)]);
        assert!(!xor.rhs());
    }
}
