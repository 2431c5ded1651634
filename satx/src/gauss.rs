//! Gauss-Jordan elimination over extracted XOR constraints.
//!
//! Partitions the currently known [`crate::xor::XorClause`]s into connected components (two
//! XORs are connected if they share a variable), builds a dense GF(2) matrix with an augmented
//! right-hand-side column per component, and fully reduces it. Reduced rows of weight 0, 1 or 2
//! yield a top-level conflict, a unit clause or an equivalence; anything else is re-added as a
//! (hopefully shorter) XOR constraint for the next inprocessing round.
//!
//! This only runs as a periodic inprocessing pass at decision level 0. It deliberately does not
//! implement "online" Gauss-Jordan (watched basic/non-basic row variables integrated into
//! [`crate::prop::propagate`] so the solver can propagate and explain conflicts through the
//! matrix itself) — see `DESIGN.md` for that scoping decision.
use partial_ref::{partial, PartialRef};

use satx_formula::lit::{Lit, Var};

use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, Context, ImplGraphP, IncrementalP,
    ProofP, SolverConfigP, SolverStateP, TmpDataP, TrailP, VsidsP, WatchlistsP, XorClausesP,
};
use crate::load::load_clause;
use crate::state::SatState;
use crate::xor::{find_xors, XorClause};

/// Union-find used to group XOR constraints that share a variable into components.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> DisjointSet {
        DisjointSet {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

/// Partition a set of XOR constraints into connected components by shared variable.
fn partition_components(xors: Vec<XorClause>) -> Vec<Vec<XorClause>> {
    use std::collections::HashMap;

    let mut dsu = DisjointSet::new(xors.len());
    let mut last_row_for_var: HashMap<Var, usize> = HashMap::new();

    for (i, xor) in xors.iter().enumerate() {
        for &var in xor.vars() {
            if let Some(&j) = last_row_for_var.get(&var) {
                dsu.union(i, j);
            }
            last_row_for_var.insert(var, i);
        }
    }

    let mut components: HashMap<usize, Vec<XorClause>> = HashMap::new();
    for (i, xor) in xors.into_iter().enumerate() {
        let root = dsu.find(i);
        components.entry(root).or_default().push(xor);
    }

    components.into_values().collect()
}

/// Fully Gauss-Jordan reduce one component of XOR constraints.
///
/// Returns the reduced rows as `(vars, rhs)` pairs, one per input equation (rows that reduce to
/// `0 == 0` are dropped; a row reducing to `0 == 1` reports an empty-vars, `rhs = true` row,
/// which the caller must treat as a top-level conflict).
fn reduce_component(xors: &[XorClause]) -> Vec<(Vec<Var>, bool)> {
    let mut vars: Vec<Var> = xors.iter().flat_map(|x| x.vars().iter().copied()).collect();
    vars.sort_by_key(|v| v.index());
    vars.dedup();

    let col_of = |var: Var| vars.binary_search_by_key(&var.index(), |v: &Var| v.index()).unwrap();

    let mut rows: Vec<Vec<bool>> = Vec::with_capacity(xors.len());
    let mut rhs: Vec<bool> = Vec::with_capacity(xors.len());

    for xor in xors {
        let mut row = vec![false; vars.len()];
        for &var in xor.vars() {
            row[col_of(var)] = true;
        }
        rows.push(row);
        rhs.push(xor.rhs());
    }

    let mut rank = 0;
    for col in 0..vars.len() {
        let pivot = (rank..rows.len()).find(|&r| rows[r][col]);
        let pivot = match pivot {
            Some(p) => p,
            None => continue,
        };
        rows.swap(rank, pivot);
        rhs.swap(rank, pivot);

        for r in 0..rows.len() {
            if r != rank && rows[r][col] {
                for c in 0..vars.len() {
                    rows[r][c] ^= rows[rank][c];
                }
                rhs[r] ^= rhs[rank];
            }
        }
        rank += 1;
    }

    let mut result = vec![];
    for r in 0..rows.len() {
        let row_vars: Vec<Var> = rows[r]
            .iter()
            .enumerate()
            .filter_map(|(c, &set)| if set { Some(vars[c]) } else { None })
            .collect();
        if row_vars.is_empty() && !rhs[r] {
            // 0 == 0, no information.
            continue;
        }
        result.push((row_vars, rhs[r]));
    }
    result
}

/// Run one round of XOR extraction and Gauss-Jordan elimination.
///
/// Only safe to call at decision level 0.
pub fn run_gauss_jordan(
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
        mut XorClausesP,
        SolverConfigP,
    ),
) {
    if !ctx.part(SolverConfigP).gauss_jordan_enable {
        return;
    }
    let max_len = ctx.part(SolverConfigP).xor_finder_max_clause_size;
    let max_rows = ctx.part(SolverConfigP).gauss_jordan_max_matrix_rows;

    for xor in find_xors(ctx.borrow(), max_len) {
        ctx.part_mut(XorClausesP).add(xor);
    }

    let all_xors = ctx.part_mut(XorClausesP).take();
    if all_xors.is_empty() {
        return;
    }

    for component in partition_components(all_xors) {
        if component.len() > max_rows {
            for xor in component {
                ctx.part_mut(XorClausesP).add(xor);
            }
            continue;
        }

        for (vars, rhs) in reduce_component(&component) {
            match vars.len() {
                0 => {
                    debug_assert!(rhs);
                    ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
                    return;
                }
                1 => {
                    let unit = Lit::from_var(vars[0], rhs);
                    load_clause(ctx.borrow(), &[unit]);
                }
                2 => {
                    let a = vars[0].positive();
                    let b = vars[1].positive();
                    if rhs {
                        load_clause(ctx.borrow(), &[a, b]);
                        load_clause(ctx.borrow(), &[!a, !b]);
                    } else {
                        load_clause(ctx.borrow(), &[a, !b]);
                        load_clause(ctx.borrow(), &[!a, b]);
                    }
                }
                _ => {
                    ctx.part_mut(XorClausesP).add(XorClause::from_lits(
                        vars.into_iter().map(Lit::positive),
                        rhs,
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_two_equal_equations_yields_one_row() {
        let xors = vec![
            XorClause::from_lits(lits![1, 2].iter().copied(), false),
            XorClause::from_lits(lits![1, 2].iter().copied(), false),
        ];
        let reduced = reduce_component(&xors);
        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced[0].0.len(), 2);
    }

    #[test]
    fn contradictory_units_reduce_to_conflict() {
        // x1 == true, x1 == false
        let xors = vec![
            XorClause::from_lits(lits![1].iter().copied(), true),
            XorClause::from_lits(lits![1].iter().copied(), false),
        ];
        let reduced = reduce_component(&xors);
        assert!(reduced.iter().any(|(vars, rhs)| vars.is_empty() && *rhs));
    }

    #[test]
    fn chained_equivalence_reduces_to_single_equation() {
        // x1 xor x2 == false, x2 xor x3 == false  =>  x1 xor x3 == false is implied
        let xors = vec![
            XorClause::from_lits(lits![1, 2].iter().copied(), false),
            XorClause::from_lits(lits![2, 3].iter().copied(), false),
        ];
        let components = partition_components(xors);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].len(), 2);
    }
}
