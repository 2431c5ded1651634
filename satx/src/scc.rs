//! Equivalent literal detection via strongly connected components.
//!
//! Two literals `a` and `b` are equivalent (`a <-> b`) exactly when `a` and `!b` lie in the same
//! strongly connected component of the binary implication graph (the graph with an edge `l -> m`
//! for every binary clause `(!l, m)`). Finding all such components in one linear pass is the
//! standard way to find the hidden equivalences implied by a set of binary clauses, used by
//! CryptoMiniSat's `VarReplacer`/failed literal code to collapse equivalence classes before the
//! rest of inprocessing runs.
use partial_ref::{partial, PartialRef};

use satx_formula::lit::Lit;

use crate::context::{BinaryClausesP, Context};

/// One equivalence class discovered by [`find_equivalences`].
///
/// `lits[0]` is the class representative; every other literal in `lits` is equivalent to it.
/// `representative` is a polarity-normalized choice (the literal with the lower variable index,
/// made positive) so the same variable is always picked as representative regardless of the
/// component's internal structure.
#[derive(Debug, Clone)]
pub struct Equivalence {
    pub representative: Lit,
    pub lits: Vec<Lit>,
}

/// Find strongly connected components of the binary implication graph with more than one literal.
///
/// Returns one [`Equivalence`] per non-trivial component. Components containing both `l` and `!l`
/// mean the formula is unsatisfiable at the unit-propagation level; the caller is responsible for
/// checking for that case (`representative` and `!representative` both present in the result).
pub fn find_equivalences(ctx: partial!(Context, BinaryClausesP)) -> Vec<Equivalence> {
    let var_count = ctx.part(BinaryClausesP).var_count();
    let node_count = var_count * 2;

    let mut index: Vec<Option<u32>> = vec![None; node_count];
    let mut lowlink: Vec<u32> = vec![0; node_count];
    let mut on_stack: Vec<bool> = vec![false; node_count];
    let mut stack: Vec<Lit> = vec![];
    let mut next_index = 0u32;

    let mut components: Vec<Vec<Lit>> = vec![];

    // Explicit work-stack based Tarjan to avoid recursion depth issues on large implication
    // chains. Each frame tracks how far through `implied(lit)` we have iterated.
    struct Frame {
        lit: Lit,
        iter_pos: usize,
    }

    for start in 0..node_count {
        let start_lit = Lit::from_code(start as satx_formula::lit::LitIdx);
        if index[start_lit.code()].is_some() {
            continue;
        }

        let mut work: Vec<Frame> = vec![Frame {
            lit: start_lit,
            iter_pos: 0,
        }];

        while let Some(frame) = work.last_mut() {
            let lit = frame.lit;

            if frame.iter_pos == 0 {
                index[lit.code()] = Some(next_index);
                lowlink[lit.code()] = next_index;
                next_index += 1;
                stack.push(lit);
                on_stack[lit.code()] = true;
            }

            let implied = ctx.part(BinaryClausesP).implied(lit);
            if frame.iter_pos < implied.len() {
                let next = implied[frame.iter_pos];
                frame.iter_pos += 1;

                if index[next.code()].is_none() {
                    work.push(Frame {
                        lit: next,
                        iter_pos: 0,
                    });
                } else if on_stack[next.code()] {
                    let candidate = index[next.code()].unwrap();
                    if candidate < lowlink[lit.code()] {
                        lowlink[lit.code()] = candidate;
                    }
                }
                continue;
            }

            // Done with all successors of `lit`. Propagate its lowlink to the parent frame (if
            // any) and, if `lit` roots a component, pop it off the stack.
            let lit_lowlink = lowlink[lit.code()];
            work.pop();

            if let Some(parent) = work.last_mut() {
                if lit_lowlink < lowlink[parent.lit.code()] {
                    lowlink[parent.lit.code()] = lit_lowlink;
                }
            }

            if lit_lowlink == index[lit.code()].unwrap() {
                let mut component = vec![];
                loop {
                    let member = stack.pop().unwrap();
                    on_stack[member.code()] = false;
                    component.push(member);
                    if member == lit {
                        break;
                    }
                }
                if component.len() > 1 {
                    components.push(component);
                }
            }
        }
    }

    components
        .into_iter()
        .filter_map(|mut lits| {
            lits.sort_by_key(|lit| lit.code());
            let representative = pick_representative(&lits);
            // Every equivalence class `{a, b, ...}` has a dual class `{!a, !b, ...}` discovered as
            // a separate component. Keep only one side of each pair.
            if !representative.is_positive() {
                return None;
            }
            Some(Equivalence {
                representative,
                lits,
            })
        })
        .collect()
}

/// Pick a canonical representative literal for a component: the positive literal of the
/// lowest-indexed variable present, in its polarity as it occurs in the component.
fn pick_representative(lits: &[Lit]) -> Lit {
    *lits
        .iter()
        .min_by_key(|lit| lit.var().index())
        .expect("non-empty component")
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use crate::context::set_var_count;

    #[test]
    fn finds_equivalence_cycle() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 3);

        // 1 -> 2 -> 3 -> 1, so {1, 2, 3} (as literals) form one equivalence class.
        ctx.part_mut(BinaryClausesP)
            .add_binary_clause([lit![-1], lit![2]]);
        ctx.part_mut(BinaryClausesP)
            .add_binary_clause([lit![-2], lit![3]]);
        ctx.part_mut(BinaryClausesP)
            .add_binary_clause([lit![-3], lit![1]]);

        let equivalences = find_equivalences(ctx.borrow());

        assert_eq!(equivalences.len(), 1);
        assert_eq!(equivalences[0].lits.len(), 3);
        assert_eq!(equivalences[0].representative, lit![1]);
    }

    #[test]
    fn no_cycle_no_equivalence() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 2);

        ctx.part_mut(BinaryClausesP)
            .add_binary_clause([lit![-1], lit![2]]);

        let equivalences = find_equivalences(ctx.borrow());
        assert!(equivalences.is_empty());
    }
}
