//! Reachability stamps over the binary implication graph.
//!
//! Computes, for every literal, a discovery/finish interval from a DFS of the binary implication
//! graph (`lit -> implied lits`). Literal `b` is reachable from literal `a` whenever `b`'s interval
//! is nested inside `a`'s interval, which turns most reachability queries used by probing and
//! vivification into a single interval comparison instead of a graph walk.
//!
//! This mirrors the stamping scheme used by CryptoMiniSat's failed literal search and clause
//! vivification to cheaply answer "does asserting `a` already imply `b`" without re-running a
//! traversal for every candidate literal.
use partial_ref::{partial, PartialRef};

use satx_formula::lit::Lit;

use crate::context::{BinaryClausesP, Context, StampP};

/// Discovery/finish timestamps for every literal, from a DFS of the binary implication graph.
#[derive(Default)]
pub struct Stamp {
    /// `start[lit]`/`end[lit]` form the DFS interval during which `lit` was on the recursion stack.
    start: Vec<u32>,
    end: Vec<u32>,
    /// Monotonically increasing, bumped on every `refresh`.
    generation: u32,
    dfs_stack: Vec<Lit>,
    on_stack: Vec<bool>,
}

impl Stamp {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.start.resize(count * 2, 0);
        self.end.resize(count * 2, 0);
        self.on_stack.resize(count * 2, false);
    }

    /// Whether `b` is known to be implied by `a`, i.e. every assignment that satisfies `a` also
    /// satisfies `b`.
    ///
    /// Conservative: a `false` result does not mean `a` does not imply `b`, only that the last
    /// [`refresh`](Self::refresh) did not discover a binary-clause path proving it.
    pub fn dominates(&self, a: Lit, b: Lit) -> bool {
        if a == b {
            return true;
        }
        let (sa, ea) = (self.start[a.code()], self.end[a.code()]);
        let (sb, eb) = (self.start[b.code()], self.end[b.code()]);
        if sa == 0 && ea == 0 {
            return false;
        }
        sa <= sb && eb <= ea
    }

    /// The DFS generation stamps were last computed in. Used by callers that want to detect a
    /// stale cache without storing a full copy of the intervals.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Recompute the reachability intervals from the current binary implication graph.
///
/// Each call invalidates intervals from the previous call; callers must not mix intervals from
/// different generations.
pub fn refresh(mut ctx: partial!(Context, mut StampP, BinaryClausesP)) {
    let var_count = ctx.part(BinaryClausesP).var_count();

    ctx.part_mut(StampP).set_var_count(var_count);

    let stamp = ctx.part_mut(StampP);
    stamp.generation += 1;
    for slot in stamp.start.iter_mut() {
        *slot = 0;
    }
    for slot in stamp.end.iter_mut() {
        *slot = 0;
    }
    for slot in stamp.on_stack.iter_mut() {
        *slot = false;
    }

    let mut clock = 0u32;

    for index in 0..var_count * 2 {
        let root = Lit::from_code(index as satx_formula::lit::LitIdx);
        if ctx.part(StampP).start[root.code()] != 0 {
            continue;
        }
        clock = dfs_from(ctx.borrow(), root, clock);
    }
}

/// Iterative DFS recording discovery/finish order, starting at `root`.
///
/// Returns the updated clock value. Iterative to avoid stack overflow on long implication chains.
fn dfs_from(mut ctx: partial!(Context, mut StampP, BinaryClausesP), root: Lit, mut clock: u32) -> u32 {
    enum Frame {
        Enter(Lit),
        Leave(Lit),
    }

    let mut stack = vec![Frame::Enter(root)];

    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Enter(lit) => {
                if ctx.part(StampP).start[lit.code()] != 0 {
                    continue;
                }
                clock += 1;
                ctx.part_mut(StampP).start[lit.code()] = clock;
                stack.push(Frame::Leave(lit));

                let implied: Vec<Lit> = ctx.part(BinaryClausesP).implied(lit).to_vec();
                for next in implied {
                    if ctx.part(StampP).start[next.code()] == 0 {
                        stack.push(Frame::Enter(next));
                    }
                }
            }
            Frame::Leave(lit) => {
                clock += 1;
                ctx.part_mut(StampP).end[lit.code()] = clock;
            }
        }
    }

    clock
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use crate::context::set_var_count;

    #[test]
    fn chain_is_nested() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 3);

        // 1 -> 2 -> 3
        ctx.part_mut(BinaryClausesP)
            .add_binary_clause([lit![-1], lit![2]]);
        ctx.part_mut(BinaryClausesP)
            .add_binary_clause([lit![-2], lit![3]]);

        refresh(ctx.borrow());

        assert!(ctx.part(StampP).dominates(lit![1], lit![2]));
        assert!(ctx.part(StampP).dominates(lit![1], lit![3]));
        assert!(!ctx.part(StampP).dominates(lit![3], lit![1]));
    }
}
