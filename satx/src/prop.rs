//! Unit propagation.
pub mod assignment;
pub mod binary;
pub mod graph;
pub mod long;
pub mod watch;

pub use assignment::{backtrack, enqueue_assignment, full_restart, restart, Assignment, Trail};
pub use binary::propagate_binary;
pub use graph::{Conflict, ImplGraph, ImplNode, Reason};
pub use long::propagate_long;
pub use watch::{Watch, Watchlists};

use partial_ref::{partial, PartialRef};

use crate::clause::gc::rebuild_watchlists;
use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, Context, ImplGraphP, TrailP, WatchlistsP,
};

/// Propagate all enqueued assignments.
///
/// Processes the trail queue until it is empty or a conflict is found. For each newly assigned
/// literal this first propagates binary clauses and then long clauses, since binary propagation
/// is cheaper and can never miss a conflict that long clause propagation would also find.
pub fn propagate(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut TrailP,
        mut WatchlistsP,
    ),
) -> Result<(), Conflict> {
    if !ctx.part(WatchlistsP).enabled() {
        rebuild_watchlists(ctx.borrow());
    }

    while let Some(lit) = ctx.part_mut(TrailP).pop_queue() {
        propagate_binary(ctx.borrow(), lit)?;
        propagate_long(ctx.borrow(), lit)?;
    }

    Ok(())
}
