//! Scheduling of restarts, clause database reduction and inprocessing.
use std::collections::VecDeque;

use log::info;

use partial_ref::{partial, PartialRef};

use crate::cdcl::conflict_step;
use crate::clause::reduce::{reduce_locals, reduce_mids};
use crate::clause::Tier;
use crate::config::RestartStrategy;
use crate::context::{
    AnalyzeConflictP, AssignmentP, BinaryClausesP, ClauseActivityP, ClauseAllocP, ClauseDbP,
    Context, EliminatedVarsP, ImplGraphP, IncrementalP, ProofP, ReplaceP, ScheduleP,
    SolverConfigP, SolverStateP, StampP, TmpDataP, TrailP, VarStatusesP, VsidsP, WatchlistsP,
    XorClausesP,
};
use crate::inprocess::run_inprocessing;
use crate::prop::restart;
use crate::state::SatState;

mod luby;

use luby::LubySequence;

/// Scheduling of restarts, clause database reduction and inprocessing passes.
#[derive(Default)]
pub struct Schedule {
    conflicts: u64,
    next_restart: u64,
    restarts: u64,
    next_inprocess: u64,
    luby: LubySequence,

    /// Recent learned clause glue levels, most recent last, bounded to the configured window.
    glue_window: VecDeque<u32>,
    glue_sum: u64,
    /// Long-term glue moving average, used as the baseline the short-term window is compared
    /// against.
    glue_slow_ema: f32,

    /// Moving average of how often recent decision levels got reverted by backtracking. Low
    /// agility means the search is thrashing and a restart should help.
    agility: f32,
    level_before_conflict: usize,
}

impl Schedule {
    /// Record the decision level just before a conflict was analyzed, so the next glue/agility
    /// update can tell how deep the following backtrack went.
    fn note_level(&mut self, level: usize) {
        self.level_before_conflict = level;
    }

    /// Update the agility estimate from how much of the pre-conflict decision trail survived.
    fn update_agility(&mut self, level_after: usize) {
        let before = self.level_before_conflict.max(1) as f32;
        let survived = level_after as f32 / before;
        // EMA with a fixed, fairly short half-life: agility should react quickly to thrashing.
        const AGILITY_DECAY: f32 = 0.9999;
        self.agility = self.agility * AGILITY_DECAY + survived * (1.0 - AGILITY_DECAY);
    }

    /// Update the glue moving averages with a newly learned clause's glue level.
    fn update_glue(&mut self, glue: usize, window: usize) {
        let glue = glue as u32;
        self.glue_window.push_back(glue);
        self.glue_sum += glue as u64;
        while self.glue_window.len() > window.max(1) {
            self.glue_sum -= self.glue_window.pop_front().unwrap() as u64;
        }

        const GLUE_SLOW_DECAY: f32 = 0.99995;
        self.glue_slow_ema = self.glue_slow_ema * GLUE_SLOW_DECAY + glue as f32 * (1.0 - GLUE_SLOW_DECAY);
    }

    /// Short-term average glue over the configured window.
    fn glue_fast_avg(&self) -> f32 {
        if self.glue_window.is_empty() {
            return 0.0;
        }
        self.glue_sum as f32 / self.glue_window.len() as f32
    }
}

/// Perform one step of the schedule: run a conflict step, and whenever it is due, a restart, a
/// clause database reduction or an inprocessing pass.
pub fn schedule_step(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseActivityP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut EliminatedVarsP,
        mut ImplGraphP,
        mut IncrementalP,
        mut ProofP,
        mut ReplaceP,
        mut ScheduleP,
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
) -> bool {
    if ctx.part(SolverStateP).sat_state != SatState::Unknown {
        return false;
    }

    let restart_strategy = ctx.part(SolverConfigP).restart_strategy;
    let glue_window = ctx.part(SolverConfigP).glue_restart_window;
    let agility_threshold = ctx.part(SolverConfigP).agility_restart_threshold;
    let luby_scale = ctx.part(SolverConfigP).luby_restart_interval_scale;
    let reduce_locals_interval = ctx.part(SolverConfigP).reduce_locals_interval;
    let reduce_mids_interval = ctx.part(SolverConfigP).reduce_mids_interval;

    let level_before = ctx.part(TrailP).current_level();
    ctx.part_mut(ScheduleP).note_level(level_before);

    let (schedule, mut ctx) = ctx.split_part_mut(ScheduleP);

    if schedule.conflicts > 0 && schedule.conflicts % 5000 == 0 {
        let db = ctx.part(ClauseDbP);
        let units = ctx.part(TrailP).top_level_assignment_count();
        info!(
            "confl: {}k rest: {} vars: {} bin: {} irred: {} core: {} mid: {} local: {}",
            schedule.conflicts / 1000,
            schedule.restarts,
            ctx.part(AssignmentP).assignment().len() - units,
            ctx.part(BinaryClausesP).count(),
            db.count_by_tier(Tier::Irred),
            db.count_by_tier(Tier::Core),
            db.count_by_tier(Tier::Mid),
            db.count_by_tier(Tier::Local)
        );
    }

    let should_restart = match restart_strategy {
        RestartStrategy::Geometric => schedule.next_restart == schedule.conflicts,
        RestartStrategy::Glue => {
            schedule.conflicts > glue_window as u64
                && schedule.glue_fast_avg() > schedule.glue_slow_ema * 1.25
        }
        RestartStrategy::Agility => {
            schedule.conflicts > 0 && schedule.agility < agility_threshold
        }
    };

    if should_restart {
        restart(ctx.borrow());
        schedule.restarts += 1;
        schedule.next_restart = schedule.conflicts + luby_scale * schedule.luby.advance();
    }

    if reduce_locals_interval > 0 && schedule.conflicts % reduce_locals_interval == 0 {
        reduce_locals(ctx.borrow());
    }
    if reduce_mids_interval > 0 && schedule.conflicts % reduce_mids_interval == 0 {
        reduce_mids(ctx.borrow());
    }

    if schedule.conflicts >= schedule.next_inprocess {
        schedule.next_inprocess = schedule.conflicts + 20000;
        run_inprocessing(ctx.borrow());
    }

    let glue = conflict_step(ctx.borrow());

    let level_after = ctx.part(TrailP).current_level();
    schedule.update_agility(level_after);
    if let Some(glue) = glue {
        schedule.update_glue(glue, glue_window);
    }

    schedule.conflicts += 1;
    true
}
