//! Boolean satisfiability solver.
use std::io;

use partial_ref::{IntoPartialRef, IntoPartialRefMut, PartialRef};

use anyhow::Error;
use log::info;

use crate::checker::ProofProcessor;
use crate::config::{SolverConfig, SolverConfigUpdate};
use crate::context::{
    config_changed, ensure_var_count, AssignmentP, Context, EliminatedVarsP, ProofP, ReplaceP,
    SolverConfigP, SolverStateP,
};
use crate::load::load_clause;
pub use crate::proof::ProofFormat;
use crate::schedule::schedule_step;
use crate::state::SatState;
use crate::xor::add_xor_clause;
use satx_dimacs::{DimacsHeader, DimacsParser};
use satx_formula::cnf::CnfFormula;
use satx_formula::lit::{Lit, Var};

/// A boolean satisfiability solver.
#[derive(Default)]
pub struct Solver<'a> {
    ctx: Box<Context<'a>>,
}

impl<'a> Solver<'a> {
    /// Create a new solver.
    pub fn new() -> Solver<'a> {
        Solver::default()
    }

    /// Add a formula to the solver.
    pub fn add_formula(&mut self, formula: &CnfFormula) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ensure_var_count(ctx.borrow(), formula.var_count());
        for clause in formula.iter() {
            load_clause(ctx.borrow(), clause);
        }
    }

    /// Reads and adds a formula in DIMACS CNF format.
    ///
    /// Using this avoids creating a temporary [`CnfFormula`].
    pub fn add_dimacs_cnf(&mut self, input: impl io::Read) -> Result<(), Error> {
        use io::BufRead;

        let mut buffer = io::BufReader::new(input);
        let mut parser = DimacsParser::new();

        loop {
            let data = buffer.fill_buf()?;
            if data.is_empty() {
                break;
            }
            parser.parse_chunk(data)?;
            let len = data.len();
            buffer.consume(len);

            self.add_formula(&parser.take_formula());
        }
        parser.eof()?;
        self.add_formula(&parser.take_formula());
        parser.check_header()?;

        info!(
            "Parsed formula with {} variables and {} clauses",
            parser.var_count(),
            parser.clause_count()
        );

        Ok(())
    }

    /// Change the solver's configuration.
    ///
    /// Only a subset of fields of `update` need to be set; unset fields leave the corresponding
    /// configuration value unchanged.
    pub fn config(&mut self, update: &SolverConfigUpdate) -> Result<(), Error> {
        let mut ctx = self.ctx.into_partial_ref_mut();
        update.apply_to(ctx.part_mut(SolverConfigP));
        config_changed(ctx.borrow(), update);
        Ok(())
    }

    /// Current solver configuration.
    pub fn current_config(&self) -> &SolverConfig {
        &self.ctx.solver_config
    }

    /// Enable on-the-fly checking of the generated proof.
    ///
    /// This roughly doubles solving time but can catch bugs in the solver before they propagate
    /// into an unsound result.
    pub fn enable_self_checking(&mut self) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(ProofP).begin_checking();
    }

    /// Add a [`ProofProcessor`].
    ///
    /// This automatically enables on-the-fly checking of the generated proof, feeding every
    /// checked step to `processor`.
    pub fn add_proof_processor(&mut self, processor: &'a mut dyn ProofProcessor) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(ProofP).add_processor(processor);
    }

    /// Start writing the proof of unsatisfiability to `target` in the given format.
    pub fn write_proof(&mut self, target: impl io::Write + 'a, format: ProofFormat) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(ProofP).write_proof(target, format);
    }

    /// Stop writing the proof, flushing any buffered data.
    pub fn close_proof(&mut self) -> Result<(), Error> {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(ProofP).close_proof();
        Ok(())
    }

    /// Check the satisfiability of the current formula.
    ///
    /// Returns `Ok(true)` if the formula (together with any assumptions) is satisfiable, `Ok(false)`
    /// if it is unsatisfiable. An `Err` is only returned for fatal errors unrelated to
    /// satisfiability, such as a failure to write the generated proof.
    pub fn solve(&mut self) -> Result<bool, Error> {
        let mut ctx = self.ctx.into_partial_ref_mut();
        while schedule_step(ctx.borrow()) {}
        ctx.part_mut(ProofP).solve_finished();
        match ctx.part(SolverStateP).sat_state {
            SatState::Unknown => unreachable!(),
            SatState::Sat => Ok(true),
            SatState::Unsat | SatState::UnsatUnderAssumptions => Ok(false),
        }
    }

    /// Add a native XOR constraint: the given literals, XORed using their current truth value,
    /// must sum to `sum`.
    ///
    /// Kept as native XOR reasoning rather than expanded into `2^(n-1)` CNF clauses, see
    /// [`crate::xor`].
    pub fn add_xor_clause(&mut self, lits: impl IntoIterator<Item = Lit>, sum: bool) {
        let lits: Vec<Lit> = lits.into_iter().collect();
        let var_count = lits.iter().map(|lit| lit.index() + 1).max().unwrap_or(0);

        let mut ctx = self.ctx.into_partial_ref_mut();
        ensure_var_count(ctx.borrow(), var_count);
        add_xor_clause(ctx.borrow(), lits, sum);
    }

    /// Set of literals that satisfy the formula.
    ///
    /// Includes an assignment for variables folded away by equivalent literal replacement, derived
    /// from the representative they were replaced by.
    pub fn model(&self) -> Option<Vec<Lit>> {
        let mut ctx = self.ctx.into_partial_ref();
        if ctx.part(SolverStateP).sat_state != SatState::Sat {
            return None;
        }

        let mut model: Vec<Lit> = ctx
            .part(AssignmentP)
            .assignment()
            .iter()
            .enumerate()
            .flat_map(|(index, assignment)| {
                assignment.map(|polarity| Lit::from_var(Var::from_index(index), !polarity))
            })
            .collect();

        // Replaced variables were removed from the clause database before the representative was
        // ever assigned, so extend the model by copying the representative's value across, applying
        // the recorded polarity. Walked newest-replacement-first: a representative may itself have
        // been folded into another variable by a later replacement round, and that later entry must
        // be resolved into the model before an earlier entry can look its value up.
        for &(var, canonical_lit) in ctx.part(ReplaceP).replacements().iter().rev() {
            let representative_true = model.contains(&canonical_lit);
            model.push(Lit::from_var(var, representative_true));
        }

        // Clauses removed by blocked-clause elimination or bounded variable elimination (see
        // `crate::occur`) must also be satisfied; this has to run after the replacement extension
        // above, since a saved clause can mention a variable only fixed by it.
        ctx.part(EliminatedVarsP).extend_model(&mut model);

        Some(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use satx_dimacs::write_dimacs;
    use satx_formula::cnf::CnfFormula;

    use crate::test::{sat_formula, sgen_unsat_formula};

    proptest! {
        #[test]
        fn sgen_unsat(formula in sgen_unsat_formula(1..7usize)) {
            let mut solver = Solver::new();

            solver.add_formula(&formula);

            prop_assert_eq!(solver.solve().ok(), Some(false));
        }

        #[test]
        fn sat(formula in sat_formula(4..20usize, 10..100usize, 0.05..0.2, 0.9..1.0)) {
            let mut solver = Solver::new();

            solver.add_formula(&formula);

            prop_assert_eq!(solver.solve().ok(), Some(true));

            let model = solver.model().unwrap();

            for clause in formula.iter() {
                prop_assert!(clause.iter().any(|lit| model.contains(lit)));
            }
        }

        #[test]
        fn sat_via_dimacs(formula in sat_formula(4..20usize, 10..100usize, 0.05..0.2, 0.9..1.0)) {
            let mut solver = Solver::new();

            let mut dimacs = vec![];

            write_dimacs(&mut dimacs, &formula).unwrap();

            solver.add_dimacs_cnf(&mut &dimacs[..]).unwrap();

            prop_assert_eq!(solver.solve().ok(), Some(true));

            let model = solver.model().unwrap();

            for clause in formula.iter() {
                prop_assert!(clause.iter().any(|lit| model.contains(lit)));
            }
        }

        #[test]
        fn sgen_unsat_incremetal_clauses(formula in sgen_unsat_formula(1..7usize)) {
            let mut solver = Solver::new();

            let mut last_state = Some(true);

            for clause in formula.iter() {
                let single_clause = CnfFormula::from(Some(clause));
                solver.add_formula(&single_clause);

                let state = solver.solve().ok();
                if state != last_state {
                    prop_assert_eq!(state, Some(false));
                    prop_assert_eq!(last_state, Some(true));
                    last_state = state;
                }
            }

            prop_assert_eq!(last_state, Some(false));
        }
    }

    #[test]
    fn xor_clause_forces_unit() {
        // x1 xor x2 == true, x1 == true => x2 must be false.
        let mut solver = Solver::new();
        solver.add_xor_clause(vec![lit![1], lit![2]], true);
        solver.add_formula(&CnfFormula::from(vec![vec![lit![1]]]));

        assert_eq!(solver.solve().ok(), Some(true));
        let model = solver.model().unwrap();
        assert!(model.contains(&lit![1]));
        assert!(model.contains(&lit![-2]));
    }

    #[test]
    fn xor_clause_detects_conflict() {
        // x1 xor x1 == true is unsatisfiable (always false).
        let mut solver = Solver::new();
        solver.add_xor_clause(vec![lit![1], lit![1]], true);

        assert_eq!(solver.solve().ok(), Some(false));
    }

    #[test]
    fn three_way_xor_matches_cnf_expansion() {
        use satx_formula::cnf::ExtendFormula;

        for sum in [false, true] {
            let mut solver = Solver::new();
            solver.add_xor_clause(vec![lit![1], lit![2], lit![3]], sum);
            solver.add_formula(&CnfFormula::from(vec![vec![lit![1]], vec![lit![2]]]));

            let mut expected = CnfFormula::new();
            expected.set_var_count(3);
            expected.add_xor_clause(vec![lit![1], lit![2], lit![3]], sum);
            expected.add_clause(vec![lit![1]]);
            expected.add_clause(vec![lit![2]]);

            let mut checker = Solver::new();
            checker.add_formula(&expected);

            assert_eq!(solver.solve().ok(), Some(true));
            assert_eq!(checker.solve().ok(), Some(true));

            let x3_native = solver.model().unwrap().contains(&lit![3]);
            let x3_expansion = checker.model().unwrap().contains(&lit![3]);
            assert_eq!(x3_native, x3_expansion);
            // x1 == x2 == true, so x1 xor x2 xor x3 == sum forces x3 == sum.
            assert_eq!(x3_native, sum);
        }
    }
}
