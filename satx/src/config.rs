//! Solver configuration.
use std::fmt::Write;

use serde::Deserialize;

use satx_internal_macros::DocDefault;

/// Restart strategy used by the search driver.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartStrategy {
    /// Restart intervals follow a geometric sequence scaled by Luby's sequence.
    Geometric,
    /// Restart as soon as the glue (LBD) of recently learned clauses trends upward.
    Glue,
    /// Restart based on the agility (how often the last few decisions got reverted) of the
    /// search.
    Agility,
}

/// Configurable parameters used during solving.
#[derive(Clone, DocDefault)]
pub struct SolverConfig {
    /// Multiplicative decay for the VSIDS decision heuristic. (Default: 0.95)
    pub vsids_decay: f32,

    /// Multiplicative decay for clause activities. (Default: 0.999)
    pub clause_activity_decay: f32,

    /// Number of conflicts between local clause reductions. (Default: 15000)
    pub reduce_locals_interval: u64,

    /// Number of conflicts between mid clause reductions. (Default: 10000)
    pub reduce_mids_interval: u64,

    /// Scaling factor for luby sequence based restarts (number of conflicts). (Default: 128)
    pub luby_restart_interval_scale: u64,

    /// Restart strategy used by the search driver. (Default: RestartStrategy::Glue)
    pub restart_strategy: RestartStrategy,

    /// Length of the glue moving average window used by the glue restart strategy. (Default: 50)
    pub glue_restart_window: usize,

    /// Lower bound on the agility moving average below which an agility restart is triggered.
    /// (Default: 0.4)
    pub agility_restart_threshold: f32,

    /// Whether Gauss-Jordan elimination over extracted XOR constraints is enabled. (Default: true)
    pub gauss_jordan_enable: bool,

    /// Maximum number of rows a Gauss-Jordan matrix may have before it is skipped for this block.
    /// (Default: 300)
    pub gauss_jordan_max_matrix_rows: usize,

    /// Maximum length of a long clause considered by the XOR finder. (Default: 10)
    pub xor_finder_max_clause_size: usize,

    /// Maximum allowed ratio of eliminated-variable resolvent literals to original literals during
    /// bounded variable elimination. (Default: 2.0)
    pub variable_elimination_growth_ratio: f32,

    /// Number of propagations budgeted for one round of clause vivification. (Default: 2000000)
    pub vivification_budget: u64,

    /// Number of simulated propagations ("bogo-props") budgeted for one round of failed-literal
    /// probing. (Default: 3000000)
    pub probing_budget: u64,
}

/// A partial update to a [`SolverConfig`].
///
/// Every field is optional, so a [`SolverConfigUpdate`] can be built up incrementally from a
/// configuration file and then from individual command line options, with later values
/// overriding earlier ones, before finally being applied to a [`SolverConfig`].
#[derive(Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SolverConfigUpdate {
    pub vsids_decay: Option<f32>,
    pub clause_activity_decay: Option<f32>,
    pub reduce_locals_interval: Option<u64>,
    pub reduce_mids_interval: Option<u64>,
    pub luby_restart_interval_scale: Option<u64>,
    pub restart_strategy: Option<RestartStrategy>,
    pub glue_restart_window: Option<usize>,
    pub agility_restart_threshold: Option<f32>,
    pub gauss_jordan_enable: Option<bool>,
    pub gauss_jordan_max_matrix_rows: Option<usize>,
    pub xor_finder_max_clause_size: Option<usize>,
    pub variable_elimination_growth_ratio: Option<f32>,
    pub vivification_budget: Option<u64>,
    pub probing_budget: Option<u64>,
}

macro_rules! merge_field {
    ($self:ident, $other:ident, $field:ident) => {
        if $other.$field.is_some() {
            $self.$field = $other.$field;
        }
    };
}

macro_rules! apply_field {
    ($config:ident, $update:ident, $field:ident) => {
        if let Some(value) = $update.$field {
            $config.$field = value;
        }
    };
}

impl SolverConfigUpdate {
    /// Create an update that changes nothing.
    pub fn new() -> SolverConfigUpdate {
        SolverConfigUpdate::default()
    }

    /// Overlay another update on top of this one.
    ///
    /// Fields set in `other` take priority over fields already set in `self`. This is used to let
    /// individual `-C` command line options override a loaded configuration file, which in turn
    /// overrides the built-in defaults.
    pub fn merge(&mut self, other: SolverConfigUpdate) {
        merge_field!(self, other, vsids_decay);
        merge_field!(self, other, clause_activity_decay);
        merge_field!(self, other, reduce_locals_interval);
        merge_field!(self, other, reduce_mids_interval);
        merge_field!(self, other, luby_restart_interval_scale);
        merge_field!(self, other, restart_strategy);
        merge_field!(self, other, glue_restart_window);
        merge_field!(self, other, agility_restart_threshold);
        merge_field!(self, other, gauss_jordan_enable);
        merge_field!(self, other, gauss_jordan_max_matrix_rows);
        merge_field!(self, other, xor_finder_max_clause_size);
        merge_field!(self, other, variable_elimination_growth_ratio);
        merge_field!(self, other, vivification_budget);
        merge_field!(self, other, probing_budget);
    }

    /// Apply this update to a configuration, leaving unset fields unchanged.
    pub fn apply_to(&self, config: &mut SolverConfig) {
        apply_field!(config, self, vsids_decay);
        apply_field!(config, self, clause_activity_decay);
        apply_field!(config, self, reduce_locals_interval);
        apply_field!(config, self, reduce_mids_interval);
        apply_field!(config, self, luby_restart_interval_scale);
        apply_field!(config, self, restart_strategy);
        apply_field!(config, self, glue_restart_window);
        apply_field!(config, self, agility_restart_threshold);
        apply_field!(config, self, gauss_jordan_enable);
        apply_field!(config, self, gauss_jordan_max_matrix_rows);
        apply_field!(config, self, xor_finder_max_clause_size);
        apply_field!(config, self, variable_elimination_growth_ratio);
        apply_field!(config, self, vivification_budget);
        apply_field!(config, self, probing_budget);
    }
}

impl SolverConfig {
    /// Renders the documentation of all configuration options as plain text.
    ///
    /// Used by the `-C help` command line option.
    pub fn help() -> String {
        let mut result = String::new();
        writeln!(result, "Available configuration options (-C name=value):\n").unwrap();
        writeln!(result, "vsids-decay: multiplicative decay for the VSIDS decision heuristic").unwrap();
        writeln!(result, "clause-activity-decay: multiplicative decay for clause activities").unwrap();
        writeln!(result, "reduce-locals-interval: conflicts between local clause reductions").unwrap();
        writeln!(result, "reduce-mids-interval: conflicts between mid clause reductions").unwrap();
        writeln!(result, "luby-restart-interval-scale: scale of the luby restart sequence").unwrap();
        writeln!(result, "restart-strategy: one of geometric, glue, agility").unwrap();
        writeln!(result, "glue-restart-window: glue moving average window length").unwrap();
        writeln!(result, "agility-restart-threshold: agility level that triggers a restart").unwrap();
        writeln!(
            result,
            "gauss-jordan-enable: enable native XOR reasoning via Gauss-Jordan elimination"
        )
        .unwrap();
        writeln!(result, "gauss-jordan-max-matrix-rows: row cap per Gauss-Jordan matrix").unwrap();
        writeln!(
            result,
            "xor-finder-max-clause-size: largest clause considered for XOR extraction"
        )
        .unwrap();
        writeln!(
            result,
            "variable-elimination-growth-ratio: resolvent growth bound for bounded variable elimination"
        )
        .unwrap();
        writeln!(result, "vivification-budget: propagation budget for clause vivification").unwrap();
        writeln!(result, "probing-budget: bogo-prop budget for failed-literal probing").unwrap();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unaffected_by_empty_update() {
        let mut config = SolverConfig::default();
        let before = config.vsids_decay;
        SolverConfigUpdate::new().apply_to(&mut config);
        assert_eq!(config.vsids_decay, before);
    }

    #[test]
    fn later_merge_wins() {
        let mut a = SolverConfigUpdate::new();
        a.vsids_decay = Some(0.9);
        let mut b = SolverConfigUpdate::new();
        b.vsids_decay = Some(0.8);
        a.merge(b);
        assert_eq!(a.vsids_decay, Some(0.8));
    }

    #[test]
    fn unset_fields_do_not_override() {
        let mut config = SolverConfig::default();
        let original_decay = config.clause_activity_decay;
        let mut update = SolverConfigUpdate::new();
        update.vsids_decay = Some(0.42);
        update.apply_to(&mut config);
        assert_eq!(config.vsids_decay, 0.42);
        assert_eq!(config.clause_activity_decay, original_decay);
    }
}
