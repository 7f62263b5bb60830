use crate::error::{AfResult, AllocError};
use clap::{parser::ValueSource, ArgMatches, Args};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Args, Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    #[command(flatten)]
    pub evolution: EvolutionParams,
    #[command(flatten)]
    pub operators: OperatorWeights,
    #[command(flatten)]
    pub checkpoints: CheckpointParams,
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionParams {
    #[arg(long, default_value_t = 500)]
    pub generations: usize,
    #[arg(long, default_value_t = 100)]
    pub population_size: usize,

    // Per-generation probabilities are drawn from these ranges
    #[arg(long, default_value_t = 0.3)]
    pub crossover_prob_min: f64,
    #[arg(long, default_value_t = 0.8)]
    pub crossover_prob_max: f64,
    #[arg(long, default_value_t = 0.3)]
    pub mutation_prob_min: f64,
    #[arg(long, default_value_t = 0.8)]
    pub mutation_prob_max: f64,

    // Rebalancing mutation: share of a bucket moved per call
    #[arg(long, default_value_t = 0.01)]
    pub impact_min: f64,
    #[arg(long, default_value_t = 0.30)]
    pub impact_max: f64,

    // Generic operators
    #[arg(long, default_value_t = 0.1)]
    pub gene_prob_min: f64,
    #[arg(long, default_value_t = 0.9)]
    pub gene_prob_max: f64,
    #[arg(long, default_value_t = 0.2)]
    pub swap_prob_min: f64,
    #[arg(long, default_value_t = 0.9)]
    pub swap_prob_max: f64,
    #[arg(long, default_value_t = 0.15)]
    pub tournament_fraction: f64,

    /// Items pulled into a bucket found empty before evaluation.
    #[arg(long, default_value_t = 1)]
    pub bucket_floor: usize,
    /// Regeneration gives up after `factor * population_size` attempts.
    #[arg(long, default_value_t = 20)]
    pub regeneration_attempt_factor: usize,

    #[arg(long, default_value_t = false)]
    pub no_hint_seed: bool,
    /// Keep items flagged `included = false` out of every bucket.
    #[arg(long, default_value_t = false)]
    pub honor_exclusions: bool,
}

impl Default for EvolutionParams {
    fn default() -> Self {
        Self {
            generations: 500,
            population_size: 100,
            crossover_prob_min: 0.3,
            crossover_prob_max: 0.8,
            mutation_prob_min: 0.3,
            mutation_prob_max: 0.8,
            impact_min: 0.01,
            impact_max: 0.30,
            gene_prob_min: 0.1,
            gene_prob_max: 0.9,
            swap_prob_min: 0.2,
            swap_prob_max: 0.9,
            tournament_fraction: 0.15,
            bucket_floor: 1,
            regeneration_attempt_factor: 20,
            no_hint_seed: false,
            honor_exclusions: false,
        }
    }
}

/// Relative weights of the operator strategies. One strategy per family is
/// drawn each generation.
#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorWeights {
    // === CROSSOVER ===
    #[arg(long, default_value_t = 6.0)]
    pub weight_bucket_wise: f64,
    #[arg(long, default_value_t = 1.0)]
    pub weight_one_point: f64,
    #[arg(long, default_value_t = 1.0)]
    pub weight_two_point: f64,
    #[arg(long, default_value_t = 2.0)]
    pub weight_uniform: f64,

    // === MUTATION ===
    #[arg(long, default_value_t = 2.0)]
    pub weight_constraint_focused: f64,
    #[arg(long, default_value_t = 2.0)]
    pub weight_combined_deviation: f64,
    #[arg(long, default_value_t = 1.0)]
    pub weight_shuffle_indexes: f64,
    #[arg(long, default_value_t = 1.0)]
    pub weight_uniform_int: f64,

    // === SELECTION ===
    #[arg(long, default_value_t = 1.0)]
    pub weight_truncation: f64,
    #[arg(long, default_value_t = 0.0)]
    pub weight_tournament: f64,
}

impl Default for OperatorWeights {
    fn default() -> Self {
        Self {
            weight_bucket_wise: 6.0,
            weight_one_point: 1.0,
            weight_two_point: 1.0,
            weight_uniform: 2.0,
            weight_constraint_focused: 2.0,
            weight_combined_deviation: 2.0,
            weight_shuffle_indexes: 1.0,
            weight_uniform_int: 1.0,
            weight_truncation: 1.0,
            weight_tournament: 0.0,
        }
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointParams {
    #[arg(long, default_value_t = 10)]
    pub best_cadence: usize,
    #[arg(long, default_value_t = 10)]
    pub population_cadence: usize,
    #[arg(long, default_value_t = 10)]
    pub history_cadence: usize,
    #[arg(long, default_value_t = 500)]
    pub best_capacity: usize,
    /// Ignore any saved population and start from scratch.
    #[arg(long, default_value_t = false)]
    pub fresh_start: bool,
}

impl Default for CheckpointParams {
    fn default() -> Self {
        Self {
            best_cadence: 10,
            population_cadence: 10,
            history_cadence: 10,
            best_capacity: 500,
            fresh_start: false,
        }
    }
}

fn check_range(name: &str, min: f64, max: f64) -> AfResult<()> {
    if !(0.0..=1.0).contains(&min) || !(0.0..=1.0).contains(&max) {
        return Err(AllocError::Config(format!(
            "{} range [{}, {}] must lie within [0, 1]",
            name, min, max
        )));
    }
    if min > max {
        return Err(AllocError::Config(format!(
            "{} range is inverted: min {} > max {}",
            name, min, max
        )));
    }
    Ok(())
}

fn check_weights(family: &str, weights: &[f64]) -> AfResult<()> {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(AllocError::Config(format!(
            "{} weights must be finite and non-negative",
            family
        )));
    }
    if weights.iter().sum::<f64>() <= 0.0 {
        return Err(AllocError::Config(format!(
            "{} weights must not all be zero",
            family
        )));
    }
    Ok(())
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> AfResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AllocError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let cfg = serde_json::from_str(&content)?;
        Ok(cfg)
    }

    /// Overwrites fields with the values explicitly typed on the command line.
    pub fn merge_from_cli(&mut self, cli: &Config, matches: &ArgMatches) {
        self.evolution.merge_from_cli(&cli.evolution, matches);
        self.operators.merge_from_cli(&cli.operators, matches);
        self.checkpoints.merge_from_cli(&cli.checkpoints, matches);
    }

    pub fn validate(&self) -> AfResult<()> {
        let e = &self.evolution;
        if e.generations == 0 {
            return Err(AllocError::Config("generations must be >= 1".to_string()));
        }
        if e.population_size == 0 {
            return Err(AllocError::Config(
                "population_size must be >= 1".to_string(),
            ));
        }
        if e.bucket_floor == 0 {
            return Err(AllocError::Config("bucket_floor must be >= 1".to_string()));
        }
        if e.regeneration_attempt_factor == 0 {
            return Err(AllocError::Config(
                "regeneration_attempt_factor must be >= 1".to_string(),
            ));
        }
        check_range("crossover probability", e.crossover_prob_min, e.crossover_prob_max)?;
        check_range("mutation probability", e.mutation_prob_min, e.mutation_prob_max)?;
        check_range("impact", e.impact_min, e.impact_max)?;
        check_range("gene probability", e.gene_prob_min, e.gene_prob_max)?;
        check_range("swap probability", e.swap_prob_min, e.swap_prob_max)?;
        if !(e.tournament_fraction > 0.0 && e.tournament_fraction <= 1.0) {
            return Err(AllocError::Config(format!(
                "tournament_fraction {} must lie in (0, 1]",
                e.tournament_fraction
            )));
        }

        let w = &self.operators;
        check_weights(
            "Crossover",
            &[
                w.weight_bucket_wise,
                w.weight_one_point,
                w.weight_two_point,
                w.weight_uniform,
            ],
        )?;
        check_weights(
            "Mutation",
            &[
                w.weight_constraint_focused,
                w.weight_combined_deviation,
                w.weight_shuffle_indexes,
                w.weight_uniform_int,
            ],
        )?;
        check_weights("Selection", &[w.weight_truncation, w.weight_tournament])?;

        let c = &self.checkpoints;
        if c.best_cadence == 0 || c.population_cadence == 0 || c.history_cadence == 0 {
            return Err(AllocError::Config("checkpoint cadences must be >= 1".to_string()));
        }
        if c.best_capacity == 0 {
            return Err(AllocError::Config("best_capacity must be >= 1".to_string()));
        }
        Ok(())
    }
}

macro_rules! update_if_present {
    ($self:ident, $cli:ident, $matches:ident, $($field:ident),+ $(,)?) => {
        $(
            if $matches.value_source(stringify!($field)) == Some(ValueSource::CommandLine) {
                $self.$field = $cli.$field.clone();
            }
        )+
    };
}

impl EvolutionParams {
    pub fn merge_from_cli(&mut self, cli: &EvolutionParams, matches: &ArgMatches) {
        update_if_present!(
            self,
            cli,
            matches,
            generations,
            population_size,
            crossover_prob_min,
            crossover_prob_max,
            mutation_prob_min,
            mutation_prob_max,
            impact_min,
            impact_max,
            gene_prob_min,
            gene_prob_max,
            swap_prob_min,
            swap_prob_max,
            tournament_fraction,
            bucket_floor,
            regeneration_attempt_factor,
            no_hint_seed,
            honor_exclusions,
        );
    }
}

impl OperatorWeights {
    pub fn merge_from_cli(&mut self, cli: &OperatorWeights, matches: &ArgMatches) {
        update_if_present!(
            self,
            cli,
            matches,
            weight_bucket_wise,
            weight_one_point,
            weight_two_point,
            weight_uniform,
            weight_constraint_focused,
            weight_combined_deviation,
            weight_shuffle_indexes,
            weight_uniform_int,
            weight_truncation,
            weight_tournament,
        );
    }
}

impl CheckpointParams {
    pub fn merge_from_cli(&mut self, cli: &CheckpointParams, matches: &ArgMatches) {
        update_if_present!(
            self,
            cli,
            matches,
            best_cadence,
            population_cadence,
            history_cadence,
            best_capacity,
            fresh_start,
        );
    }
}
