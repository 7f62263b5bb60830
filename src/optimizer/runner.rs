use super::allocation::ensure_every_bucket_non_empty;
use super::crossover::{cross, CrossoverKind};
use super::mutation::{mutate, MutationKind};
use super::selection::{self, SelectionKind};
use super::stats::{GenerationCounters, GenerationRecord, History};
use super::{uniform_in, Candidate, Registry, VariationParams};
use crate::checkpoint::{self, BestRecord, CheckpointStore};
use crate::config::Config;
use crate::error::{AfResult, AllocError};
use crate::problem::Problem;
use crate::report;
use fastrand::Rng;
use rayon::prelude::*;
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct EvolutionOptions {
    pub generations: usize,
    pub population_size: usize,
    pub crossover_range: (f64, f64),
    pub mutation_range: (f64, f64),
    pub variation: VariationParams,
    pub tournament_fraction: f64,
    pub bucket_floor: usize,
    pub regeneration_attempt_factor: usize,
    pub seed_from_hints: bool,
    pub restore_population: bool,
    pub best_cadence: usize,
    pub population_cadence: usize,
    pub history_cadence: usize,
    pub best_capacity: usize,
    pub crossover: Registry<CrossoverKind>,
    pub mutation: Registry<MutationKind>,
    pub selection: Registry<SelectionKind>,
}

impl From<&Config> for EvolutionOptions {
    fn from(cfg: &Config) -> Self {
        let e = &cfg.evolution;
        let w = &cfg.operators;
        let c = &cfg.checkpoints;
        Self {
            generations: e.generations,
            population_size: e.population_size,
            crossover_range: (e.crossover_prob_min, e.crossover_prob_max),
            mutation_range: (e.mutation_prob_min, e.mutation_prob_max),
            variation: VariationParams {
                impact: (e.impact_min, e.impact_max),
                gene_probability: (e.gene_prob_min, e.gene_prob_max),
                swap_probability: (e.swap_prob_min, e.swap_prob_max),
            },
            tournament_fraction: e.tournament_fraction,
            bucket_floor: e.bucket_floor,
            regeneration_attempt_factor: e.regeneration_attempt_factor,
            seed_from_hints: !e.no_hint_seed,
            restore_population: !c.fresh_start,
            best_cadence: c.best_cadence,
            population_cadence: c.population_cadence,
            history_cadence: c.history_cadence,
            best_capacity: c.best_capacity,
            crossover: Registry::new(vec![
                (CrossoverKind::BucketWise, w.weight_bucket_wise),
                (CrossoverKind::OnePoint, w.weight_one_point),
                (CrossoverKind::TwoPoint, w.weight_two_point),
                (CrossoverKind::Uniform, w.weight_uniform),
            ]),
            mutation: Registry::new(vec![
                (MutationKind::ConstraintFocused, w.weight_constraint_focused),
                (MutationKind::CombinedDeviation, w.weight_combined_deviation),
                (MutationKind::ShuffleIndexes, w.weight_shuffle_indexes),
                (MutationKind::UniformInt, w.weight_uniform_int),
            ]),
            selection: Registry::new(vec![
                (SelectionKind::Truncation, w.weight_truncation),
                (SelectionKind::Tournament, w.weight_tournament),
            ]),
        }
    }
}

impl Default for EvolutionOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Receives a summary after every generation.
/// Returning `false` stops the run early.
pub trait ProgressCallback {
    fn on_generation(&self, record: &GenerationRecord, best: Option<&Candidate>) -> bool;
}

/// Callback that never interrupts the run.
pub struct Silent;

impl ProgressCallback for Silent {
    fn on_generation(&self, _record: &GenerationRecord, _best: Option<&Candidate>) -> bool {
        true
    }
}

fn warn_on_failure(what: &str, res: AfResult<()>) {
    if let Err(e) = res {
        warn!("⚠️  Failed to persist {}: {}", what, e);
    }
}

/// Forces excluded items to the null bucket and refills empty buckets.
fn prepare(
    c: &mut Candidate,
    problem: &Problem,
    excluded: &[usize],
    floor: usize,
    rng: &mut Rng,
) {
    let null = problem.null_bucket();
    if excluded.iter().any(|&i| c.genes()[i] != null) {
        let genes = c.genes_mut();
        for &i in excluded {
            genes[i] = null;
        }
    }
    ensure_every_bucket_non_empty(c, problem, floor, rng);
}

fn is_better(candidate: &Candidate, incumbent: Option<&Candidate>) -> bool {
    let Some(new) = candidate.objective() else {
        return false;
    };
    match incumbent.and_then(Candidate::objective) {
        None => true,
        Some(old) if old.is_nan() => true,
        Some(old) => new < old,
    }
}

/// Population state carried from one generation to the next.
pub struct Evolution<'a> {
    problem: &'a Problem,
    options: &'a EvolutionOptions,
    population: Vec<Candidate>,
    history: History,
    generation: usize,
    best: Option<Candidate>,
}

impl<'a> Evolution<'a> {
    /// Restores or creates the first population and evaluates it.
    pub fn initialize(
        problem: &'a Problem,
        options: &'a EvolutionOptions,
        store: &mut dyn CheckpointStore,
        rng: &mut Rng,
    ) -> AfResult<Self> {
        let mut population = Vec::with_capacity(options.population_size);
        let mut history = History::default();

        if options.restore_population {
            if let Some(saved) =
                checkpoint::load_json::<Vec<Vec<usize>>>(store, checkpoint::POPULATION)?
            {
                for genes in saved {
                    problem.validate_genes(&genes).map_err(|e| {
                        AllocError::Checkpoint(format!("Saved population does not fit: {}", e))
                    })?;
                    population.push(Candidate::from_genes(genes));
                }
                if let Some(saved) = checkpoint::load_json::<History>(store, checkpoint::HISTORY)? {
                    history = saved;
                }
                info!("♻️  Restored {} candidates from checkpoint", population.len());
            }
        }

        if options.seed_from_hints && problem.has_hints() {
            debug!("   -> Seeding one candidate from bucket hints");
            population.push(Candidate::from_genes(problem.hinted_genes()));
        }

        let generation = history.last().map(|r| r.generation).unwrap_or(0);
        let mut evo = Self {
            problem,
            options,
            population,
            history,
            generation,
            best: None,
        };

        evo.prepare_unevaluated(rng);
        evo.deduplicate();
        evo.fill_random(rng);
        let evaluated = evo.evaluate_pending(store);
        debug!("   -> Initial population: {} evaluated", evaluated.len());

        selection::rank(&mut evo.population);
        if let Some(first) = evo.population.first() {
            if is_better(first, None) {
                evo.best = Some(first.clone());
            }
        }

        Ok(evo)
    }

    pub fn population(&self) -> &[Candidate] {
        &self.population
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn best(&self) -> Option<&Candidate> {
        self.best.as_ref()
    }

    /// First occurrence wins. Returns how many were removed.
    fn deduplicate(&mut self) -> usize {
        let before = self.population.len();
        let mut seen = HashSet::with_capacity(before);
        self.population.retain(|c| seen.insert(c.genes().to_vec()));
        before - self.population.len()
    }

    /// Tops the population up with distinct, repaired random candidates.
    fn fill_random(&mut self, rng: &mut Rng) {
        let problem = self.problem;
        let target = self.options.population_size;
        let excluded: Vec<usize> = problem.excluded_items().collect();
        let mut seen: HashSet<Vec<usize>> =
            self.population.iter().map(|c| c.genes().to_vec()).collect();
        let max_attempts = self.options.regeneration_attempt_factor * target;
        let mut attempts = 0;
        while self.population.len() < target && attempts < max_attempts {
            attempts += 1;
            let mut c = Candidate::random(problem, rng);
            prepare(&mut c, problem, &excluded, self.options.bucket_floor, rng);
            if seen.insert(c.genes().to_vec()) {
                self.population.push(c);
            }
        }
    }

    /// Runs the exclusion hook and the empty-bucket repair on every
    /// candidate that still needs evaluation. Runs before deduplication.
    fn prepare_unevaluated(&mut self, rng: &mut Rng) {
        let problem = self.problem;
        let excluded: Vec<usize> = problem.excluded_items().collect();
        for c in self.population.iter_mut().filter(|c| !c.has_fitness()) {
            prepare(c, problem, &excluded, self.options.bucket_floor, rng);
        }
    }

    /// Scores pending candidates in parallel and logs feasible ones to the
    /// known-good store. Returns the indices that were evaluated.
    fn evaluate_pending(&mut self, store: &mut dyn CheckpointStore) -> Vec<usize> {
        let problem = self.problem;
        let pending: Vec<usize> = self
            .population
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.has_fitness())
            .map(|(i, _)| i)
            .collect();

        self.population
            .par_iter_mut()
            .filter(|c| !c.has_fitness())
            .for_each(|c| c.evaluate(problem));

        let feasible: Vec<Vec<usize>> = pending
            .iter()
            .map(|&i| &self.population[i])
            .filter(|c| c.is_feasible())
            .map(|c| c.genes().to_vec())
            .collect();
        if !feasible.is_empty() {
            debug!("   -> {} new feasible allocations", feasible.len());
            warn_on_failure(
                "valid individuals",
                checkpoint::append_lines(store, checkpoint::VALID_INDIVIDUALS, &feasible),
            );
        }
        pending
    }

    /// Runs one generation and returns its record.
    pub fn step(&mut self, store: &mut dyn CheckpointStore, rng: &mut Rng) -> GenerationRecord {
        let problem = self.problem;
        let opts = self.options;
        let target = opts.population_size;
        self.generation += 1;
        let generation = self.generation;
        let mut counters = GenerationCounters::default();

        rng.shuffle(&mut self.population);

        // Crossover pass
        let pc = uniform_in(rng, opts.crossover_range);
        let cx_kind = opts.crossover.pick(rng).unwrap_or(CrossoverKind::BucketWise);
        let mut survivors = Vec::new();
        let mut crossed = 0;
        for pair in self.population.chunks_exact_mut(2) {
            if rng.f64() >= pc {
                continue;
            }
            let (left, right) = pair.split_at_mut(1);
            let (a, b) = (&mut left[0], &mut right[0]);
            if !a.has_fitness() || !b.has_fitness() {
                continue;
            }
            survivors.push(a.clone());
            survivors.push(b.clone());
            if cross(cx_kind, a, b, problem, &opts.variation, rng) {
                crossed += 1;
            }
        }
        self.population.append(&mut survivors);

        // Mutation pass
        let pm = uniform_in(rng, opts.mutation_range);
        let mut_kind = opts.mutation.pick(rng).unwrap_or(MutationKind::CombinedDeviation);
        let mut mutated = 0;
        for c in self.population.iter_mut() {
            if !c.has_fitness() || rng.f64() >= pm {
                continue;
            }
            survivors.push(c.clone());
            if mutate(mut_kind, c, problem, &opts.variation, rng) {
                mutated += 1;
            }
        }
        self.population.append(&mut survivors);
        debug!(
            "   -> gen {}: {} x{} (pc {:.2}), {} x{} (pm {:.2})",
            generation, cx_kind, crossed, pc, mut_kind, mutated, pm
        );

        self.prepare_unevaluated(rng);
        counters.duplicates_removed = self.deduplicate();
        counters.regenerated = self.regenerate(pc, pm, cx_kind, mut_kind, rng);

        counters.evaluated = self.evaluate_pending(store).len();

        let before = self.population.len();
        self.population
            .retain(|c| !c.objective().is_some_and(f64::is_nan));
        counters.nan_dropped = before - self.population.len();
        if counters.nan_dropped > 0 {
            warn!("⚠️  Dropped {} candidates with NaN objective", counters.nan_dropped);
        }

        let sel_kind = opts.selection.pick(rng).unwrap_or(SelectionKind::Truncation);
        let population = std::mem::take(&mut self.population);
        self.population =
            selection::select(sel_kind, population, target, opts.tournament_fraction, rng);

        let record = GenerationRecord::from_population(generation, &self.population, counters);
        self.history.push(record.clone());

        if let Some(first) = self.population.first() {
            if is_better(first, self.best.as_ref()) {
                self.best = Some(first.clone());
            }
        }

        info!(
            "🧬 Gen {:>4} | best {:.4} | mean {:.4} | feasible {}/{}",
            generation,
            record.min,
            record.mean,
            record.feasible,
            self.population.len()
        );

        self.persist_on_cadence(store);
        record
    }

    /// Refills the population toward its target from evaluated donors.
    fn regenerate(
        &mut self,
        pc: f64,
        pm: f64,
        cx_kind: CrossoverKind,
        mut_kind: MutationKind,
        rng: &mut Rng,
    ) -> usize {
        let problem = self.problem;
        let opts = self.options;
        let target = opts.population_size;
        if self.population.len() >= target {
            return 0;
        }

        let donors: Vec<usize> = self
            .population
            .iter()
            .enumerate()
            .filter(|(_, c)| c.has_fitness())
            .map(|(i, _)| i)
            .collect();
        if donors.is_empty() {
            debug!("   -> No donors left, population stays at {}", self.population.len());
            return 0;
        }

        let excluded: Vec<usize> = problem.excluded_items().collect();
        let mutate_threshold = if pc <= 0.0 {
            1.0
        } else {
            (2.0 / 3.0) * (pm / pc)
        };
        let mut seen: HashSet<Vec<usize>> =
            self.population.iter().map(|c| c.genes().to_vec()).collect();
        let max_attempts = opts.regeneration_attempt_factor * target;
        let mut attempts = 0;
        let mut added = 0;

        while self.population.len() < target && attempts < max_attempts {
            attempts += 1;
            let mut fresh = Vec::with_capacity(2);
            if donors.len() < 2 || rng.f64() < mutate_threshold {
                let mut c = self.population[donors[rng.usize(0..donors.len())]].clone();
                mutate(mut_kind, &mut c, problem, &opts.variation, rng);
                fresh.push(c);
            } else {
                let i = rng.usize(0..donors.len());
                let mut j = rng.usize(0..donors.len() - 1);
                if j >= i {
                    j += 1;
                }
                let mut a = self.population[donors[i]].clone();
                let mut b = self.population[donors[j]].clone();
                cross(cx_kind, &mut a, &mut b, problem, &opts.variation, rng);
                fresh.push(a);
                fresh.push(b);
            }

            for mut c in fresh {
                prepare(&mut c, problem, &excluded, opts.bucket_floor, rng);
                if self.population.len() < target && seen.insert(c.genes().to_vec()) {
                    self.population.push(c);
                    added += 1;
                }
            }
        }

        if self.population.len() < target {
            debug!(
                "   -> Regeneration stalled after {} attempts ({}/{})",
                attempts,
                self.population.len(),
                target
            );
        }
        added
    }

    fn best_record(&self) -> Option<BestRecord> {
        let best = self.best.as_ref()?;
        Some(BestRecord {
            generation: self.generation,
            objective: best.objective().unwrap_or(f64::NAN),
            feasible: best.is_feasible(),
            genes: best.genes().to_vec(),
        })
    }

    fn persist_best(&self, store: &mut dyn CheckpointStore) {
        if let Some(record) = self.best_record() {
            let text = report::render_report(self.problem, &record.genes);
            warn_on_failure(
                "best individual",
                checkpoint::append_json(
                    store,
                    checkpoint::BEST_INDIVIDUALS,
                    vec![record],
                    Some(self.options.best_capacity),
                ),
            );
            warn_on_failure(
                "report",
                checkpoint::save_text(store, checkpoint::REPORT, &text),
            );
        }
    }

    fn persist_population(&self, store: &mut dyn CheckpointStore) {
        let genes: Vec<&[usize]> = self.population.iter().map(Candidate::genes).collect();
        warn_on_failure(
            "population",
            checkpoint::save_json(store, checkpoint::POPULATION, &genes),
        );
    }

    fn persist_history(&self, store: &mut dyn CheckpointStore) {
        warn_on_failure(
            "history",
            checkpoint::save_json(store, checkpoint::HISTORY, &self.history),
        );
    }

    fn persist_on_cadence(&self, store: &mut dyn CheckpointStore) {
        let g = self.generation;
        if g % self.options.best_cadence.max(1) == 0 {
            self.persist_best(store);
        }
        if g % self.options.population_cadence.max(1) == 0 {
            self.persist_population(store);
        }
        if g % self.options.history_cadence.max(1) == 0 {
            self.persist_history(store);
        }
    }

    /// Save of every key, used at the end of a run. The best log is only
    /// appended when this generation did not already write it.
    pub fn persist_all(&self, store: &mut dyn CheckpointStore) {
        let g = self.generation;
        if g == 0 || g % self.options.best_cadence.max(1) != 0 {
            self.persist_best(store);
        }
        self.persist_population(store);
        self.persist_history(store);
    }
}

#[derive(Debug, Clone)]
pub struct EvolutionResult {
    pub best: Candidate,
    pub history: History,
    pub generations_run: usize,
}

pub struct Optimizer<'a> {
    problem: &'a Problem,
    options: EvolutionOptions,
}

impl<'a> Optimizer<'a> {
    pub fn new(problem: &'a Problem, options: EvolutionOptions) -> Self {
        Self { problem, options }
    }

    pub fn options(&self) -> &EvolutionOptions {
        &self.options
    }

    pub fn run<CB: ProgressCallback>(
        &self,
        store: &mut dyn CheckpointStore,
        rng: &mut Rng,
        callback: CB,
    ) -> AfResult<EvolutionResult> {
        let mut evo = Evolution::initialize(self.problem, &self.options, store, rng)?;
        info!(
            "🚀 Evolving {} candidates for {} generations",
            evo.population().len(),
            self.options.generations
        );

        let mut generations_run = 0;
        for _ in 0..self.options.generations {
            let record = evo.step(store, rng);
            generations_run += 1;
            if !callback.on_generation(&record, evo.best()) {
                info!("🛑 Stopped by callback at generation {}", record.generation);
                break;
            }
        }

        evo.persist_all(store);

        let best = evo
            .best()
            .cloned()
            .ok_or_else(|| AllocError::Validation("Population ended up empty".to_string()))?;
        if let Some(obj) = best.objective() {
            info!(
                "🏁 Best objective {:.4} ({})",
                obj,
                if best.is_feasible() { "feasible" } else { "infeasible" }
            );
        }

        Ok(EvolutionResult {
            best,
            history: evo.history().clone(),
            generations_run,
        })
    }
}
