pub mod allocation;
pub mod crossover;
pub mod mutation;
pub mod runner;
pub mod selection;
pub mod stats;

pub use self::crossover::CrossoverKind;
pub use self::mutation::MutationKind;
pub use self::runner::{
    Evolution, EvolutionOptions, EvolutionResult, Optimizer, ProgressCallback, Silent,
};
pub use self::selection::SelectionKind;

use crate::evaluator::{self, Fitness};
use crate::problem::Problem;
use fastrand::Rng;
use std::hash::{Hash, Hasher};

/// One allocation: `genes[item]` is a bucket index, `bucket_count` meaning
/// unallocated. Equality and hashing look at the genes only.
#[derive(Debug, Clone)]
pub struct Candidate {
    genes: Vec<usize>,
    fitness: Option<Fitness>,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.genes == other.genes
    }
}

impl Eq for Candidate {}

impl Hash for Candidate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.genes.hash(state);
    }
}

impl Candidate {
    pub fn from_genes(genes: Vec<usize>) -> Self {
        Self {
            genes,
            fitness: None,
        }
    }

    /// Uniform draw over `[0, bucket_count]` per item. Excluded items start
    /// unallocated.
    pub fn random(problem: &Problem, rng: &mut Rng) -> Self {
        let null = problem.null_bucket();
        let genes = (0..problem.item_count())
            .map(|i| {
                if problem.is_excluded(i) {
                    null
                } else {
                    rng.usize(0..=null)
                }
            })
            .collect();
        Self::from_genes(genes)
    }

    #[inline(always)]
    pub fn genes(&self) -> &[usize] {
        &self.genes
    }

    /// Mutable access to the genes. Clears the fitness.
    pub fn genes_mut(&mut self) -> &mut Vec<usize> {
        self.fitness = None;
        &mut self.genes
    }

    pub fn set_genes(&mut self, genes: Vec<usize>) {
        self.fitness = None;
        self.genes = genes;
    }

    pub fn into_genes(self) -> Vec<usize> {
        self.genes
    }

    pub fn fitness(&self) -> Option<&Fitness> {
        self.fitness.as_ref()
    }

    #[inline(always)]
    pub fn has_fitness(&self) -> bool {
        self.fitness.is_some()
    }

    pub fn objective(&self) -> Option<f64> {
        self.fitness.as_ref().map(Fitness::objective)
    }

    pub fn is_feasible(&self) -> bool {
        self.fitness.as_ref().is_some_and(|f| f.feasible)
    }

    pub fn invalidate(&mut self) {
        self.fitness = None;
    }

    pub fn evaluate(&mut self, problem: &Problem) {
        self.fitness = Some(evaluator::evaluate(problem, &self.genes));
    }
}

/// Knobs shared by the variation operators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariationParams {
    pub impact: (f64, f64),
    pub gene_probability: (f64, f64),
    pub swap_probability: (f64, f64),
}

impl Default for VariationParams {
    fn default() -> Self {
        Self {
            impact: (0.01, 0.30),
            gene_probability: (0.1, 0.9),
            swap_probability: (0.2, 0.9),
        }
    }
}

#[inline(always)]
pub(crate) fn uniform_in(rng: &mut Rng, (lo, hi): (f64, f64)) -> f64 {
    lo + rng.f64() * (hi - lo)
}

/// Named strategies with relative weights; one is drawn per generation.
#[derive(Debug, Clone)]
pub struct Registry<K> {
    entries: Vec<(K, f64)>,
    total_weight: f64,
}

impl<K: Copy> Registry<K> {
    pub fn new(entries: Vec<(K, f64)>) -> Self {
        let entries: Vec<(K, f64)> = entries
            .into_iter()
            .map(|(k, w)| (k, if w.is_finite() { w.max(0.0) } else { 0.0 }))
            .collect();
        let total_weight = entries.iter().map(|(_, w)| w).sum();
        Self {
            entries,
            total_weight,
        }
    }

    pub fn entries(&self) -> &[(K, f64)] {
        &self.entries
    }

    /// Weighted draw. Falls back to a uniform draw when every weight is zero.
    /// Returns `None` only for an empty registry.
    pub fn pick(&self, rng: &mut Rng) -> Option<K> {
        if self.entries.is_empty() {
            return None;
        }
        if self.total_weight <= 0.0 {
            return Some(self.entries[rng.usize(0..self.entries.len())].0);
        }

        let target = rng.f64() * self.total_weight;
        let mut current = 0.0;
        for &(kind, w) in &self.entries {
            if w <= 0.0 {
                continue;
            }
            current += w;
            if current >= target {
                return Some(kind);
            }
        }
        // Float rounding
        self.entries
            .iter()
            .rev()
            .find(|(_, w)| *w > 0.0)
            .map(|(k, _)| *k)
    }
}
