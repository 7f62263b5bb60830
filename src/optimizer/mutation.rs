use super::allocation::{self, Direction};
use super::{uniform_in, Candidate, VariationParams};
use crate::evaluator::Fitness;
use crate::problem::{Constraint, Problem};
use fastrand::Rng;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
pub enum MutationKind {
    /// Rebalance on one randomly chosen constraint.
    ConstraintFocused,
    /// Rebalance on `total + external - internal` deviations.
    CombinedDeviation,
    ShuffleIndexes,
    UniformInt,
}

/// Mutates `candidate` in place and clears its fitness. Without fitness the
/// candidate is left untouched and `false` is returned.
pub fn mutate(
    kind: MutationKind,
    candidate: &mut Candidate,
    problem: &Problem,
    params: &VariationParams,
    rng: &mut Rng,
) -> bool {
    if !candidate.has_fitness() {
        return false;
    }
    match kind {
        MutationKind::ConstraintFocused => {
            let constraint = Constraint::ALL[rng.usize(0..Constraint::ALL.len())];
            return rebalance_on(constraint, candidate, problem, params, rng);
        }
        MutationKind::CombinedDeviation => {
            let keys = candidate
                .fitness()
                .map(|f| combined_keys(f, problem.bucket_count()))
                .unwrap_or_default();
            rebalance(candidate, problem, &keys, params, rng);
        }
        MutationKind::ShuffleIndexes => shuffle_indexes(candidate, params, rng),
        MutationKind::UniformInt => uniform_int(candidate, problem, params, rng),
    }
    candidate.invalidate();
    true
}

/// Rebalancing walk keyed on a single constraint.
pub fn rebalance_on(
    constraint: Constraint,
    candidate: &mut Candidate,
    problem: &Problem,
    params: &VariationParams,
    rng: &mut Rng,
) -> bool {
    let keys = match candidate.fitness() {
        Some(f) => constraint_keys(f, problem.bucket_count(), constraint),
        None => return false,
    };
    rebalance(candidate, problem, &keys, params, rng);
    candidate.invalidate();
    true
}

/// Positive key = bucket overshoots on the constraint.
pub fn constraint_keys(fitness: &Fitness, bucket_count: usize, constraint: Constraint) -> Vec<f64> {
    let sign = if constraint.is_maximum() { -1.0 } else { 1.0 };
    (0..bucket_count)
        .map(|b| sign * fitness.deviation(b, constraint))
        .collect()
}

pub fn combined_keys(fitness: &Fitness, bucket_count: usize) -> Vec<f64> {
    (0..bucket_count)
        .map(|b| {
            fitness.deviation(b, Constraint::Target) + fitness.deviation(b, Constraint::MinExternal)
                - fitness.deviation(b, Constraint::MaxInternal)
        })
        .collect()
}

/// Walks buckets from the largest key down. Overshooting buckets release a
/// share of their members, undershooting ones pull from the unallocated pool.
/// One impact rate is drawn for the whole walk.
fn rebalance(
    candidate: &mut Candidate,
    problem: &Problem,
    keys: &[f64],
    params: &VariationParams,
    rng: &mut Rng,
) {
    let rate = uniform_in(rng, params.impact);

    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by(|&x, &y| keys[y].total_cmp(&keys[x]));

    for bucket in order {
        let key = keys[bucket];
        let direction = if key > 0.0 {
            Direction::OutOf
        } else if key < 0.0 {
            Direction::Into
        } else {
            continue;
        };
        let occupancy = allocation::members(candidate.genes(), bucket).len();
        let count = ((rate * occupancy as f64).floor() as usize).max(1);
        allocation::reassign(candidate, problem, bucket, count, direction, rng);
    }
}

fn shuffle_indexes(candidate: &mut Candidate, params: &VariationParams, rng: &mut Rng) {
    let p = uniform_in(rng, params.gene_probability);
    let genes = candidate.genes_mut();
    let len = genes.len();
    for i in 0..len {
        if rng.f64() < p {
            let j = rng.usize(0..len);
            genes.swap(i, j);
        }
    }
}

fn uniform_int(
    candidate: &mut Candidate,
    problem: &Problem,
    params: &VariationParams,
    rng: &mut Rng,
) {
    let p = uniform_in(rng, params.gene_probability);
    let null = problem.null_bucket();
    for g in candidate.genes_mut().iter_mut() {
        if rng.f64() < p {
            *g = rng.usize(0..=null);
        }
    }
}
