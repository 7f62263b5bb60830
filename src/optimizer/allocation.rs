use super::Candidate;
use crate::problem::Problem;
use fastrand::Rng;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Direction {
    /// Pull unallocated items into the bucket.
    Into,
    /// Release bucket members to the null bucket.
    OutOf,
}

pub fn members(genes: &[usize], bucket: usize) -> Vec<usize> {
    genes
        .iter()
        .enumerate()
        .filter(|(_, &g)| g == bucket)
        .map(|(i, _)| i)
        .collect()
}

/// Item count per real bucket. Null-bucket genes are not counted.
pub fn occupancy(genes: &[usize], bucket_count: usize) -> Vec<usize> {
    let mut counts = vec![0usize; bucket_count];
    for &g in genes {
        if g < bucket_count {
            counts[g] += 1;
        }
    }
    counts
}

/// Unallocated items that may still be placed.
fn free_pool(problem: &Problem, genes: &[usize]) -> Vec<usize> {
    let null = problem.null_bucket();
    genes
        .iter()
        .enumerate()
        .filter(|(i, &g)| g == null && !problem.is_excluded(*i))
        .map(|(i, _)| i)
        .collect()
}

/// Moves up to `count` items into or out of `bucket`, sampled uniformly
/// without replacement. `OutOf` always leaves at least one member behind.
/// Returns how many items moved.
pub fn reassign(
    candidate: &mut Candidate,
    problem: &Problem,
    bucket: usize,
    count: usize,
    direction: Direction,
    rng: &mut Rng,
) -> usize {
    if bucket >= problem.bucket_count() || count == 0 {
        return 0;
    }

    let (mut pool, limit, dest) = match direction {
        Direction::Into => {
            let pool = free_pool(problem, candidate.genes());
            let limit = pool.len();
            (pool, limit, bucket)
        }
        Direction::OutOf => {
            let pool = members(candidate.genes(), bucket);
            let limit = pool.len().saturating_sub(1);
            (pool, limit, problem.null_bucket())
        }
    };

    let moved = count.min(limit);
    if moved == 0 {
        return 0;
    }

    rng.shuffle(&mut pool);
    let genes = candidate.genes_mut();
    for &item in &pool[..moved] {
        genes[item] = dest;
    }
    moved
}

/// Gives every empty real bucket `floor` items from the unallocated pool
/// (fewer when the pool runs dry). Returns the number of buckets repaired.
pub fn ensure_every_bucket_non_empty(
    candidate: &mut Candidate,
    problem: &Problem,
    floor: usize,
    rng: &mut Rng,
) -> usize {
    let counts = occupancy(candidate.genes(), problem.bucket_count());
    let mut repaired = 0;
    for (bucket, &n) in counts.iter().enumerate() {
        if n == 0 && reassign(candidate, problem, bucket, floor, Direction::Into, rng) > 0 {
            repaired += 1;
        }
    }
    repaired
}
