use super::{uniform_in, Candidate, VariationParams};
use crate::problem::Problem;
use fastrand::Rng;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
pub enum CrossoverKind {
    BucketWise,
    OnePoint,
    TwoPoint,
    Uniform,
}

/// Recombines `a` and `b` in place; both end up as children with cleared
/// fitness. Parents without fitness are left untouched and `false` is
/// returned.
pub fn cross(
    kind: CrossoverKind,
    a: &mut Candidate,
    b: &mut Candidate,
    problem: &Problem,
    params: &VariationParams,
    rng: &mut Rng,
) -> bool {
    if !a.has_fitness() || !b.has_fitness() {
        return false;
    }
    match kind {
        CrossoverKind::BucketWise => bucket_wise(a, b, problem, rng),
        CrossoverKind::OnePoint => one_point(a, b, rng),
        CrossoverKind::TwoPoint => two_point(a, b, rng),
        CrossoverKind::Uniform => uniform(a, b, params, rng),
    }
    true
}

/// Per bucket, the parent with the lower summed deviation wins (ties go to
/// `b`). Buckets are walked worst-first for the first child and in random
/// order for the second; each visit copies the winner's members of that
/// bucket into the child. Later visits overwrite earlier ones.
fn bucket_wise(a: &mut Candidate, b: &mut Candidate, problem: &Problem, rng: &mut Rng) {
    let (fa, fb) = match (a.fitness(), b.fitness()) {
        (Some(fa), Some(fb)) => (fa, fb),
        _ => return,
    };

    // (bucket, ranking key, a wins)
    let mut ranked: Vec<(usize, f64, bool)> = (0..problem.bucket_count())
        .map(|bucket| {
            let d1 = fa.bucket_deviation_sum(bucket);
            let d2 = fb.bucket_deviation_sum(bucket);
            (bucket, d1.min(d2), d1 < d2)
        })
        .collect();
    ranked.sort_by(|x, y| y.1.total_cmp(&x.1));

    let mut shuffled = ranked.clone();
    rng.shuffle(&mut shuffled);

    let genes_a = a.genes().to_vec();
    let genes_b = b.genes().to_vec();

    let walk = |start: &[usize], order: &[(usize, f64, bool)]| {
        let mut child = start.to_vec();
        for &(bucket, _, a_wins) in order {
            let winner = if a_wins { &genes_a } else { &genes_b };
            for (item, &g) in winner.iter().enumerate() {
                if g == bucket {
                    child[item] = bucket;
                }
            }
        }
        child
    };

    let child1 = walk(&genes_a, &ranked);
    let child2 = walk(&genes_b, &shuffled);
    a.set_genes(child1);
    b.set_genes(child2);
}

fn swap_range(a: &mut Candidate, b: &mut Candidate, start: usize, end: usize) {
    let ga = a.genes_mut();
    let gb = b.genes_mut();
    for i in start..end {
        std::mem::swap(&mut ga[i], &mut gb[i]);
    }
}

fn one_point(a: &mut Candidate, b: &mut Candidate, rng: &mut Rng) {
    let len = a.genes().len().min(b.genes().len());
    if len < 2 {
        a.invalidate();
        b.invalidate();
        return;
    }
    let point = rng.usize(1..len);
    swap_range(a, b, point, len);
}

fn two_point(a: &mut Candidate, b: &mut Candidate, rng: &mut Rng) {
    let len = a.genes().len().min(b.genes().len());
    if len < 2 {
        a.invalidate();
        b.invalidate();
        return;
    }
    let mut p1 = rng.usize(0..len);
    let mut p2 = rng.usize(0..len);
    if p1 > p2 {
        std::mem::swap(&mut p1, &mut p2);
    }
    swap_range(a, b, p1, p2 + 1);
}

fn uniform(a: &mut Candidate, b: &mut Candidate, params: &VariationParams, rng: &mut Rng) {
    let p = uniform_in(rng, params.swap_probability);
    let ga = a.genes_mut();
    let gb = b.genes_mut();
    for (x, y) in ga.iter_mut().zip(gb.iter_mut()) {
        if rng.f64() < p {
            std::mem::swap(x, y);
        }
    }
}
