use super::Candidate;
use fastrand::Rng;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
pub enum SelectionKind {
    Truncation,
    Tournament,
}

#[inline(always)]
fn sort_key(c: &Candidate) -> f64 {
    c.objective().unwrap_or(f64::INFINITY)
}

/// Stable ascending sort by objective. Unevaluated candidates sink to the end.
pub fn rank(population: &mut [Candidate]) {
    population.sort_by(|a, b| sort_key(a).total_cmp(&sort_key(b)));
}

/// Returns at most `k` candidates sorted ascending by objective.
pub fn select(
    kind: SelectionKind,
    mut population: Vec<Candidate>,
    k: usize,
    tournament_fraction: f64,
    rng: &mut Rng,
) -> Vec<Candidate> {
    rank(&mut population);
    match kind {
        SelectionKind::Truncation => {
            population.truncate(k);
            population
        }
        SelectionKind::Tournament => tournament(population, k, tournament_fraction, rng),
    }
}

/// Each round draws `window` ranks with replacement and keeps the best one.
fn tournament(ranked: Vec<Candidate>, k: usize, fraction: f64, rng: &mut Rng) -> Vec<Candidate> {
    let n = ranked.len();
    if n == 0 {
        return ranked;
    }
    let window = ((fraction * n as f64).floor() as usize).max(1);
    let rounds = k.min(n);

    let mut winners: Vec<usize> = (0..rounds)
        .map(|_| {
            (0..window)
                .map(|_| rng.usize(0..n))
                .min()
                .unwrap_or(0)
        })
        .collect();
    winners.sort_unstable();

    winners.into_iter().map(|i| ranked[i].clone()).collect()
}
