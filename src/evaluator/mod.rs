pub mod constraints;

pub use self::constraints::{check, ConstraintReport};

use crate::problem::{Category, Constraint, Problem, CONSTRAINT_COUNT};
use serde::{Deserialize, Serialize};

/// Scale applied to the signed deviations stored in the second half of a
/// fitness vector. Keeps them orders of magnitude below any squared term.
pub const TIE_BREAK_SCALE: f64 = 1e-12;

/// Per-bucket consolidation: category totals and signed deviations.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BucketRow {
    pub company: f64,
    pub external: f64,
    pub internal: f64,
    pub total: f64,
    /// `total - target`, `external - min_external`, `max_internal - internal`.
    pub deviations: [f64; CONSTRAINT_COUNT],
}

impl BucketRow {
    #[inline(always)]
    pub fn deviation(&self, constraint: Constraint) -> f64 {
        self.deviations[constraint.index()]
    }

    fn accumulate(&mut self, other: &BucketRow) {
        self.company += other.company;
        self.external += other.external;
        self.internal += other.internal;
        self.total += other.total;
        for k in 0..CONSTRAINT_COUNT {
            self.deviations[k] += other.deviations[k];
        }
    }
}

/// Consolidated view of one allocation. `rows` has one entry per real bucket;
/// `aggregate` is the column-sum row, kept for reporting only.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviationTable {
    pub rows: Vec<BucketRow>,
    pub aggregate: BucketRow,
    pub occupancy: Vec<usize>,
}

impl DeviationTable {
    /// Signed deviation with inactive constraints and unused maximum capacity
    /// forced to zero. This is what the objective squares.
    pub fn masked_deviation(&self, problem: &Problem, bucket: usize, constraint: Constraint) -> f64 {
        let b = &problem.buckets()[bucket];
        if !b.is_active(constraint) {
            return 0.0;
        }
        let d = self.rows[bucket].deviation(constraint);
        if constraint.is_maximum() && d > 0.0 {
            return 0.0;
        }
        d
    }
}

pub fn consolidate(problem: &Problem, genes: &[usize]) -> DeviationTable {
    let n_buckets = problem.bucket_count();
    let mut rows = vec![BucketRow::default(); n_buckets];
    let mut occupancy = vec![0usize; n_buckets];

    for (item, &g) in problem.items().iter().zip(genes) {
        if g >= n_buckets {
            continue;
        }
        occupancy[g] += 1;
        let row = &mut rows[g];
        match item.category {
            Category::Company => row.company += item.value,
            Category::External => row.external += item.value,
            Category::Internal => row.internal += item.value,
        }
    }

    let mut aggregate = BucketRow::default();
    for (row, bucket) in rows.iter_mut().zip(problem.buckets()) {
        row.total = row.company + row.external + row.internal;
        row.deviations = [
            row.total - bucket.target,
            row.external - bucket.min_external,
            bucket.max_internal - row.internal,
        ];
        aggregate.accumulate(row);
    }

    DeviationTable {
        rows,
        aggregate,
        occupancy,
    }
}

/// Objective vector of one candidate.
///
/// Layout is bucket-major: `[b0.target, b0.min_ext, b0.max_int, b1.target, ...]`
/// for the squared terms, followed by the same masked deviations multiplied by
/// [`TIE_BREAK_SCALE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fitness {
    pub values: Vec<f64>,
    pub feasible: bool,
}

impl Fitness {
    #[inline(always)]
    fn half(&self) -> usize {
        self.values.len() / 2
    }

    pub fn objective_terms(&self) -> &[f64] {
        &self.values[..self.half()]
    }

    /// Sum of the squared terms. Lower is better.
    pub fn objective(&self) -> f64 {
        self.objective_terms().iter().sum()
    }

    pub fn bucket_count(&self) -> usize {
        self.half() / CONSTRAINT_COUNT
    }

    /// Masked signed deviation recovered from the tie-break half.
    #[inline(always)]
    pub fn deviation(&self, bucket: usize, constraint: Constraint) -> f64 {
        self.values[self.half() + bucket * CONSTRAINT_COUNT + constraint.index()] / TIE_BREAK_SCALE
    }

    pub fn bucket_deviation_sum(&self, bucket: usize) -> f64 {
        Constraint::ALL
            .iter()
            .map(|&c| self.deviation(bucket, c))
            .sum()
    }
}

pub fn fitness_from_table(problem: &Problem, table: &DeviationTable, feasible: bool) -> Fitness {
    let n = problem.bucket_count() * CONSTRAINT_COUNT;
    let mut values = vec![0.0; 2 * n];

    for b in 0..problem.bucket_count() {
        for c in Constraint::ALL {
            let d = table.masked_deviation(problem, b, c);
            let k = b * CONSTRAINT_COUNT + c.index();
            values[k] = d * d;
            values[n + k] = d * TIE_BREAK_SCALE;
        }
    }

    Fitness { values, feasible }
}

/// Full evaluation: consolidation, feasibility, objective vector.
pub fn evaluate(problem: &Problem, genes: &[usize]) -> Fitness {
    let table = consolidate(problem, genes);
    let report = check(problem, &table);
    fitness_from_table(problem, &table, report.feasible)
}
