use super::DeviationTable;
use crate::problem::{Constraint, Problem, CONSTRAINT_COUNT};

/// Outcome of checking one consolidated allocation against every bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintReport {
    pub feasible: bool,
    /// Per bucket: which of the three constraints carry a positive threshold.
    pub active: Vec<[bool; CONSTRAINT_COUNT]>,
    pub bucket_feasible: Vec<bool>,
    /// Mirrors `feasible`; the aggregate row is never judged on its own.
    pub aggregate_feasible: bool,
}

/// A constraint holds when it is inactive or its signed deviation is
/// non-negative. Unmasked deviations are used: spare capacity counts as met.
pub fn check(problem: &Problem, table: &DeviationTable) -> ConstraintReport {
    let mut active = Vec::with_capacity(problem.bucket_count());
    let mut bucket_feasible = Vec::with_capacity(problem.bucket_count());

    for (bucket, row) in problem.buckets().iter().zip(&table.rows) {
        let flags = Constraint::ALL.map(|c| bucket.is_active(c));
        let ok = Constraint::ALL
            .iter()
            .all(|&c| !flags[c.index()] || row.deviation(c) >= 0.0);
        active.push(flags);
        bucket_feasible.push(ok);
    }

    let feasible = bucket_feasible.iter().all(|&ok| ok);
    ConstraintReport {
        feasible,
        active,
        bucket_feasible,
        aggregate_feasible: feasible,
    }
}
