use super::Candidate;
use serde::{Deserialize, Serialize};

/// Per-generation counters gathered by the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationCounters {
    pub evaluated: usize,
    pub duplicates_removed: usize,
    pub regenerated: usize,
    pub nan_dropped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub generation: usize,
    pub min: f64,
    pub mean: f64,
    pub std: f64,
    pub max: f64,
    pub feasible: usize,
    #[serde(flatten)]
    pub counters: GenerationCounters,
}

impl GenerationRecord {
    /// Summarizes the objective sums of the evaluated members.
    pub fn from_population(
        generation: usize,
        population: &[Candidate],
        counters: GenerationCounters,
    ) -> Self {
        let values: Vec<f64> = population.iter().filter_map(Candidate::objective).collect();
        let feasible = population.iter().filter(|c| c.is_feasible()).count();

        let (min, mean, std, max) = if values.is_empty() {
            (f64::NAN, f64::NAN, f64::NAN, f64::NAN)
        } else {
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (min, mean, var.sqrt(), max)
        };

        Self {
            generation,
            min,
            mean,
            std,
            max,
            feasible,
            counters,
        }
    }
}

/// Append-only list of generation records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    records: Vec<GenerationRecord>,
}

impl History {
    pub fn push(&mut self, record: GenerationRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[GenerationRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&GenerationRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
