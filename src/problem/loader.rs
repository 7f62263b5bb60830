use super::{Bucket, Category, Item, Problem};
use crate::error::{AfResult, AllocError};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct ItemRecord {
    id: String,
    value: f64,
    category: String,
    #[serde(default, alias = "hint", alias = "contract")]
    bucket: Option<String>,
    #[serde(default)]
    included: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct BucketRecord {
    name: String,
    #[serde(alias = "obligation")]
    target: f64,
    #[serde(alias = "min_a")]
    min_external: f64,
    #[serde(alias = "max_b")]
    max_internal: f64,
}

pub fn read_items<R: Read>(reader: R) -> AfResult<Vec<Item>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut items = Vec::new();
    for (row_idx, result) in rdr.deserialize::<ItemRecord>().enumerate() {
        let rec = result?;
        let category = Category::from_str(&rec.category).map_err(|_| {
            AllocError::Validation(format!(
                "[Row {}] Unknown category '{}' for item '{}'",
                row_idx + 1,
                rec.category,
                rec.id
            ))
        })?;
        let hint = rec.bucket.filter(|b| !b.is_empty());

        items.push(Item {
            id: rec.id,
            value: rec.value,
            category,
            hint,
            included: rec.included.unwrap_or(true),
        });
    }

    debug!("   -> Parsed {} items", items.len());
    Ok(items)
}

pub fn read_buckets<R: Read>(reader: R) -> AfResult<Vec<Bucket>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut buckets = Vec::new();
    for result in rdr.deserialize::<BucketRecord>() {
        let rec = result?;
        buckets.push(Bucket::new(
            rec.name,
            rec.target,
            rec.min_external,
            rec.max_internal,
        ));
    }

    debug!("   -> Parsed {} buckets", buckets.len());
    Ok(buckets)
}

pub fn load_items<P: AsRef<Path>>(path: P) -> AfResult<Vec<Item>> {
    let path = path.as_ref();
    info!("📂 Loading Items: {}", path.display());
    let file = File::open(path).map_err(|e| {
        AllocError::Config(format!(
            "Could not open item table at '{}': {}",
            path.display(),
            e
        ))
    })?;
    read_items(file)
}

pub fn load_buckets<P: AsRef<Path>>(path: P) -> AfResult<Vec<Bucket>> {
    let path = path.as_ref();
    info!("📂 Loading Buckets: {}", path.display());
    let file = File::open(path).map_err(|e| {
        AllocError::Config(format!(
            "Could not open bucket table at '{}': {}",
            path.display(),
            e
        ))
    })?;
    read_buckets(file)
}

/// Loads and validates both tables into a `Problem`.
pub fn load_problem<P: AsRef<Path>, Q: AsRef<Path>>(
    items_path: P,
    buckets_path: Q,
) -> AfResult<Problem> {
    let items = load_items(items_path)?;
    let buckets = load_buckets(buckets_path)?;
    let problem = Problem::new(items, buckets)?;
    info!(
        "   -> {} items across {} buckets (+ unallocated)",
        problem.item_count(),
        problem.bucket_count()
    );
    Ok(problem)
}
