pub mod loader;

use crate::error::{AfResult, AllocError};
use std::collections::HashSet;
use strum_macros::{Display, EnumIter, EnumString};

/// Funding category of an item. `External` feeds the minimum-share
/// constraint, `Internal` the maximum-share constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum Category {
    #[strum(to_string = "Company", serialize = "empresa")]
    Company,
    #[strum(to_string = "External", serialize = "externo", serialize = "a")]
    External,
    #[strum(to_string = "Internal", serialize = "interno", serialize = "b")]
    Internal,
}

/// The three independent constraints every bucket carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Constraint {
    #[strum(to_string = "Target")]
    Target,
    #[strum(to_string = "MinExternal")]
    MinExternal,
    #[strum(to_string = "MaxInternal")]
    MaxInternal,
}

pub const CONSTRAINT_COUNT: usize = 3;

impl Constraint {
    pub const ALL: [Constraint; CONSTRAINT_COUNT] = [
        Constraint::Target,
        Constraint::MinExternal,
        Constraint::MaxInternal,
    ];

    #[inline(always)]
    pub fn index(self) -> usize {
        match self {
            Constraint::Target => 0,
            Constraint::MinExternal => 1,
            Constraint::MaxInternal => 2,
        }
    }

    #[inline(always)]
    pub fn is_maximum(self) -> bool {
        matches!(self, Constraint::MaxInternal)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: String,
    pub value: f64,
    pub category: Category,
    pub hint: Option<String>,
    pub included: bool,
}

impl Item {
    pub fn new(id: impl Into<String>, value: f64, category: Category) -> Self {
        Self {
            id: id.into(),
            value,
            category,
            hint: None,
            included: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub name: String,
    pub target: f64,
    pub min_external: f64,
    pub max_internal: f64,
}

impl Bucket {
    pub fn new(name: impl Into<String>, target: f64, min_external: f64, max_internal: f64) -> Self {
        Self {
            name: name.into(),
            target,
            min_external,
            max_internal,
        }
    }

    #[inline(always)]
    pub fn threshold(&self, constraint: Constraint) -> f64 {
        match constraint {
            Constraint::Target => self.target,
            Constraint::MinExternal => self.min_external,
            Constraint::MaxInternal => self.max_internal,
        }
    }

    /// A constraint is only enforced when its threshold is positive.
    #[inline(always)]
    pub fn is_active(&self, constraint: Constraint) -> bool {
        self.threshold(constraint) > 0.0
    }
}

/// Static, read-only tables for one run plus the exclusion mask.
#[derive(Debug, Clone)]
pub struct Problem {
    items: Vec<Item>,
    buckets: Vec<Bucket>,
    excluded: Vec<bool>,
}

impl Problem {
    pub fn new(items: Vec<Item>, buckets: Vec<Bucket>) -> AfResult<Self> {
        if items.is_empty() {
            return Err(AllocError::Validation("Item table is empty".to_string()));
        }
        if buckets.is_empty() {
            return Err(AllocError::Validation("Bucket table is empty".to_string()));
        }

        let mut names = HashSet::new();
        for b in &buckets {
            if b.name.trim().is_empty() {
                return Err(AllocError::Validation("Bucket with empty name".to_string()));
            }
            if !names.insert(b.name.as_str()) {
                return Err(AllocError::Validation(format!(
                    "Duplicate bucket name '{}'",
                    b.name
                )));
            }
            for c in Constraint::ALL {
                let t = b.threshold(c);
                if !t.is_finite() || t < 0.0 {
                    return Err(AllocError::Validation(format!(
                        "Bucket '{}' has invalid {} threshold {}",
                        b.name, c, t
                    )));
                }
            }
        }

        for item in &items {
            if !item.value.is_finite() || item.value < 0.0 {
                return Err(AllocError::Validation(format!(
                    "Item '{}' has invalid value {}",
                    item.id, item.value
                )));
            }
            if let Some(hint) = &item.hint {
                if !names.contains(hint.as_str()) {
                    return Err(AllocError::Validation(format!(
                        "Item '{}' hints unknown bucket '{}'",
                        item.id, hint
                    )));
                }
            }
        }

        let excluded = vec![false; items.len()];
        Ok(Self {
            items,
            buckets,
            excluded,
        })
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    #[inline(always)]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Number of real buckets (the null bucket is not counted).
    #[inline(always)]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Index of the sentinel bucket meaning "unallocated".
    #[inline(always)]
    pub fn null_bucket(&self) -> usize {
        self.buckets.len()
    }

    pub fn bucket_index(&self, name: &str) -> Option<usize> {
        self.buckets.iter().position(|b| b.name == name)
    }

    pub fn bucket_label(&self, idx: usize) -> &str {
        self.buckets.get(idx).map(|b| b.name.as_str()).unwrap_or("")
    }

    #[inline(always)]
    pub fn is_excluded(&self, item: usize) -> bool {
        self.excluded[item]
    }

    pub fn has_exclusions(&self) -> bool {
        self.excluded.iter().any(|&e| e)
    }

    pub fn excluded_items(&self) -> impl Iterator<Item = usize> + '_ {
        self.excluded
            .iter()
            .enumerate()
            .filter(|(_, &e)| e)
            .map(|(i, _)| i)
    }

    pub fn exclude(&mut self, item: usize) -> AfResult<()> {
        if item >= self.items.len() {
            return Err(AllocError::Validation(format!(
                "Cannot exclude item #{}: only {} items",
                item,
                self.items.len()
            )));
        }
        self.excluded[item] = true;
        Ok(())
    }

    /// Marks every item whose `included` flag is false as excluded.
    /// Returns how many items are excluded afterwards.
    pub fn honor_exclusions(&mut self) -> usize {
        for (i, item) in self.items.iter().enumerate() {
            if !item.included {
                self.excluded[i] = true;
            }
        }
        self.excluded.iter().filter(|&&e| e).count()
    }

    /// Allocation built from the items' bucket hints. Items without a hint
    /// (and excluded items) land in the null bucket.
    pub fn hinted_genes(&self) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                if self.excluded[i] {
                    return self.null_bucket();
                }
                item.hint
                    .as_deref()
                    .and_then(|h| self.bucket_index(h))
                    .unwrap_or(self.null_bucket())
            })
            .collect()
    }

    pub fn has_hints(&self) -> bool {
        self.items.iter().any(|i| i.hint.is_some())
    }

    /// Checks an externally supplied sequence (e.g. from a checkpoint).
    pub fn validate_genes(&self, genes: &[usize]) -> AfResult<()> {
        if genes.len() != self.items.len() {
            return Err(AllocError::Validation(format!(
                "Allocation has {} genes, expected {}",
                genes.len(),
                self.items.len()
            )));
        }
        if let Some((i, &g)) = genes
            .iter()
            .enumerate()
            .find(|(_, &g)| g > self.null_bucket())
        {
            return Err(AllocError::Validation(format!(
                "Gene #{} references bucket {} (max {})",
                i,
                g,
                self.null_bucket()
            )));
        }
        Ok(())
    }
}
