use crate::error::AfResult;
use crate::evaluator::{self, BucketRow};
use crate::problem::{Constraint, Problem};
use comfy_table::presets::ASCII_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use serde::Serialize;
use std::path::Path;

fn flag(ok: bool) -> Cell {
    if ok {
        Cell::new("yes").fg(Color::Green)
    } else {
        Cell::new("NO").fg(Color::Red)
    }
}

fn money(v: f64) -> Cell {
    Cell::new(format!("{:.2}", v))
}

fn row_cells(label: &str, row: &BucketRow, ok: bool, bold: bool) -> Vec<Cell> {
    let mut name = Cell::new(label);
    if bold {
        name = name.add_attribute(Attribute::Bold);
    }
    vec![
        name,
        money(row.company),
        money(row.external),
        money(row.internal),
        money(row.total).fg(Color::Cyan),
        money(row.deviation(Constraint::Target)),
        money(row.deviation(Constraint::MinExternal)),
        money(row.deviation(Constraint::MaxInternal)),
        flag(ok),
    ]
}

/// Consolidation table per bucket plus the item assignment table.
pub fn render_report(problem: &Problem, genes: &[usize]) -> String {
    let table = evaluator::consolidate(problem, genes);
    let report = evaluator::check(problem, &table);
    let fitness = evaluator::fitness_from_table(problem, &table, report.feasible);

    let mut buckets = Table::new();
    buckets
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    buckets.set_header(vec![
        Cell::new("Bucket").add_attribute(Attribute::Bold),
        Cell::new("Company"),
        Cell::new("External"),
        Cell::new("Internal"),
        Cell::new("Total").fg(Color::Cyan),
        Cell::new("Dev Target"),
        Cell::new("Dev MinExt"),
        Cell::new("Dev MaxInt"),
        Cell::new("OK"),
    ]);
    for i in 1..=7 {
        if let Some(col) = buckets.column_mut(i) {
            col.set_cell_alignment(CellAlignment::Right);
        }
    }

    for (b, bucket) in problem.buckets().iter().enumerate() {
        buckets.add_row(row_cells(
            &bucket.name,
            &table.rows[b],
            report.bucket_feasible[b],
            false,
        ));
    }
    buckets.add_row(row_cells(
        "TOTAL",
        &table.aggregate,
        report.aggregate_feasible,
        true,
    ));

    let mut items = Table::new();
    items
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    items.set_header(vec![
        Cell::new("Item").add_attribute(Attribute::Bold),
        Cell::new("Value"),
        Cell::new("Category"),
        Cell::new("Bucket"),
    ]);
    if let Some(col) = items.column_mut(1) {
        col.set_cell_alignment(CellAlignment::Right);
    }
    for (item, &g) in problem.items().iter().zip(genes) {
        let label = problem.bucket_label(g);
        items.add_row(vec![
            Cell::new(&item.id),
            money(item.value),
            Cell::new(item.category.to_string()),
            if label.is_empty() {
                Cell::new("-").fg(Color::DarkGrey)
            } else {
                Cell::new(label)
            },
        ]);
    }

    let unallocated = genes.iter().filter(|&&g| g == problem.null_bucket()).count();
    format!(
        "{}\n\n{}\nObjective: {:.4}\nFeasible: {}\nUnallocated: {}\n",
        buckets,
        items,
        fitness.objective(),
        if report.feasible { "yes" } else { "no" },
        unallocated
    )
}

#[derive(Debug, Serialize)]
struct AllocationRow<'a> {
    id: &'a str,
    value: f64,
    category: String,
    bucket: &'a str,
}

/// One row per item; unallocated items get an empty bucket column.
pub fn write_allocation_csv<P: AsRef<Path>>(
    path: P,
    problem: &Problem,
    genes: &[usize],
) -> AfResult<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for (item, &g) in problem.items().iter().zip(genes) {
        wtr.serialize(AllocationRow {
            id: &item.id,
            value: item.value,
            category: item.category.to_string(),
            bucket: problem.bucket_label(g),
        })?;
    }
    wtr.flush()?;
    Ok(())
}
