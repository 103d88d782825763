//! Output shaping: turns a merged table into the final [`OutputTable`].
//!
//! Steps run in a fixed order: validate, sort, project to the final columns,
//! post-process (interpolation, presence markers), drop empty rows, fill.

use std::cmp::Ordering;

use health_core::config::CombinationDescriptor;
use health_core::error::{CombineError, Result};
use health_core::table::{Cell, KeyedTable, OutputTable};
use tracing::debug;

/// Cell value treated as missing by interpolation.
const MISSING_SENTINEL: f64 = -1.0;

/// Shape `merged` according to the combination's output structure.
pub fn shape(merged: KeyedTable, combination: &CombinationDescriptor) -> Result<OutputTable> {
    let output = &combination.output;
    let missing = |column: &str| CombineError::MissingOutputColumn {
        combination: combination.name.clone(),
        column: column.to_string(),
    };

    let final_columns = if output.final_columns.is_empty() {
        merged.table.column_names()
    } else {
        output.final_columns.clone()
    };
    if let Some(column) = final_columns.iter().find(|c| !merged.table.has_column(c)) {
        return Err(missing(column.as_str()));
    }

    let sort_column = output.primary_sort.as_deref().unwrap_or(&merged.key);
    let order = match merged.table.column(sort_column) {
        Some(column) => sort_order(&column.cells, output.ascending),
        None => return Err(missing(sort_column)),
    };

    let mut table = merged.table;
    table.reorder(&order);
    let mut table = table.select(&final_columns);

    for name in &output.interpolate_columns {
        match table.column_mut(name) {
            Some(column) => interpolate(&mut column.cells),
            None => debug!(combination = %combination.name, column = %name, "interpolation column not in output"),
        }
    }
    for name in &output.presence_columns {
        match table.column_mut(name) {
            Some(column) => mark_presence(&mut column.cells),
            None => debug!(combination = %combination.name, column = %name, "presence column not in output"),
        }
    }

    let dropped = table.drop_empty_rows();
    if dropped > 0 {
        debug!(combination = %combination.name, dropped, "dropped empty rows");
    }

    Ok(OutputTable::from_table(
        combination.output_file.clone(),
        &table,
        &output.fill_token,
    ))
}

/// Stable row order for `cells`. Absent values go last in both directions.
pub fn sort_order(cells: &[Cell], ascending: bool) -> Vec<usize> {
    let mut order: Vec<usize> = (0..cells.len()).collect();
    order.sort_by(|&a, &b| match (&cells[a], &cells[b]) {
        (Cell::Absent, Cell::Absent) => Ordering::Equal,
        (Cell::Absent, _) => Ordering::Greater,
        (_, Cell::Absent) => Ordering::Less,
        (x, y) if ascending => x.cmp_present(y),
        (x, y) => y.cmp_present(x),
    });
    order
}

/// Linear interpolation over row order.
///
/// Absent cells and the `-1` sentinel are gaps; gaps before the first or after
/// the last known value stay absent. Numbers are rounded to two decimals.
pub fn interpolate(cells: &mut [Cell]) {
    let mut previous: Option<(usize, f64)> = None;

    for i in 0..cells.len() {
        let value = match &cells[i] {
            Cell::Number(n) if *n != MISSING_SENTINEL => *n,
            Cell::Number(_) => {
                cells[i] = Cell::Absent;
                continue;
            }
            _ => continue,
        };

        if let Some((start, from)) = previous {
            let span = (i - start) as f64;
            for (step, cell) in cells[start + 1..i].iter_mut().enumerate() {
                if cell.is_absent() {
                    let t = (step + 1) as f64 / span;
                    *cell = Cell::Number(round2(from + (value - from) * t));
                }
            }
        }
        cells[i] = Cell::Number(round2(value));
        previous = Some((i, value));
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Replace every present value with the marker `1`.
pub fn mark_presence(cells: &mut [Cell]) {
    for cell in cells.iter_mut().filter(|c| !c.is_absent()) {
        *cell = Cell::Number(1.0);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
