//! Merge planning: a full outer join on exact merge-key equality.
//!
//! Joining is split into planning (which row pairs make up the output) and
//! application (materializing columns from the plan), so the row layout can
//! be inspected and tested without building tables.

use std::collections::HashMap;

use health_core::error::{CombineError, Result};
use health_core::table::{Cell, Column, JoinKey, KeyedTable, Table};
use tracing::debug;

// ── Plan ──────────────────────────────────────────────────────────────────────

/// Output rows as `(accumulator row, incoming row)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinPlan {
    pub rows: Vec<(Option<usize>, Option<usize>)>,
}

impl JoinPlan {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn left_indices(&self) -> Vec<Option<usize>> {
        self.rows.iter().map(|(l, _)| *l).collect()
    }

    fn right_indices(&self) -> Vec<Option<usize>> {
        self.rows.iter().map(|(_, r)| *r).collect()
    }
}

/// Plan a full outer join of two key columns.
///
/// Every left row in order, paired with each matching right row in right
/// order (or with nothing), then every right row that matched nothing.
/// Absent keys never match.
pub fn plan_join(left: &[Cell], right: &[Cell]) -> JoinPlan {
    let mut index: HashMap<JoinKey, Vec<usize>> = HashMap::new();
    for (i, cell) in right.iter().enumerate() {
        if let Some(key) = cell.join_key() {
            index.entry(key).or_default().push(i);
        }
    }

    let mut matched = vec![false; right.len()];
    let mut rows = Vec::with_capacity(left.len().max(right.len()));

    for (l, cell) in left.iter().enumerate() {
        match cell.join_key().and_then(|key| index.get(&key)) {
            Some(hits) => {
                for &r in hits {
                    matched[r] = true;
                    rows.push((Some(l), Some(r)));
                }
            }
            None => rows.push((Some(l), None)),
        }
    }

    rows.extend(
        matched
            .iter()
            .enumerate()
            .filter(|(_, hit)| !**hit)
            .map(|(r, _)| (None, Some(r))),
    );

    JoinPlan { rows }
}

// ── Merge ─────────────────────────────────────────────────────────────────────

/// Fold `incoming` into the accumulator.
///
/// The first table seeds the accumulator unchanged. Afterwards the
/// accumulator's key name is canonical, and the output columns are the key,
/// the accumulator's other columns, then the incoming ones.
pub fn merge(
    accumulator: Option<KeyedTable>,
    incoming: KeyedTable,
    source_name: &str,
) -> Result<KeyedTable> {
    let Some(acc) = accumulator else {
        return Ok(incoming);
    };

    let incoming = reconcile_key(&acc.key, incoming, source_name)?;

    // Collisions are rejected before any row work.
    for column in incoming.value_columns() {
        if acc.table.has_column(&column.name) {
            return Err(CombineError::ColumnCollision {
                source_name: source_name.to_string(),
                column: column.name.clone(),
            });
        }
    }

    let (Some(left_key), Some(right_key)) = (acc.key_column(), incoming.key_column()) else {
        return Err(CombineError::ColumnNotFound {
            source_name: source_name.to_string(),
            column: acc.key.clone(),
            candidates: Vec::new(),
        });
    };

    let plan = plan_join(&left_key.cells, &right_key.cells);
    let key_cells = plan
        .rows
        .iter()
        .map(|pair| match pair {
            (Some(l), _) => left_key.cells[*l].clone(),
            (None, Some(r)) => right_key.cells[*r].clone(),
            (None, None) => Cell::Absent,
        })
        .collect();

    let left_rows = plan.left_indices();
    let right_rows = plan.right_indices();

    let mut columns = Vec::with_capacity(acc.table.column_count() + incoming.table.column_count());
    columns.push(Column::new(acc.key.clone(), key_cells));
    columns.extend(acc.value_columns().map(|c| c.take(&left_rows)));
    columns.extend(incoming.value_columns().map(|c| c.take(&right_rows)));

    debug!(
        source = source_name,
        left = acc.row_count(),
        right = incoming.row_count(),
        rows = plan.len(),
        "merged source"
    );

    Ok(KeyedTable::new(acc.key, Table::from_columns(columns)))
}

/// Rename the incoming key to the canonical name when the aliases differ.
fn reconcile_key(canonical: &str, incoming: KeyedTable, source_name: &str) -> Result<KeyedTable> {
    if incoming.key == canonical {
        return Ok(incoming);
    }
    if incoming.table.has_column(canonical) {
        return Err(CombineError::ColumnCollision {
            source_name: source_name.to_string(),
            column: canonical.to_string(),
        });
    }

    let KeyedTable { key, mut table } = incoming;
    if let Some(column) = table.column_mut(&key) {
        column.name = canonical.to_string();
    }
    debug!(source = source_name, from = %key, to = canonical, "reconciled merge key alias");
    Ok(KeyedTable::new(canonical, table))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(key: &str, columns: Vec<(&str, Vec<Cell>)>) -> KeyedTable {
        KeyedTable::new(
            key,
            Table::from_columns(
                columns
                    .into_iter()
                    .map(|(name, cells)| Column::new(name, cells))
                    .collect(),
            ),
        )
    }

    fn nums(values: &[f64]) -> Vec<Cell> {
        values.iter().map(|v| Cell::Number(*v)).collect()
    }

    #[test]
    fn test_first_table_seeds_accumulator() {
        let table = keyed("k", vec![("k", nums(&[1.0])), ("a", nums(&[10.0]))]);
        let merged = merge(None, table.clone(), "a").unwrap();
        assert_eq!(merged, table);
    }

    #[test]
    fn test_full_outer_join() {
        let left = keyed("k", vec![("k", nums(&[1.0, 2.0, 3.0])), ("a", nums(&[10.0, 20.0, 30.0]))]);
        let right = keyed("k", vec![("k", nums(&[2.0, 3.0, 4.0])), ("b", nums(&[200.0, 300.0, 400.0]))]);

        let merged = merge(Some(left), right, "b").unwrap();
        assert_eq!(merged.table.column_names(), vec!["k", "a", "b"]);
        assert_eq!(merged.key_column().unwrap().cells, nums(&[1.0, 2.0, 3.0, 4.0]));
        assert_eq!(
            merged.table.column("a").unwrap().cells,
            vec![Cell::Number(10.0), Cell::Number(20.0), Cell::Number(30.0), Cell::Absent]
        );
        assert_eq!(
            merged.table.column("b").unwrap().cells,
            vec![Cell::Absent, Cell::Number(200.0), Cell::Number(300.0), Cell::Number(400.0)]
        );
    }

    #[test]
    fn test_duplicate_keys_cross_product() {
        let plan = plan_join(&nums(&[1.0, 1.0]), &nums(&[1.0, 2.0, 1.0]));
        assert_eq!(
            plan.rows,
            vec![
                (Some(0), Some(0)),
                (Some(0), Some(2)),
                (Some(1), Some(0)),
                (Some(1), Some(2)),
                (None, Some(1)),
            ]
        );
    }

    #[test]
    fn test_absent_keys_never_match() {
        let plan = plan_join(&[Cell::Absent, Cell::from("x")], &[Cell::Absent, Cell::from("x")]);
        assert_eq!(
            plan.rows,
            vec![(Some(0), None), (Some(1), Some(1)), (None, Some(0))]
        );
    }

    #[test]
    fn test_unmatched_incoming_rows_keep_order() {
        let plan = plan_join(&nums(&[9.0]), &nums(&[3.0, 1.0, 2.0]));
        assert_eq!(
            plan.rows,
            vec![(Some(0), None), (None, Some(0)), (None, Some(1)), (None, Some(2))]
        );
    }

    #[test]
    fn test_same_named_columns_collide() {
        let left = keyed("date", vec![("date", nums(&[1.0])), ("value", nums(&[1.0]))]);
        let right = keyed("date", vec![("date", nums(&[1.0])), ("value", nums(&[2.0]))]);

        let err = merge(Some(left), right, "weight").unwrap_err();
        match err {
            CombineError::ColumnCollision { source_name, column } => {
                assert_eq!(source_name, "weight");
                assert_eq!(column, "value");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_incoming_key_alias_is_reconciled() {
        let left = keyed("date", vec![("date", vec![Cell::from("2024-01-01")]), ("a", nums(&[1.0]))]);
        let right = keyed(
            "day_time",
            vec![("day_time", vec![Cell::from("2024-01-01")]), ("b", nums(&[2.0]))],
        );

        let merged = merge(Some(left), right, "b").unwrap();
        assert_eq!(merged.key, "date");
        assert_eq!(merged.table.column_names(), vec!["date", "a", "b"]);
        assert_eq!(merged.row_count(), 1);
    }

    #[test]
    fn test_alias_reconciliation_collision() {
        let left = keyed("date", vec![("date", nums(&[1.0]))]);
        let right = keyed("day_time", vec![("day_time", nums(&[1.0])), ("date", nums(&[5.0]))]);

        let err = merge(Some(left), right, "b").unwrap_err();
        assert_eq!(err.kind(), "ColumnCollision");
    }
}
