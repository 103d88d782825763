//! Column projection.
//!
//! Narrows a loaded source to its configured columns, applies renames and
//! derives the canonical, normalized merge-key column.

use std::collections::HashSet;

use health_core::config::SourceDescriptor;
use health_core::error::{CombineError, Result};
use health_core::table::{Column, KeyedTable, Table};
use health_core::time_utils::{normalize_key_cells, KeyGranularity};
use tracing::debug;

fn take_column(pool: &mut Vec<Column>, name: &str) -> Option<Column> {
    pool.iter().position(|c| c.name == name).map(|pos| pool.remove(pos))
}

/// Columns whose name is a qualified variant of `column`
/// (e.g. `com.samsung.health.x.start_time` for `start_time`).
fn qualified_variants(table: &Table, column: &str) -> Vec<String> {
    let suffix = format!(".{column}");
    table
        .columns()
        .iter()
        .filter(|c| c.name.ends_with(&suffix))
        .map(|c| c.name.clone())
        .collect()
}

fn not_found(descriptor: &SourceDescriptor, table: &Table, column: &str) -> CombineError {
    CombineError::ColumnNotFound {
        source_name: descriptor.name.clone(),
        column: column.to_string(),
        candidates: qualified_variants(table, column),
    }
}

/// Project `loaded` according to `descriptor`.
///
/// The result starts with the merge key, renamed to its alias and normalized
/// to `granularity`, followed by the retained columns in include order. When
/// the raw merge key is itself renamed, a raw copy of it is appended under
/// the rename target.
pub fn project(
    loaded: KeyedTable,
    descriptor: &SourceDescriptor,
    granularity: KeyGranularity,
) -> Result<KeyedTable> {
    let table = &loaded.table;
    let key_name = descriptor.merge_key.as_str();

    // Exact names only; qualified variants are diagnostics, never picked.
    if !table.has_column(key_name) {
        return Err(not_found(descriptor, table, key_name));
    }

    let retained: Vec<String> = if descriptor.columns.is_empty() {
        table
            .column_names()
            .into_iter()
            .filter(|name| name != key_name)
            .collect()
    } else {
        let mut names = Vec::with_capacity(descriptor.columns.len());
        for name in &descriptor.columns {
            if name == key_name || names.contains(name) {
                continue;
            }
            if !table.has_column(name) {
                return Err(not_found(descriptor, table, name));
            }
            names.push(name.clone());
        }
        names
    };

    for from in descriptor.renames.keys() {
        if from != key_name && !retained.contains(from) {
            return Err(not_found(descriptor, table, from));
        }
    }

    let mut pool = loaded.table.into_columns();
    let Some(mut key) = take_column(&mut pool, key_name) else {
        return Err(CombineError::ColumnNotFound {
            source_name: descriptor.name.clone(),
            column: key_name.to_string(),
            candidates: Vec::new(),
        });
    };

    let key_copy = descriptor
        .renames
        .get(key_name)
        .map(|target| Column::new(target.clone(), key.cells.clone()));

    let alias = descriptor.key_alias().to_string();
    key.name = alias.clone();
    let unparsed = normalize_key_cells(&mut key.cells, granularity);
    if unparsed > 0 {
        debug!(
            source = %descriptor.name,
            key = %alias,
            granularity = %granularity,
            unparsed,
            "merge-key values kept as loaded"
        );
    }

    let mut columns = Vec::with_capacity(retained.len() + 2);
    columns.push(key);
    for name in &retained {
        if let Some(mut column) = take_column(&mut pool, name) {
            if let Some(target) = descriptor.renames.get(name) {
                column.name = target.clone();
            }
            columns.push(column);
        }
    }
    columns.extend(key_copy);

    let mut names = HashSet::with_capacity(columns.len());
    for column in &columns {
        if !names.insert(column.name.as_str()) {
            return Err(CombineError::ColumnCollision {
                source_name: descriptor.name.clone(),
                column: column.name.clone(),
            });
        }
    }

    Ok(KeyedTable::new(alias, Table::from_columns(columns)))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use health_core::table::Cell;
    use std::collections::BTreeMap;

    fn loaded(columns: Vec<(&str, Vec<Cell>)>) -> KeyedTable {
        KeyedTable::new(
            "day_time",
            Table::from_columns(
                columns
                    .into_iter()
                    .map(|(name, cells)| Column::new(name, cells))
                    .collect(),
            ),
        )
    }

    fn sample() -> KeyedTable {
        loaded(vec![
            ("noise", vec![Cell::from("a"), Cell::from("b")]),
            ("temperature", vec![Cell::Number(36.5), Cell::Number(37.0)]),
            ("day_time", vec![Cell::from("2024-01-01"), Cell::from("2024-01-02")]),
            ("flow", vec![Cell::from("light"), Cell::Absent]),
        ])
    }

    fn source(columns: &[&str], renames: &[(&str, &str)]) -> SourceDescriptor {
        SourceDescriptor {
            name: "temp".to_string(),
            priority: 1,
            required: false,
            merge_key: "day_time".to_string(),
            merge_key_rename: None,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            renames: renames
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn test_project_exact_columns_key_first() {
        let projected = project(
            sample(),
            &source(&["flow", "temperature"], &[]),
            KeyGranularity::Date,
        )
        .unwrap();
        assert_eq!(projected.key, "day_time");
        assert_eq!(
            projected.table.column_names(),
            vec!["day_time", "flow", "temperature"]
        );
        assert_eq!(projected.row_count(), 2);
    }

    #[test]
    fn test_project_empty_include_list_keeps_everything() {
        let projected = project(sample(), &source(&[], &[]), KeyGranularity::Date).unwrap();
        assert_eq!(
            projected.table.column_names(),
            vec!["day_time", "noise", "temperature", "flow"]
        );
    }

    #[test]
    fn test_project_missing_column() {
        let err = project(sample(), &source(&["weight"], &[]), KeyGranularity::Date).unwrap_err();
        match err {
            CombineError::ColumnNotFound { column, .. } => assert_eq!(column, "weight"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_project_missing_key_reports_qualified_variants() {
        let table = loaded(vec![
            (
                "com.samsung.health.body_temperature.day_time",
                vec![Cell::from("2024-01-01")],
            ),
            ("temperature", vec![Cell::Number(36.5)]),
        ]);
        let err = project(table, &source(&["temperature"], &[]), KeyGranularity::Date).unwrap_err();
        match err {
            CombineError::ColumnNotFound {
                column, candidates, ..
            } => {
                assert_eq!(column, "day_time");
                assert_eq!(
                    candidates,
                    vec!["com.samsung.health.body_temperature.day_time"]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_loaded_source_reports_qualified_key_variant() {
        use crate::loader::{load_source, LoaderOptions};

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("sleep.csv");
        std::fs::write(
            &path,
            "meta\ncom.samsung.health.sleep.start_time,value\n2024-01-01 23:00:00,81\n",
        )
        .unwrap();
        let mut descriptor = source(&["value"], &[]);
        descriptor.name = "sleep".to_string();
        descriptor.merge_key = "start_time".to_string();

        let loaded = load_source(&descriptor, &path, &LoaderOptions::default()).unwrap();
        let err = project(loaded, &descriptor, KeyGranularity::Date).unwrap_err();
        match err {
            CombineError::ColumnNotFound {
                source_name,
                column,
                candidates,
            } => {
                assert_eq!(source_name, "sleep");
                assert_eq!(column, "start_time");
                assert_eq!(candidates, vec!["com.samsung.health.sleep.start_time"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_project_renames_columns_and_key() {
        let mut descriptor = source(&["temperature"], &[("temperature", "temp_c")]);
        descriptor.merge_key_rename = Some("date".to_string());

        let projected = project(sample(), &descriptor, KeyGranularity::Date).unwrap();
        assert_eq!(projected.key, "date");
        assert_eq!(projected.table.column_names(), vec!["date", "temp_c"]);
    }

    #[test]
    fn test_project_renamed_key_is_duplicated_raw() {
        let table = loaded(vec![
            ("day_time", vec![Cell::Number(1_704_067_200_000.0)]),
            ("temperature", vec![Cell::Number(36.5)]),
        ]);
        let mut descriptor = source(&["temperature"], &[("day_time", "raw_time")]);
        descriptor.merge_key_rename = Some("date".to_string());

        let projected = project(table, &descriptor, KeyGranularity::Date).unwrap();
        assert_eq!(
            projected.table.column_names(),
            vec!["date", "temperature", "raw_time"]
        );
        assert_eq!(
            projected.table.column("date").unwrap().cells,
            vec![Cell::from("2024-01-01")]
        );
        assert_eq!(
            projected.table.column("raw_time").unwrap().cells,
            vec![Cell::Number(1_704_067_200_000.0)]
        );
    }

    #[test]
    fn test_project_rename_of_unretained_column() {
        let err = project(
            sample(),
            &source(&["temperature"], &[("noise", "signal")]),
            KeyGranularity::Date,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "ColumnNotFound");
    }

    #[test]
    fn test_project_rename_collision() {
        let err = project(
            sample(),
            &source(&["temperature", "flow"], &[("flow", "temperature")]),
            KeyGranularity::Date,
        )
        .unwrap_err();
        match err {
            CombineError::ColumnCollision { column, .. } => assert_eq!(column, "temperature"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_project_normalizes_epoch_key() {
        let table = loaded(vec![
            (
                "day_time",
                vec![
                    Cell::Number(1_704_067_200_000.0),
                    Cell::Number(1_704_153_600_000.0),
                ],
            ),
            ("v", vec![Cell::Number(1.0), Cell::Number(2.0)]),
        ]);
        let projected = project(table, &source(&["v"], &[]), KeyGranularity::Date).unwrap();
        assert_eq!(
            projected.key_column().unwrap().cells,
            vec![Cell::from("2024-01-01"), Cell::from("2024-01-02")]
        );
    }

    #[test]
    fn test_project_raw_granularity_keeps_values() {
        let table = loaded(vec![("day_time", vec![Cell::Number(3.0)])]);
        let projected = project(table, &source(&[], &[]), KeyGranularity::Raw).unwrap();
        assert_eq!(projected.key_column().unwrap().cells, vec![Cell::Number(3.0)]);
    }
}
