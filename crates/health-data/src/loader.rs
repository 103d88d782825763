//! Source table loading.
//!
//! Reads one raw export CSV into a [`KeyedTable`] of tagged columns. Only the
//! columns the source descriptor asks for are materialized, plus any
//! qualified variants of the merge key so a missing key can be diagnosed.

use std::collections::HashSet;
use std::path::Path;

use health_core::config::SourceDescriptor;
use health_core::error::{CombineError, Result};
use health_core::table::{Column, KeyedTable, Table};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Metadata lines preceding the header row.
    pub skip_rows: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self { skip_rows: 1 }
    }
}

/// The part of a file that follows its BOM and `skip_rows` metadata lines.
pub(crate) fn data_section(content: &str, skip_rows: usize) -> &str {
    let mut rest = content.strip_prefix('\u{feff}').unwrap_or(content);
    for _ in 0..skip_rows {
        match rest.find('\n') {
            Some(pos) => rest = &rest[pos + 1..],
            None => return "",
        }
    }
    rest
}

/// Load the file backing `descriptor`.
///
/// The returned table is keyed on the raw merge-key name; whether that column
/// actually exists is checked by the projector.
pub fn load_source(
    descriptor: &SourceDescriptor,
    path: &Path,
    options: &LoaderOptions,
) -> Result<KeyedTable> {
    if !path.is_file() {
        return Err(CombineError::SourceUnavailable {
            source_name: descriptor.name.clone(),
            path: Some(path.to_path_buf()),
        });
    }

    let bytes = std::fs::read(path).map_err(|source| CombineError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let content = String::from_utf8_lossy(&bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data_section(&content, options.skip_rows).as_bytes());

    let headers = reader.headers()?.clone();
    let wanted: Option<HashSet<String>> = descriptor
        .wanted_columns()
        .map(|names| names.into_iter().collect());
    let key_suffix = format!(".{}", descriptor.merge_key);

    // (field index, column name); first occurrence of a name wins.
    let mut seen = HashSet::new();
    let selected: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (i, h.trim().to_string()))
        .filter(|(_, name)| !name.is_empty())
        .filter(|(_, name)| {
            wanted
                .as_ref()
                .map_or(true, |w| w.contains(name) || name.ends_with(&key_suffix))
        })
        .filter(|(_, name)| seen.insert(name.clone()))
        .collect();

    let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); selected.len()];
    let mut rows = 0usize;
    for record in reader.records() {
        let record = record?;
        for (slot, (idx, _)) in raw.iter_mut().zip(&selected) {
            slot.push(record.get(*idx).map(str::to_string));
        }
        rows += 1;
    }

    if rows == 0 {
        return Err(CombineError::SourceEmpty {
            source_name: descriptor.name.clone(),
            path: path.to_path_buf(),
        });
    }

    let columns: Vec<Column> = selected
        .into_iter()
        .zip(raw)
        .map(|((_, name), values)| Column::from_raw(name, values))
        .collect();

    debug!(
        source = %descriptor.name,
        path = %path.display(),
        rows,
        columns = columns.len(),
        "loaded source"
    );

    Ok(KeyedTable::new(
        descriptor.merge_key.clone(),
        Table::from_columns(columns),
    ))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
