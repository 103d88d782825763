//! Output table serialization.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use health_core::error::{CombineError, Result};
use health_core::table::OutputTable;
use tracing::debug;

/// Destination for finished output tables.
pub trait TableWriter: Send + Sync {
    /// Persist `table`, returning where it ended up.
    fn write(&self, table: &OutputTable) -> Result<PathBuf>;
}

/// Serialize a table as CSV with a header row.
pub fn to_csv_bytes(table: &OutputTable) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| CombineError::Io(e.into_error()))
}

// ── CsvTableWriter ────────────────────────────────────────────────────────────

/// Writes `output_dir/<file_name>` on disk.
#[derive(Debug, Clone)]
pub struct CsvTableWriter {
    output_dir: PathBuf,
}

impl CsvTableWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl TableWriter for CsvTableWriter {
    fn write(&self, table: &OutputTable) -> Result<PathBuf> {
        let path = self.output_dir.join(&table.file_name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let bytes = to_csv_bytes(table)?;

        // Write to a temp file then rename so a partial file is never visible.
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        if let Err(err) = std::fs::write(&tmp, &bytes).and_then(|()| std::fs::rename(&tmp, &path)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err.into());
        }

        debug!(path = %path.display(), bytes = bytes.len(), "wrote output table");
        Ok(path)
    }
}

// ── MemoryWriter ──────────────────────────────────────────────────────────────

/// Keeps written tables in memory.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    tables: Mutex<Vec<OutputTable>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tables(&self) -> Vec<OutputTable> {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, file_name: &str) -> Option<OutputTable> {
        self.tables().into_iter().find(|t| t.file_name == file_name)
    }
}

impl TableWriter for MemoryWriter {
    fn write(&self, table: &OutputTable) -> Result<PathBuf> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| CombineError::Io(std::io::Error::other("memory writer lock poisoned")))?;
        tables.push(table.clone());
        Ok(PathBuf::from(&table.file_name))
    }
}

impl<W: TableWriter + ?Sized> TableWriter for std::sync::Arc<W> {
    fn write(&self, table: &OutputTable) -> Result<PathBuf> {
        (**self).write(table)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
