//! In-memory column model shared by every stage of a combination.
//!
//! Columns are schema-less: each one is a name plus a sequence of tagged
//! [`Cell`]s, and absence is an explicit [`Cell::Absent`] marker.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

// ── Cell ──────────────────────────────────────────────────────────────────────

/// A single tagged value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Absent,
    Number(f64),
    Text(String),
}

/// Hashable projection of a present cell used for exact-equality joins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JoinKey {
    Number(u64),
    Text(String),
}

impl Cell {
    pub fn is_absent(&self) -> bool {
        matches!(self, Cell::Absent)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The join identity of this cell. Absent cells never join.
    pub fn join_key(&self) -> Option<JoinKey> {
        match self {
            Cell::Absent => None,
            // -0.0 and 0.0 must land on the same key.
            Cell::Number(n) if *n == 0.0 => Some(JoinKey::Number(0f64.to_bits())),
            Cell::Number(n) => Some(JoinKey::Number(n.to_bits())),
            Cell::Text(s) => Some(JoinKey::Text(s.clone())),
        }
    }

    /// Ordering between two present cells: numbers before text, numbers by
    /// value, text lexicographically.
    ///
    /// Absent handling is left to the caller so sort direction can keep absent
    /// values last.
    pub fn cmp_present(&self, other: &Cell) -> Ordering {
        match (self, other) {
            (Cell::Number(a), Cell::Number(b)) => a.total_cmp(b),
            (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
            (Cell::Number(_), Cell::Text(_)) => Ordering::Less,
            (Cell::Text(_), Cell::Number(_)) => Ordering::Greater,
            _ => Ordering::Equal,
        }
    }

    /// Render the cell for output, substituting `fill` for absent values.
    pub fn render(&self, fill: &str) -> String {
        match self {
            Cell::Absent => fill.to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Absent => Ok(()),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

// ── Column ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }

    /// A column of `len` absent cells.
    pub fn absent(name: impl Into<String>, len: usize) -> Self {
        Self::new(name, vec![Cell::Absent; len])
    }

    /// Build a column from raw CSV fields, inferring numeric vs text.
    ///
    /// The column is numeric only when every non-empty field parses as a
    /// finite number, so `NaN` and `inf` stay text; empty fields become
    /// [`Cell::Absent`].
    pub fn from_raw(name: impl Into<String>, raw: Vec<Option<String>>) -> Self {
        let numeric = raw
            .iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .all(|s| s.trim().parse::<f64>().is_ok_and(f64::is_finite));

        let cells = raw
            .into_iter()
            .map(|field| match field {
                None => Cell::Absent,
                Some(s) if s.is_empty() => Cell::Absent,
                Some(s) if numeric => s.trim().parse::<f64>().map(Cell::Number).unwrap_or(Cell::Text(s)),
                Some(s) => Cell::Text(s),
            })
            .collect();

        Self::new(name, cells)
    }

    /// Copy of the column restricted to the given row indices (in order).
    pub fn take(&self, rows: &[Option<usize>]) -> Column {
        let cells = rows
            .iter()
            .map(|r| match r {
                Some(i) => self.cells[*i].clone(),
                None => Cell::Absent,
            })
            .collect();
        Column::new(self.name.clone(), cells)
    }
}

// ── Table ─────────────────────────────────────────────────────────────────────

/// An ordered set of equal-length named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from columns. All columns must have the same length.
    ///
    /// # Panics
    /// Panics when column lengths differ; every producer in the workspace
    /// builds columns row-aligned.
    pub fn from_columns(columns: Vec<Column>) -> Self {
        let rows = columns.first().map(|c| c.cells.len()).unwrap_or(0);
        assert!(
            columns.iter().all(|c| c.cells.len() == rows),
            "table columns must have equal length"
        );
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    /// Reorder rows by `order` (indices into the current rows).
    pub fn reorder(&mut self, order: &[usize]) {
        for column in &mut self.columns {
            let cells = order.iter().map(|&i| column.cells[i].clone()).collect();
            column.cells = cells;
        }
        self.rows = order.len();
    }

    /// Keep only the named columns, in the given order. Unknown names are ignored.
    pub fn select(self, names: &[String]) -> Table {
        let mut pool = self.columns;
        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            if let Some(pos) = pool.iter().position(|c| &c.name == name) {
                selected.push(pool.swap_remove(pos));
            }
        }
        let rows = if selected.is_empty() { 0 } else { self.rows };
        Table {
            columns: selected,
            rows,
        }
    }

    /// Drop rows in which every cell is absent.
    pub fn drop_empty_rows(&mut self) -> usize {
        let keep: Vec<usize> = (0..self.rows)
            .filter(|&r| self.columns.iter().any(|c| !c.cells[r].is_absent()))
            .collect();
        let dropped = self.rows - keep.len();
        if dropped > 0 {
            self.reorder(&keep);
        }
        dropped
    }

    /// Number of absent cells across the whole table.
    pub fn absent_count(&self) -> usize {
        self.columns
            .iter()
            .map(|c| c.cells.iter().filter(|v| v.is_absent()).count())
            .sum()
    }
}

// ── KeyedTable ────────────────────────────────────────────────────────────────

/// A table plus the name of its merge-key column.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedTable {
    pub key: String,
    pub table: Table,
}

impl KeyedTable {
    pub fn new(key: impl Into<String>, table: Table) -> Self {
        Self {
            key: key.into(),
            table,
        }
    }

    pub fn key_column(&self) -> Option<&Column> {
        self.table.column(&self.key)
    }

    /// Every column except the key, in table order.
    pub fn value_columns(&self) -> impl Iterator<Item = &Column> {
        self.table.columns().iter().filter(move |c| c.name != self.key)
    }

    pub fn row_count(&self) -> usize {
        self.table.row_count()
    }
}

// ── OutputTable ───────────────────────────────────────────────────────────────

/// Final, fully materialized table ready for serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputTable {
    pub file_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl OutputTable {
    /// Materialize `table`, rendering absent cells as `fill`.
    pub fn from_table(file_name: impl Into<String>, table: &Table, fill: &str) -> Self {
        let headers = table.column_names();
        let rows = (0..table.row_count())
            .map(|r| table.columns().iter().map(|c| c.cells[r].render(fill)).collect())
            .collect();
        Self {
            file_name: file_name.into(),
            headers,
            rows,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
