use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::table::Cell;

// ── KeyGranularity ────────────────────────────────────────────────────────────

/// How merge-key values are normalized before exact-equality matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyGranularity {
    /// Calendar day, rendered `YYYY-MM-DD`.
    Date,
    /// Millisecond timestamp, rendered `YYYY-MM-DD HH:MM:SS.mmm`.
    Datetime,
    /// Values are matched exactly as loaded.
    Raw,
}

impl KeyGranularity {
    /// Granularity implied by the key's output name when none is configured.
    pub fn for_key_name(name: &str) -> Self {
        if name == "datetime" {
            Self::Datetime
        } else {
            Self::Date
        }
    }
}

impl std::fmt::Display for KeyGranularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Date => write!(f, "date"),
            Self::Datetime => write!(f, "datetime"),
            Self::Raw => write!(f, "raw"),
        }
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Interpret a number as epoch milliseconds.
pub fn from_epoch_millis(ms: f64) -> Option<NaiveDateTime> {
    if !ms.is_finite() {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(ms.trunc() as i64).map(|dt| dt.naive_utc())
}

/// Parse a textual timestamp in any of the forms found in health exports.
///
/// Offsets are converted to UTC; naive values are taken as-is.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let normalised = if let Some(stripped) = s.strip_suffix('Z') {
        format!("{}+00:00", stripped)
    } else {
        s.to_string()
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
        return Some(dt.naive_utc());
    }

    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%Y/%m/%d %H:%M:%S",
    ];
    for fmt in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive);
        }
    }

    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}

// ── Key normalization ─────────────────────────────────────────────────────────

/// Normalize one merge-key cell to `granularity`.
///
/// Returns `None` when the cell is present but cannot be interpreted as a
/// timestamp; callers keep the raw value in that case.
pub fn normalize_key(cell: &Cell, granularity: KeyGranularity) -> Option<Cell> {
    if granularity == KeyGranularity::Raw {
        return Some(cell.clone());
    }

    let ts = match cell {
        Cell::Absent => return Some(Cell::Absent),
        Cell::Number(ms) => from_epoch_millis(*ms)?,
        Cell::Text(s) => parse_timestamp(s)?,
    };

    let rendered = match granularity {
        KeyGranularity::Date => ts.date().format(DATE_FORMAT).to_string(),
        KeyGranularity::Datetime => ts.format(DATETIME_FORMAT).to_string(),
        KeyGranularity::Raw => unreachable!("raw granularity returns early"),
    };
    Some(Cell::Text(rendered))
}

/// Normalize every cell of a key column in place.
///
/// Returns the number of present cells that could not be parsed and were
/// left untouched.
pub fn normalize_key_cells(cells: &mut [Cell], granularity: KeyGranularity) -> usize {
    let mut unparsed = 0;
    for cell in cells.iter_mut() {
        match normalize_key(cell, granularity) {
            Some(normalized) => *cell = normalized,
            None => unparsed += 1,
        }
    }
    unparsed
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granularity_for_key_name() {
        assert_eq!(KeyGranularity::for_key_name("datetime"), KeyGranularity::Datetime);
        assert_eq!(KeyGranularity::for_key_name("day_time"), KeyGranularity::Date);
    }

    #[test]
    fn test_epoch_millis_to_date() {
        // 2024-01-01T00:00:00Z
        let cell = Cell::Number(1_704_067_200_000.0);
        assert_eq!(
            normalize_key(&cell, KeyGranularity::Date),
            Some(Cell::from("2024-01-01"))
        );
    }

    #[test]
    fn test_epoch_millis_to_datetime() {
        let cell = Cell::Number(1_704_103_200_123.0);
        assert_eq!(
            normalize_key(&cell, KeyGranularity::Datetime),
            Some(Cell::from("2024-01-01 10:00:00.123"))
        );
    }

    #[test]
    fn test_text_datetime_truncates_to_date() {
        let cell = Cell::from("2024-03-05 23:59:59.000");
        assert_eq!(
            normalize_key(&cell, KeyGranularity::Date),
            Some(Cell::from("2024-03-05"))
        );
    }

    #[test]
    fn test_rfc3339_with_offset_converted_to_utc() {
        let cell = Cell::from("2024-03-05T01:00:00+02:00");
        assert_eq!(
            normalize_key(&cell, KeyGranularity::Datetime),
            Some(Cell::from("2024-03-04 23:00:00.000"))
        );
    }

    #[test]
    fn test_date_only_text_is_stable() {
        let cell = Cell::from("2024-01-01");
        assert_eq!(normalize_key(&cell, KeyGranularity::Date), Some(cell.clone()));
    }

    #[test]
    fn test_raw_granularity_is_identity() {
        let cell = Cell::Number(42.0);
        assert_eq!(normalize_key(&cell, KeyGranularity::Raw), Some(cell.clone()));
    }

    #[test]
    fn test_unparseable_text_is_reported() {
        assert_eq!(normalize_key(&Cell::from("yesterday"), KeyGranularity::Date), None);

        let mut cells = vec![Cell::from("yesterday"), Cell::from("2024-01-01"), Cell::Absent];
        let unparsed = normalize_key_cells(&mut cells, KeyGranularity::Date);
        assert_eq!(unparsed, 1);
        assert_eq!(cells[0], Cell::from("yesterday"));
        assert_eq!(cells[2], Cell::Absent);
    }

    #[test]
    fn test_parse_timestamp_rejects_empty() {
        assert!(parse_timestamp("   ").is_none());
    }
}
