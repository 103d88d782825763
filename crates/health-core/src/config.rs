//! Data-combination configuration.
//!
//! The JSON document is parsed once, up front, into immutable
//! [`CombinationDescriptor`]s. Anything ambiguous (a source without a
//! priority, a missing merge key, no combinations at all) is rejected here as
//! [`CombineError::ConfigurationInvalid`] so nothing is discovered mid-merge.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{CombineError, Result};
use crate::time_utils::KeyGranularity;

// ── Raw document ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    csv_filtering: RawCsvFiltering,
    /// Kept as a JSON map so combinations run in file order.
    #[serde(default)]
    data_combinations: serde_json::Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCsvFiltering {
    #[serde(default)]
    enabled_csvs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawCombination {
    output_file: Option<String>,
    #[serde(default)]
    key_granularity: Option<KeyGranularity>,
    #[serde(default)]
    sources: Vec<RawSource>,
    #[serde(default)]
    output_structure: RawOutputStructure,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    csv_name: Option<String>,
    priority: Option<i64>,
    #[serde(default)]
    required: bool,
    merge_key: Option<String>,
    merge_key_rename: Option<String>,
    #[serde(default)]
    columns_to_include: Vec<String>,
    #[serde(default)]
    rename_columns: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawOutputStructure {
    primary_sort: Option<String>,
    #[serde(default = "default_true")]
    sort_ascending: bool,
    #[serde(default)]
    final_columns: Vec<String>,
    #[serde(default)]
    fill_token: Option<Value>,
    #[serde(default)]
    data_processing: RawDataProcessing,
}

#[derive(Debug, Default, Deserialize)]
struct RawDataProcessing {
    #[serde(default)]
    fill_missing_values: Option<Value>,
    #[serde(default)]
    interpolate_temperature: bool,
    #[serde(default)]
    interpolate_columns: Vec<String>,
    #[serde(default)]
    presence_columns: Vec<String>,
}

impl Default for RawOutputStructure {
    fn default() -> Self {
        Self {
            primary_sort: None,
            sort_ascending: true,
            final_columns: Vec::new(),
            fill_token: None,
            data_processing: RawDataProcessing::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

// ── Descriptors ───────────────────────────────────────────────────────────────

/// One raw CSV and the rules for folding it into a combination.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    /// Logical source name, as produced by source discovery.
    pub name: String,
    /// Lower merges first.
    pub priority: i64,
    pub required: bool,
    /// Merge-key column name in the raw file.
    pub merge_key: String,
    /// Output name of the merge key, when different from the raw name.
    pub merge_key_rename: Option<String>,
    /// Columns to retain, in order. Empty retains every column.
    pub columns: Vec<String>,
    /// Raw name → output name.
    pub renames: BTreeMap<String, String>,
}

impl SourceDescriptor {
    /// Name the merge key carries after projection.
    pub fn key_alias(&self) -> &str {
        self.merge_key_rename.as_deref().unwrap_or(&self.merge_key)
    }

    /// Raw columns the loader needs to materialize, or `None` for all of them.
    pub fn wanted_columns(&self) -> Option<Vec<String>> {
        if self.columns.is_empty() {
            return None;
        }
        let mut wanted = vec![self.merge_key.clone()];
        for name in self.columns.iter().chain(self.renames.keys()) {
            if !wanted.contains(name) {
                wanted.push(name.clone());
            }
        }
        Some(wanted)
    }
}

/// Final shaping rules for a combination.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputStructure {
    /// Sort column; the canonical merge key when unset.
    pub primary_sort: Option<String>,
    pub ascending: bool,
    /// Output columns in order. Empty keeps every merged column.
    pub final_columns: Vec<String>,
    /// Literal written for every absent cell.
    pub fill_token: String,
    /// Numeric columns linearly interpolated over row order.
    pub interpolate_columns: Vec<String>,
    /// Columns reduced to a `1` marker where a value is present.
    pub presence_columns: Vec<String>,
}

impl Default for OutputStructure {
    fn default() -> Self {
        Self {
            primary_sort: None,
            ascending: true,
            final_columns: Vec::new(),
            fill_token: String::new(),
            interpolate_columns: Vec::new(),
            presence_columns: Vec::new(),
        }
    }
}

/// A named unit of output.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinationDescriptor {
    pub name: String,
    pub output_file: String,
    pub key_granularity: Option<KeyGranularity>,
    /// Sorted ascending by priority; ties keep declaration order.
    pub sources: Vec<SourceDescriptor>,
    pub output: OutputStructure,
}

impl CombinationDescriptor {
    /// Key granularity shared by every source, derived from the canonical
    /// key name unless set explicitly.
    pub fn granularity_for(&self, canonical_key: &str) -> KeyGranularity {
        self.key_granularity
            .unwrap_or_else(|| KeyGranularity::for_key_name(canonical_key))
    }
}

/// The validated configuration document.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinationConfig {
    /// Allow-list of logical source names. Empty allows everything.
    pub enabled_csvs: Vec<String>,
    pub combinations: Vec<CombinationDescriptor>,
}

impl CombinationConfig {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CombineError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&content)?;
        tracing::info!(
            path = %path.display(),
            combinations = config.combinations.len(),
            enabled_csvs = config.enabled_csvs.len(),
            "loaded combination config"
        );
        Ok(config)
    }

    /// Parse and validate a configuration document.
    pub fn from_json(input: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(input)?;

        if raw.data_combinations.is_empty() {
            return Err(CombineError::ConfigurationInvalid(
                "no data combinations configured".into(),
            ));
        }

        let mut combinations = Vec::with_capacity(raw.data_combinations.len());
        let mut output_files = HashSet::new();
        for (name, value) in raw.data_combinations {
            let raw_combo: RawCombination = serde_json::from_value(value).map_err(|e| {
                CombineError::ConfigurationInvalid(format!("combination '{name}': {e}"))
            })?;
            let combo = build_combination(name, raw_combo)?;
            if !output_files.insert(combo.output_file.clone()) {
                return Err(CombineError::ConfigurationInvalid(format!(
                    "combination '{}': output file '{}' is used by another combination",
                    combo.name, combo.output_file
                )));
            }
            combinations.push(combo);
        }

        Ok(Self {
            enabled_csvs: raw.csv_filtering.enabled_csvs,
            combinations,
        })
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

fn invalid(combination: &str, msg: impl std::fmt::Display) -> CombineError {
    CombineError::ConfigurationInvalid(format!("combination '{combination}': {msg}"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn build_combination(name: String, raw: RawCombination) -> Result<CombinationDescriptor> {
    let output_file =
        non_empty(raw.output_file).ok_or_else(|| invalid(&name, "missing output_file"))?;

    if raw.sources.is_empty() {
        return Err(invalid(&name, "no sources configured"));
    }

    let mut sources = raw
        .sources
        .into_iter()
        .enumerate()
        .map(|(i, s)| build_source(&name, i, s))
        .collect::<Result<Vec<_>>>()?;
    // Stable: equal priorities keep declaration order.
    sources.sort_by_key(|s| s.priority);

    let raw_out = raw.output_structure;
    let fill_token = raw_out
        .fill_token
        .or(raw_out.data_processing.fill_missing_values)
        .map(|v| fill_token_text(&name, v))
        .transpose()?
        .unwrap_or_default();

    let mut interpolate_columns = raw_out.data_processing.interpolate_columns;
    if raw_out.data_processing.interpolate_temperature
        && !interpolate_columns.iter().any(|c| c == "temperature")
    {
        interpolate_columns.push("temperature".to_string());
    }

    Ok(CombinationDescriptor {
        name,
        output_file,
        key_granularity: raw.key_granularity,
        sources,
        output: OutputStructure {
            primary_sort: non_empty(raw_out.primary_sort),
            ascending: raw_out.sort_ascending,
            final_columns: raw_out.final_columns,
            fill_token,
            interpolate_columns,
            presence_columns: raw_out.data_processing.presence_columns,
        },
    })
}

fn build_source(combination: &str, index: usize, raw: RawSource) -> Result<SourceDescriptor> {
    let name = non_empty(raw.csv_name)
        .ok_or_else(|| invalid(combination, format!("source #{} has no csv_name", index + 1)))?;
    let priority = raw
        .priority
        .ok_or_else(|| invalid(combination, format!("source '{name}' has no priority")))?;
    let merge_key = non_empty(raw.merge_key)
        .ok_or_else(|| invalid(combination, format!("source '{name}' has no merge_key")))?;

    if let Some((from, _)) = raw.rename_columns.iter().find(|(_, to)| to.trim().is_empty()) {
        return Err(invalid(
            combination,
            format!("source '{name}' renames '{from}' to an empty name"),
        ));
    }

    Ok(SourceDescriptor {
        name,
        priority,
        required: raw.required,
        merge_key_rename: non_empty(raw.merge_key_rename),
        merge_key,
        columns: raw.columns_to_include,
        renames: raw.rename_columns,
    })
}

fn fill_token_text(combination: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(invalid(
            combination,
            format!("fill value must be a scalar, got {other}"),
        )),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
