//! Export-dump discovery.
//!
//! Finds the per-metric CSV files of a health export, derives their logical
//! source names and filters them (ignore list, data-row check, allow-list)
//! into a [`SourceCatalog`] the engine resolves sources against.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use health_core::error::{CombineError, Result};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::loader::data_section;

// ── Resolver ──────────────────────────────────────────────────────────────────

/// Maps a logical source name to the file backing it.
pub trait SourceResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<PathBuf>;
}

impl SourceResolver for HashMap<String, PathBuf> {
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.get(name).cloned()
    }
}

// ── Name cleaning ─────────────────────────────────────────────────────────────

fn trailing_digits() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+$").expect("regex is valid"))
}

/// Derive the logical source name from an export file name.
///
/// `com.samsung.shealth.tracker.pedometer_day_summary.20240101.csv` becomes
/// `.tracker.pedometer_day_summary`.
pub fn clean_csv_name(file_name: &str) -> String {
    let name = file_name.strip_suffix(".csv").unwrap_or(file_name);
    let name = match name.find("health") {
        Some(pos) => &name[pos + "health".len()..],
        None => name,
    };
    let name = trailing_digits().replace(name, "");
    name.trim_end_matches(&['.', '_'][..]).to_string()
}

// ── Filters ───────────────────────────────────────────────────────────────────

/// Read the ignore list: one source name per line, `#` starts a comment line.
///
/// A missing file ignores nothing.
pub fn read_ignore_list(path: &Path) -> HashSet<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let names: HashSet<String> = content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string)
                .collect();
            info!("Loaded {} ignored sources from {}", names.len(), path.display());
            names
        }
        Err(e) => {
            warn!("Ignore list {} not readable ({}); ignoring nothing", path.display(), e);
            HashSet::new()
        }
    }
}

/// Whether `path` holds more than `min_rows` non-blank data rows after the
/// metadata lines and the header.
pub fn csv_has_data(path: &Path, min_rows: usize, skip_rows: usize) -> bool {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to read file {}: {}", path.display(), e);
            return false;
        }
    };
    let content = String::from_utf8_lossy(&bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data_section(&content, skip_rows).as_bytes());

    let mut rows = 0usize;
    for record in reader.records() {
        let Ok(record) = record else { continue };
        if record.iter().any(|field| !field.trim().is_empty()) {
            rows += 1;
            if rows > min_rows {
                return true;
            }
        }
    }
    false
}

// ── Dump layout ───────────────────────────────────────────────────────────────

/// Locate the export dump inside `data_path`.
///
/// The first sub-directory by name wins; a data path holding CSV files
/// directly is used as-is.
pub fn resolve_dump_dir(data_path: &Path) -> Result<PathBuf> {
    if !data_path.is_dir() {
        return Err(CombineError::DataPathNotFound(data_path.to_path_buf()));
    }

    let mut dirs: Vec<PathBuf> = walkdir::WalkDir::new(data_path)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .collect();
    dirs.sort();

    if let Some(first) = dirs.into_iter().next() {
        debug!("Using export dump {}", first.display());
        return Ok(first);
    }
    if !find_csv_files(data_path).is_empty() {
        return Ok(data_path.to_path_buf());
    }
    Err(CombineError::DataPathNotFound(data_path.to_path_buf()))
}

/// CSV files directly inside `dir`, sorted by path.
pub fn find_csv_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext == "csv")
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

// ── Catalog ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    pub ignore: HashSet<String>,
    /// Allow-list of source names. Empty allows everything.
    pub enabled: HashSet<String>,
    /// Data-row threshold; `None` skips the check.
    pub min_rows: Option<usize>,
    pub skip_rows: usize,
}

/// Why a discovered file was left out of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    Ignored,
    Empty,
    NotEnabled,
    DuplicateName,
}

impl std::fmt::Display for FilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ignored => write!(f, "ignored"),
            Self::Empty => write!(f, "empty"),
            Self::NotEnabled => write!(f, "not enabled"),
            Self::DuplicateName => write!(f, "duplicate name"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredSource {
    pub name: String,
    pub path: PathBuf,
    pub reason: FilterReason,
}

/// Display grouping of source names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Category {
    pub files: Vec<String>,
    pub subcategories: Vec<String>,
}

impl Category {
    pub fn len(&self) -> usize {
        self.files.len() + self.subcategories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The qualifying sources of one export dump.
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    sources: BTreeMap<String, PathBuf>,
    filtered: Vec<FilteredSource>,
}

impl SourceCatalog {
    /// Scan `dump_dir` and keep every file that passes the filters.
    pub fn discover(dump_dir: &Path, options: &DiscoveryOptions) -> Self {
        let mut catalog = Self::default();

        for path in find_csv_files(dump_dir) {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let name = clean_csv_name(&file_name);

            let reason = if options.ignore.contains(&name) {
                Some(FilterReason::Ignored)
            } else if options
                .min_rows
                .is_some_and(|min| !csv_has_data(&path, min, options.skip_rows))
            {
                Some(FilterReason::Empty)
            } else if !options.enabled.is_empty() && !options.enabled.contains(&name) {
                Some(FilterReason::NotEnabled)
            } else if catalog.sources.contains_key(&name) {
                Some(FilterReason::DuplicateName)
            } else {
                None
            };

            match reason {
                Some(reason) => {
                    debug!(source = %name, reason = %reason, "filtered source");
                    catalog.filtered.push(FilteredSource { name, path, reason });
                }
                None => {
                    catalog.sources.insert(name, path);
                }
            }
        }

        info!(
            dump = %dump_dir.display(),
            sources = catalog.sources.len(),
            filtered = catalog.filtered.len(),
            "discovered sources"
        );
        catalog
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn filtered(&self) -> &[FilteredSource] {
        &self.filtered
    }

    /// Group source names by their leading dot-separated parts.
    pub fn categories(&self) -> BTreeMap<String, Category> {
        let mut categories: BTreeMap<String, Category> = BTreeMap::new();
        for name in self.sources.keys() {
            let parts: Vec<&str> = name.split('.').collect();
            if parts.len() <= 2 {
                categories
                    .entry(parts[0].to_string())
                    .or_default()
                    .files
                    .push(name.clone());
            } else {
                let category = categories.entry(parts[..2].join(".")).or_default();
                let sub = parts[2..].join(".");
                if !category.subcategories.contains(&sub) {
                    category.subcategories.push(sub);
                }
            }
        }
        for category in categories.values_mut() {
            category.files.sort();
            category.subcategories.sort();
        }
        categories
    }
}

impl SourceResolver for SourceCatalog {
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.sources.get(name).cloned()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_export(dir: &Path, file: &str, data_rows: usize) -> PathBuf {
        let mut content = String::from("com.samsung.health.meta,1,2\nday_time,value\n");
        for i in 0..data_rows {
            content.push_str(&format!("{},{}\n", 1_704_067_200_000u64 + i as u64, i));
        }
        let path = dir.join(file);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_clean_csv_name() {
        assert_eq!(
            clean_csv_name("com.samsung.shealth.tracker.pedometer_day_summary.20240101.csv"),
            ".tracker.pedometer_day_summary"
        );
        assert_eq!(
            clean_csv_name("com.samsung.health.body_temperature.20240101123000.csv"),
            ".body_temperature"
        );
        assert_eq!(clean_csv_name("sleep_2.csv"), "sleep");
        assert_eq!(clean_csv_name("plain"), "plain");
    }

    #[test]
    fn test_read_ignore_list_skips_comments() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ignore_csvs.txt");
        fs::write(&path, "# noise\n.tracker.heart_rate\n\n  .badge  \n").unwrap();

        let names = read_ignore_list(&path);
        assert_eq!(names.len(), 2);
        assert!(names.contains(".tracker.heart_rate"));
        assert!(names.contains(".badge"));
    }

    #[test]
    fn test_read_ignore_list_missing_file() {
        let tmp = TempDir::new().unwrap();
        assert!(read_ignore_list(&tmp.path().join("nope.txt")).is_empty());
    }

    #[test]
    fn test_csv_has_data_threshold() {
        let tmp = TempDir::new().unwrap();
        let ten = write_export(tmp.path(), "ten.csv", 10);
        let eleven = write_export(tmp.path(), "eleven.csv", 11);

        assert!(!csv_has_data(&ten, 10, 1));
        assert!(csv_has_data(&eleven, 10, 1));
        assert!(csv_has_data(&ten, 0, 1));
    }

    #[test]
    fn test_csv_has_data_ignores_blank_rows() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blank.csv");
        fs::write(&path, "meta\na,b\n,\n,\n1,2\n").unwrap();
        assert!(!csv_has_data(&path, 1, 1));
        assert!(csv_has_data(&path, 0, 1));
    }

    #[test]
    fn test_resolve_dump_dir_picks_first_subdirectory() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("samsunghealth_b")).unwrap();
        fs::create_dir(tmp.path().join("samsunghealth_a")).unwrap();
        let dump = resolve_dump_dir(tmp.path()).unwrap();
        assert_eq!(dump, tmp.path().join("samsunghealth_a"));
    }

    #[test]
    fn test_resolve_dump_dir_flat_layout() {
        let tmp = TempDir::new().unwrap();
        write_export(tmp.path(), "x.csv", 1);
        assert_eq!(resolve_dump_dir(tmp.path()).unwrap(), tmp.path());
    }

    #[test]
    fn test_resolve_dump_dir_errors() {
        let tmp = TempDir::new().unwrap();
        let err = resolve_dump_dir(&tmp.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), "DataPathNotFound");

        let err = resolve_dump_dir(tmp.path()).unwrap_err();
        assert_eq!(err.kind(), "DataPathNotFound");
    }

    #[test]
    fn test_find_csv_files_is_flat_and_sorted() {
        let tmp = TempDir::new().unwrap();
        write_export(tmp.path(), "b.csv", 1);
        write_export(tmp.path(), "a.csv", 1);
        fs::write(tmp.path().join("notes.txt"), "x").unwrap();
        fs::create_dir(tmp.path().join("jsons")).unwrap();
        write_export(&tmp.path().join("jsons"), "nested.csv", 1);

        let files = find_csv_files(tmp.path());
        assert_eq!(files, vec![tmp.path().join("a.csv"), tmp.path().join("b.csv")]);
    }

    #[test]
    fn test_discover_applies_filters() {
        let tmp = TempDir::new().unwrap();
        write_export(tmp.path(), "com.samsung.health.hr.20240101.csv", 20);
        write_export(tmp.path(), "com.samsung.health.weight.20240101.csv", 20);
        write_export(tmp.path(), "com.samsung.health.badge.20240101.csv", 20);
        write_export(tmp.path(), "com.samsung.health.tiny.20240101.csv", 2);

        let options = DiscoveryOptions {
            ignore: HashSet::from([".badge".to_string()]),
            enabled: HashSet::from([".hr".to_string(), ".tiny".to_string()]),
            min_rows: Some(10),
            skip_rows: 1,
        };
        let catalog = SourceCatalog::discover(tmp.path(), &options);

        assert_eq!(catalog.names().collect::<Vec<_>>(), vec![".hr"]);
        assert!(catalog.resolve(".hr").is_some());
        assert!(catalog.resolve(".weight").is_none());

        let reasons: HashMap<&str, FilterReason> = catalog
            .filtered()
            .iter()
            .map(|f| (f.name.as_str(), f.reason))
            .collect();
        assert_eq!(reasons[".badge"], FilterReason::Ignored);
        assert_eq!(reasons[".tiny"], FilterReason::Empty);
        assert_eq!(reasons[".weight"], FilterReason::NotEnabled);
    }

    #[test]
    fn test_discover_first_file_wins_on_duplicate_names() {
        let tmp = TempDir::new().unwrap();
        write_export(tmp.path(), "com.samsung.health.hr.20240101.csv", 1);
        write_export(tmp.path(), "com.samsung.health.hr.20240202.csv", 1);

        let catalog = SourceCatalog::discover(tmp.path(), &DiscoveryOptions::default());
        assert_eq!(catalog.len(), 1);
        assert_eq!(
            catalog.resolve(".hr").unwrap(),
            tmp.path().join("com.samsung.health.hr.20240101.csv")
        );
        assert_eq!(catalog.filtered()[0].reason, FilterReason::DuplicateName);
    }

    #[test]
    fn test_categories() {
        let tmp = TempDir::new().unwrap();
        for file in [
            "steps.csv",
            "sleep.stage.csv",
            "tracker.heart.rate.csv",
            "tracker.heart.variability.csv",
        ] {
            write_export(tmp.path(), file, 1);
        }
        let catalog = SourceCatalog::discover(tmp.path(), &DiscoveryOptions::default());
        let categories = catalog.categories();

        assert_eq!(categories["steps"].files, vec!["steps"]);
        assert_eq!(categories["sleep"].files, vec!["sleep.stage"]);
        assert_eq!(
            categories["tracker.heart"].subcategories,
            vec!["rate", "variability"]
        );
        assert_eq!(categories["tracker.heart"].len(), 2);
    }

    #[test]
    fn test_hashmap_resolver() {
        let map = HashMap::from([("hr".to_string(), PathBuf::from("/d/hr.csv"))]);
        assert_eq!(map.resolve("hr"), Some(PathBuf::from("/d/hr.csv")));
        assert_eq!(map.resolve("x"), None);
    }
}
