use std::path::PathBuf;
use thiserror::Error;

/// All errors produced while combining health exports.
#[derive(Error, Debug)]
pub enum CombineError {
    /// The source could not be resolved to a file, or the file is missing.
    #[error("Source '{source_name}' is unavailable{}", path_suffix(.path))]
    SourceUnavailable {
        source_name: String,
        path: Option<PathBuf>,
    },

    /// The source file has a header but no data rows.
    #[error("Source '{source_name}' has no data rows: {}", .path.display())]
    SourceEmpty { source_name: String, path: PathBuf },

    /// A declared column is not present in the source file.
    #[error("Source '{source_name}': column '{column}' not found{}", candidates_suffix(.candidates))]
    ColumnNotFound {
        source_name: String,
        column: String,
        /// Qualified variants of the column that do exist, reported for diagnosis only.
        candidates: Vec<String>,
    },

    /// Two columns would end up with the same name.
    #[error("Column '{column}' collides while merging '{source_name}'")]
    ColumnCollision { source_name: String, column: String },

    /// A final or sort column does not exist after merging.
    #[error("Combination '{combination}': output column '{column}' does not exist after merge")]
    MissingOutputColumn { combination: String, column: String },

    /// The configuration is empty, malformed or ambiguous.
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// Every source of the combination was skipped.
    #[error("Combination '{combination}': no source produced data")]
    NoData { combination: String },

    /// The expected data directory does not exist.
    #[error("Data path not found: {0}")]
    DataPathNotFound(PathBuf),

    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A CSV document could not be parsed or written.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CombineError {
    /// Stable name of the error kind, used in run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "SourceUnavailable",
            Self::SourceEmpty { .. } => "SourceEmpty",
            Self::ColumnNotFound { .. } => "ColumnNotFound",
            Self::ColumnCollision { .. } => "ColumnCollision",
            Self::MissingOutputColumn { .. } => "MissingOutputColumn",
            Self::ConfigurationInvalid(_) => "ConfigurationInvalid",
            Self::NoData { .. } => "NoData",
            Self::DataPathNotFound(_) => "DataPathNotFound",
            Self::FileRead { .. } => "FileRead",
            Self::Csv(_) => "Csv",
            Self::JsonParse(_) => "JsonParse",
            Self::Io(_) => "Io",
        }
    }
}

fn path_suffix(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(": {}", p.display()),
        None => String::new(),
    }
}

fn candidates_suffix(candidates: &[String]) -> String {
    if candidates.is_empty() {
        String::new()
    } else {
        format!(" (qualified variants present: {})", candidates.join(", "))
    }
}

/// Convenience alias used throughout the health crates.
pub type Result<T> = std::result::Result<T, CombineError>;
