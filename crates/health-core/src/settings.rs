use clap::Parser;
use std::path::PathBuf;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Combine per-metric health CSV exports into unified tables
#[derive(Parser, Debug, Clone)]
#[command(
    name = "health-combine",
    about = "Combine per-metric health CSV exports into unified tables",
    version
)]
pub struct Settings {
    /// Directory holding the health export dump(s)
    #[arg(long, default_value = "./Samsung Health", env = "HEALTH_DATA_PATH")]
    pub data_path: PathBuf,

    /// Data-combination configuration (JSON)
    #[arg(long, default_value = "data_combination.json")]
    pub config: PathBuf,

    /// File listing source names to ignore, one per line
    #[arg(long, default_value = "ignore_csvs.txt")]
    pub ignore_file: PathBuf,

    /// Directory the combined CSV files are written to
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Sources with this many data rows or fewer are treated as empty
    #[arg(long, default_value = "10")]
    pub min_rows: usize,

    /// Metadata lines preceding the header in every export file
    #[arg(long, default_value = "1")]
    pub skip_rows: usize,

    /// Keep sources regardless of how many data rows they have
    #[arg(long)]
    pub keep_empty: bool,

    /// Process combinations concurrently
    #[arg(long)]
    pub parallel: bool,

    /// Do not print the available-sources listing
    #[arg(long)]
    pub no_listing: bool,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Run log file (JSON lines); defaults to logs/health_combine_<timestamp>.log
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Settings {
    /// Parse the process arguments and resolve derived values.
    pub fn load() -> Self {
        Self::resolve(Settings::parse())
    }

    /// Same as [`Settings::load`] but with an explicit argument list.
    pub fn load_from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::resolve(Settings::parse_from(args))
    }

    /// `--debug` overrides the log level.
    fn resolve(mut settings: Settings) -> Settings {
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
