mod bootstrap;
mod report;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use health_core::config::CombinationConfig;
use health_core::settings::Settings;
use health_data::discovery::{read_ignore_list, resolve_dump_dir, DiscoveryOptions, SourceCatalog};
use health_data::loader::LoaderOptions;
use health_data::writer::CsvTableWriter;
use health_runtime::{CombinationEngine, CombinationRegistry, TracingSink};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let settings = Settings::load();

    let log_path = bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;
    tracing::info!("health-combine v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(log_file = %log_path.display(), "run log");

    // Any configuration problem aborts the whole run.
    let config = CombinationConfig::load(&settings.config)
        .with_context(|| format!("loading configuration {}", settings.config.display()))?;
    let options = DiscoveryOptions {
        ignore: read_ignore_list(&settings.ignore_file),
        enabled: config.enabled_csvs.iter().cloned().collect(),
        min_rows: (!settings.keep_empty).then_some(settings.min_rows),
        skip_rows: settings.skip_rows,
    };
    let registry = CombinationRegistry::new(config)?;

    let dump_dir = resolve_dump_dir(&settings.data_path)
        .with_context(|| format!("locating export in {}", settings.data_path.display()))?;
    let catalog = SourceCatalog::discover(&dump_dir, &options);

    if !settings.no_listing {
        print!("{}", report::format_filtered(catalog.filtered()));
        print!("{}", report::format_categories(&catalog.categories()));
    }

    let engine = CombinationEngine::new(
        Arc::new(catalog),
        Arc::new(CsvTableWriter::new(&settings.output_dir)),
    )
    .with_sink(Arc::new(TracingSink))
    .with_loader_options(LoaderOptions {
        skip_rows: settings.skip_rows,
    });

    let summary = if settings.parallel {
        registry.run_parallel(&engine).await
    } else {
        registry.run(&engine)
    };

    print!("{}", report::format_summary(&summary));
    tracing::info!(summary = %summary.to_json()?, "run finished");

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
