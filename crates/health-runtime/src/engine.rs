//! Combination engine.
//!
//! Runs one combination through `pending → loading_sources → merging →
//! shaping → written`, or into `failed` from whichever stage broke. Every
//! transition and notable fact goes to the [`EventSink`] the engine was built
//! with; the outcome is returned as a [`CombinationReport`].

use std::path::PathBuf;
use std::sync::Arc;

use health_core::config::{CombinationDescriptor, SourceDescriptor};
use health_core::error::{CombineError, Result};
use health_core::events::{CombinationEvent, CombinationStage, EventSink, NullSink};
use health_core::table::KeyedTable;
use health_core::time_utils::KeyGranularity;
use health_data::discovery::SourceResolver;
use health_data::loader::{load_source, LoaderOptions};
use health_data::merge::merge;
use health_data::projector::project;
use health_data::shaping::shape;
use health_data::writer::TableWriter;
use serde::Serialize;

// ── Report ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CombinationOutcome {
    Written {
        path: PathBuf,
        rows: usize,
        columns: usize,
    },
    Failed {
        stage: CombinationStage,
        kind: String,
        reason: String,
    },
}

/// Result of running one combination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinationReport {
    pub combination: String,
    pub output_file: String,
    /// Optional sources left out, in priority order.
    pub skipped_sources: Vec<String>,
    pub outcome: CombinationOutcome,
}

impl CombinationReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, CombinationOutcome::Written { .. })
    }

    /// Report for a combination that failed outside the engine.
    pub fn failed(
        combination: &CombinationDescriptor,
        stage: CombinationStage,
        kind: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            combination: combination.name.clone(),
            output_file: combination.output_file.clone(),
            skipped_sources: Vec::new(),
            outcome: CombinationOutcome::Failed {
                stage,
                kind: kind.into(),
                reason: reason.into(),
            },
        }
    }
}

// ── Stage tracking ────────────────────────────────────────────────────────────

struct Progress<'a> {
    sink: &'a dyn EventSink,
    combination: &'a str,
    stage: CombinationStage,
    skipped: Vec<String>,
}

impl<'a> Progress<'a> {
    fn new(sink: &'a dyn EventSink, combination: &'a str) -> Self {
        Self {
            sink,
            combination,
            stage: CombinationStage::Pending,
            skipped: Vec::new(),
        }
    }

    fn advance(&mut self, to: CombinationStage) {
        self.sink.emit(CombinationEvent::StageChanged {
            combination: self.combination.to_string(),
            from: self.stage,
            to,
        });
        self.stage = to;
    }

    fn emit(&self, event: CombinationEvent) {
        self.sink.emit(event);
    }
}

// ── CombinationEngine ─────────────────────────────────────────────────────────

/// Drives single combinations. Cheap to clone; clones share the resolver,
/// writer and sink.
#[derive(Clone)]
pub struct CombinationEngine {
    resolver: Arc<dyn SourceResolver>,
    writer: Arc<dyn TableWriter>,
    sink: Arc<dyn EventSink>,
    loader_options: LoaderOptions,
}

impl CombinationEngine {
    pub fn new(resolver: Arc<dyn SourceResolver>, writer: Arc<dyn TableWriter>) -> Self {
        Self {
            resolver,
            writer,
            sink: Arc::new(NullSink),
            loader_options: LoaderOptions::default(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_loader_options(mut self, options: LoaderOptions) -> Self {
        self.loader_options = options;
        self
    }

    /// Run `combination` to completion. Failures are captured in the report.
    pub fn run(&self, combination: &CombinationDescriptor) -> CombinationReport {
        let mut progress = Progress::new(self.sink.as_ref(), &combination.name);

        let outcome = match self.execute(combination, &mut progress) {
            Ok((path, rows, columns)) => CombinationOutcome::Written {
                path,
                rows,
                columns,
            },
            Err(err) => {
                let stage = progress.stage;
                progress.advance(CombinationStage::Failed);
                progress.emit(CombinationEvent::CombinationFailed {
                    combination: combination.name.clone(),
                    stage,
                    kind: err.kind().to_string(),
                    reason: err.to_string(),
                });
                CombinationOutcome::Failed {
                    stage,
                    kind: err.kind().to_string(),
                    reason: err.to_string(),
                }
            }
        };

        CombinationReport {
            combination: combination.name.clone(),
            output_file: combination.output_file.clone(),
            skipped_sources: progress.skipped,
            outcome,
        }
    }

    fn execute(
        &self,
        combination: &CombinationDescriptor,
        progress: &mut Progress<'_>,
    ) -> Result<(PathBuf, usize, usize)> {
        progress.advance(CombinationStage::LoadingSources);
        let mut prepared = Vec::with_capacity(combination.sources.len());
        // Alias of the first source that loads; every later source is
        // normalized at its granularity so the merge compares like with like.
        let mut canonical_key: Option<String> = None;
        for source in &combination.sources {
            let granularity = combination
                .granularity_for(canonical_key.as_deref().unwrap_or(source.key_alias()));
            match self.prepare(combination, source, granularity, progress) {
                Ok(table) => {
                    canonical_key.get_or_insert_with(|| source.key_alias().to_string());
                    prepared.push((source, table));
                }
                Err(err) if !source.required => {
                    progress.emit(CombinationEvent::SourceSkipped {
                        combination: combination.name.clone(),
                        source: source.name.clone(),
                        reason: err.to_string(),
                    });
                    progress.skipped.push(source.name.clone());
                }
                Err(err) => return Err(err),
            }
        }

        if prepared.is_empty() {
            return Err(CombineError::NoData {
                combination: combination.name.clone(),
            });
        }

        progress.advance(CombinationStage::Merging);
        let mut accumulator: Option<KeyedTable> = None;
        for (source, table) in prepared {
            let merged = merge(accumulator.take(), table, &source.name)?;
            progress.emit(CombinationEvent::MergeCompleted {
                combination: combination.name.clone(),
                source: source.name.clone(),
                rows: merged.row_count(),
                columns: merged.table.column_names(),
            });
            accumulator = Some(merged);
        }
        let merged = accumulator.ok_or_else(|| CombineError::NoData {
            combination: combination.name.clone(),
        })?;

        progress.advance(CombinationStage::Shaping);
        let output = shape(merged, combination)?;
        let path = self.writer.write(&output)?;

        progress.advance(CombinationStage::Written);
        progress.emit(CombinationEvent::OutputWritten {
            combination: combination.name.clone(),
            path: path.clone(),
            rows: output.row_count(),
            columns: output.column_count(),
        });

        Ok((path, output.row_count(), output.column_count()))
    }

    /// Resolve, load and project one source.
    fn prepare(
        &self,
        combination: &CombinationDescriptor,
        source: &SourceDescriptor,
        granularity: KeyGranularity,
        progress: &Progress<'_>,
    ) -> Result<KeyedTable> {
        let path = self
            .resolver
            .resolve(&source.name)
            .ok_or_else(|| CombineError::SourceUnavailable {
                source_name: source.name.clone(),
                path: None,
            })?;

        let loaded = load_source(source, &path, &self.loader_options)?;
        let projected = project(loaded, source, granularity)?;

        progress.emit(CombinationEvent::SourceLoaded {
            combination: combination.name.clone(),
            source: source.name.clone(),
            path,
            rows: projected.row_count(),
            columns: projected.table.column_names(),
        });
        Ok(projected)
    }
}

impl std::fmt::Debug for CombinationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombinationEngine")
            .field("loader_options", &self.loader_options)
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
