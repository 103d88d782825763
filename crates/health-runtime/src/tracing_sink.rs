use health_core::events::{CombinationEvent, EventSink};
use tracing::{debug, error, info, warn};

/// Forwards combination events to `tracing` as structured records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: CombinationEvent) {
        match event {
            CombinationEvent::StageChanged {
                combination,
                from,
                to,
            } => {
                debug!(%combination, %from, %to, "stage changed");
            }
            CombinationEvent::SourceSkipped {
                combination,
                source,
                reason,
            } => {
                warn!(%combination, %source, %reason, "source skipped");
            }
            CombinationEvent::SourceLoaded {
                combination,
                source,
                path,
                rows,
                columns,
            } => {
                info!(
                    %combination,
                    %source,
                    path = %path.display(),
                    rows,
                    columns = ?columns,
                    "source loaded"
                );
            }
            CombinationEvent::MergeCompleted {
                combination,
                source,
                rows,
                columns,
            } => {
                debug!(
                    %combination,
                    %source,
                    rows,
                    columns = columns.len(),
                    "merge completed"
                );
            }
            CombinationEvent::OutputWritten {
                combination,
                path,
                rows,
                columns,
            } => {
                info!(
                    %combination,
                    path = %path.display(),
                    rows,
                    columns,
                    "output written"
                );
            }
            CombinationEvent::CombinationFailed {
                combination,
                stage,
                kind,
                reason,
            } => {
                error!(%combination, %stage, %kind, %reason, "combination failed");
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
