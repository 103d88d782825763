//! Structured notifications emitted while a combination runs.
//!
//! The engine never logs directly; it reports discrete facts to an
//! [`EventSink`] handed to it by the caller.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

// ── CombinationStage ──────────────────────────────────────────────────────────

/// Lifecycle of a single combination.
///
/// `Pending → LoadingSources → Merging → Shaping → Written`, or `Failed` from
/// any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationStage {
    Pending,
    LoadingSources,
    Merging,
    Shaping,
    Written,
    Failed,
}

impl CombinationStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Written | Self::Failed)
    }
}

impl std::fmt::Display for CombinationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::LoadingSources => write!(f, "loading_sources"),
            Self::Merging => write!(f, "merging"),
            Self::Shaping => write!(f, "shaping"),
            Self::Written => write!(f, "written"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ── CombinationEvent ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CombinationEvent {
    StageChanged {
        combination: String,
        from: CombinationStage,
        to: CombinationStage,
    },
    SourceSkipped {
        combination: String,
        source: String,
        reason: String,
    },
    SourceLoaded {
        combination: String,
        source: String,
        path: PathBuf,
        rows: usize,
        columns: Vec<String>,
    },
    MergeCompleted {
        combination: String,
        source: String,
        rows: usize,
        columns: Vec<String>,
    },
    OutputWritten {
        combination: String,
        path: PathBuf,
        rows: usize,
        columns: usize,
    },
    CombinationFailed {
        combination: String,
        stage: CombinationStage,
        kind: String,
        reason: String,
    },
}

impl CombinationEvent {
    pub fn combination(&self) -> &str {
        match self {
            Self::StageChanged { combination, .. }
            | Self::SourceSkipped { combination, .. }
            | Self::SourceLoaded { combination, .. }
            | Self::MergeCompleted { combination, .. }
            | Self::OutputWritten { combination, .. }
            | Self::CombinationFailed { combination, .. } => combination,
        }
    }
}

// ── Sinks ─────────────────────────────────────────────────────────────────────

/// Receiver of combination events. Shared across concurrently running
/// combinations, hence `Send + Sync`.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: CombinationEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: CombinationEvent) {}
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<CombinationEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<CombinationEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events belonging to one combination.
    pub fn events_for(&self, combination: &str) -> Vec<CombinationEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.combination() == combination)
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: CombinationEvent) {
        // Append-only, so a poisoned log is still consistent.
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for std::sync::Arc<S> {
    fn emit(&self, event: CombinationEvent) {
        (**self).emit(event);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn skipped(combination: &str) -> CombinationEvent {
        CombinationEvent::SourceSkipped {
            combination: combination.to_string(),
            source: "tracker.heart_rate".to_string(),
            reason: "not found".to_string(),
        }
    }

    #[test]
    fn test_recording_sink_preserves_order() {
        let sink = RecordingSink::new();
        sink.emit(skipped("a"));
        sink.emit(skipped("b"));
        sink.emit(skipped("a"));

        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.events_for("a").len(), 2);
        assert_eq!(sink.events()[1].combination(), "b");
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_value(skipped("daily")).unwrap();
        assert_eq!(json["event"], "source_skipped");
        assert_eq!(json["combination"], "daily");
    }

    #[test]
    fn test_stage_display_and_terminal() {
        assert_eq!(CombinationStage::LoadingSources.to_string(), "loading_sources");
        assert!(CombinationStage::Written.is_terminal());
        assert!(CombinationStage::Failed.is_terminal());
        assert!(!CombinationStage::Merging.is_terminal());
    }

    #[test]
    fn test_recording_sink_survives_poisoned_lock() {
        let sink = std::sync::Arc::new(RecordingSink::new());
        sink.emit(skipped("a"));
        let holder = sink.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.events.lock().unwrap();
            panic!("poison the sink lock");
        })
        .join();

        sink.emit(skipped("b"));
        let combinations: Vec<String> = sink
            .events()
            .iter()
            .map(|e| e.combination().to_string())
            .collect();
        assert_eq!(combinations, vec!["a", "b"]);
    }

    #[test]
    fn test_arc_sink_forwards() {
        let sink = std::sync::Arc::new(RecordingSink::new());
        let shared: std::sync::Arc<RecordingSink> = sink.clone();
        shared.emit(skipped("x"));
        assert_eq!(sink.events().len(), 1);
    }
}
