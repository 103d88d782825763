//! Combination registry: runs every configured combination independently.

use health_core::config::{CombinationConfig, CombinationDescriptor};
use health_core::error::{CombineError, Result};
use health_core::events::CombinationStage;
use serde::Serialize;
use tracing::{info, warn};

use crate::engine::{CombinationEngine, CombinationReport};

// ── RunSummary ────────────────────────────────────────────────────────────────

/// Outcome of a whole run, one report per combination in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub reports: Vec<CombinationReport>,
}

impl RunSummary {
    pub fn succeeded(&self) -> impl Iterator<Item = &CombinationReport> {
        self.reports.iter().filter(|r| r.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &CombinationReport> {
        self.reports.iter().filter(|r| !r.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.reports.iter().all(CombinationReport::is_success)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── CombinationRegistry ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CombinationRegistry {
    combinations: Vec<CombinationDescriptor>,
}

impl CombinationRegistry {
    pub fn new(config: CombinationConfig) -> Result<Self> {
        Self::from_descriptors(config.combinations)
    }

    pub fn from_descriptors(combinations: Vec<CombinationDescriptor>) -> Result<Self> {
        if combinations.is_empty() {
            return Err(CombineError::ConfigurationInvalid(
                "no data combinations configured".into(),
            ));
        }
        Ok(Self { combinations })
    }

    pub fn combinations(&self) -> &[CombinationDescriptor] {
        &self.combinations
    }

    pub fn len(&self) -> usize {
        self.combinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combinations.is_empty()
    }

    /// Run every combination in configuration order.
    pub fn run(&self, engine: &CombinationEngine) -> RunSummary {
        info!(combinations = self.combinations.len(), "running combinations");
        let reports = self
            .combinations
            .iter()
            .map(|combination| engine.run(combination))
            .collect();
        RunSummary { reports }
    }

    /// Run every combination concurrently on tokio's blocking pool.
    ///
    /// Reports come back in configuration order, identical to [`Self::run`].
    pub async fn run_parallel(&self, engine: &CombinationEngine) -> RunSummary {
        info!(
            combinations = self.combinations.len(),
            "running combinations in parallel"
        );

        let handles: Vec<_> = self
            .combinations
            .iter()
            .cloned()
            .map(|combination| {
                let engine = engine.clone();
                tokio::task::spawn_blocking(move || engine.run(&combination))
            })
            .collect();

        let mut reports = Vec::with_capacity(handles.len());
        for (handle, combination) in handles.into_iter().zip(&self.combinations) {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    warn!(combination = %combination.name, "combination task failed: {}", e);
                    reports.push(CombinationReport::failed(
                        combination,
                        CombinationStage::Pending,
                        "TaskFailed",
                        e.to_string(),
                    ));
                }
            }
        }
        RunSummary { reports }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
