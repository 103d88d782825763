use std::collections::BTreeMap;
use std::fmt::Write;

use health_data::discovery::{Category, FilteredSource};
use health_runtime::{CombinationOutcome, RunSummary};

// ── Source listing ─────────────────────────────────────────────────────────────

/// Render the available sources grouped by category.
pub fn format_categories(categories: &BTreeMap<String, Category>) -> String {
    let mut out = String::new();
    let mut total = 0;

    for (name, category) in categories {
        let _ = writeln!(out, "\n{}", name.to_uppercase());
        if !category.subcategories.is_empty() {
            let _ = writeln!(out, "  Subcategories:");
            for sub in &category.subcategories {
                let _ = writeln!(out, "    - {sub}");
            }
        }
        if !category.files.is_empty() {
            let _ = writeln!(out, "  Files:");
            for file in &category.files {
                let _ = writeln!(out, "    - {file}");
            }
        }
        let _ = writeln!(out, "  Total items in {name}: {}", category.len());
        total += category.len();
    }

    let _ = writeln!(
        out,
        "\n{} categories, {} sources available",
        categories.len(),
        total
    );
    out
}

/// One line per discovered file that was left out.
pub fn format_filtered(filtered: &[FilteredSource]) -> String {
    let mut out = String::new();
    for source in filtered {
        let _ = writeln!(out, "[FILTERED] {} ({})", source.name, source.reason);
    }
    out
}

// ── Run summary ────────────────────────────────────────────────────────────────

pub fn format_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let succeeded = summary.succeeded().count();
    let failed = summary.reports.len() - succeeded;

    let _ = writeln!(
        out,
        "\nCombinations: {succeeded} succeeded, {failed} failed"
    );
    for report in &summary.reports {
        match &report.outcome {
            CombinationOutcome::Written {
                path,
                rows,
                columns,
            } => {
                let _ = writeln!(
                    out,
                    "  OK    {:<24} {} rows x {} columns -> {}",
                    report.combination,
                    rows,
                    columns,
                    path.display()
                );
            }
            CombinationOutcome::Failed {
                stage,
                kind,
                reason,
            } => {
                let _ = writeln!(
                    out,
                    "  FAIL  {:<24} [{kind} during {stage}] {reason}",
                    report.combination
                );
            }
        }
        if !report.skipped_sources.is_empty() {
            let _ = writeln!(out, "        skipped: {}", report.skipped_sources.join(", "));
        }
    }
    out
}

// ── Tests ──────────────────────────────────────────────────────────────────────
