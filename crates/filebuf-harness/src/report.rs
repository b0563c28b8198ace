//! Report generation for conformance results.

use std::collections::BTreeMap;

use filebuf_core::metrics::MetricsSnapshot;
use serde::{Deserialize, Serialize};

use crate::verify::VerificationSummary;

/// A conformance report over one or more fixture sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConformanceReport {
    /// Report title.
    pub title: String,
    /// Handle buffering modes exercised.
    pub mode: String,
    /// Timestamp (UTC).
    pub timestamp: String,
    /// SHA-256 of each fixture set, keyed by family.
    #[serde(default)]
    pub fixture_digests: BTreeMap<String, String>,
    /// Engine counters at the end of the run.
    #[serde(default)]
    pub metrics: BTreeMap<String, u64>,
    /// Verification summary.
    pub summary: VerificationSummary,
}

impl ConformanceReport {
    /// A report with no digests or metrics attached.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        mode: impl Into<String>,
        timestamp: impl Into<String>,
        summary: VerificationSummary,
    ) -> Self {
        Self {
            title: title.into(),
            mode: mode.into(),
            timestamp: timestamp.into(),
            fixture_digests: BTreeMap::new(),
            metrics: BTreeMap::new(),
            summary,
        }
    }

    /// Attach an engine metrics snapshot.
    #[must_use]
    pub fn with_metrics(mut self, snapshot: &MetricsSnapshot) -> Self {
        self.metrics = snapshot
            .entries()
            .iter()
            .map(|&(name, value)| (name.to_string(), value))
            .collect();
        self
    }

    /// Render the report as markdown.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", self.title));
        out.push_str(&format!("- Mode: {}\n", self.mode));
        out.push_str(&format!("- Timestamp: {}\n", self.timestamp));
        out.push_str(&format!("- Total: {}\n", self.summary.total));
        out.push_str(&format!("- Passed: {}\n", self.summary.passed));
        out.push_str(&format!("- Failed: {}\n\n", self.summary.failed));

        out.push_str("| Case | Family | Mode | Status |\n");
        out.push_str("|------|--------|------|--------|\n");
        for r in &self.summary.results {
            let status = if r.passed { "PASS" } else { "FAIL" };
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                r.case_name, r.family, r.mode, status
            ));
        }

        let failures: Vec<_> = self.summary.failures().collect();
        if !failures.is_empty() {
            out.push_str("\n## Failures\n");
            for r in failures {
                out.push_str(&format!("\n### {} ({})\n\n```diff\n", r.case_name, r.mode));
                out.push_str(r.diff.as_deref().unwrap_or("[no diff]"));
                out.push_str("\n```\n");
            }
        }

        if !self.metrics.is_empty() {
            out.push_str("\n## Engine metrics\n\n| Counter | Value |\n|---------|-------|\n");
            for (name, value) in &self.metrics {
                out.push_str(&format!("| {name} | {value} |\n"));
            }
        }

        if !self.fixture_digests.is_empty() {
            out.push_str("\n## Fixtures\n\n");
            for (family, digest) in &self.fixture_digests {
                out.push_str(&format!("- {family}: `{digest}`\n"));
            }
        }
        out
    }

    /// Render the report as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}
