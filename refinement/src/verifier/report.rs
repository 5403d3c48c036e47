//! Verification Report: shared output shape of the fast and semantic phases
//!
//! Issues carry machine-readable ids (used for convergence fingerprints) and
//! the edits the verifier suggests to resolve them.

use serde::{Deserialize, Serialize};

use crate::convergence::IssueFingerprint;
use crate::edits::Edit;

pub const CHECK_TIME_FIT: &str = "time_fit";
pub const CHECK_BALANCE: &str = "balance";
pub const CHECK_AVOIDANCE: &str = "avoidance";
pub const CHECK_PROGRESSION: &str = "progression";

/// Which verification phase produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPhase {
    /// Deterministic, in-process checks
    Fast,
    /// External generative review
    Semantic,
}

impl std::fmt::Display for VerificationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Semantic => write!(f, "semantic"),
        }
    }
}

/// Result of one named sub-check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub ok: bool,
    /// Check-specific details (per-day minutes, presence counts, ...)
    #[serde(default)]
    pub details: serde_json::Value,
}

impl CheckResult {
    pub fn new(ok: bool, details: serde_json::Value) -> Self {
        Self { ok, details }
    }
}

/// A single finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Stable machine-readable id, e.g. `time_day_2_over`
    pub id: String,
    /// Sub-check that raised it
    pub check: String,
    pub message: String,
    /// Suggested fixes. Empty means a revision is needed.
    #[serde(default)]
    pub edits: Vec<Edit>,
}

impl Issue {
    pub fn new(id: impl Into<String>, check: &str, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            check: check.to_string(),
            message: message.into(),
            edits: Vec::new(),
        }
    }

    pub fn with_edits(mut self, edits: Vec<Edit>) -> Self {
        self.edits = edits;
        self
    }
}

/// Complete verification report. A pure function of what was verified:
/// equal inputs give equal reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub phase: VerificationPhase,
    /// True iff `issues` is empty
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_fit: Option<CheckResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<CheckResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avoidance: Option<CheckResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progression: Option<CheckResult>,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

impl VerificationReport {
    pub fn new(phase: VerificationPhase) -> Self {
        Self {
            phase,
            ok: true,
            time_fit: None,
            balance: None,
            avoidance: None,
            progression: None,
            issues: Vec::new(),
        }
    }

    pub fn add_issue(&mut self, issue: Issue) {
        self.issues.push(issue);
        self.ok = false;
    }

    /// Recompute `ok` from the issue list.
    pub fn finalize(&mut self) {
        self.ok = self.issues.is_empty();
    }

    pub fn fingerprint(&self) -> IssueFingerprint {
        IssueFingerprint::from_ids(self.issues.iter().map(|i| i.id.as_str()))
    }

    pub fn issue_ids(&self) -> Vec<String> {
        self.fingerprint().into_iter().collect()
    }

    /// All suggested edits, in issue order
    pub fn suggested_edits(&self) -> Vec<Edit> {
        self.issues
            .iter()
            .flat_map(|i| i.edits.iter().cloned())
            .collect()
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        if self.ok {
            format!("{} verification: PASS", self.phase)
        } else {
            let ids = self.issue_ids();
            format!(
                "{} verification: FAIL ({} issues: {})",
                self.phase,
                ids.len(),
                ids.join(", ")
            )
        }
    }
}

/// Lowercase, with every run of non-alphanumerics collapsed to `_`.
pub fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}
