//! Run telemetry.
//!
//! One [`RunRecord`] per finished run, appended to a JSONL file so runs can
//! be compared across prompt versions and models.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use refinement::{LoopAction, Profile, RunOutcome, StopReason};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::prompts::PROMPT_VERSION;

/// Summary of one refinement run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: i64,
    pub model: String,
    pub prompt_version: String,
    pub goal: String,
    pub days_per_week: u32,
    pub minutes_per_day: u32,
    pub stop_reason: StopReason,
    pub converged: bool,
    /// Iterations whose report was not ok
    pub iterations_logged: usize,
    pub substitutions_applied: usize,
    pub regressions: u32,
    pub generation_failures: u32,
    pub revisions_requested: usize,
    /// Issue ids still open in the final report
    pub final_issue_ids: Vec<String>,
}

impl RunRecord {
    pub fn from_outcome(outcome: &RunOutcome, profile: &Profile, model: &str) -> Self {
        Self {
            started_at: outcome.started_at,
            elapsed_ms: outcome.elapsed_ms(),
            model: model.to_string(),
            prompt_version: PROMPT_VERSION.to_string(),
            goal: profile.goal.clone(),
            days_per_week: profile.days_per_week,
            minutes_per_day: profile.minutes_per_day,
            stop_reason: outcome.stop_reason,
            converged: outcome.converged(),
            iterations_logged: outcome.iterations_log.len(),
            substitutions_applied: outcome.substitutions_applied,
            regressions: outcome.regressions,
            generation_failures: outcome
                .iterations_log
                .iter()
                .map(|l| l.generation_failures)
                .sum(),
            revisions_requested: outcome
                .iterations_log
                .iter()
                .filter(|l| l.action == LoopAction::RequestRevision)
                .count(),
            final_issue_ids: outcome
                .final_report
                .as_ref()
                .map(|r| r.issue_ids())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Telemetry file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Telemetry record could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Telemetry file {} line {line}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl TelemetryError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Append one record as a single JSONL line, creating the file if needed.
/// The record is encoded before the file is touched, so a failure never
/// leaves a partial line behind.
pub fn append_telemetry(record: &RunRecord, path: &Path) -> Result<(), TelemetryError> {
    let mut line = serde_json::to_string(record).map_err(TelemetryError::Encode)?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| TelemetryError::io(path, e))?;
    file.write_all(line.as_bytes())
        .map_err(|e| TelemetryError::io(path, e))?;
    debug!(path = %path.display(), converged = record.converged, "Appended run record");
    Ok(())
}

/// Run records loaded from a telemetry file, with simple aggregates.
pub struct TelemetryReader {
    runs: Vec<RunRecord>,
}

impl TelemetryReader {
    /// Load every record. Blank lines are ignored; a line that is not a
    /// record fails the whole read with its 1-based line number.
    pub fn read_from_file(path: &Path) -> Result<Self, TelemetryError> {
        let raw = std::fs::read_to_string(path).map_err(|e| TelemetryError::io(path, e))?;
        let runs = raw
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str(line).map_err(|source| TelemetryError::Corrupt {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    source,
                })
            })
            .collect::<Result<Vec<RunRecord>, _>>()?;
        Ok(Self { runs })
    }

    pub fn runs(&self) -> &[RunRecord] {
        &self.runs
    }

    /// Fraction of runs that converged, 0.0 when empty.
    pub fn convergence_rate(&self) -> f64 {
        if self.runs.is_empty() {
            return 0.0;
        }
        self.runs.iter().filter(|r| r.converged).count() as f64 / self.runs.len() as f64
    }

    /// How often each issue id was still open when a run stopped.
    pub fn open_issue_frequencies(&self) -> BTreeMap<String, usize> {
        let mut freq = BTreeMap::new();
        for id in self.runs.iter().flat_map(|r| r.final_issue_ids.iter()) {
            *freq.entry(id.clone()).or_insert(0) += 1;
        }
        freq
    }
}
