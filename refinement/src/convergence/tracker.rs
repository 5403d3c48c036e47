//! Convergence Tracker: classifies progress over successive fingerprints
//!
//! History is per run: a tracker is created when a run starts and dropped
//! when it ends.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::fingerprint::IssueFingerprint;

/// Progress classification for the newest fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Progress {
    /// No issues left
    Converged,
    /// Same issue set as the previous iteration
    Stagnant,
    /// New issues appeared and the count did not drop
    Regressing,
    Improving,
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::Stagnant => write!(f, "stagnant"),
            Self::Regressing => write!(f, "regressing"),
            Self::Improving => write!(f, "improving"),
        }
    }
}

/// Classify the last entry of `history` against the one before it.
///
/// Rules are checked in order: converged, stagnant, regressing, improving.
/// An empty history counts as converged; a first non-empty fingerprint is
/// improving.
pub fn classify(history: &[IssueFingerprint]) -> Progress {
    let Some(latest) = history.last() else {
        return Progress::Converged;
    };
    if latest.is_empty() {
        return Progress::Converged;
    }
    let Some(previous) = history.len().checked_sub(2).map(|i| &history[i]) else {
        return Progress::Improving;
    };
    if latest == previous {
        return Progress::Stagnant;
    }
    let introduced = latest.introduced_since(previous).next().is_some();
    if introduced && latest.len() >= previous.len() {
        return Progress::Regressing;
    }
    Progress::Improving
}

/// Per-run fingerprint history plus the consecutive-stagnation counter.
#[derive(Debug, Clone, Default)]
pub struct ConvergenceTracker {
    history: Vec<IssueFingerprint>,
    consecutive_stagnant: u32,
    regressions: u32,
}

impl ConvergenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fingerprint and classify it.
    pub fn record(&mut self, fingerprint: IssueFingerprint) -> Progress {
        self.history.push(fingerprint);
        let progress = classify(&self.history);
        match progress {
            Progress::Stagnant => self.consecutive_stagnant += 1,
            Progress::Regressing => {
                self.regressions += 1;
                self.consecutive_stagnant = 0;
            }
            _ => self.consecutive_stagnant = 0,
        }
        debug!(
            iteration = self.history.len() - 1,
            %progress,
            consecutive_stagnant = self.consecutive_stagnant,
            "Recorded fingerprint"
        );
        progress
    }

    pub fn consecutive_stagnant(&self) -> u32 {
        self.consecutive_stagnant
    }

    pub fn regressions(&self) -> u32 {
        self.regressions
    }

    pub fn history(&self) -> &[IssueFingerprint] {
        &self.history
    }

    pub fn latest(&self) -> Option<&IssueFingerprint> {
        self.history.last()
    }
}
