//! Run results returned to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state_machine::TransitionRecord;
use crate::convergence::Progress;
use crate::plan::Plan;
use crate::verifier::{VerificationPhase, VerificationReport};

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A verification passed
    Converged,
    /// The same issues persisted for the configured number of iterations
    Stagnation,
    /// The iteration cap ran out
    CapReached,
    /// Cancellation was signalled between iterations
    Cancelled,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::Stagnation => write!(f, "stagnation"),
            Self::CapReached => write!(f, "cap_reached"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What the loop did after tracking an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopAction {
    ApplyMechanicalEdits,
    RequestRevision,
    /// Semantic phase was unreachable; the plan is left as is
    NoChange,
    Stop,
}

/// One entry per iteration whose report was not ok.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationLog {
    pub iteration_index: u32,
    pub phase: VerificationPhase,
    pub ok: bool,
    pub issue_count: usize,
    /// Sorted, deduplicated
    pub issue_ids: Vec<String>,
    /// Edits the applier accepted this iteration
    pub applied_edit_count: usize,
    pub progress: Progress,
    pub action: LoopAction,
    /// Failed generative calls this iteration, retries included
    pub generation_failures: u32,
}

/// Everything a finished run hands back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Best current plan when the run stopped
    pub final_plan: Plan,
    /// Last verification report; `None` only if cancelled before the first
    /// iteration
    pub final_report: Option<VerificationReport>,
    pub iterations_log: Vec<IterationLog>,
    pub transitions: Vec<TransitionRecord>,
    pub stop_reason: StopReason,
    pub substitutions_applied: usize,
    /// Iterations classified as regressing
    pub regressions: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn converged(&self) -> bool {
        self.stop_reason == StopReason::Converged
    }

    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "stop={} iterations_logged={} substitutions={} regressions={} ({}ms)",
            self.stop_reason,
            self.iterations_log.len(),
            self.substitutions_applied,
            self.regressions,
            self.elapsed_ms()
        )
    }
}
