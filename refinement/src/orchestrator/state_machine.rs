//! Refinement loop state machine: explicit states and legal transition guards.
//!
//! Every transition is validated against a fixed table and recorded, so a
//! finished run can be replayed state by state from its `TransitionRecord`s.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::RefinementError;

/// The set of loop states.
///
/// Every run starts at `Generate` and ends at `Stopped` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Calling the plan generator.
    Generate,
    /// Asking for substitution suggestions.
    SuggestSubs,
    /// Running suggestions through the applier, once.
    ApplySubs,
    /// Deterministic checks.
    VerifyFast,
    /// External review; only entered when the fast report is ok.
    VerifySemantic,
    /// Fingerprinting the report and classifying progress.
    Track,
    /// Applying suggested edits without a generative call.
    ApplyMechanicalEdits,
    /// Asking the reviser for a new plan.
    RequestRevision,
    /// Run finished with a stop reason (terminal).
    Stopped,
    /// Run aborted without a plan (terminal).
    Failed,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generate => write!(f, "Generate"),
            Self::SuggestSubs => write!(f, "SuggestSubs"),
            Self::ApplySubs => write!(f, "ApplySubs"),
            Self::VerifyFast => write!(f, "VerifyFast"),
            Self::VerifySemantic => write!(f, "VerifySemantic"),
            Self::Track => write!(f, "Track"),
            Self::ApplyMechanicalEdits => write!(f, "ApplyMechanicalEdits"),
            Self::RequestRevision => write!(f, "RequestRevision"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Legal transitions.
///
/// ```text
/// Generate → SuggestSubs | Failed
/// SuggestSubs → ApplySubs
/// ApplySubs → VerifyFast | Stopped
/// VerifyFast → VerifySemantic | Track
/// VerifySemantic → Track
/// Track → ApplyMechanicalEdits | RequestRevision | VerifyFast | Stopped
/// ApplyMechanicalEdits → RequestRevision | VerifyFast | Stopped
/// RequestRevision → VerifyFast | Stopped
/// ```
fn is_legal_transition(from: LoopState, to: LoopState) -> bool {
    use LoopState::*;

    if to == Failed && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Generate, SuggestSubs)
            | (SuggestSubs, ApplySubs)
            | (ApplySubs, VerifyFast)
            // cancelled before the first iteration
            | (ApplySubs, Stopped)
            | (VerifyFast, VerifySemantic)
            | (VerifyFast, Track)
            | (VerifySemantic, Track)
            // converged or stagnant
            | (Track, Stopped)
            | (Track, ApplyMechanicalEdits)
            | (Track, RequestRevision)
            // semantic phase unavailable, nothing to act on
            | (Track, VerifyFast)
            // partial mechanical fix, remainder goes to the reviser
            | (ApplyMechanicalEdits, RequestRevision)
            | (ApplyMechanicalEdits, VerifyFast)
            | (ApplyMechanicalEdits, Stopped)
            | (RequestRevision, VerifyFast)
            | (RequestRevision, Stopped)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: LoopState,
    pub to: LoopState,
    /// Loop iteration at the time of transition (0 for pre-loop states).
    pub iteration: u32,
    /// Milliseconds since the state machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: LoopState,
    pub to: LoopState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal state transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

impl From<IllegalTransition> for RefinementError {
    fn from(err: IllegalTransition) -> Self {
        RefinementError::IllegalTransition {
            from: err.from.to_string(),
            to: err.to.to_string(),
        }
    }
}

/// Tracks the current state and the transition log of one run.
pub struct StateMachine {
    current: LoopState,
    iteration: u32,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StateMachine {
    /// Create a new state machine starting at `Generate`.
    pub fn new() -> Self {
        Self {
            current: LoopState::Generate,
            iteration: 0,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> LoopState {
        self.current
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn set_iteration(&mut self, iteration: u32) {
        self.iteration = iteration;
    }

    /// Move to `to` if the transition table allows it.
    pub fn advance(&mut self, to: LoopState, reason: Option<&str>) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        let record = TransitionRecord {
            from: self.current,
            to,
            iteration: self.iteration,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };

        tracing::debug!(
            from = %self.current,
            to = %to,
            iteration = self.iteration,
            "State transition"
        );

        self.transitions.push(record);
        self.current = to;
        Ok(())
    }

    /// Transition to `Failed` from any non-terminal state.
    pub fn fail(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(LoopState::Failed, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn into_transitions(self) -> Vec<TransitionRecord> {
        self.transitions
    }

    pub fn summary(&self) -> String {
        let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        let mut out = format!(
            "{} → {} ({}ms, {} transitions)",
            LoopState::Generate,
            self.current,
            self.created_at.elapsed().as_millis(),
            self.transitions.len(),
        );
        if !states.is_empty() {
            out.push_str(&format!(" [{}]", states.join(" → ")));
        }
        out
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(state: LoopState) -> StateMachine {
        StateMachine {
            current: state,
            iteration: 0,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    #[test]
    fn test_initial_state() {
        let sm = StateMachine::new();
        assert_eq!(sm.current(), LoopState::Generate);
        assert!(!sm.is_terminal());
        assert!(sm.transitions().is_empty());
    }

    #[test]
    fn test_mechanical_path_to_convergence() {
        let mut sm = StateMachine::new();
        sm.advance(LoopState::SuggestSubs, None).unwrap();
        sm.advance(LoopState::ApplySubs, None).unwrap();
        sm.advance(LoopState::VerifyFast, None).unwrap();
        sm.advance(LoopState::Track, Some("fast issues")).unwrap();
        sm.advance(LoopState::ApplyMechanicalEdits, None).unwrap();
        sm.set_iteration(1);
        sm.advance(LoopState::VerifyFast, None).unwrap();
        sm.advance(LoopState::VerifySemantic, None).unwrap();
        sm.advance(LoopState::Track, None).unwrap();
        sm.advance(LoopState::Stopped, Some("converged")).unwrap();

        assert!(sm.is_terminal());
        assert_eq!(sm.transitions().len(), 9);
        assert_eq!(sm.transitions()[8].iteration, 1);
        assert_eq!(sm.transitions()[8].reason.as_deref(), Some("converged"));
    }

    #[test]
    fn test_partial_fix_then_revision() {
        let mut sm = at(LoopState::Track);
        sm.advance(LoopState::ApplyMechanicalEdits, None).unwrap();
        sm.advance(LoopState::RequestRevision, None).unwrap();
        sm.advance(LoopState::VerifyFast, None).unwrap();
    }

    #[test]
    fn test_failure_from_any_non_terminal_state() {
        for state in [
            LoopState::Generate,
            LoopState::SuggestSubs,
            LoopState::ApplySubs,
            LoopState::VerifyFast,
            LoopState::VerifySemantic,
            LoopState::Track,
            LoopState::ApplyMechanicalEdits,
            LoopState::RequestRevision,
        ] {
            let mut sm = at(state);
            assert!(sm.fail("test failure").is_ok());
            assert_eq!(sm.current(), LoopState::Failed);
        }
    }

    #[test]
    fn test_cannot_leave_terminal_state() {
        let mut sm = at(LoopState::Stopped);
        assert!(sm.advance(LoopState::VerifyFast, None).is_err());
        assert!(sm.fail("nope").is_err());
    }

    #[test]
    fn test_semantic_requires_fast_first() {
        let mut sm = at(LoopState::ApplySubs);
        let err = sm.advance(LoopState::VerifySemantic, None).unwrap_err();
        assert_eq!(err.from, LoopState::ApplySubs);
        assert_eq!(err.to, LoopState::VerifySemantic);
        let as_refinement: RefinementError = err.into();
        assert!(as_refinement.to_string().contains("ApplySubs"));
    }

    #[test]
    fn test_summary_lists_states() {
        let mut sm = StateMachine::new();
        sm.advance(LoopState::SuggestSubs, None).unwrap();
        assert!(sm.summary().contains("Generate → SuggestSubs"));
    }
}
