//! Workout Plan Refinement Engine
//!
//! Turns a training profile into a verified weekly plan by alternating calls
//! to generative collaborators with deterministic corrections.
//!
//! # Components
//!
//! - **Edit applier** (`edits`): pure `(Plan, [Edit]) -> Plan`, skipping and
//!   recording edits that do not resolve
//! - **Fast verifier** (`verifier`): time fit, movement balance, avoidance
//!   and progression sanity, with suggested fixes
//! - **Convergence tracker** (`convergence`): improving / stagnant /
//!   regressing / converged over successive issue sets
//! - **Orchestration loop** (`orchestrator`): generate, substitute, then
//!   verify / track / act until converged, stagnant, cancelled or capped
//!
//! Generative collaborators live behind the traits in
//! [`orchestrator::ports`]; this crate does no network I/O.

#![allow(clippy::uninlined_format_args)]

pub mod avoidance;
pub mod config;
pub mod convergence;
pub mod edits;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod verifier;

pub use avoidance::{ExpandedAvoidance, LiteralExpander};
pub use config::{MovementPattern, PatternBucket, PatternTable, RefinementConfig, SaneBounds, TimeTable};
pub use convergence::{classify, ConvergenceTracker, IssueFingerprint, Progress};
pub use edits::{
    apply_edits, apply_substitutions, parse_edits, split_edits, ApplyOutcome, Edit, EditOp,
    EditType, NoteTarget, SkippedEdit, SubstitutionSuggestion,
};
pub use error::{ConfigError, EditError, GenerationError, RefinementError, RetryCategory};
pub use orchestrator::{
    AvoidExpander, Collaborators, IterationLog, LoopAction, LoopState, PlanGenerator, PlanReviser,
    RefinementEngine, RevisionContext, RunOutcome, SemanticVerifier, StopReason,
    SubstitutionSuggester, TransitionRecord, SEMANTIC_FAILED_ISSUE, SEMANTIC_REJECTED_ISSUE,
};
pub use plan::{Block, BlockRef, Day, Exercise, ExerciseRef, Plan, Profile, TrainingHistory};
pub use verifier::{FastVerifier, Issue, VerificationPhase, VerificationReport};
