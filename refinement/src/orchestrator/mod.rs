//! Orchestration loop
//!
//! - `ports`: collaborator traits the loop drives
//! - `state_machine`: guarded states and the transition log
//! - `engine`: the loop itself
//! - `outcome`: what a run returns

pub mod engine;
pub mod outcome;
pub mod ports;
pub mod state_machine;

pub use engine::{RefinementEngine, SEMANTIC_FAILED_ISSUE, SEMANTIC_REJECTED_ISSUE};
pub use outcome::{IterationLog, LoopAction, RunOutcome, StopReason};
pub use ports::{
    AvoidExpander, Collaborators, PlanGenerator, PlanReviser, RevisionContext, SemanticVerifier,
    SubstitutionSuggester,
};
pub use state_machine::{IllegalTransition, LoopState, StateMachine, TransitionRecord};
