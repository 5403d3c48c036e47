//! Two-phase plan verification
//!
//! The fast phase runs in-process on every iteration. The semantic phase is
//! an external collaborator (see [`crate::orchestrator::ports::SemanticVerifier`])
//! and only runs once the fast phase passes. Both produce a
//! [`VerificationReport`].

pub mod estimate;
pub mod fast;
pub mod report;

pub use fast::FastVerifier;
pub use report::{
    slug, CheckResult, Issue, VerificationPhase, VerificationReport, CHECK_AVOIDANCE,
    CHECK_BALANCE, CHECK_PROGRESSION, CHECK_TIME_FIT,
};
