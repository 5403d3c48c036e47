//! Convergence tracking over successive verification reports.

pub mod fingerprint;
pub mod tracker;

pub use fingerprint::IssueFingerprint;
pub use tracker::{classify, ConvergenceTracker, Progress};
