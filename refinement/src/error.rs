//! Error taxonomy for the refinement engine.
//!
//! | Error              | Raised by            | Handling                          |
//! |--------------------|----------------------|-----------------------------------|
//! | `EditError`        | edit decode / apply  | edit skipped, batch continues     |
//! | `GenerationError`  | external agents      | retried once, then no-progress    |
//! | `ConfigError`      | config load/validate | fatal at startup                  |
//! | `RefinementError`  | orchestration loop   | run-level failure                 |

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::plan::{BlockRef, ExerciseRef};

/// Why a single edit was rejected. Never aborts a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    /// Unknown `type` tag or a payload that does not decode.
    #[error("Malformed edit: {0}")]
    Malformed(String),

    /// Location does not resolve against the current plan.
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    /// Target was removed by an earlier edit in the same batch.
    #[error("Stale location: {at} was removed earlier in this batch")]
    StaleLocation { at: ExerciseRef },

    /// Payload decoded but violates a field constraint (sets < 1, rest < 0).
    #[error("Invalid payload for {edit_type}: {message}")]
    InvalidPayload { edit_type: String, message: String },

    /// `reorder_days` permutation is not a bijection over the day indices.
    #[error("Day order {order:?} is not a permutation of 0..{day_count}")]
    NotABijection { order: Vec<usize>, day_count: usize },
}

impl EditError {
    pub fn day_out_of_range(day: usize, day_count: usize) -> Self {
        Self::InvalidLocation(format!("day {} out of range ({} days)", day, day_count))
    }

    pub fn block_out_of_range(at: BlockRef, block_count: usize) -> Self {
        Self::InvalidLocation(format!("{} out of range ({} blocks)", at, block_count))
    }

    pub fn exercise_out_of_range(at: ExerciseRef, exercise_count: usize) -> Self {
        Self::InvalidLocation(format!("{} out of range ({} exercises)", at, exercise_count))
    }

    pub fn payload(edit_type: &str, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            edit_type: edit_type.to_string(),
            message: message.into(),
        }
    }

    /// Short machine-readable code for logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::InvalidLocation(_) => "invalid_location",
            Self::StaleLocation { .. } => "stale_location",
            Self::InvalidPayload { .. } => "invalid_payload",
            Self::NotABijection { .. } => "not_a_bijection",
        }
    }
}

/// Classification used by the loop to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    /// Network / inference backend hiccup.
    Transient,
    /// Model output did not decode into the expected shape.
    ParseFailure,
    /// Component is not configured or reachable at all.
    Unavailable,
    /// Component refused the request outright.
    Rejected,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Transient | Self::ParseFailure)
    }
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::ParseFailure => write!(f, "parse_failure"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Failure of an external generative component.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// Output could not be parsed into a plan / report / suggestion list.
    #[error("Unparseable output: {0}")]
    ParseFailure(String),

    #[error("Component unavailable: {0}")]
    Unavailable(String),

    #[error("Rejected: {0}")]
    Rejected(String),
}

impl GenerationError {
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::RequestFailed(_) | Self::Timeout(_) => RetryCategory::Transient,
            Self::ParseFailure(_) => RetryCategory::ParseFailure,
            Self::Unavailable(_) => RetryCategory::Unavailable,
            Self::Rejected(_) => RetryCategory::Rejected,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.retry_category().is_retriable()
    }
}

impl From<serde_json::Error> for GenerationError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseFailure(err.to_string())
    }
}

/// Invalid configuration. Only ever raised before a run starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_revisions must be at least 1 (got {0})")]
    InvalidCap(u32),

    #[error("Invalid {name}: {message}")]
    InvalidValue { name: String, message: String },

    #[error("Pattern table is invalid: {0}")]
    PatternTable(String),

    #[error("Bounds for {name} are inverted: min {min} > max {max}")]
    InvertedBounds { name: String, min: i64, max: i64 },

    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn invalid(name: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// Run-level failure of the orchestration loop.
///
/// Everything that can degrade gracefully does; these are the cases where
/// there is no plan to return.
#[derive(Debug, Error)]
pub enum RefinementError {
    #[error("Initial plan generation failed: {0}")]
    Generation(#[source] GenerationError),

    #[error("Illegal state transition: {from} → {to}")]
    IllegalTransition { from: String, to: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
