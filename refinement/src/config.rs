//! Refinement engine configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. `MAX_REVISIONS` environment variable
//! 2. Values loaded from a TOML file (`RefinementConfig::from_toml_file`)
//! 3. Built-in defaults
//!
//! Every section is `#[serde(default)]`, so a config file only needs the keys
//! it overrides:
//!
//! ```toml
//! max_revisions = 3
//!
//! [time]
//! tolerance = 0.10
//!
//! [bounds]
//! max_sets = 5
//! ```

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment override for the iteration cap.
const ENV_MAX_REVISIONS: &str = "MAX_REVISIONS";

const DEFAULT_MAX_REVISIONS: u32 = 2;
const DEFAULT_GENERATION_RETRIES: u32 = 1;
const DEFAULT_STAGNATION_LIMIT: u32 = 2;

/// Movement pattern buckets used by the balance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementPattern {
    Squat,
    Hinge,
    Push,
    Pull,
    Carry,
}

impl MovementPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Squat => "squat",
            Self::Hinge => "hinge",
            Self::Push => "push",
            Self::Pull => "pull",
            Self::Carry => "carry",
        }
    }
}

impl std::fmt::Display for MovementPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constants for the per-exercise time estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeTable {
    pub seconds_per_rep: f64,
    /// Rest assumed when an exercise does not specify one.
    pub default_rest_seconds: u32,
    /// Rep count assumed for "AMRAP" / "max" prescriptions.
    pub amrap_reps: f64,
    /// Rep count assumed when the reps string has no number in it.
    pub default_reps: f64,
    /// Fractional allowance over `minutes_per_day` before a day is flagged.
    pub tolerance: f64,
}

impl Default for TimeTable {
    fn default() -> Self {
        Self {
            seconds_per_rep: 3.0,
            default_rest_seconds: 90,
            amrap_reps: 15.0,
            default_reps: 10.0,
            tolerance: 0.15,
        }
    }
}

/// One balance bucket: keywords that classify an exercise into it, whether
/// the week must contain it, and the exercise to add when it is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternBucket {
    pub pattern: MovementPattern,
    pub keywords: Vec<String>,
    #[serde(default = "default_true")]
    pub required: bool,
    pub fallback: String,
}

fn default_true() -> bool {
    true
}

impl PatternBucket {
    fn new(pattern: MovementPattern, keywords: &[&str], required: bool, fallback: &str) -> Self {
        Self {
            pattern,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            required,
            fallback: fallback.to_string(),
        }
    }

    pub fn matches(&self, name_lower: &str) -> bool {
        self.keywords
            .iter()
            .any(|kw| name_lower.contains(kw.to_lowercase().as_str()))
    }
}

/// Keyword lookup table for movement patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternTable {
    pub buckets: Vec<PatternBucket>,
}

impl Default for PatternTable {
    fn default() -> Self {
        use MovementPattern::*;
        Self {
            buckets: vec![
                PatternBucket::new(
                    Squat,
                    &["squat", "lunge", "split squat", "leg press", "step up"],
                    true,
                    "Goblet Squat",
                ),
                PatternBucket::new(
                    Hinge,
                    &["deadlift", "rdl", "good morning", "hip thrust", "glute bridge"],
                    true,
                    "Romanian Deadlift",
                ),
                PatternBucket::new(Push, &["press", "push", "dip", "fly"], true, "Push-Up"),
                PatternBucket::new(
                    Pull,
                    &["pull", "row", "chin", "curl", "raise"],
                    true,
                    "Dumbbell Row",
                ),
                PatternBucket::new(
                    Carry,
                    &["carry", "farmer", "suitcase"],
                    false,
                    "Farmer Carry",
                ),
            ],
        }
    }
}

impl PatternTable {
    /// Every pattern an exercise name belongs to. A name may hit several
    /// buckets ("Leg Press" is both squat and push).
    pub fn classify(&self, name: &str) -> Vec<MovementPattern> {
        let lower = name.to_lowercase();
        self.buckets
            .iter()
            .filter(|b| b.matches(&lower))
            .map(|b| b.pattern)
            .collect()
    }

    pub fn bucket(&self, pattern: MovementPattern) -> Option<&PatternBucket> {
        self.buckets.iter().find(|b| b.pattern == pattern)
    }

    pub fn required(&self) -> impl Iterator<Item = &PatternBucket> {
        self.buckets.iter().filter(|b| b.required)
    }
}

/// Plausible ranges for the progression sanity check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaneBounds {
    pub min_sets: u32,
    pub max_sets: u32,
    pub min_rest_seconds: i64,
    pub max_rest_seconds: i64,
}

impl Default for SaneBounds {
    fn default() -> Self {
        Self {
            min_sets: 1,
            max_sets: 6,
            min_rest_seconds: 0,
            max_rest_seconds: 300,
        }
    }
}

/// Everything the core loop and fast verifier read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    /// Iteration cap for the verify/act loop.
    pub max_revisions: u32,
    pub time: TimeTable,
    pub patterns: PatternTable,
    pub bounds: SaneBounds,
    /// Extra attempts for a retriable generation failure.
    pub generation_retries: u32,
    /// Consecutive stagnant classifications that stop the run.
    pub stagnation_limit: u32,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_revisions: env::var(ENV_MAX_REVISIONS)
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_MAX_REVISIONS),
            time: TimeTable::default(),
            patterns: PatternTable::default(),
            bounds: SaneBounds::default(),
            generation_retries: DEFAULT_GENERATION_RETRIES,
            stagnation_limit: DEFAULT_STAGNATION_LIMIT,
        }
    }
}

impl RefinementConfig {
    /// Load from a TOML file. Missing keys keep their defaults; the
    /// `MAX_REVISIONS` env var still wins over the file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(cap) = env::var(ENV_MAX_REVISIONS)
            .ok()
            .and_then(|v| v.trim().parse().ok())
        {
            config.max_revisions = cap;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_revisions(mut self, max_revisions: u32) -> Self {
        self.max_revisions = max_revisions;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_revisions < 1 {
            return Err(ConfigError::InvalidCap(self.max_revisions));
        }
        if self.stagnation_limit < 1 {
            return Err(ConfigError::invalid("stagnation_limit", "must be at least 1"));
        }

        let t = &self.time;
        if !(t.seconds_per_rep.is_finite() && t.seconds_per_rep > 0.0) {
            return Err(ConfigError::invalid("time.seconds_per_rep", "must be positive"));
        }
        if !(t.tolerance.is_finite() && t.tolerance >= 0.0) {
            return Err(ConfigError::invalid("time.tolerance", "must be non-negative"));
        }
        if t.amrap_reps <= 0.0 || t.default_reps <= 0.0 {
            return Err(ConfigError::invalid(
                "time.amrap_reps/default_reps",
                "must be positive",
            ));
        }

        let b = &self.bounds;
        if b.min_sets < 1 {
            return Err(ConfigError::invalid("bounds.min_sets", "must be at least 1"));
        }
        if b.min_sets > b.max_sets {
            return Err(ConfigError::InvertedBounds {
                name: "sets".into(),
                min: b.min_sets as i64,
                max: b.max_sets as i64,
            });
        }
        if b.min_rest_seconds < 0 {
            return Err(ConfigError::invalid(
                "bounds.min_rest_seconds",
                "must be non-negative",
            ));
        }
        if b.min_rest_seconds > b.max_rest_seconds {
            return Err(ConfigError::InvertedBounds {
                name: "rest_seconds".into(),
                min: b.min_rest_seconds,
                max: b.max_rest_seconds,
            });
        }

        if self.patterns.buckets.is_empty() {
            return Err(ConfigError::PatternTable("no buckets defined".into()));
        }
        let mut seen = std::collections::BTreeSet::new();
        for bucket in &self.patterns.buckets {
            if !seen.insert(bucket.pattern) {
                return Err(ConfigError::PatternTable(format!(
                    "pattern '{}' defined twice",
                    bucket.pattern
                )));
            }
            if bucket.keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(ConfigError::PatternTable(format!(
                    "pattern '{}' has no keywords",
                    bucket.pattern
                )));
            }
            if bucket.fallback.trim().is_empty() {
                return Err(ConfigError::PatternTable(format!(
                    "pattern '{}' has no fallback exercise",
                    bucket.pattern
                )));
            }
        }
        Ok(())
    }
}
