//! Constraint resolver: expands loose avoid terms from a guideline table.
//!
//! The table is a JSON array of entries:
//!
//! ```json
//! [{"term_or_constraint": "knees",
//!   "clarify_options": ["lunge", "jump", "pistol squat"],
//!   "recommended_alternatives": ["Box Squat", "Glute Bridge"]}]
//! ```
//!
//! Terms match ignoring case, surrounding whitespace and one trailing `s`.
//! Unknown terms expand to themselves.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use refinement::{AvoidExpander, ExpandedAvoidance, GenerationError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidelineEntry {
    pub term_or_constraint: String,
    #[serde(default)]
    pub clarify_options: Vec<String>,
    #[serde(default)]
    pub recommended_alternatives: Vec<String>,
}

/// Lowercased, trimmed, one trailing `s` dropped.
fn normalize(term: &str) -> String {
    let lower = term.trim().to_lowercase();
    match lower.strip_suffix('s') {
        Some(base) if !base.is_empty() => base.to_string(),
        _ => lower,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuidelineTable {
    entries: Vec<GuidelineEntry>,
}

impl GuidelineTable {
    pub fn new(entries: Vec<GuidelineEntry>) -> Self {
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read constraint guidelines {}", path.display()))?;
        let table: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid constraint guidelines {}", path.display()))?;
        info!(path = %path.display(), entries = table.len(), "Loaded constraint guidelines");
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, term: &str) -> Option<&GuidelineEntry> {
        let key = normalize(term);
        if key.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|e| normalize(&e.term_or_constraint) == key)
    }

    /// Recommended alternatives for `term`, empty when unknown.
    pub fn alternatives(&self, term: &str) -> &[String] {
        self.lookup(term)
            .map(|e| e.recommended_alternatives.as_slice())
            .unwrap_or_default()
    }

    /// Expand raw terms: each term always matches itself, plus its clarify
    /// options when the table knows it.
    pub fn expand(&self, terms: &[String]) -> ExpandedAvoidance {
        let mut expanded = ExpandedAvoidance::new();
        for term in terms {
            match self.lookup(term) {
                Some(entry) => {
                    debug!(term = %term, options = entry.clarify_options.len(), "Expanded avoid term");
                    expanded.insert(
                        term,
                        std::iter::once(term.as_str())
                            .chain(entry.clarify_options.iter().map(String::as_str)),
                    );
                }
                None => expanded.insert(term, [term.as_str()]),
            }
        }
        expanded
    }
}

/// [`AvoidExpander`] over a [`GuidelineTable`].
pub struct GuidelineExpander {
    table: GuidelineTable,
}

impl GuidelineExpander {
    pub fn new(table: GuidelineTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &GuidelineTable {
        &self.table
    }
}

#[async_trait]
impl AvoidExpander for GuidelineExpander {
    async fn expand(&self, terms: &[String]) -> Result<ExpandedAvoidance, GenerationError> {
        Ok(self.table.expand(terms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> GuidelineTable {
        GuidelineTable::new(vec![
            GuidelineEntry {
                term_or_constraint: "Knees".into(),
                clarify_options: vec!["Lunge".into(), "jump".into(), "pistol squat".into()],
                recommended_alternatives: vec!["Box Squat".into(), "Glute Bridge".into()],
            },
            GuidelineEntry {
                term_or_constraint: "overhead".into(),
                clarify_options: vec!["overhead press".into(), "snatch".into()],
                recommended_alternatives: vec![],
            },
        ])
    }

    #[test]
    fn test_trailing_s_ignored_both_ways() {
        let table = table();
        assert!(table.lookup("knee").is_some());
        assert!(table.lookup(" KNEES ").is_some());
        assert!(table.lookup("overheads").is_some());
        assert!(table.lookup("shoulder").is_none());
        assert!(table.lookup("s").is_none());
    }

    #[test]
    fn test_expand_known_and_unknown() {
        let terms = vec!["knee".to_string(), "Burpee".to_string()];
        let avoid = table().expand(&terms);
        assert!(avoid.matches("Walking Lunge"));
        assert!(avoid.matches("Box Jump"));
        assert!(avoid.matches("Knee Extension"));
        assert_eq!(avoid.matching_term("Burpee Broad Jump"), Some("burpee"));
        assert!(!avoid.matches("Bench Press"));
    }

    #[test]
    fn test_alternatives() {
        assert_eq!(table().alternatives("knee"), ["Box Squat", "Glute Bridge"]);
        assert!(table().alternatives("elbow").is_empty());
    }

    #[tokio::test]
    async fn test_expander_port() {
        let expander = GuidelineExpander::new(table());
        let avoid = expander.expand(&["overhead".to_string()]).await.unwrap();
        assert!(avoid.matches("Power Snatch"));
    }
}
