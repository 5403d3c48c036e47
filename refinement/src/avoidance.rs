//! Expanded avoidance terms.
//!
//! Users write avoid terms loosely ("knee", "overhead"). An expander maps
//! each raw term to the phrases that should be matched against exercise
//! names; the fast verifier only ever sees the expanded form.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;
use crate::orchestrator::ports::AvoidExpander;

/// Raw avoid term → lowercase match phrases
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpandedAvoidance {
    terms: BTreeMap<String, Vec<String>>,
}

impl ExpandedAvoidance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each term matches only itself.
    pub fn literal<S: AsRef<str>>(terms: &[S]) -> Self {
        let mut expanded = Self::new();
        for term in terms {
            let term = term.as_ref();
            expanded.insert(term, [term]);
        }
        expanded
    }

    /// Register phrases for `term`. Blank phrases are dropped; a term with
    /// no usable phrases is not recorded.
    pub fn insert<I, S>(&mut self, term: &str, phrases: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let key = term.trim().to_lowercase();
        if key.is_empty() {
            return;
        }
        let entry = self.terms.entry(key).or_default();
        for phrase in phrases {
            let phrase = phrase.as_ref().trim().to_lowercase();
            if !phrase.is_empty() && !entry.contains(&phrase) {
                entry.push(phrase);
            }
        }
        if entry.is_empty() {
            self.terms.remove(&term.trim().to_lowercase());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.terms.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Every raw term with a phrase contained in `name`, case-insensitive,
    /// in term order.
    pub fn matching_terms(&self, name: &str) -> Vec<&str> {
        let lower = name.to_lowercase();
        self.terms
            .iter()
            .filter(|(_, phrases)| phrases.iter().any(|p| lower.contains(p.as_str())))
            .map(|(term, _)| term.as_str())
            .collect()
    }

    /// First of [`matching_terms`](Self::matching_terms).
    pub fn matching_term(&self, name: &str) -> Option<&str> {
        self.matching_terms(name).into_iter().next()
    }

    pub fn matches(&self, name: &str) -> bool {
        self.matching_term(name).is_some()
    }
}

/// Expander that treats every term as its own only phrase. Used when no
/// guideline table or model is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiteralExpander;

#[async_trait]
impl AvoidExpander for LiteralExpander {
    async fn expand(&self, terms: &[String]) -> Result<ExpandedAvoidance, GenerationError> {
        Ok(ExpandedAvoidance::literal(terms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_matching_is_case_insensitive() {
        let avoid = ExpandedAvoidance::literal(&["Knee"]);
        assert_eq!(avoid.matching_term("Kneeling Cable Crunch"), Some("knee"));
        assert!(!avoid.matches("Back Squat"));
    }

    #[test]
    fn test_expanded_phrases() {
        let mut avoid = ExpandedAvoidance::new();
        avoid.insert("overhead", ["overhead press", "ohp", "military press"]);
        assert_eq!(avoid.matching_term("Seated Military Press"), Some("overhead"));
        assert!(!avoid.matches("Bench Press"));
    }

    #[test]
    fn test_name_hitting_several_terms() {
        let avoid = ExpandedAvoidance::literal(&["knee", "crunch", "dips"]);
        assert_eq!(
            avoid.matching_terms("Kneeling Cable Crunch"),
            vec!["crunch", "knee"]
        );
        assert_eq!(avoid.matching_term("Kneeling Cable Crunch"), Some("crunch"));
        assert!(avoid.matching_terms("Back Squat").is_empty());
    }

    #[test]
    fn test_blank_terms_dropped() {
        let mut avoid = ExpandedAvoidance::new();
        avoid.insert("  ", ["x"]);
        avoid.insert("knee", ["", "  "]);
        assert!(avoid.is_empty());
    }

    #[tokio::test]
    async fn test_literal_expander() {
        let expanded = LiteralExpander
            .expand(&["knee".to_string(), "dips".to_string()])
            .await
            .unwrap();
        assert_eq!(expanded.terms().count(), 2);
        assert!(expanded.matches("Bench Dips"));
    }
}
