//! Subber agent: substitution suggestions for exercises the user avoids.
//!
//! Detection is deterministic: an exercise needs a substitute when its name
//! matches an expanded avoid phrase. Candidates come from a per-pattern
//! catalog; the model only picks the best one. The plan is never touched,
//! suggestions go through the edit applier like any other edit.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use refinement::{
    AvoidExpander, ExpandedAvoidance, GenerationError, MovementPattern, PatternTable, Plan,
    Profile, SubstitutionSuggester, SubstitutionSuggestion,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::constraints::GuidelineTable;
use crate::llm::{complete_json, ChatModel, ChatRequest};
use crate::prompts;

/// Commonly available alternatives per movement pattern.
const CATALOG: &[(MovementPattern, &[&str])] = &[
    (
        MovementPattern::Squat,
        &[
            "Goblet Squat",
            "Leg Press",
            "Box Squat",
            "Split Squat",
            "Step Up",
            "Wall Sit",
        ],
    ),
    (
        MovementPattern::Hinge,
        &[
            "Romanian Deadlift",
            "Hip Thrust",
            "Glute Bridge",
            "Kettlebell Swing",
            "Back Extension",
            "Good Morning",
        ],
    ),
    (
        MovementPattern::Push,
        &[
            "Push-Up",
            "Dumbbell Bench Press",
            "Landmine Press",
            "Floor Press",
            "Dip",
        ],
    ),
    (
        MovementPattern::Pull,
        &[
            "Dumbbell Row",
            "Lat Pulldown",
            "Seated Cable Row",
            "Chin-Up",
            "Face Pull",
        ],
    ),
    (
        MovementPattern::Carry,
        &["Farmer Carry", "Suitcase Carry"],
    ),
];

/// Pattern hinted by a day's focus text.
fn pattern_from_focus(focus: Option<&str>) -> Option<MovementPattern> {
    let f = focus?.to_lowercase();
    if f.contains("squat") {
        Some(MovementPattern::Squat)
    } else if f.contains("hinge") || f.contains("deadlift") {
        Some(MovementPattern::Hinge)
    } else if f.contains("push") || f.contains("press") {
        Some(MovementPattern::Push)
    } else if f.contains("pull") || f.contains("row") {
        Some(MovementPattern::Pull)
    } else {
        None
    }
}

/// LLM-backed substitution suggester.
pub struct Subber {
    model: Arc<dyn ChatModel>,
    expander: Arc<dyn AvoidExpander>,
    patterns: PatternTable,
    guidelines: Option<GuidelineTable>,
    top_k: usize,
}

impl Subber {
    pub fn new(
        model: Arc<dyn ChatModel>,
        expander: Arc<dyn AvoidExpander>,
        patterns: PatternTable,
        top_k: usize,
    ) -> Self {
        Self {
            model,
            expander,
            patterns,
            guidelines: None,
            top_k: top_k.max(1),
        }
    }

    /// Seed candidates with the table's recommended alternatives.
    pub fn with_guidelines(mut self, guidelines: GuidelineTable) -> Self {
        self.guidelines = Some(guidelines);
        self
    }

    /// Guideline and catalog alternatives for `name`, excluding the original
    /// and anything the user avoids.
    fn candidates(
        &self,
        name: &str,
        term: &str,
        focus: Option<&str>,
        avoid: &ExpandedAvoidance,
    ) -> (Option<MovementPattern>, Vec<String>) {
        let mut patterns = self.patterns.classify(name);
        if patterns.is_empty() {
            patterns.extend(pattern_from_focus(focus));
        }

        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(name.trim().to_lowercase());
        let mut out = Vec::new();
        let recommended = self
            .guidelines
            .as_ref()
            .map(|g| g.alternatives(term))
            .unwrap_or_default();
        for candidate in recommended {
            if !avoid.matches(candidate) && seen.insert(candidate.to_lowercase()) {
                out.push(candidate.clone());
            }
        }
        for pattern in &patterns {
            let fallback = self.patterns.bucket(*pattern).map(|b| b.fallback.as_str());
            let catalog = CATALOG
                .iter()
                .filter(|(p, _)| p == pattern)
                .flat_map(|(_, names)| names.iter().copied());
            for candidate in fallback.into_iter().chain(catalog) {
                if avoid.matches(candidate) || !seen.insert(candidate.to_lowercase()) {
                    continue;
                }
                out.push(candidate.to_string());
            }
        }
        out.truncate(self.top_k);
        (patterns.first().copied(), out)
    }

    /// Ask the model for the best substitute, with a single retry on any
    /// failure. `Ok(None)` means the model had nothing usable.
    async fn pick_best(
        &self,
        original: &str,
        pattern: Option<MovementPattern>,
        avoid: &ExpandedAvoidance,
        candidates: &[String],
    ) -> Result<Option<String>, GenerationError> {
        let avoid_terms: Vec<&str> = avoid
            .terms()
            .flat_map(|(_, phrases)| phrases.iter().map(String::as_str))
            .collect();
        let payload = json!({
            "target_exercise": original,
            "pattern": pattern.map(|p| p.as_str()),
            "avoid_terms": avoid_terms,
            "candidates": candidates,
            "top_k": self.top_k,
        });
        let request = ChatRequest::new(
            prompts::SUBBER_PREAMBLE,
            format!("Payload:\n{payload}"),
        );

        match self.pick_once(&request, original, avoid).await {
            Ok(pick) => Ok(pick),
            Err(err) => {
                debug!(original, error = %err, "Substitution pick failed, retrying once");
                self.pick_once(&request, original, avoid).await
            }
        }
    }

    async fn pick_once(
        &self,
        request: &ChatRequest,
        original: &str,
        avoid: &ExpandedAvoidance,
    ) -> Result<Option<String>, GenerationError> {
        let value = complete_json(self.model.as_ref(), request).await?;
        let Some(name) = best_name(&value)? else {
            return Ok(None);
        };
        if name.eq_ignore_ascii_case(original.trim()) {
            return Ok(None);
        }
        if avoid.matches(&name) {
            return Err(GenerationError::Rejected(format!(
                "substitute '{name}' matches an avoid term"
            )));
        }
        Ok(Some(name))
    }
}

/// `best.name`, else the first candidate's name.
fn best_name(value: &Value) -> Result<Option<String>, GenerationError> {
    let obj = value
        .as_object()
        .ok_or_else(|| GenerationError::ParseFailure("substitution reply is not an object".into()))?;
    let best = obj
        .get("best")
        .ok_or_else(|| GenerationError::ParseFailure("missing 'best' object".into()))?;

    let name_of = |v: &Value| -> Option<String> {
        let raw = match v {
            Value::String(s) => s.as_str(),
            other => other.get("name").and_then(Value::as_str)?,
        };
        Some(raw.trim().to_string()).filter(|s| !s.is_empty())
    };

    Ok(name_of(best).or_else(|| {
        obj.get("candidates")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .and_then(name_of)
    }))
}

#[async_trait]
impl SubstitutionSuggester for Subber {
    async fn suggest_substitutions(
        &self,
        plan: &Plan,
        profile: &Profile,
    ) -> Result<Vec<SubstitutionSuggestion>, GenerationError> {
        if profile.avoid_exercises.iter().all(|t| t.trim().is_empty()) {
            return Ok(Vec::new());
        }
        let avoid = match self.expander.expand(&profile.avoid_exercises).await {
            Ok(expanded) => expanded,
            Err(err) => {
                warn!(error = %err, "Avoid expansion failed, using literal terms");
                ExpandedAvoidance::literal(&profile.avoid_exercises)
            }
        };

        let mut suggestions = Vec::new();
        for (di, day) in plan.days.iter().enumerate() {
            for (bi, ei, exercise) in day.exercises() {
                let Some(term) = avoid.matching_term(&exercise.name) else {
                    continue;
                };
                let (pattern, candidates) =
                    self.candidates(&exercise.name, term, day.focus.as_deref(), &avoid);

                let picked = match self
                    .pick_best(&exercise.name, pattern, &avoid, &candidates)
                    .await
                {
                    Ok(pick) => pick,
                    Err(err) => {
                        warn!(exercise = %exercise.name, error = %err, "Substitution agent failed");
                        None
                    }
                };
                let llm_picked = picked.is_some();
                let best = picked.or_else(|| candidates.first().cloned());

                suggestions.push(SubstitutionSuggestion {
                    day: di,
                    block: bi,
                    exercise: ei,
                    original: exercise.name.clone(),
                    best,
                    candidates,
                    rationale: Some(format!(
                        "avoid term '{}' matched; pattern={}; LLM {}",
                        term,
                        pattern.map(|p| p.as_str()).unwrap_or("n/a"),
                        if llm_picked { "picked" } else { "not available" }
                    )),
                });
            }
        }

        info!(suggestions = suggestions.len(), "Subber suggested substitutions");
        Ok(suggestions)
    }
}
