//! Programmer agent: authors the initial plan and rewrites it on revision.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use refinement::{
    Block, Day, Exercise, GenerationError, Plan, PlanGenerator, PlanReviser, Profile,
    RevisionContext,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::llm::{complete_json, ChatModel, ChatRequest};
use crate::prompts;

const MIN_DAYS: u32 = 2;
const MAX_DAYS: u32 = 6;

/// LLM-backed plan author.
pub struct Programmer {
    model: Arc<dyn ChatModel>,
}

impl Programmer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    fn stamp(&self, plan: &mut Plan, stage: &str) {
        plan.metadata
            .insert("generator".into(), json!(self.model.model()));
        plan.metadata
            .insert("prompt_version".into(), json!(prompts::PROMPT_VERSION));
        plan.metadata.insert("stage".into(), json!(stage));
    }
}

/// Constraints block sent with both generate and revise prompts.
fn constraints(profile: &Profile) -> Value {
    json!({
        "days_per_week": profile.days_per_week.clamp(MIN_DAYS, MAX_DAYS),
        "minutes_per_day": profile.minutes_per_day,
        "goal": profile.goal,
        "equipment_available": profile.equipment_available,
        "avoid_exercises": profile.avoid_exercises,
        "training_history": profile.training_history,
        "estimated_1rm": profile.estimated_1rm,
    })
}

#[async_trait]
impl PlanGenerator for Programmer {
    async fn generate(&self, profile: &Profile) -> Result<Plan, GenerationError> {
        let request = ChatRequest::new(
            prompts::programmer_preamble(),
            format!(
                "Generate a weekly plan that meets these constraints.\n{}\nReturn STRICT JSON only in the required schema.",
                constraints(profile)
            ),
        );
        let value = complete_json(self.model.as_ref(), &request).await?;
        let mut plan = decode_plan(&value)?;
        self.stamp(&mut plan, "generated");
        info!(
            days = plan.days.len(),
            exercises = plan.exercise_count(),
            model = %self.model.model(),
            "Programmer generated plan"
        );
        Ok(plan)
    }
}

#[async_trait]
impl PlanReviser for Programmer {
    async fn revise(
        &self,
        plan: &Plan,
        profile: &Profile,
        context: &RevisionContext,
    ) -> Result<Plan, GenerationError> {
        let issues: Vec<Value> = context
            .issues
            .iter()
            .map(|i| json!({"id": i.id, "check": i.check, "message": i.message}))
            .collect();
        let payload = json!({
            "constraints": constraints(profile),
            "current_plan": plan,
            "substitutions": context.substitutions,
            "issues": issues,
            "suggested_edits": context.verifier_edits,
        });
        let request = ChatRequest::new(
            prompts::reviser_preamble(),
            format!("Revise this plan so every listed issue is resolved.\n{payload}"),
        );

        let value = complete_json(self.model.as_ref(), &request).await?;
        let mut revised = decode_plan(&value)?;
        if revised.days.len() != plan.days.len() {
            warn!(
                before = plan.days.len(),
                after = revised.days.len(),
                "Revision changed the day count"
            );
        }
        for (key, val) in &plan.metadata {
            revised.metadata.entry(key.clone()).or_insert(val.clone());
        }
        self.stamp(&mut revised, "revised");
        info!(
            days = revised.days.len(),
            issues = context.issues.len(),
            edits = context.verifier_edits.len(),
            "Programmer revised plan"
        );
        Ok(revised)
    }
}

/// Coerce a model reply into a [`Plan`].
///
/// Field shapes are tolerated loosely (numeric strings for sets, numbers for
/// reps, missing names); a reply without any day is a parse failure.
pub fn decode_plan(value: &Value) -> Result<Plan, GenerationError> {
    let root = match value {
        Value::Object(_) => value,
        _ => {
            return Err(GenerationError::ParseFailure(
                "plan reply is not a JSON object".into(),
            ))
        }
    };
    let days_json = root
        .get("days")
        .and_then(Value::as_array)
        .ok_or_else(|| GenerationError::ParseFailure("plan reply has no `days` array".into()))?;

    let days: Vec<Day> = days_json
        .iter()
        .enumerate()
        .map(|(i, d)| decode_day(i, d))
        .collect();
    if days.is_empty() {
        return Err(GenerationError::ParseFailure("plan has no days".into()));
    }

    let mut plan = Plan::new(days);
    match root.get("metadata") {
        Some(Value::Object(map)) => {
            plan.metadata = map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<BTreeMap<_, _>>();
        }
        Some(Value::String(note)) => {
            plan.metadata.insert("notes".into(), json!(note));
        }
        _ => {}
    }
    if let Some(notes) = root.get("notes").and_then(Value::as_array) {
        plan.notes = notes
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect();
    }
    Ok(plan)
}

fn decode_day(index: usize, value: &Value) -> Day {
    let name = string_field(value, "name").unwrap_or_else(|| format!("Day {}", index + 1));
    let blocks = value
        .get("blocks")
        .and_then(Value::as_array)
        .map(|blocks| blocks.iter().map(decode_block).collect())
        .unwrap_or_default();
    let mut day = Day::new(name, blocks);
    day.focus = string_field(value, "focus");
    day
}

fn decode_block(value: &Value) -> Block {
    let exercises = value
        .get("exercises")
        .and_then(Value::as_array)
        .map(|exs| exs.iter().map(decode_exercise).collect())
        .unwrap_or_default();
    Block::new(
        string_field(value, "name").unwrap_or_else(|| "Block".into()),
        exercises,
    )
}

fn decode_exercise(value: &Value) -> Exercise {
    let name = string_field(value, "name").unwrap_or_else(|| "Exercise".into());
    let sets = value
        .get("sets")
        .and_then(integer)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(3);
    let reps = match value.get("reps") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "5-8".to_string(),
    };
    let mut exercise = Exercise::new(name, sets, reps);
    exercise.intensity = string_field(value, "intensity");
    exercise.rest_seconds = value.get("rest_seconds").and_then(integer);
    exercise.notes = string_field(value, "notes");
    exercise
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Integers, integral floats, and numeric strings.
fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ScriptedChat;
    use refinement::{Edit, ExerciseRef, Issue};

    fn plan_reply() -> String {
        r#"```json
{"days": [
  {"name": "Lower", "focus": "squat", "blocks": [
    {"name": "Main", "exercises": [
      {"name": "Back Squat", "sets": "5", "reps": 5, "rest_seconds": 180},
      {"name": "Romanian Deadlift", "sets": 3.0, "reps": "8"}
    ]}
  ]},
  {"blocks": [{"exercises": [{"name": "Bench Press", "sets": 4}]}]}
],
"metadata": {"notes": "4 week block"}}
```"#
            .to_string()
    }

    #[tokio::test]
    async fn test_generate_decodes_loose_reply() {
        let chat = Arc::new(ScriptedChat::new(vec![Ok(plan_reply())]));
        let programmer = Programmer::new(chat.clone());

        let plan = programmer.generate(&Profile::default()).await.unwrap();
        assert_eq!(plan.days.len(), 2);
        let squat = &plan.days[0].blocks[0].exercises[0];
        assert_eq!((squat.sets, squat.reps.as_str()), (5, "5"));
        assert_eq!(squat.rest_seconds, Some(180));
        assert_eq!(plan.days[0].blocks[0].exercises[1].sets, 3);

        assert_eq!(plan.days[1].name, "Day 2");
        assert_eq!(plan.days[1].blocks[0].name, "Block");
        assert_eq!(plan.days[1].blocks[0].exercises[0].reps, "5-8");

        assert_eq!(plan.metadata["notes"], "4 week block");
        assert_eq!(plan.metadata["stage"], "generated");

        let sent = chat.requests();
        assert!(sent[0].user.contains("\"days_per_week\":4"));
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_plan() {
        let chat = Arc::new(ScriptedChat::new(vec![Ok(r#"{"days": []}"#.into())]));
        let err = Programmer::new(chat)
            .generate(&Profile::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::ParseFailure(_)));
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_revise_sends_issues_and_edits() {
        let chat = Arc::new(ScriptedChat::new(vec![Ok(plan_reply())]));
        let programmer = Programmer::new(chat.clone());

        let mut current = decode_plan(&crate::llm::extract_json(&plan_reply()).unwrap()).unwrap();
        current.metadata.insert("source".into(), json!("template-7"));
        let context = RevisionContext {
            substitutions: Vec::new(),
            verifier_edits: vec![Edit::reorder_days(vec![1, 0], "heavy day first")],
            issues: vec![Issue::new("order_heavy_day_last", "semantic", "Heavy day is last")],
        };

        let revised = programmer
            .revise(&current, &Profile::default(), &context)
            .await
            .unwrap();
        assert_eq!(revised.metadata["stage"], "revised");
        assert_eq!(revised.metadata["source"], "template-7");

        let prompt = &chat.requests()[0].user;
        assert!(prompt.contains("order_heavy_day_last"));
        assert!(prompt.contains("reorder_days"));
        assert!(prompt.contains("Back Squat"));
    }

    #[test]
    fn test_decode_rejects_non_object() {
        assert!(decode_plan(&json!([1, 2])).is_err());
        assert!(decode_plan(&json!({"plan": {}})).is_err());
    }

    #[test]
    fn test_decode_negative_rest_survives() {
        let plan = decode_plan(&json!({"days": [{"blocks": [{"exercises": [
            {"name": "Plank", "sets": 3, "reps": "30s", "rest_seconds": -10}
        ]}]}]}))
        .unwrap();
        let plank = plan.exercise(ExerciseRef::new(0, 0, 0)).unwrap();
        assert_eq!(plank.rest_seconds, Some(-10));
    }
}
