//! Full refinement runs with every agent wired to a scripted chat model.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use plan_agents::llm::{ChatModel, ChatRequest, LlmError};
use plan_agents::telemetry::{append_telemetry, RunRecord, TelemetryReader};
use plan_agents::{prompts, AgentFactory, AgentsConfig};
use refinement::{
    LoopAction, Profile, RefinementConfig, RefinementEngine, StopReason, SEMANTIC_FAILED_ISSUE,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Role {
    Programmer,
    Reviser,
    Subber,
    Semantic,
}

/// Routes each request to a per-role reply queue by its system prompt.
struct RoutedChat {
    replies: Mutex<HashMap<Role, VecDeque<Result<String, LlmError>>>>,
    calls: Mutex<HashMap<Role, usize>>,
}

impl RoutedChat {
    fn new(script: Vec<(Role, Result<String, LlmError>)>) -> Self {
        let mut replies: HashMap<Role, VecDeque<_>> = HashMap::new();
        for (role, reply) in script {
            replies.entry(role).or_default().push_back(reply);
        }
        Self {
            replies: Mutex::new(replies),
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn calls(&self, role: Role) -> usize {
        self.calls.lock().unwrap().get(&role).copied().unwrap_or(0)
    }

    fn role_of(request: &ChatRequest) -> Role {
        if request.system == prompts::programmer_preamble() {
            Role::Programmer
        } else if request.system == prompts::reviser_preamble() {
            Role::Reviser
        } else if request.system == prompts::SUBBER_PREAMBLE {
            Role::Subber
        } else if request.system == prompts::semantic_verifier_preamble() {
            Role::Semantic
        } else {
            panic!("unexpected system prompt: {}", request.system)
        }
    }
}

#[async_trait]
impl ChatModel for RoutedChat {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let role = Self::role_of(request);
        *self.calls.lock().unwrap().entry(role).or_default() += 1;
        self.replies
            .lock()
            .unwrap()
            .get_mut(&role)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Err(LlmError::EmptyReply))
    }

    fn model(&self) -> &str {
        "routed"
    }
}

const GENERATED_PLAN: &str = r#"```json
{"days": [
  {"name": "Full Body A", "focus": "squat", "blocks": [
    {"name": "Main", "exercises": [
      {"name": "Back Squat", "sets": 3, "reps": "5", "rest_seconds": 120},
      {"name": "Romanian Deadlift", "sets": 3, "reps": "8", "rest_seconds": 90},
      {"name": "Bench Press", "sets": 3, "reps": "5", "rest_seconds": 120},
      {"name": "Barbell Row", "sets": 3, "reps": "8", "rest_seconds": 90},
      {"name": "Walking Lunge", "sets": 3, "reps": "10", "rest_seconds": 60}
    ]}
  ]}
],
"metadata": {"notes": "single session"}}
```"#;

fn guidelines_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[{{"term_or_constraint": "knees", "clarify_options": ["lunge", "jump"],
             "recommended_alternatives": ["Step Up"]}}]"#
    )
    .unwrap();
    file
}

fn knee_profile() -> Profile {
    Profile {
        days_per_week: 1,
        minutes_per_day: 60,
        avoid_exercises: vec!["knee".into()],
        ..Profile::default()
    }
}

fn engine(chat: Arc<RoutedChat>, guidelines: &tempfile::NamedTempFile, cap: u32) -> RefinementEngine {
    let agents_config = AgentsConfig {
        constraints_path: Some(guidelines.path().to_path_buf()),
        ..AgentsConfig::default()
    };
    let config = RefinementConfig::default().with_max_revisions(cap);
    let factory = AgentFactory::with_model(&agents_config, chat);
    let collaborators = factory.collaborators(config.patterns.clone());
    RefinementEngine::new(config, collaborators).unwrap()
}

#[tokio::test]
async fn test_knee_run_converges_through_agents() {
    let chat = Arc::new(RoutedChat::new(vec![
        (Role::Programmer, Ok(GENERATED_PLAN.into())),
        (Role::Subber, Ok(r#"{"best": {"name": "Step Up"}, "candidates": []}"#.into())),
        (
            Role::Semantic,
            Ok(r#"{"ok": false,
                   "issues": [{"id": "no_core_work", "message": "No trunk stability work"}],
                   "suggested_edits": [{"type": "add_exercise", "issue_id": "no_core_work",
                     "reason": "add trunk work", "loc": {"day_idx": 0, "block_idx": 0},
                     "payload": {"exercise": {"name": "Plank", "sets": 3, "reps": "30s"}}}]}"#
                .into()),
        ),
        (Role::Semantic, Ok(r#"{"ok": true, "progression": {"ok": true}}"#.into())),
    ]));
    let guidelines = guidelines_file();
    let engine = engine(chat.clone(), &guidelines, 3);

    let outcome = engine
        .run(&knee_profile(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.stop_reason, StopReason::Converged);
    assert_eq!(outcome.substitutions_applied, 1);
    assert_eq!(outcome.iterations_log.len(), 1);
    assert_eq!(outcome.iterations_log[0].action, LoopAction::ApplyMechanicalEdits);
    assert_eq!(outcome.iterations_log[0].issue_ids, vec!["no_core_work"]);

    let names: Vec<&str> = outcome.final_plan.days[0].blocks[0]
        .exercises
        .iter()
        .map(|e| e.name.as_str())
        .collect();
    assert!(names.contains(&"Step Up"));
    assert!(names.contains(&"Plank"));
    assert!(!names.contains(&"Walking Lunge"));
    assert_eq!(outcome.final_plan.metadata["generator"], "routed");

    assert_eq!(chat.calls(Role::Programmer), 1);
    assert_eq!(chat.calls(Role::Subber), 1);
    assert_eq!(chat.calls(Role::Semantic), 2);
    assert_eq!(chat.calls(Role::Reviser), 0);
}

#[tokio::test]
async fn test_rejected_semantic_reviewer_stagnates_without_revisions() {
    let unauthorized = || {
        Err(LlmError::Status {
            status: 401,
            body: "invalid api key".into(),
        })
    };
    let chat = Arc::new(RoutedChat::new(vec![
        (Role::Programmer, Ok(GENERATED_PLAN.into())),
        (Role::Subber, Ok(r#"{"best": {"name": "Step Up"}}"#.into())),
        (Role::Semantic, unauthorized()),
        (Role::Semantic, unauthorized()),
        (Role::Semantic, unauthorized()),
    ]));
    let guidelines = guidelines_file();
    let engine = engine(chat.clone(), &guidelines, 5);

    let outcome = engine
        .run(&knee_profile(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.stop_reason, StopReason::Stagnation);
    assert_eq!(outcome.iterations_log.len(), 3);
    let actions: Vec<LoopAction> = outcome.iterations_log.iter().map(|l| l.action).collect();
    assert_eq!(
        actions,
        vec![LoopAction::NoChange, LoopAction::NoChange, LoopAction::Stop]
    );
    assert!(outcome.iterations_log.iter().all(|l| l.generation_failures == 1));
    assert_eq!(
        outcome.final_report.unwrap().issue_ids(),
        vec![SEMANTIC_FAILED_ISSUE]
    );
    // unavailable is not retried
    assert_eq!(chat.calls(Role::Semantic), 3);
    assert_eq!(chat.calls(Role::Reviser), 0);
}

#[tokio::test]
async fn test_unparseable_initial_plan_fails_run() {
    let chat = Arc::new(RoutedChat::new(vec![
        (Role::Programmer, Ok("Sorry, I can't do that.".into())),
        (Role::Programmer, Ok(r#"{"days": []}"#.into())),
    ]));
    let guidelines = guidelines_file();
    let engine = engine(chat.clone(), &guidelines, 2);

    let err = engine
        .run(&knee_profile(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("generation failed"), "{err}");
    assert_eq!(chat.calls(Role::Programmer), 2);
    assert_eq!(chat.calls(Role::Subber), 0);
}

#[tokio::test]
async fn test_run_record_round_trips_through_telemetry() {
    let chat = Arc::new(RoutedChat::new(vec![
        (Role::Programmer, Ok(GENERATED_PLAN.into())),
        (Role::Subber, Ok(r#"{"best": {"name": "Step Up"}}"#.into())),
        (Role::Semantic, Ok(r#"{"ok": true}"#.into())),
    ]));
    let guidelines = guidelines_file();
    let engine = engine(chat, &guidelines, 2);
    let profile = knee_profile();
    let outcome = engine.run(&profile, &CancellationToken::new()).await.unwrap();
    assert!(outcome.converged());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runs.jsonl");
    append_telemetry(&RunRecord::from_outcome(&outcome, &profile, "routed"), &path).unwrap();

    let reader = TelemetryReader::read_from_file(&path).unwrap();
    let run = &reader.runs()[0];
    assert!(run.converged);
    assert_eq!(run.iterations_logged, 0);
    assert_eq!(run.substitutions_applied, 1);
    assert!(run.final_issue_ids.is_empty());
    assert_eq!(run.prompt_version, prompts::PROMPT_VERSION);
}
