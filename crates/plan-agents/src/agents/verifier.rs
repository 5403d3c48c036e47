//! Semantic verifier agent: progression quality and goal fit.
//!
//! Only consulted once the fast checks pass. The model's reply is mapped
//! onto the shared [`VerificationReport`] shape; suggested edits go through
//! [`parse_edits`] so malformed entries are dropped, not fatal.

use std::sync::Arc;

use async_trait::async_trait;
use refinement::verifier::{slug, CheckResult, CHECK_PROGRESSION};
use refinement::{
    parse_edits, Edit, ExpandedAvoidance, GenerationError, Issue, Plan, Profile,
    SemanticVerifier, VerificationPhase, VerificationReport,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::llm::{complete_json, ChatModel, ChatRequest};
use crate::prompts;

/// LLM-backed semantic reviewer.
pub struct PlanReviewer {
    model: Arc<dyn ChatModel>,
}

impl PlanReviewer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl SemanticVerifier for PlanReviewer {
    async fn semantic_verify(
        &self,
        profile: &Profile,
        plan: &Plan,
        avoid: &ExpandedAvoidance,
    ) -> Result<VerificationReport, GenerationError> {
        let payload = json!({
            "profile": profile,
            "plan": plan,
            "goal": profile.goal,
            "avoid": avoid,
        });
        let request = ChatRequest::new(
            prompts::semantic_verifier_preamble(),
            format!(
                "Evaluate this plan for progression quality and programming wisdom. \
Return strict JSON with an issues array and a suggested_edits array.\n{payload}"
            ),
        );

        let value = complete_json(self.model.as_ref(), &request).await?;
        let report = decode_report(&value)?;
        info!(
            ok = report.ok,
            issues = report.issues.len(),
            edits = report.suggested_edits().len(),
            "Semantic verification"
        );
        Ok(report)
    }
}

/// Map a semantic reply onto a report.
///
/// Issues come from `issues` (objects or plain strings) and
/// `progression.issues`. Each suggested edit attaches to the issue named by
/// its `issue_id`; edits without a known issue attach to the first issue, or
/// to an issue of their own when none was listed.
pub fn decode_report(value: &Value) -> Result<VerificationReport, GenerationError> {
    let obj = value
        .as_object()
        .ok_or_else(|| GenerationError::ParseFailure("semantic reply is not an object".into()))?;
    let model_ok = obj.get("ok").and_then(Value::as_bool).ok_or_else(|| {
        GenerationError::ParseFailure("semantic reply has no boolean 'ok'".into())
    })?;

    let progression = obj.get("progression").cloned().unwrap_or(Value::Null);
    let mut issues: Vec<Issue> = Vec::new();
    let listed = obj
        .get("issues")
        .and_then(Value::as_array)
        .into_iter()
        .chain(progression.get("issues").and_then(Value::as_array))
        .flatten();
    for entry in listed {
        let Some(issue) = decode_issue(entry) else {
            continue;
        };
        if !issues.iter().any(|i| i.id == issue.id) {
            issues.push(issue);
        }
    }

    let raw_edits: Vec<Value> = obj
        .get("suggested_edits")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let issue_refs: Vec<Option<String>> = raw_edits
        .iter()
        .map(|e| e.get("issue_id").and_then(Value::as_str).map(slug))
        .collect();
    let (edits, rejected) = parse_edits(&raw_edits);
    for (index, err) in &rejected {
        warn!(index, error = %err, "Dropping malformed semantic edit");
    }

    // parse_edits preserves order among accepted entries
    let accepted_refs = issue_refs
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !rejected.iter().any(|(r, _)| r == i))
        .map(|(_, r)| r);
    for (edit, issue_ref) in edits.into_iter().zip(accepted_refs) {
        attach_edit(&mut issues, edit, issue_ref);
    }

    let mut report = VerificationReport::new(VerificationPhase::Semantic);
    report.progression = Some(CheckResult::new(
        progression
            .get("ok")
            .and_then(Value::as_bool)
            .unwrap_or(issues.is_empty()),
        json!({
            "notes": progression.get("notes").cloned().unwrap_or(Value::Null),
        }),
    ));
    for issue in issues {
        report.add_issue(issue);
    }
    report.finalize();
    // rejection without a listed issue stays not-ok
    report.ok = report.ok && model_ok;
    debug!(summary = %report.summary(), "Decoded semantic report");
    Ok(report)
}

fn decode_issue(entry: &Value) -> Option<Issue> {
    let (id, message) = match entry {
        Value::String(text) => (slug(text), text.trim().to_string()),
        Value::Object(map) => {
            let message = map
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string();
            let id = map
                .get("id")
                .and_then(Value::as_str)
                .map(slug)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| slug(&message));
            (id, message)
        }
        _ => return None,
    };
    if id.is_empty() {
        return None;
    }
    let message = if message.is_empty() { id.clone() } else { message };
    Some(Issue::new(id, CHECK_PROGRESSION, message))
}

fn attach_edit(issues: &mut Vec<Issue>, edit: Edit, issue_ref: Option<String>) {
    if let Some(issue) = issue_ref
        .as_deref()
        .and_then(|id| issues.iter_mut().find(|i| i.id == id))
    {
        issue.edits.push(edit);
        return;
    }
    if let Some(first) = issues.first_mut() {
        first.edits.push(edit);
        return;
    }
    let id = format!("semantic_edit_{}", edit.edit_type());
    let message = edit.reason.clone();
    issues.push(Issue::new(id, CHECK_PROGRESSION, message).with_edits(vec![edit]));
}
