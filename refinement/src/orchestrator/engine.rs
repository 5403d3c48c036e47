//! Refinement engine: the verify / track / act loop
//!
//! ```text
//! generate → suggest subs → apply subs
//!   loop i in 0..max_revisions:
//!       check cancellation
//!       fast verify ─ ok ─→ semantic verify
//!       track fingerprint
//!       ok → stop(converged)
//!       stagnant × limit → stop(stagnation)
//!       apply resolvable edits; anything left → reviser
//!   stop(cap_reached)
//! ```
//!
//! The plan, the tracker and the log are locals of `run`; the engine itself
//! holds only configuration and collaborators, so one engine can serve
//! concurrent runs.

use std::future::Future;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::outcome::{IterationLog, LoopAction, RunOutcome, StopReason};
use super::ports::{Collaborators, RevisionContext};
use super::state_machine::{LoopState, StateMachine};
use crate::avoidance::ExpandedAvoidance;
use crate::config::RefinementConfig;
use crate::convergence::{ConvergenceTracker, Progress};
use crate::edits::{apply_edits, apply_substitutions, Edit};
use crate::error::{ConfigError, GenerationError, RefinementError};
use crate::plan::{Plan, Profile};
use crate::verifier::{FastVerifier, Issue, VerificationPhase, VerificationReport};

/// Issue id recorded when the semantic verifier could not be reached.
pub const SEMANTIC_FAILED_ISSUE: &str = "generation_failed_semantic";
/// Issue id recorded when the semantic verifier says "not ok" with no issues.
pub const SEMANTIC_REJECTED_ISSUE: &str = "semantic_rejected";

const CHECK_SEMANTIC: &str = "semantic";

pub struct RefinementEngine {
    config: RefinementConfig,
    verifier: FastVerifier,
    collaborators: Collaborators,
}

impl RefinementEngine {
    pub fn new(config: RefinementConfig, collaborators: Collaborators) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            verifier: FastVerifier::new(&config),
            config,
            collaborators,
        })
    }

    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    /// Drive one run to a stop reason.
    ///
    /// Only a failed initial generation (or an internal state-machine bug)
    /// returns `Err`; every later generation failure degrades to a
    /// no-progress iteration.
    pub async fn run(
        &self,
        profile: &Profile,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RefinementError> {
        let started_at = Utc::now();
        let retries = self.config.generation_retries;
        let mut sm = StateMachine::new();

        info!(
            days_per_week = profile.days_per_week,
            minutes_per_day = profile.minutes_per_day,
            avoid_terms = profile.avoid_exercises.len(),
            max_revisions = self.config.max_revisions,
            "Starting refinement run"
        );

        let avoid = self.expand_avoidance(profile).await;

        // ── Generate ────────────────────────────────────────────────
        let mut setup_failures = 0;
        let generator = self.collaborators.generator.as_ref();
        let generated = with_retry(retries, "generate", &mut setup_failures, move || {
            generator.generate(profile)
        })
        .await;
        let mut plan = match generated {
            Ok(plan) => plan,
            Err(err) => {
                error!(error = %err, "Initial plan generation failed");
                sm.fail(&err.to_string())?;
                return Err(RefinementError::Generation(err));
            }
        };
        info!(
            days = plan.days.len(),
            exercises = plan.exercise_count(),
            "Initial plan generated"
        );
        sm.advance(LoopState::SuggestSubs, Some("plan generated"))?;

        // ── Substitutions ───────────────────────────────────────────
        let suggester = self.collaborators.suggester.as_ref();
        let plan_ref = &plan;
        let suggested = with_retry(retries, "suggest_substitutions", &mut setup_failures, move || {
            suggester.suggest_substitutions(plan_ref, profile)
        })
        .await;
        let substitutions = match suggested {
            Ok(subs) => subs,
            Err(err) => {
                warn!(error = %err, "Substitution suggestions failed, continuing without");
                Vec::new()
            }
        };
        sm.advance(
            LoopState::ApplySubs,
            Some(&format!("{} suggestions", substitutions.len())),
        )?;
        let sub_outcome = apply_substitutions(&plan, &substitutions);
        let substitutions_applied = sub_outcome.applied;
        plan = sub_outcome.plan;
        if substitutions_applied > 0 {
            info!(applied = substitutions_applied, "Substitutions applied");
        }

        // ── Verify / track / act ────────────────────────────────────
        let mut tracker = ConvergenceTracker::new();
        let mut iterations_log = Vec::new();
        let mut last_report: Option<VerificationReport> = None;
        let mut stop_reason = None;

        for iteration in 0..self.config.max_revisions {
            sm.set_iteration(iteration);
            if cancel.is_cancelled() {
                info!(iteration, "Run cancelled");
                sm.advance(LoopState::Stopped, Some("cancelled"))?;
                stop_reason = Some(StopReason::Cancelled);
                break;
            }

            sm.advance(LoopState::VerifyFast, None)?;
            let mut failures = 0;
            let mut semantic_failed = false;
            let fast = self.verifier.verify(profile, &plan, &avoid);
            let report = if fast.ok {
                sm.advance(LoopState::VerifySemantic, Some("fast checks passed"))?;
                let semantic = self.collaborators.semantic.as_ref();
                let (plan_ref, avoid_ref) = (&plan, &avoid);
                let verified = with_retry(retries, "semantic_verify", &mut failures, move || {
                    semantic.semantic_verify(profile, plan_ref, avoid_ref)
                })
                .await;
                match verified {
                    Ok(report) => normalize_semantic(report),
                    Err(err) => {
                        warn!(iteration, error = %err, "Semantic verification failed");
                        semantic_failed = true;
                        failed_semantic_report(&err)
                    }
                }
            } else {
                fast
            };

            sm.advance(LoopState::Track, None)?;
            let progress = tracker.record(report.fingerprint());
            info!(
                iteration,
                phase = %report.phase,
                ok = report.ok,
                issues = report.issues.len(),
                %progress,
                "Iteration verified"
            );

            if report.ok {
                sm.advance(LoopState::Stopped, Some("converged"))?;
                last_report = Some(report);
                stop_reason = Some(StopReason::Converged);
                break;
            }
            if progress == Progress::Regressing {
                warn!(iteration, issues = %report.summary(), "Issue set regressing");
            }

            let mut applied_edit_count = 0;
            let action = if tracker.consecutive_stagnant() >= self.config.stagnation_limit {
                info!(
                    iteration,
                    stagnant = tracker.consecutive_stagnant(),
                    "Same issues persist, stopping"
                );
                sm.advance(LoopState::Stopped, Some("stagnation"))?;
                stop_reason = Some(StopReason::Stagnation);
                LoopAction::Stop
            } else if semantic_failed {
                LoopAction::NoChange
            } else {
                let (resolvable, unresolved) = partition_issues(&plan, &report.issues);
                if !resolvable.is_empty() {
                    sm.advance(
                        LoopState::ApplyMechanicalEdits,
                        Some(&format!("{} edits", resolvable.len())),
                    )?;
                    let outcome = apply_edits(&plan, &resolvable);
                    for skip in &outcome.skipped {
                        debug!(
                            iteration,
                            index = skip.index,
                            edit_type = %skip.edit_type,
                            error = %skip.error,
                            "Mechanical edit skipped"
                        );
                    }
                    applied_edit_count = outcome.applied;
                    plan = outcome.plan;
                }

                if unresolved.is_empty() {
                    LoopAction::ApplyMechanicalEdits
                } else {
                    sm.advance(
                        LoopState::RequestRevision,
                        Some(&format!("{} unresolved issues", unresolved.len())),
                    )?;
                    let context = RevisionContext {
                        substitutions: substitutions.clone(),
                        verifier_edits: unresolved
                            .iter()
                            .flat_map(|i| i.edits.iter().cloned())
                            .collect(),
                        issues: unresolved,
                    };
                    let reviser = self.collaborators.reviser.as_ref();
                    let (plan_ref, context_ref) = (&plan, &context);
                    let revised = with_retry(retries, "revise", &mut failures, move || {
                        reviser.revise(plan_ref, profile, context_ref)
                    })
                    .await;
                    match revised {
                        Ok(revised) => plan = revised,
                        Err(err) => {
                            warn!(iteration, error = %err, "Revision failed, keeping current plan")
                        }
                    }
                    LoopAction::RequestRevision
                }
            };

            iterations_log.push(IterationLog {
                iteration_index: iteration,
                phase: report.phase,
                ok: report.ok,
                issue_count: report.issues.len(),
                issue_ids: report.issue_ids(),
                applied_edit_count,
                progress,
                action,
                generation_failures: failures,
            });
            last_report = Some(report);

            if action == LoopAction::Stop {
                break;
            }
        }

        let stop_reason = match stop_reason {
            Some(reason) => reason,
            None => {
                info!(max_revisions = self.config.max_revisions, "Iteration cap reached");
                sm.advance(LoopState::Stopped, Some("iteration cap reached"))?;
                StopReason::CapReached
            }
        };

        debug!(transitions = %sm.summary(), "Run finished");
        let outcome = RunOutcome {
            final_plan: plan,
            final_report: last_report,
            iterations_log,
            transitions: sm.into_transitions(),
            stop_reason,
            substitutions_applied,
            regressions: tracker.regressions(),
            started_at,
            finished_at: Utc::now(),
        };
        info!(summary = %outcome.summary(), "Refinement run complete");
        Ok(outcome)
    }

    async fn expand_avoidance(&self, profile: &Profile) -> ExpandedAvoidance {
        if profile.avoid_exercises.is_empty() {
            return ExpandedAvoidance::new();
        }
        match self
            .collaborators
            .expander
            .expand(&profile.avoid_exercises)
            .await
        {
            Ok(expanded) => expanded,
            Err(err) => {
                warn!(error = %err, "Avoid-term expansion failed, matching terms literally");
                ExpandedAvoidance::literal(&profile.avoid_exercises)
            }
        }
    }
}

/// Call a collaborator, retrying retriable failures up to `retries` times.
/// Every failed attempt is counted in `failures`.
async fn with_retry<T, F, Fut>(
    retries: u32,
    call_name: &str,
    failures: &mut u32,
    mut call: F,
) -> Result<T, GenerationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GenerationError>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                *failures += 1;
                if err.is_retriable() && attempt < retries {
                    attempt += 1;
                    warn!(
                        call = call_name,
                        attempt,
                        category = %err.retry_category(),
                        error = %err,
                        "Generation call failed, retrying"
                    );
                    continue;
                }
                return Err(err);
            }
        }
    }
}

/// Split issues into the edits that can be applied mechanically and the
/// issues that need a revision. An issue is resolvable when it has edits,
/// all of them are mechanical, and they apply cleanly to `plan` on their own.
/// An edit shared by several issues is collected once.
fn partition_issues(plan: &Plan, issues: &[Issue]) -> (Vec<Edit>, Vec<Issue>) {
    let mut resolvable: Vec<Edit> = Vec::new();
    let mut unresolved = Vec::new();
    for issue in issues {
        let mechanical = !issue.edits.is_empty()
            && issue.edits.iter().all(Edit::is_mechanical)
            && apply_edits(plan, &issue.edits).is_clean();
        if mechanical {
            for edit in &issue.edits {
                if !resolvable.contains(edit) {
                    resolvable.push(edit.clone());
                }
            }
        } else {
            unresolved.push(issue.clone());
        }
    }
    (resolvable, unresolved)
}

fn normalize_semantic(mut report: VerificationReport) -> VerificationReport {
    report.phase = VerificationPhase::Semantic;
    if !report.ok && report.issues.is_empty() {
        report.add_issue(Issue::new(
            SEMANTIC_REJECTED_ISSUE,
            CHECK_SEMANTIC,
            "Semantic verifier rejected the plan without listing issues",
        ));
    }
    report.finalize();
    report
}

fn failed_semantic_report(err: &GenerationError) -> VerificationReport {
    let mut report = VerificationReport::new(VerificationPhase::Semantic);
    report.add_issue(Issue::new(
        SEMANTIC_FAILED_ISSUE,
        CHECK_SEMANTIC,
        format!("Semantic verification unavailable: {}", err),
    ));
    report
}
