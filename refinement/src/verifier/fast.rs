//! Fast deterministic verification.
//!
//! Four checks run in-process over the plan: time fit, movement-pattern
//! balance, avoidance, and progression sanity. Each failing check emits
//! issues with suggested edits where a mechanical fix exists.

use std::collections::BTreeMap;

use serde_json::json;
use tracing::debug;

use super::estimate::{day_minutes, exercise_seconds, seconds_per_set};
use super::report::{
    slug, CheckResult, Issue, VerificationPhase, VerificationReport, CHECK_AVOIDANCE,
    CHECK_BALANCE, CHECK_PROGRESSION, CHECK_TIME_FIT,
};
use crate::avoidance::ExpandedAvoidance;
use crate::config::{MovementPattern, PatternTable, RefinementConfig, SaneBounds, TimeTable};
use crate::edits::{Edit, EditOp};
use crate::plan::{BlockRef, Exercise, ExerciseRef, Plan, Profile};

/// Sets and reps prescribed for a fallback exercise added by the balance check.
const FALLBACK_SETS: u32 = 3;
const FALLBACK_REPS: &str = "8-12";

/// Deterministic verifier. Holds only configuration, so it is cheap to share.
#[derive(Debug, Clone)]
pub struct FastVerifier {
    time: TimeTable,
    patterns: PatternTable,
    bounds: SaneBounds,
}

impl FastVerifier {
    pub fn new(config: &RefinementConfig) -> Self {
        Self {
            time: config.time.clone(),
            patterns: config.patterns.clone(),
            bounds: config.bounds.clone(),
        }
    }

    pub fn verify(
        &self,
        profile: &Profile,
        plan: &Plan,
        avoid: &ExpandedAvoidance,
    ) -> VerificationReport {
        let mut report = VerificationReport::new(VerificationPhase::Fast);

        let (time_fit, time_issues) = self.check_time_fit(profile, plan);
        let planned_sets = planned_set_counts(&time_issues);
        let (balance, balance_issues) = self.check_balance(plan, avoid);
        let (avoidance, avoid_issues) = self.check_avoidance(plan, avoid);
        let (progression, prog_issues) = self.check_progression(plan, &planned_sets);

        report.time_fit = Some(time_fit);
        report.balance = Some(balance);
        report.avoidance = Some(avoidance);
        report.progression = Some(progression);
        for issue in time_issues
            .into_iter()
            .chain(balance_issues)
            .chain(avoid_issues)
            .chain(prog_issues)
        {
            report.add_issue(issue);
        }
        report.finalize();

        debug!(ok = report.ok, issues = report.issues.len(), "Fast verification done");
        report
    }

    fn check_time_fit(&self, profile: &Profile, plan: &Plan) -> (CheckResult, Vec<Issue>) {
        let limit = profile.minutes_per_day as f64;
        let ceiling = limit * (1.0 + self.time.tolerance);
        let per_day: Vec<f64> = plan
            .days
            .iter()
            .map(|d| day_minutes(d, &self.time))
            .collect();

        let mut issues = Vec::new();
        for (day_idx, &minutes) in per_day.iter().enumerate() {
            if minutes <= ceiling {
                continue;
            }
            let edits = self.reduce_sets_to_fit(plan, day_idx, ceiling * 60.0);
            issues.push(
                Issue::new(
                    format!("time_day_{}_over", day_idx),
                    CHECK_TIME_FIT,
                    format!(
                        "Day {} runs {:.1} min, over the {} min budget",
                        day_idx + 1,
                        minutes,
                        profile.minutes_per_day
                    ),
                )
                .with_edits(edits),
            );
        }

        let details = json!({
            "per_day_minutes": per_day.iter().map(|m| (m * 10.0).round() / 10.0).collect::<Vec<_>>(),
            "limit": profile.minutes_per_day,
        });
        (CheckResult::new(issues.is_empty(), details), issues)
    }

    /// Greedy set reductions for one day: repeatedly take one set off the
    /// exercise with the most sets until the estimate fits. Returns nothing
    /// if the day cannot be made to fit without going below `min_sets`.
    fn reduce_sets_to_fit(&self, plan: &Plan, day_idx: usize, ceiling_secs: f64) -> Vec<Edit> {
        let Some(day) = plan.days.get(day_idx) else {
            return Vec::new();
        };
        let mut slots: Vec<(ExerciseRef, u32, u32, f64)> = day
            .exercises()
            .map(|(bi, ei, ex)| {
                (
                    ExerciseRef::new(day_idx, bi, ei),
                    ex.sets,
                    ex.sets,
                    seconds_per_set(ex, &self.time),
                )
            })
            .collect();
        let mut total: f64 = day
            .exercises()
            .map(|(_, _, ex)| exercise_seconds(ex, &self.time))
            .sum();

        while total > ceiling_secs {
            // max_by_key keeps the last maximum; iterate in reverse so ties
            // go to the earliest exercise
            let candidate = (0..slots.len())
                .rev()
                .filter(|&i| slots[i].2 > self.bounds.min_sets)
                .max_by_key(|&i| slots[i].2);
            let Some(i) = candidate else {
                return Vec::new();
            };
            slots[i].2 -= 1;
            total -= slots[i].3;
        }

        slots
            .into_iter()
            .filter(|(_, original, sets, _)| sets != original)
            .map(|(at, original, sets, _)| {
                Edit::tune_sets(
                    at,
                    sets,
                    &format!("Day {} over time budget: {} → {} sets", day_idx + 1, original, sets),
                )
            })
            .collect()
    }

    fn check_balance(&self, plan: &Plan, avoid: &ExpandedAvoidance) -> (CheckResult, Vec<Issue>) {
        let mut presence: BTreeMap<MovementPattern, usize> =
            self.patterns.buckets.iter().map(|b| (b.pattern, 0)).collect();
        for day in &plan.days {
            let mut seen = std::collections::BTreeSet::new();
            for (_, _, ex) in day.exercises() {
                seen.extend(self.patterns.classify(&ex.name));
            }
            for pattern in seen {
                *presence.entry(pattern).or_default() += 1;
            }
        }

        let mut issues = Vec::new();
        for bucket in self.patterns.required() {
            if presence.get(&bucket.pattern).copied().unwrap_or(0) > 0 {
                continue;
            }
            let mut issue = Issue::new(
                format!("balance_{}_missing", bucket.pattern),
                CHECK_BALANCE,
                format!("No {} pattern anywhere in the week", bucket.pattern),
            );
            if !avoid.matches(&bucket.fallback) {
                if let Some(day) = self.lightest_day(plan) {
                    issue = issue.with_edits(vec![Edit::add_exercise(
                        BlockRef { day, block: 0 },
                        Exercise::new(bucket.fallback.clone(), FALLBACK_SETS, FALLBACK_REPS),
                        &format!("Add a {} movement", bucket.pattern),
                    )]);
                }
            }
            issues.push(issue);
        }

        let details = json!({
            "weekly_presence_days": presence
                .iter()
                .map(|(p, n)| (p.as_str().to_string(), *n))
                .collect::<BTreeMap<_, _>>(),
        });
        (CheckResult::new(issues.is_empty(), details), issues)
    }

    /// Day with the lowest estimated time that has at least one block.
    fn lightest_day(&self, plan: &Plan) -> Option<usize> {
        plan.days
            .iter()
            .enumerate()
            .filter(|(_, d)| !d.blocks.is_empty())
            .map(|(i, d)| (i, day_minutes(d, &self.time)))
            .fold(None, |best: Option<(usize, f64)>, (i, m)| match best {
                Some((_, bm)) if bm <= m => best,
                _ => Some((i, m)),
            })
            .map(|(i, _)| i)
    }

    fn check_avoidance(
        &self,
        plan: &Plan,
        avoid: &ExpandedAvoidance,
    ) -> (CheckResult, Vec<Issue>) {
        // term → (offending names, edits). An exercise hitting several terms
        // is reported under each, all carrying the same single edit.
        let mut hits: BTreeMap<String, (Vec<String>, Vec<Edit>)> = BTreeMap::new();
        for (day_idx, day) in plan.days.iter().enumerate() {
            for (bi, ei, ex) in day.exercises() {
                let terms = avoid.matching_terms(&ex.name);
                if terms.is_empty() {
                    continue;
                }
                let at = ExerciseRef::new(day_idx, bi, ei);
                let quoted: Vec<String> = terms.iter().map(|t| format!("'{}'", t)).collect();
                let reason = format!("{} conflicts with avoid {}", ex.name, quoted.join(", "));
                let edit = match self.safe_fallback(&ex.name, avoid) {
                    Some(fallback) => Edit::replace_exercise(at, fallback, &reason),
                    None => Edit::remove_exercise(at, &reason),
                };
                for term in terms {
                    let entry = hits.entry(term.to_string()).or_default();
                    entry.0.push(ex.name.clone());
                    entry.1.push(edit.clone());
                }
            }
        }

        let violations: Vec<String> = hits
            .iter()
            .flat_map(|(term, (names, _))| {
                names
                    .iter()
                    .map(move |n| format!("{} (contains '{}')", n, term))
            })
            .collect();
        let issues: Vec<Issue> = hits
            .into_iter()
            .map(|(term, (names, edits))| {
                Issue::new(
                    format!("avoid_violation_{}", slug(&term)),
                    CHECK_AVOIDANCE,
                    format!("Avoided '{}' appears in: {}", term, names.join(", ")),
                )
                .with_edits(edits)
            })
            .collect();

        let details = json!({
            "violations": violations,
            "expanded_terms": avoid,
        });
        (CheckResult::new(issues.is_empty(), details), issues)
    }

    /// Fallback exercise for the first pattern `name` belongs to, unless the
    /// fallback itself hits an avoid term.
    fn safe_fallback(&self, name: &str, avoid: &ExpandedAvoidance) -> Option<String> {
        self.patterns
            .classify(name)
            .into_iter()
            .filter_map(|p| self.patterns.bucket(p))
            .map(|b| b.fallback.clone())
            .find(|f| !avoid.matches(f) && !f.eq_ignore_ascii_case(name))
    }

    /// `planned_sets` holds the set counts time fit already asked for; a sets
    /// clamp starts from those so it cannot undo a reduction in the same batch.
    fn check_progression(
        &self,
        plan: &Plan,
        planned_sets: &BTreeMap<ExerciseRef, u32>,
    ) -> (CheckResult, Vec<Issue>) {
        let b = &self.bounds;
        let mut by_id: BTreeMap<String, Issue> = BTreeMap::new();

        for (day_idx, day) in plan.days.iter().enumerate() {
            for (bi, ei, ex) in day.exercises() {
                let at = ExerciseRef::new(day_idx, bi, ei);
                let mut problems = Vec::new();
                let mut edits = Vec::new();

                if ex.sets < b.min_sets || ex.sets > b.max_sets {
                    let clamped = planned_sets
                        .get(&at)
                        .copied()
                        .unwrap_or(ex.sets)
                        .clamp(b.min_sets, b.max_sets);
                    problems.push(format!(
                        "{} sets outside [{}, {}]",
                        ex.sets, b.min_sets, b.max_sets
                    ));
                    edits.push(Edit::tune_sets(at, clamped, "Clamp sets to a sane range"));
                }
                if let Some(rest) = ex.rest_seconds {
                    if rest < b.min_rest_seconds || rest > b.max_rest_seconds {
                        let clamped = rest.clamp(b.min_rest_seconds, b.max_rest_seconds);
                        problems.push(format!(
                            "{}s rest outside [{}, {}]",
                            rest, b.min_rest_seconds, b.max_rest_seconds
                        ));
                        edits.push(Edit::add_rest(at, clamped, "Clamp rest to a sane range"));
                    }
                }
                if problems.is_empty() {
                    continue;
                }

                let id = format!("prog_{}_out_of_range", slug(&ex.name));
                let message = format!("{} at {}: {}", ex.name, at, problems.join("; "));
                by_id
                    .entry(id.clone())
                    .and_modify(|issue| {
                        issue.message.push_str(&format!("; {}", message));
                        issue.edits.extend(edits.iter().cloned());
                    })
                    .or_insert_with(|| {
                        Issue::new(id, CHECK_PROGRESSION, message).with_edits(edits)
                    });
            }
        }

        let issues: Vec<Issue> = by_id.into_values().collect();
        let details = json!({
            "flagged": issues.iter().map(|i| i.id.clone()).collect::<Vec<_>>(),
        });
        (CheckResult::new(issues.is_empty(), details), issues)
    }
}

/// Target set counts from the time-fit edits, keyed by exercise.
fn planned_set_counts(time_issues: &[Issue]) -> BTreeMap<ExerciseRef, u32> {
    time_issues
        .iter()
        .flat_map(|i| i.edits.iter())
        .filter_map(|e| match e.op {
            EditOp::TuneSets { at, sets } => Some((at, sets)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edits::apply_edits;
    use crate::plan::{Block, Day};

    fn verifier() -> FastVerifier {
        FastVerifier::new(&RefinementConfig::default().with_max_revisions(2))
    }

    fn balanced_day(name: &str) -> Day {
        Day::new(
            name,
            vec![Block::new(
                "Main",
                vec![
                    Exercise::new("Back Squat", 3, "5").with_rest(120),
                    Exercise::new("Romanian Deadlift", 3, "8").with_rest(90),
                    Exercise::new("Bench Press", 3, "5").with_rest(120),
                    Exercise::new("Barbell Row", 3, "8").with_rest(90),
                ],
            )],
        )
    }

    fn ids(report: &VerificationReport) -> Vec<String> {
        report.issue_ids()
    }

    #[test]
    fn test_balanced_plan_passes() {
        let plan = Plan::new(vec![balanced_day("A"), balanced_day("B")]);
        let report = verifier().verify(&Profile::default(), &plan, &ExpandedAvoidance::new());
        assert!(report.ok, "unexpected issues: {:?}", ids(&report));
        assert!(report.time_fit.as_ref().unwrap().ok);
        assert_eq!(report.phase, VerificationPhase::Fast);
    }

    #[test]
    fn test_verify_is_deterministic() {
        let plan = Plan::new(vec![balanced_day("A")]);
        let profile = Profile {
            minutes_per_day: 10,
            avoid_exercises: vec!["row".into()],
            ..Profile::default()
        };
        let avoid = ExpandedAvoidance::literal(&profile.avoid_exercises);
        let v = verifier();
        let a = v.verify(&profile, &plan, &avoid);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = v.verify(&profile, &plan, &avoid);
        assert!(!a.ok);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_time_over_suggests_set_reductions_that_fit() {
        let plan = Plan::new(vec![Day::new(
            "Long",
            vec![Block::new(
                "Main",
                vec![
                    Exercise::new("Back Squat", 6, "5").with_rest(180),
                    Exercise::new("Bench Press", 5, "5").with_rest(180),
                    Exercise::new("Barbell Row", 4, "8").with_rest(90),
                    Exercise::new("Romanian Deadlift", 4, "8").with_rest(90),
                ],
            )],
        )]);
        let profile = Profile {
            minutes_per_day: 30,
            ..Profile::default()
        };
        let v = verifier();
        let report = v.verify(&profile, &plan, &ExpandedAvoidance::new());
        let issue = report
            .issues
            .iter()
            .find(|i| i.id == "time_day_0_over")
            .expect("time issue");
        assert!(!issue.edits.is_empty());
        assert!(issue
            .edits
            .iter()
            .all(|e| matches!(e.op, EditOp::TuneSets { sets, .. } if sets >= 1)));

        let fixed = apply_edits(&plan, &issue.edits).plan;
        let after = v.verify(&profile, &fixed, &ExpandedAvoidance::new());
        assert!(!ids(&after).contains(&"time_day_0_over".to_string()));
    }

    #[test]
    fn test_time_over_without_reducible_sets_has_no_edits() {
        let plan = Plan::new(vec![Day::new(
            "Tiny",
            vec![Block::new(
                "Main",
                vec![
                    Exercise::new("Back Squat", 1, "30"),
                    Exercise::new("Bench Press", 1, "30"),
                ],
            )],
        )]);
        let profile = Profile {
            minutes_per_day: 1,
            ..Profile::default()
        };
        let report = verifier().verify(&profile, &plan, &ExpandedAvoidance::new());
        let issue = report
            .issues
            .iter()
            .find(|i| i.id == "time_day_0_over")
            .unwrap();
        assert!(issue.edits.is_empty());
    }

    #[test]
    fn test_missing_pattern_adds_fallback_to_lightest_day() {
        let plan = Plan::new(vec![
            balanced_day("Full"),
            Day::new(
                "Upper",
                vec![Block::new("Main", vec![Exercise::new("Bench Press", 3, "5")])],
            ),
        ]);
        let mut plan = plan;
        // drop the only pull movement
        plan.days[0].blocks[0].exercises.remove(3);
        let report = verifier().verify(&Profile::default(), &plan, &ExpandedAvoidance::new());
        let issue = report
            .issues
            .iter()
            .find(|i| i.id == "balance_pull_missing")
            .unwrap();
        match &issue.edits[..] {
            [edit] => match &edit.op {
                EditOp::AddExercise { to, exercise } => {
                    assert_eq!(to.day, 1);
                    assert_eq!(exercise.name, "Dumbbell Row");
                }
                other => panic!("unexpected op {:?}", other),
            },
            other => panic!("expected one edit, got {:?}", other),
        }
    }

    #[test]
    fn test_fallback_matching_avoid_term_not_suggested() {
        let mut plan = Plan::new(vec![balanced_day("A")]);
        plan.days[0].blocks[0].exercises.remove(3);
        let avoid = ExpandedAvoidance::literal(&["dumbbell"]);
        let report = verifier().verify(&Profile::default(), &plan, &avoid);
        let issue = report
            .issues
            .iter()
            .find(|i| i.id == "balance_pull_missing")
            .unwrap();
        assert!(issue.edits.is_empty());
    }

    #[test]
    fn test_avoidance_without_pattern_removes() {
        let mut plan = Plan::new(vec![balanced_day("A")]);
        plan.days[0].blocks[0]
            .exercises
            .push(Exercise::new("Kneeling Cable Crunch", 3, "12"));
        let avoid = ExpandedAvoidance::literal(&["knee"]);
        let report = verifier().verify(&Profile::default(), &plan, &avoid);
        assert_eq!(ids(&report), vec!["avoid_violation_knee"]);
        assert_eq!(
            report.issues[0].edits[0].op,
            EditOp::RemoveExercise {
                at: ExerciseRef::new(0, 0, 4)
            }
        );
    }

    #[test]
    fn test_exercise_hitting_two_terms_flags_both() {
        let mut plan = Plan::new(vec![balanced_day("A")]);
        plan.days[0].blocks[0]
            .exercises
            .push(Exercise::new("Kneeling Cable Crunch", 3, "12"));
        let avoid = ExpandedAvoidance::literal(&["knee", "crunch"]);
        let report = verifier().verify(&Profile::default(), &plan, &avoid);
        assert_eq!(
            ids(&report),
            vec!["avoid_violation_crunch", "avoid_violation_knee"]
        );

        let edits: Vec<&Edit> = report.issues.iter().flat_map(|i| i.edits.iter()).collect();
        assert_eq!(edits.len(), 2);
        assert_eq!(edits[0], edits[1]);
        assert_eq!(
            edits[0].op,
            EditOp::RemoveExercise {
                at: ExerciseRef::new(0, 0, 4)
            }
        );
        let violations = &report.avoidance.as_ref().unwrap().details["violations"];
        assert_eq!(violations.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_avoidance_replaces_with_safe_fallback() {
        let plan = Plan::new(vec![balanced_day("A")]);
        let mut avoid = ExpandedAvoidance::new();
        avoid.insert("barbell back", ["back squat"]);
        let report = verifier().verify(&Profile::default(), &plan, &avoid);
        let issue = &report.issues[0];
        assert_eq!(issue.id, "avoid_violation_barbell_back");
        assert_eq!(
            issue.edits[0].op,
            EditOp::ReplaceExercise {
                at: ExerciseRef::new(0, 0, 0),
                new_name: "Goblet Squat".into()
            }
        );
    }

    #[test]
    fn test_sets_clamp_keeps_time_reduction() {
        let plan = Plan::new(vec![Day::new(
            "Heavy",
            vec![Block::new(
                "Main",
                vec![
                    Exercise::new("Back Squat", 10, "5").with_rest(60),
                    Exercise::new("Romanian Deadlift", 2, "5").with_rest(60),
                    Exercise::new("Bench Press", 2, "5").with_rest(60),
                    Exercise::new("Barbell Row", 2, "5").with_rest(60),
                ],
            )],
        )]);
        let profile = Profile {
            minutes_per_day: 8,
            ..Profile::default()
        };
        let v = verifier();
        let report = v.verify(&profile, &plan, &ExpandedAvoidance::new());
        assert!(ids(&report).contains(&"time_day_0_over".to_string()));
        assert!(ids(&report).contains(&"prog_back_squat_out_of_range".to_string()));

        let fixed = apply_edits(&plan, &report.suggested_edits()).plan;
        assert_eq!(fixed.days[0].blocks[0].exercises[0].sets, 4);
        let after = v.verify(&profile, &fixed, &ExpandedAvoidance::new());
        assert!(after.ok, "unexpected issues: {:?}", ids(&after));
    }

    #[test]
    fn test_progression_clamps() {
        let mut plan = Plan::new(vec![balanced_day("A")]);
        plan.days[0].blocks[0].exercises[0].sets = 10;
        plan.days[0].blocks[0].exercises[1].rest_seconds = Some(-5);
        let report = verifier().verify(&Profile::default(), &plan, &ExpandedAvoidance::new());
        let prog: Vec<&Issue> = report
            .issues
            .iter()
            .filter(|i| i.check == CHECK_PROGRESSION)
            .collect();
        assert_eq!(prog.len(), 2);
        let fixed = apply_edits(&plan, &report.suggested_edits()).plan;
        assert_eq!(fixed.days[0].blocks[0].exercises[0].sets, 6);
        assert_eq!(fixed.days[0].blocks[0].exercises[1].rest_seconds, Some(0));
    }
}
