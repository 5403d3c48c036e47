//! Deterministic edit application.
//!
//! `apply_edits` never touches its input: it clones the plan once and applies
//! the batch to the copy, in order. Each edit is validated completely before
//! it mutates anything, so a rejected edit leaves no trace.
//!
//! Exercise indices inside one batch refer to the block contents as they were
//! before the batch started. A removal ledger per `(day, block)` records
//! which original indices have been deleted; later edits are shifted down past
//! earlier removals, and edits aimed at a removed exercise are stale.

use tracing::debug;

use super::types::{Edit, EditOp, EditType, NoteTarget, SubstitutionSuggestion};
use crate::error::EditError;
use crate::plan::{BlockRef, Exercise, ExerciseRef, Plan};

/// An edit that was not applied.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedEdit {
    /// Position in the submitted batch
    pub index: usize,
    pub edit_type: EditType,
    pub error: EditError,
}

/// Result of applying a batch
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub plan: Plan,
    pub applied: usize,
    pub skipped: Vec<SkippedEdit>,
}

impl ApplyOutcome {
    /// True when every submitted edit landed.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Apply `edits` to a copy of `plan`.
pub fn apply_edits(plan: &Plan, edits: &[Edit]) -> ApplyOutcome {
    let mut batch = Batch::new(plan.clone());
    let mut applied = 0;
    let mut skipped = Vec::new();

    for (index, edit) in edits.iter().enumerate() {
        match batch.apply(edit) {
            Ok(()) => applied += 1,
            Err(error) => {
                debug!(
                    index,
                    edit_type = %edit.edit_type(),
                    code = error.code(),
                    error = %error,
                    "Skipping edit"
                );
                skipped.push(SkippedEdit {
                    index,
                    edit_type: edit.edit_type(),
                    error,
                });
            }
        }
    }

    ApplyOutcome {
        plan: batch.plan,
        applied,
        skipped,
    }
}

/// Convert substitution suggestions to `replace_exercise` edits and apply
/// them. Suggestions with no usable pick are dropped before application.
pub fn apply_substitutions(plan: &Plan, suggestions: &[SubstitutionSuggestion]) -> ApplyOutcome {
    let edits: Vec<Edit> = suggestions
        .iter()
        .filter_map(SubstitutionSuggestion::to_edit)
        .collect();
    apply_edits(plan, &edits)
}

/// Working copy plus the per-block removal ledger.
struct Batch {
    plan: Plan,
    /// `removed[day][block]` = sorted original indices deleted so far
    removed: Vec<Vec<Vec<usize>>>,
}

impl Batch {
    fn new(plan: Plan) -> Self {
        let removed = plan
            .days
            .iter()
            .map(|d| vec![Vec::new(); d.blocks.len()])
            .collect();
        Self { plan, removed }
    }

    fn apply(&mut self, edit: &Edit) -> Result<(), EditError> {
        let tag = edit.edit_type().as_str();
        match &edit.op {
            EditOp::ReplaceExercise { at, new_name } => {
                let name = new_name.trim();
                if name.is_empty() {
                    return Err(EditError::payload(tag, "new_name is empty"));
                }
                self.exercise_mut(*at)?.name = name.to_string();
            }
            EditOp::TuneSets { at, sets } => {
                if *sets < 1 {
                    return Err(EditError::payload(tag, "sets must be positive"));
                }
                self.exercise_mut(*at)?.sets = *sets;
            }
            EditOp::TuneReps { at, reps } => {
                if reps.trim().is_empty() {
                    return Err(EditError::payload(tag, "reps is empty"));
                }
                self.exercise_mut(*at)?.reps = reps.clone();
            }
            EditOp::AddRest { at, rest_seconds } => {
                if *rest_seconds < 0 {
                    return Err(EditError::payload(
                        tag,
                        format!("rest_seconds must be non-negative (got {})", rest_seconds),
                    ));
                }
                self.exercise_mut(*at)?.rest_seconds = Some(*rest_seconds);
            }
            EditOp::RemoveExercise { at } => self.remove(*at)?,
            EditOp::AddExercise { to, exercise } => self.append(*to, exercise, tag)?,
            EditOp::ReorderDays { order } => self.reorder(order)?,
            EditOp::AddNote { target, note } => {
                let note = note.trim();
                if note.is_empty() {
                    return Err(EditError::payload(tag, "note is empty"));
                }
                match target {
                    NoteTarget::Plan => self.plan.notes.push(note.to_string()),
                    NoteTarget::Day(day) => {
                        let count = self.plan.days.len();
                        let day = self
                            .plan
                            .days
                            .get_mut(*day)
                            .ok_or_else(|| EditError::day_out_of_range(*day, count))?;
                        day.focus = Some(match day.focus.take() {
                            Some(focus) if !focus.is_empty() => format!("{} | {}", focus, note),
                            _ => note.to_string(),
                        });
                    }
                    NoteTarget::Exercise(at) => self.exercise_mut(*at)?.push_note(note),
                }
            }
        }
        Ok(())
    }

    fn check_block(&self, at: BlockRef) -> Result<(), EditError> {
        let day = self
            .plan
            .days
            .get(at.day)
            .ok_or_else(|| EditError::day_out_of_range(at.day, self.plan.days.len()))?;
        if at.block >= day.blocks.len() {
            return Err(EditError::block_out_of_range(at, day.blocks.len()));
        }
        Ok(())
    }

    /// Translate a batch-relative exercise index into the current position.
    fn resolve(&self, at: ExerciseRef) -> Result<usize, EditError> {
        self.check_block(at.block_ref())?;
        let removed = &self.removed[at.day][at.block];
        if removed.binary_search(&at.exercise).is_ok() {
            return Err(EditError::StaleLocation { at });
        }
        let shift = removed.partition_point(|&r| r < at.exercise);
        let current = at.exercise - shift;
        let len = self.plan.days[at.day].blocks[at.block].exercises.len();
        if current >= len {
            return Err(EditError::exercise_out_of_range(at, len));
        }
        Ok(current)
    }

    fn exercise_mut(&mut self, at: ExerciseRef) -> Result<&mut Exercise, EditError> {
        let current = self.resolve(at)?;
        Ok(&mut self.plan.days[at.day].blocks[at.block].exercises[current])
    }

    fn remove(&mut self, at: ExerciseRef) -> Result<(), EditError> {
        let current = self.resolve(at)?;
        self.plan.days[at.day].blocks[at.block]
            .exercises
            .remove(current);
        let ledger = &mut self.removed[at.day][at.block];
        let pos = ledger.partition_point(|&r| r < at.exercise);
        ledger.insert(pos, at.exercise);
        Ok(())
    }

    fn append(&mut self, to: BlockRef, exercise: &Exercise, tag: &str) -> Result<(), EditError> {
        if exercise.sets < 1 {
            return Err(EditError::payload(tag, "exercise sets must be positive"));
        }
        if exercise.name.trim().is_empty() {
            return Err(EditError::payload(tag, "exercise name is empty"));
        }
        self.check_block(to)?;
        self.plan.days[to.day].blocks[to.block]
            .exercises
            .push(exercise.clone());
        Ok(())
    }

    fn reorder(&mut self, order: &[usize]) -> Result<(), EditError> {
        let day_count = self.plan.days.len();
        let mut seen = vec![false; day_count];
        let bijective = order.len() == day_count
            && order.iter().all(|&i| {
                i < day_count && !std::mem::replace(&mut seen[i], true)
            });
        if !bijective {
            return Err(EditError::NotABijection {
                order: order.to_vec(),
                day_count,
            });
        }

        let mut days: Vec<Option<_>> = std::mem::take(&mut self.plan.days)
            .into_iter()
            .map(Some)
            .collect();
        let mut ledgers: Vec<Option<_>> = std::mem::take(&mut self.removed)
            .into_iter()
            .map(Some)
            .collect();
        for &i in order {
            // Bijection guarantees each slot is taken exactly once.
            if let (Some(day), Some(ledger)) = (days[i].take(), ledgers[i].take()) {
                self.plan.days.push(day);
                self.removed.push(ledger);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Block, Day};

    fn ex(name: &str, sets: u32) -> Exercise {
        Exercise::new(name, sets, "8")
    }

    fn one_block_plan(exercises: Vec<Exercise>) -> Plan {
        Plan::new(vec![Day::new("Day 1", vec![Block::new("Main", exercises)])])
    }

    fn names(plan: &Plan, day: usize, block: usize) -> Vec<String> {
        plan.days[day].blocks[block]
            .exercises
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    #[test]
    fn test_empty_batch_is_identity() {
        let plan = one_block_plan(vec![ex("A", 3), ex("B", 3)]);
        let outcome = apply_edits(&plan, &[]);
        assert_eq!(outcome.plan, plan);
        assert_eq!(outcome.applied, 0);
        assert!(outcome.is_clean());
    }

    #[test]
    fn test_tune_sets_changes_only_sets() {
        let plan = one_block_plan(vec![ex("Back Squat", 5)]);
        let edits = [Edit::tune_sets(ExerciseRef::new(0, 0, 0), 3, "time")];
        let outcome = apply_edits(&plan, &edits);

        let mut expected = plan.clone();
        expected.days[0].blocks[0].exercises[0].sets = 3;
        assert_eq!(outcome.plan, expected);
        // input untouched
        assert_eq!(plan.days[0].blocks[0].exercises[0].sets, 5);
    }

    #[test]
    fn test_remove_then_tune_shifts_index() {
        let plan = one_block_plan(vec![ex("A", 3), ex("B", 3)]);
        let edits = [
            Edit::remove_exercise(ExerciseRef::new(0, 0, 0), "avoid"),
            Edit::tune_sets(ExerciseRef::new(0, 0, 1), 4, "volume"),
        ];
        let outcome = apply_edits(&plan, &edits);
        assert!(outcome.is_clean());
        assert_eq!(names(&outcome.plan, 0, 0), vec!["B"]);
        assert_eq!(outcome.plan.days[0].blocks[0].exercises[0].sets, 4);
    }

    #[test]
    fn test_edit_on_removed_exercise_is_stale() {
        let plan = one_block_plan(vec![ex("A", 3), ex("B", 3)]);
        let edits = [
            Edit::remove_exercise(ExerciseRef::new(0, 0, 0), "avoid"),
            Edit::tune_sets(ExerciseRef::new(0, 0, 0), 2, "time"),
        ];
        let outcome = apply_edits(&plan, &edits);
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].index, 1);
        assert_eq!(
            outcome.skipped[0].error,
            EditError::StaleLocation {
                at: ExerciseRef::new(0, 0, 0)
            }
        );
        assert_eq!(names(&outcome.plan, 0, 0), vec!["B"]);
    }

    #[test]
    fn test_two_removals_in_one_block() {
        let plan = one_block_plan(vec![ex("A", 3), ex("B", 3), ex("C", 3), ex("D", 3)]);
        let edits = [
            Edit::remove_exercise(ExerciseRef::new(0, 0, 2), "x"),
            Edit::remove_exercise(ExerciseRef::new(0, 0, 0), "x"),
            Edit::replace_exercise(ExerciseRef::new(0, 0, 3), "D2", "x"),
        ];
        let outcome = apply_edits(&plan, &edits);
        assert!(outcome.is_clean());
        assert_eq!(names(&outcome.plan, 0, 0), vec!["B", "D2"]);
    }

    #[test]
    fn test_out_of_range_location_skipped() {
        let plan = one_block_plan(vec![ex("A", 3)]);
        let edits = [
            Edit::tune_sets(ExerciseRef::new(0, 0, 5), 2, "x"),
            Edit::tune_sets(ExerciseRef::new(0, 3, 0), 2, "x"),
            Edit::tune_sets(ExerciseRef::new(9, 0, 0), 2, "x"),
        ];
        let outcome = apply_edits(&plan, &edits);
        assert_eq!(outcome.applied, 0);
        assert!(outcome
            .skipped
            .iter()
            .all(|s| matches!(s.error, EditError::InvalidLocation(_))));
        assert_eq!(outcome.plan, plan);
    }

    #[test]
    fn test_invalid_payloads_rejected() {
        let plan = one_block_plan(vec![ex("A", 3)]);
        let at = ExerciseRef::new(0, 0, 0);
        let edits = [
            Edit::tune_sets(at, 0, "x"),
            Edit::add_rest(at, -30, "x"),
            Edit::tune_reps(at, "  ", "x"),
            Edit::add_exercise(BlockRef { day: 0, block: 0 }, ex("Zero", 0), "x"),
        ];
        let outcome = apply_edits(&plan, &edits);
        assert_eq!(outcome.skipped.len(), 4);
        assert!(outcome
            .skipped
            .iter()
            .all(|s| s.error.code() == "invalid_payload"));
        assert_eq!(outcome.plan, plan);
    }

    #[test]
    fn test_add_exercise_appends_and_is_addressable() {
        let plan = one_block_plan(vec![ex("A", 3)]);
        let edits = [
            Edit::add_exercise(BlockRef { day: 0, block: 0 }, ex("Row", 3), "balance"),
            Edit::add_rest(ExerciseRef::new(0, 0, 1), 60, "rest"),
        ];
        let outcome = apply_edits(&plan, &edits);
        assert!(outcome.is_clean());
        let added = &outcome.plan.days[0].blocks[0].exercises[1];
        assert_eq!(added.name, "Row");
        assert_eq!(added.rest_seconds, Some(60));
    }

    #[test]
    fn test_reorder_days_permutes() {
        let plan = Plan::new(vec![
            Day::new("Mon", vec![Block::new("Main", vec![ex("A", 3)])]),
            Day::new("Wed", vec![Block::new("Main", vec![ex("B", 3)])]),
            Day::new("Fri", vec![Block::new("Main", vec![ex("C", 3)])]),
        ]);
        let outcome = apply_edits(&plan, &[Edit::reorder_days(vec![2, 0, 1], "spacing")]);
        assert!(outcome.is_clean());
        let order: Vec<&str> = outcome.plan.days.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(order, vec!["Fri", "Mon", "Wed"]);
    }

    #[test]
    fn test_reorder_days_rejects_non_bijection() {
        let plan = Plan::new(vec![
            Day::new("Mon", vec![]),
            Day::new("Wed", vec![]),
        ]);
        for order in [vec![0, 0], vec![0], vec![0, 1, 2], vec![1, 5]] {
            let outcome = apply_edits(&plan, &[Edit::reorder_days(order, "x")]);
            assert_eq!(outcome.skipped.len(), 1);
            assert_eq!(outcome.skipped[0].error.code(), "not_a_bijection");
            assert_eq!(outcome.plan, plan);
        }
    }

    #[test]
    fn test_removal_ledger_follows_reorder() {
        let plan = Plan::new(vec![
            Day::new("Mon", vec![Block::new("Main", vec![ex("A", 3), ex("B", 3)])]),
            Day::new("Wed", vec![Block::new("Main", vec![ex("C", 3)])]),
        ]);
        let edits = [
            Edit::remove_exercise(ExerciseRef::new(0, 0, 0), "x"),
            Edit::reorder_days(vec![1, 0], "x"),
            // Mon is now day 1; original index 1 (B) shifts to 0
            Edit::tune_sets(ExerciseRef::new(1, 0, 1), 5, "x"),
            Edit::tune_sets(ExerciseRef::new(1, 0, 0), 5, "x"),
        ];
        let outcome = apply_edits(&plan, &edits);
        assert_eq!(outcome.applied, 3);
        assert_eq!(outcome.skipped[0].index, 3);
        assert_eq!(outcome.skipped[0].error.code(), "stale_location");
        assert_eq!(outcome.plan.days[1].blocks[0].exercises[0].name, "B");
        assert_eq!(outcome.plan.days[1].blocks[0].exercises[0].sets, 5);
    }

    #[test]
    fn test_add_note_targets() {
        let plan = one_block_plan(vec![ex("A", 3)]);
        let edits = [
            Edit::add_note(NoteTarget::Plan, "deload every 4th week", "x"),
            Edit::add_note(NoteTarget::Day(0), "keep it light", "x"),
            Edit::add_note(NoteTarget::Exercise(ExerciseRef::new(0, 0, 0)), "tempo", "x"),
            Edit::add_note(NoteTarget::Exercise(ExerciseRef::new(0, 0, 0)), "belt", "x"),
        ];
        let outcome = apply_edits(&plan, &edits);
        assert!(outcome.is_clean());
        assert_eq!(outcome.plan.notes, vec!["deload every 4th week"]);
        assert_eq!(outcome.plan.days[0].focus.as_deref(), Some("keep it light"));
        assert_eq!(
            outcome.plan.days[0].blocks[0].exercises[0].notes.as_deref(),
            Some("tempo | belt")
        );
    }

    #[test]
    fn test_apply_substitutions_skips_echoes() {
        let plan = one_block_plan(vec![ex("Bulgarian Split Squat", 3), ex("Row", 3)]);
        let subs = vec![
            SubstitutionSuggestion {
                day: 0,
                block: 0,
                exercise: 0,
                original: "Bulgarian Split Squat".into(),
                best: Some("Hip Thrust".into()),
                candidates: vec!["Hip Thrust".into()],
                rationale: Some("knee friendly".into()),
            },
            SubstitutionSuggestion {
                day: 0,
                block: 0,
                exercise: 1,
                original: "Row".into(),
                best: Some("Row".into()),
                candidates: vec![],
                rationale: None,
            },
        ];
        let outcome = apply_substitutions(&plan, &subs);
        assert_eq!(outcome.applied, 1);
        assert_eq!(names(&outcome.plan, 0, 0), vec!["Hip Thrust", "Row"]);
    }
}
