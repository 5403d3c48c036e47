//! Session time estimates.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::TimeTable;
use crate::plan::{Day, Exercise};

static REP_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("rep number regex should compile"));

/// Average reps implied by a display string: "8-12" → 10, "5" → 5.
pub fn average_reps(reps: &str, table: &TimeTable) -> f64 {
    let lower = reps.to_lowercase();
    if lower.contains("amrap") || lower.contains("max") {
        return table.amrap_reps;
    }
    let numbers: Vec<f64> = REP_NUMBER_RE
        .find_iter(reps)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect();
    if numbers.is_empty() {
        table.default_reps
    } else {
        numbers.iter().sum::<f64>() / numbers.len() as f64
    }
}

/// Rest between sets, falling back to the table default. Negative values
/// count as zero here; the progression check reports them.
pub fn rest_seconds(exercise: &Exercise, table: &TimeTable) -> f64 {
    exercise
        .rest_seconds
        .map(|r| r.max(0) as f64)
        .unwrap_or(table.default_rest_seconds as f64)
}

/// Seconds one working set adds: the reps plus the rest that follows it.
pub fn seconds_per_set(exercise: &Exercise, table: &TimeTable) -> f64 {
    average_reps(&exercise.reps, table) * table.seconds_per_rep + rest_seconds(exercise, table)
}

/// `sets × avg_reps × seconds_per_rep + (sets − 1) × rest`
pub fn exercise_seconds(exercise: &Exercise, table: &TimeTable) -> f64 {
    let sets = exercise.sets as f64;
    let work = sets * average_reps(&exercise.reps, table) * table.seconds_per_rep;
    let rest = (sets - 1.0).max(0.0) * rest_seconds(exercise, table);
    work + rest
}

pub fn day_minutes(day: &Day, table: &TimeTable) -> f64 {
    day.exercises()
        .map(|(_, _, ex)| exercise_seconds(ex, table))
        .sum::<f64>()
        / 60.0
}
