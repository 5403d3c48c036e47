//! Plan Model: profiles, weekly plans, and addressing into them
//!
//! A [`Plan`] is produced wholesale by the generator and afterwards only
//! changes through the edit applier (copy-on-write) or full replacement by a
//! revision. Verifiers take `&Plan` and never mutate it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Self-reported training experience
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingHistory {
    Beginner,
    Intermediate,
    Advanced,
}

/// Immutable description of the trainee and their constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_history: Option<TrainingHistory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_age_years: Option<f64>,
    /// Training days per week
    #[serde(default = "default_days_per_week")]
    pub days_per_week: u32,
    /// Session length budget in minutes
    #[serde(default = "default_minutes_per_day")]
    pub minutes_per_day: u32,
    #[serde(default)]
    pub equipment_available: Vec<String>,
    #[serde(default = "default_goal")]
    pub goal: String,
    /// Estimated one-rep maxes keyed by lift name (e.g. `"squat" -> 140`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_1rm: Option<BTreeMap<String, f64>>,
    /// Raw avoidance terms as the user typed them ("knee", "overhead press")
    #[serde(default)]
    pub avoid_exercises: Vec<String>,
}

fn default_days_per_week() -> u32 {
    4
}

fn default_minutes_per_day() -> u32 {
    60
}

fn default_goal() -> String {
    "strength - squat focus".to_string()
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            sex: None,
            age: None,
            height_cm: None,
            weight_kg: None,
            training_history: None,
            training_age_years: None,
            days_per_week: default_days_per_week(),
            minutes_per_day: default_minutes_per_day(),
            equipment_available: Vec::new(),
            goal: default_goal(),
            estimated_1rm: None,
            avoid_exercises: Vec::new(),
        }
    }
}

/// A single prescribed exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub name: String,
    pub sets: u32,
    /// Display string: "5", "8-12", "AMRAP"
    pub reps: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<String>,
    /// Signed so a negative value from a generator survives decoding and
    /// can be flagged by the progression check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Exercise {
    pub fn new(name: impl Into<String>, sets: u32, reps: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sets,
            reps: reps.into(),
            intensity: None,
            rest_seconds: None,
            notes: None,
        }
    }

    pub fn with_rest(mut self, rest_seconds: i64) -> Self {
        self.rest_seconds = Some(rest_seconds);
        self
    }

    /// JSON object in the generator's exercise shape. Built field by field so
    /// edit serialization never has a failure path.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("name".into(), self.name.clone().into());
        obj.insert("sets".into(), self.sets.into());
        obj.insert("reps".into(), self.reps.clone().into());
        if let Some(intensity) = &self.intensity {
            obj.insert("intensity".into(), intensity.clone().into());
        }
        if let Some(rest) = self.rest_seconds {
            obj.insert("rest_seconds".into(), rest.into());
        }
        if let Some(notes) = &self.notes {
            obj.insert("notes".into(), notes.clone().into());
        }
        serde_json::Value::Object(obj)
    }

    /// Append a note, joining with any existing text.
    pub fn push_note(&mut self, note: &str) {
        match &mut self.notes {
            Some(existing) if !existing.is_empty() => {
                existing.push_str(" | ");
                existing.push_str(note);
            }
            _ => self.notes = Some(note.to_string()),
        }
    }
}

/// Named group of exercises within a day ("Main Lift", "Accessories")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    #[serde(default)]
    pub exercises: Vec<Exercise>,
}

impl Block {
    pub fn new(name: impl Into<String>, exercises: Vec<Exercise>) -> Self {
        Self {
            name: name.into(),
            exercises,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Day {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl Day {
    pub fn new(name: impl Into<String>, blocks: Vec<Block>) -> Self {
        Self {
            name: name.into(),
            focus: None,
            blocks,
        }
    }

    /// Iterate `(block_index, exercise_index, exercise)` in plan order.
    pub fn exercises(&self) -> impl Iterator<Item = (usize, usize, &Exercise)> {
        self.blocks.iter().enumerate().flat_map(|(bi, block)| {
            block
                .exercises
                .iter()
                .enumerate()
                .map(move |(ei, ex)| (bi, ei, ex))
        })
    }
}

/// Weekly workout plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub days: Vec<Day>,
    /// Plan-level notes appended by `add_note` edits without a location
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    /// Free-form provenance (template source URL, generator model, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Plan {
    pub fn new(days: Vec<Day>) -> Self {
        Self {
            days,
            notes: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Total number of exercises across all days and blocks
    pub fn exercise_count(&self) -> usize {
        self.days
            .iter()
            .flat_map(|d| d.blocks.iter())
            .map(|b| b.exercises.len())
            .sum()
    }

    /// Resolve an exercise address, if it exists.
    pub fn exercise(&self, at: ExerciseRef) -> Option<&Exercise> {
        self.days
            .get(at.day)?
            .blocks
            .get(at.block)?
            .exercises
            .get(at.exercise)
    }
}

/// Address of a block: `{day_index, block_index}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockRef {
    pub day: usize,
    pub block: usize,
}

/// Address of an exercise: `{day_index, block_index, exercise_index}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExerciseRef {
    pub day: usize,
    pub block: usize,
    pub exercise: usize,
}

impl ExerciseRef {
    pub fn new(day: usize, block: usize, exercise: usize) -> Self {
        Self {
            day,
            block,
            exercise,
        }
    }

    pub fn block_ref(&self) -> BlockRef {
        BlockRef {
            day: self.day,
            block: self.block,
        }
    }
}

impl std::fmt::Display for ExerciseRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "day {} block {} exercise {}", self.day, self.block, self.exercise)
    }
}

impl std::fmt::Display for BlockRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "day {} block {}", self.day, self.block)
    }
}
