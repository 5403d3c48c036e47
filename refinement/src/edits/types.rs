//! Edit value objects and their wire format.
//!
//! Generative components emit edits as loosely-typed JSON:
//!
//! ```json
//! {"type": "tune_sets", "reason": "...", "loc": {"day_idx": 0, "block_idx": 0, "ex_idx": 2},
//!  "payload": {"sets": 3}}
//! ```
//!
//! Decoding goes through [`RawEdit`] and is fallible: unknown tags, missing
//! locations and undecodable payloads become [`EditError`] values instead of
//! panics, so one bad edit never poisons a batch.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::EditError;
use crate::plan::{BlockRef, Exercise, ExerciseRef};

/// Edit discriminant, used for logging and the mechanical/semantic split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditType {
    ReplaceExercise,
    TuneSets,
    TuneReps,
    AddRest,
    RemoveExercise,
    AddExercise,
    ReorderDays,
    AddNote,
}

impl EditType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReplaceExercise => "replace_exercise",
            Self::TuneSets => "tune_sets",
            Self::TuneReps => "tune_reps",
            Self::AddRest => "add_rest",
            Self::RemoveExercise => "remove_exercise",
            Self::AddExercise => "add_exercise",
            Self::ReorderDays => "reorder_days",
            Self::AddNote => "add_note",
        }
    }

    fn parse(tag: &str) -> Option<Self> {
        Some(match tag {
            "replace_exercise" => Self::ReplaceExercise,
            "tune_sets" => Self::TuneSets,
            "tune_reps" => Self::TuneReps,
            "add_rest" => Self::AddRest,
            "remove_exercise" => Self::RemoveExercise,
            "add_exercise" => Self::AddExercise,
            "reorder_days" => Self::ReorderDays,
            "add_note" => Self::AddNote,
            _ => return None,
        })
    }
}

impl std::fmt::Display for EditType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an `add_note` lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteTarget {
    /// Plan metadata notes
    Plan,
    /// Appended to the day's focus line
    Day(usize),
    /// Appended to the exercise's notes
    Exercise(ExerciseRef),
}

/// The typed operation carried by an [`Edit`]
#[derive(Debug, Clone, PartialEq)]
pub enum EditOp {
    ReplaceExercise { at: ExerciseRef, new_name: String },
    TuneSets { at: ExerciseRef, sets: u32 },
    TuneReps { at: ExerciseRef, reps: String },
    AddRest { at: ExerciseRef, rest_seconds: i64 },
    RemoveExercise { at: ExerciseRef },
    AddExercise { to: BlockRef, exercise: Exercise },
    ReorderDays { order: Vec<usize> },
    AddNote { target: NoteTarget, note: String },
}

/// Atomic, located mutation instruction. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEdit", into = "RawEdit")]
pub struct Edit {
    pub reason: String,
    pub op: EditOp,
}

impl Edit {
    pub fn new(op: EditOp, reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            op,
        }
    }

    pub fn replace_exercise(at: ExerciseRef, new_name: impl Into<String>, reason: &str) -> Self {
        Self::new(
            EditOp::ReplaceExercise {
                at,
                new_name: new_name.into(),
            },
            reason,
        )
    }

    pub fn tune_sets(at: ExerciseRef, sets: u32, reason: &str) -> Self {
        Self::new(EditOp::TuneSets { at, sets }, reason)
    }

    pub fn tune_reps(at: ExerciseRef, reps: impl Into<String>, reason: &str) -> Self {
        Self::new(
            EditOp::TuneReps {
                at,
                reps: reps.into(),
            },
            reason,
        )
    }

    pub fn add_rest(at: ExerciseRef, rest_seconds: i64, reason: &str) -> Self {
        Self::new(EditOp::AddRest { at, rest_seconds }, reason)
    }

    pub fn remove_exercise(at: ExerciseRef, reason: &str) -> Self {
        Self::new(EditOp::RemoveExercise { at }, reason)
    }

    pub fn add_exercise(to: BlockRef, exercise: Exercise, reason: &str) -> Self {
        Self::new(EditOp::AddExercise { to, exercise }, reason)
    }

    pub fn reorder_days(order: Vec<usize>, reason: &str) -> Self {
        Self::new(EditOp::ReorderDays { order }, reason)
    }

    pub fn add_note(target: NoteTarget, note: impl Into<String>, reason: &str) -> Self {
        Self::new(
            EditOp::AddNote {
                target,
                note: note.into(),
            },
            reason,
        )
    }

    pub fn edit_type(&self) -> EditType {
        match &self.op {
            EditOp::ReplaceExercise { .. } => EditType::ReplaceExercise,
            EditOp::TuneSets { .. } => EditType::TuneSets,
            EditOp::TuneReps { .. } => EditType::TuneReps,
            EditOp::AddRest { .. } => EditType::AddRest,
            EditOp::RemoveExercise { .. } => EditType::RemoveExercise,
            EditOp::AddExercise { .. } => EditType::AddExercise,
            EditOp::ReorderDays { .. } => EditType::ReorderDays,
            EditOp::AddNote { .. } => EditType::AddNote,
        }
    }

    /// Whether this edit can be applied without reasoning about training
    /// logic. Day reordering changes recovery spacing, so it goes to the
    /// reviser instead.
    pub fn is_mechanical(&self) -> bool {
        !matches!(self.op, EditOp::ReorderDays { .. })
    }

    /// Decode one edit from generator JSON.
    pub fn from_value(value: &Value) -> Result<Self, EditError> {
        let raw: RawEdit = serde_json::from_value(value.clone())
            .map_err(|e| EditError::Malformed(e.to_string()))?;
        Self::try_from(raw)
    }
}

/// Split a batch into (mechanical, needs-reasoning), preserving order.
pub fn split_edits(edits: &[Edit]) -> (Vec<Edit>, Vec<Edit>) {
    edits.iter().cloned().partition(Edit::is_mechanical)
}

/// Decode an untyped edit array, keeping the good ones.
///
/// Rejections carry the index into `values` so they can be reported.
pub fn parse_edits(values: &[Value]) -> (Vec<Edit>, Vec<(usize, EditError)>) {
    let mut edits = Vec::with_capacity(values.len());
    let mut rejected = Vec::new();
    for (index, value) in values.iter().enumerate() {
        match Edit::from_value(value) {
            Ok(edit) => edits.push(edit),
            Err(err) => rejected.push((index, err)),
        }
    }
    (edits, rejected)
}

// ── Wire format ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawLocation {
    #[serde(default, alias = "day_index", skip_serializing_if = "Option::is_none")]
    day_idx: Option<usize>,
    #[serde(default, alias = "block_index", skip_serializing_if = "Option::is_none")]
    block_idx: Option<usize>,
    #[serde(default, alias = "exercise_index", skip_serializing_if = "Option::is_none")]
    ex_idx: Option<usize>,
}

impl RawLocation {
    fn is_empty(&self) -> bool {
        self.day_idx.is_none() && self.block_idx.is_none() && self.ex_idx.is_none()
    }
}

impl From<ExerciseRef> for RawLocation {
    fn from(at: ExerciseRef) -> Self {
        Self {
            day_idx: Some(at.day),
            block_idx: Some(at.block),
            ex_idx: Some(at.exercise),
        }
    }
}

impl From<BlockRef> for RawLocation {
    fn from(at: BlockRef) -> Self {
        Self {
            day_idx: Some(at.day),
            block_idx: Some(at.block),
            ex_idx: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawEdit {
    #[serde(rename = "type")]
    edit_type: String,
    #[serde(default)]
    reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    loc: Option<RawLocation>,
    #[serde(default)]
    payload: Value,
}

impl TryFrom<RawEdit> for Edit {
    type Error = EditError;

    fn try_from(raw: RawEdit) -> Result<Self, Self::Error> {
        let edit_type = EditType::parse(&raw.edit_type)
            .ok_or_else(|| EditError::Malformed(format!("unknown edit type '{}'", raw.edit_type)))?;
        let loc = raw.loc.unwrap_or_default();
        let payload = &raw.payload;
        let tag = edit_type.as_str();

        let op = match edit_type {
            EditType::ReplaceExercise => EditOp::ReplaceExercise {
                at: exercise_ref(tag, &loc)?,
                new_name: non_empty_string(tag, payload, "new_name")?,
            },
            EditType::TuneSets => EditOp::TuneSets {
                at: exercise_ref(tag, &loc)?,
                sets: coerce_sets(tag, payload.get("sets"))?,
            },
            EditType::TuneReps => EditOp::TuneReps {
                at: exercise_ref(tag, &loc)?,
                reps: coerce_reps(tag, payload.get("reps"))?,
            },
            EditType::AddRest => EditOp::AddRest {
                at: exercise_ref(tag, &loc)?,
                rest_seconds: coerce_int(tag, "rest_seconds", payload.get("rest_seconds"))?,
            },
            EditType::RemoveExercise => EditOp::RemoveExercise {
                at: exercise_ref(tag, &loc)?,
            },
            EditType::AddExercise => EditOp::AddExercise {
                to: block_ref(tag, &loc)?,
                exercise: coerce_exercise(tag, payload.get("exercise"))?,
            },
            EditType::ReorderDays => EditOp::ReorderDays {
                order: coerce_order(tag, payload.get("order"))?,
            },
            EditType::AddNote => EditOp::AddNote {
                target: note_target(&loc)?,
                note: non_empty_string(tag, payload, "note")?,
            },
        };

        Ok(Edit {
            reason: raw.reason,
            op,
        })
    }
}

impl From<Edit> for RawEdit {
    fn from(edit: Edit) -> Self {
        let edit_type = edit.edit_type().as_str().to_string();
        let (loc, payload) = match edit.op {
            EditOp::ReplaceExercise { at, new_name } => {
                (Some(at.into()), json!({ "new_name": new_name }))
            }
            EditOp::TuneSets { at, sets } => (Some(at.into()), json!({ "sets": sets })),
            EditOp::TuneReps { at, reps } => (Some(at.into()), json!({ "reps": reps })),
            EditOp::AddRest { at, rest_seconds } => {
                (Some(at.into()), json!({ "rest_seconds": rest_seconds }))
            }
            EditOp::RemoveExercise { at } => (Some(at.into()), Value::Object(Map::new())),
            EditOp::AddExercise { to, exercise } => (
                Some(to.into()),
                json!({ "exercise": exercise.to_json() }),
            ),
            EditOp::ReorderDays { order } => (None, json!({ "order": order })),
            EditOp::AddNote { target, note } => {
                let loc = match target {
                    NoteTarget::Plan => None,
                    NoteTarget::Day(day) => Some(RawLocation {
                        day_idx: Some(day),
                        ..Default::default()
                    }),
                    NoteTarget::Exercise(at) => Some(at.into()),
                };
                (loc, json!({ "note": note }))
            }
        };
        RawEdit {
            edit_type,
            reason: edit.reason,
            loc,
            payload,
        }
    }
}

fn exercise_ref(tag: &str, loc: &RawLocation) -> Result<ExerciseRef, EditError> {
    match (loc.day_idx, loc.block_idx, loc.ex_idx) {
        (Some(day), Some(block), Some(exercise)) => Ok(ExerciseRef {
            day,
            block,
            exercise,
        }),
        _ => Err(EditError::Malformed(format!(
            "{} requires loc.day_idx, loc.block_idx and loc.ex_idx",
            tag
        ))),
    }
}

fn block_ref(tag: &str, loc: &RawLocation) -> Result<BlockRef, EditError> {
    match (loc.day_idx, loc.block_idx) {
        (Some(day), Some(block)) => Ok(BlockRef { day, block }),
        _ => Err(EditError::Malformed(format!(
            "{} requires loc.day_idx and loc.block_idx",
            tag
        ))),
    }
}

fn note_target(loc: &RawLocation) -> Result<NoteTarget, EditError> {
    if loc.is_empty() {
        return Ok(NoteTarget::Plan);
    }
    match (loc.day_idx, loc.block_idx, loc.ex_idx) {
        (Some(day), None, None) => Ok(NoteTarget::Day(day)),
        (Some(day), Some(block), Some(exercise)) => Ok(NoteTarget::Exercise(ExerciseRef {
            day,
            block,
            exercise,
        })),
        _ => Err(EditError::Malformed(
            "add_note location must be empty, a day, or a full exercise address".to_string(),
        )),
    }
}

fn non_empty_string(tag: &str, payload: &Value, key: &str) -> Result<String, EditError> {
    match payload.get(key).and_then(Value::as_str).map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(EditError::Malformed(format!(
            "{} requires a non-empty payload.{}",
            tag, key
        ))),
    }
}

/// Integer from a JSON number (integral floats allowed) or numeric string.
fn coerce_int(tag: &str, key: &str, value: Option<&Value>) -> Result<i64, EditError> {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64)
        }),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| EditError::Malformed(format!("{} requires an integer payload.{}", tag, key)))
}

fn coerce_sets(tag: &str, value: Option<&Value>) -> Result<u32, EditError> {
    let sets = coerce_int(tag, "sets", value)?;
    if sets < 1 {
        return Err(EditError::payload(tag, format!("sets must be positive (got {})", sets)));
    }
    u32::try_from(sets).map_err(|_| EditError::payload(tag, format!("sets {} too large", sets)))
}

fn coerce_reps(tag: &str, value: Option<&Value>) -> Result<String, EditError> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(EditError::Malformed(format!(
            "{} requires a non-empty payload.reps",
            tag
        ))),
    }
}

fn coerce_order(tag: &str, value: Option<&Value>) -> Result<Vec<usize>, EditError> {
    let items = value
        .and_then(Value::as_array)
        .ok_or_else(|| EditError::Malformed(format!("{} requires payload.order array", tag)))?;
    items
        .iter()
        .map(|v| {
            v.as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| EditError::Malformed(format!("{} order entries must be indices", tag)))
        })
        .collect()
}

/// Build an exercise literal, filling the defaults generators tend to omit.
fn coerce_exercise(tag: &str, value: Option<&Value>) -> Result<Exercise, EditError> {
    let obj = value
        .and_then(Value::as_object)
        .ok_or_else(|| EditError::Malformed(format!("{} requires payload.exercise object", tag)))?;

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("Exercise")
        .to_string();
    let sets = match obj.get("sets") {
        None | Some(Value::Null) => 3,
        some => coerce_sets(tag, some)?,
    };
    let reps = match obj.get("reps") {
        None | Some(Value::Null) => "8-12".to_string(),
        some => coerce_reps(tag, some)?,
    };
    let rest_seconds = match obj.get("rest_seconds") {
        None | Some(Value::Null) => None,
        some => Some(coerce_int(tag, "exercise.rest_seconds", some)?),
    };
    let text = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);

    Ok(Exercise {
        name,
        sets,
        reps,
        intensity: text("intensity"),
        rest_seconds,
        notes: text("notes"),
    })
}

/// Substitution proposal from the Subber. Never mutates a plan by itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstitutionSuggestion {
    #[serde(rename = "day_idx")]
    pub day: usize,
    #[serde(rename = "block_idx")]
    pub block: usize,
    #[serde(rename = "ex_idx")]
    pub exercise: usize,
    pub original: String,
    #[serde(default)]
    pub best: Option<String>,
    #[serde(default)]
    pub candidates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl SubstitutionSuggestion {
    pub fn location(&self) -> ExerciseRef {
        ExerciseRef::new(self.day, self.block, self.exercise)
    }

    /// Convert to a `replace_exercise` edit. Suggestions without a usable
    /// pick, or echoing the original name, produce nothing.
    pub fn to_edit(&self) -> Option<Edit> {
        let best = self.best.as_deref().map(str::trim).filter(|b| !b.is_empty())?;
        if best.eq_ignore_ascii_case(self.original.trim()) {
            return None;
        }
        let reason = self
            .rationale
            .clone()
            .unwrap_or_else(|| format!("substitute {} → {}", self.original, best));
        Some(Edit::replace_exercise(self.location(), best, &reason))
    }
}
