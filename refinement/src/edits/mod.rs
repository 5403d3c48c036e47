//! Structured plan edits and the deterministic applier.

pub mod applier;
pub mod types;

pub use applier::{apply_edits, apply_substitutions, ApplyOutcome, SkippedEdit};
pub use types::{
    parse_edits, split_edits, Edit, EditOp, EditType, NoteTarget, SubstitutionSuggestion,
};
