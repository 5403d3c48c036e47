//! Collaborator interfaces.
//!
//! Every generative component sits behind one of these traits. They may be
//! slow and non-deterministic; the loop only relies on each call eventually
//! returning a value or a [`GenerationError`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::avoidance::{ExpandedAvoidance, LiteralExpander};
use crate::edits::{Edit, SubstitutionSuggestion};
use crate::error::GenerationError;
use crate::plan::{Plan, Profile};
use crate::verifier::{Issue, VerificationReport};

/// Authors the initial plan.
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate(&self, profile: &Profile) -> Result<Plan, GenerationError>;
}

/// Proposes exercise substitutions. Must not mutate the plan.
#[async_trait]
pub trait SubstitutionSuggester: Send + Sync {
    async fn suggest_substitutions(
        &self,
        plan: &Plan,
        profile: &Profile,
    ) -> Result<Vec<SubstitutionSuggestion>, GenerationError>;
}

/// What the reviser is told about the current plan.
#[derive(Debug, Clone, Default)]
pub struct RevisionContext {
    /// Substitutions suggested before the loop started
    pub substitutions: Vec<SubstitutionSuggestion>,
    /// Suggested edits of the issues that could not be applied mechanically
    pub verifier_edits: Vec<Edit>,
    /// The unresolved issues themselves, for their messages
    pub issues: Vec<Issue>,
}

/// Rewrites a plan wholesale given verifier feedback.
#[async_trait]
pub trait PlanReviser: Send + Sync {
    async fn revise(
        &self,
        plan: &Plan,
        profile: &Profile,
        context: &RevisionContext,
    ) -> Result<Plan, GenerationError>;
}

/// Reviews progression quality and goal fit once the fast checks pass.
#[async_trait]
pub trait SemanticVerifier: Send + Sync {
    async fn semantic_verify(
        &self,
        profile: &Profile,
        plan: &Plan,
        avoid: &ExpandedAvoidance,
    ) -> Result<VerificationReport, GenerationError>;
}

/// Expands raw avoid terms into match phrases.
#[async_trait]
pub trait AvoidExpander: Send + Sync {
    async fn expand(&self, terms: &[String]) -> Result<ExpandedAvoidance, GenerationError>;
}

/// The full set of collaborators one engine drives.
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn PlanGenerator>,
    pub suggester: Arc<dyn SubstitutionSuggester>,
    pub reviser: Arc<dyn PlanReviser>,
    pub semantic: Arc<dyn SemanticVerifier>,
    pub expander: Arc<dyn AvoidExpander>,
}

impl Collaborators {
    /// Collaborators with the literal avoid-term expander.
    pub fn new(
        generator: Arc<dyn PlanGenerator>,
        suggester: Arc<dyn SubstitutionSuggester>,
        reviser: Arc<dyn PlanReviser>,
        semantic: Arc<dyn SemanticVerifier>,
    ) -> Self {
        Self {
            generator,
            suggester,
            reviser,
            semantic,
            expander: Arc::new(LiteralExpander),
        }
    }

    pub fn with_expander(mut self, expander: Arc<dyn AvoidExpander>) -> Self {
        self.expander = expander;
        self
    }
}
