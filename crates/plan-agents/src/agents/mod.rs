//! LLM-backed collaborators for the refinement loop.
//!
//! [`AgentFactory`] builds one chat client from an [`AgentsConfig`] and wires
//! every agent to it, producing the [`Collaborators`] an engine drives.

pub mod constraints;
pub mod programmer;
pub mod subber;
pub mod verifier;

use std::sync::Arc;

use anyhow::Result;
use refinement::{AvoidExpander, Collaborators, LiteralExpander, PatternTable};
use tracing::warn;

use crate::config::AgentsConfig;
use crate::llm::{ChatModel, OpenAiChat};
use constraints::{GuidelineExpander, GuidelineTable};
use programmer::Programmer;
use subber::Subber;
use verifier::PlanReviewer;

/// Builds every agent over one shared chat model.
pub struct AgentFactory {
    pub model: Arc<dyn ChatModel>,
    pub config: AgentsConfig,
    guidelines: Option<GuidelineTable>,
}

impl AgentFactory {
    /// Factory talking to the configured HTTP endpoint. A missing or broken
    /// guideline table degrades to literal avoid terms.
    pub fn new(config: &AgentsConfig) -> Result<Self> {
        let model = Arc::new(OpenAiChat::new(config.endpoint.clone())?);
        Ok(Self::with_model(config, model))
    }

    pub fn with_model(config: &AgentsConfig, model: Arc<dyn ChatModel>) -> Self {
        let guidelines = config
            .constraints_path
            .as_deref()
            .and_then(|path| match GuidelineTable::load(path) {
                Ok(table) => Some(table),
                Err(e) => {
                    warn!("Constraint guidelines unavailable, using literal avoid terms: {e:#}");
                    None
                }
            });
        Self {
            model,
            config: config.clone(),
            guidelines,
        }
    }

    pub fn build_expander(&self) -> Arc<dyn AvoidExpander> {
        match &self.guidelines {
            Some(table) => Arc::new(GuidelineExpander::new(table.clone())),
            None => Arc::new(LiteralExpander),
        }
    }

    pub fn build_subber(&self, patterns: PatternTable) -> Subber {
        let subber = Subber::new(
            self.model.clone(),
            self.build_expander(),
            patterns,
            self.config.substitution_top_k,
        );
        match &self.guidelines {
            Some(table) => subber.with_guidelines(table.clone()),
            None => subber,
        }
    }

    /// The full collaborator set. `patterns` should be the engine's pattern
    /// table so substitution candidates agree with the balance check.
    pub fn collaborators(&self, patterns: PatternTable) -> Collaborators {
        let programmer = Arc::new(Programmer::new(self.model.clone()));
        Collaborators::new(
            programmer.clone(),
            Arc::new(self.build_subber(patterns)),
            programmer,
            Arc::new(PlanReviewer::new(self.model.clone())),
        )
        .with_expander(self.build_expander())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedChat;
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_factory_loads_guidelines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"term_or_constraint": "knees", "clarify_options": ["lunge"]}}]"#
        )
        .unwrap();
        let config = AgentsConfig {
            constraints_path: Some(file.path().to_path_buf()),
            ..AgentsConfig::default()
        };
        let factory = AgentFactory::with_model(&config, Arc::new(ScriptedChat::new(vec![])));
        let avoid = factory
            .build_expander()
            .expand(&["knee".to_string()])
            .await
            .unwrap();
        assert!(avoid.matches("Reverse Lunge"));
    }

    #[tokio::test]
    async fn test_missing_guidelines_fall_back_to_literal() {
        let config = AgentsConfig {
            constraints_path: Some("/nonexistent/constraints.json".into()),
            ..AgentsConfig::default()
        };
        let factory = AgentFactory::with_model(&config, Arc::new(ScriptedChat::new(vec![])));
        let avoid = factory
            .build_expander()
            .expand(&["knee".to_string()])
            .await
            .unwrap();
        assert!(avoid.matches("Knee Extension"));
        assert!(!avoid.matches("Reverse Lunge"));
    }
}
