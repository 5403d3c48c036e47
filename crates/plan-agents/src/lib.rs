//! LLM-backed collaborators for the plan refinement engine.
//!
//! The `refinement` crate owns the loop and the deterministic checks; this
//! crate supplies the generative parts behind its ports:
//!
//! - [`agents::programmer::Programmer`] authors and revises plans
//! - [`agents::subber::Subber`] suggests substitutions for avoided exercises
//! - [`agents::verifier::PlanReviewer`] reviews progression quality
//! - [`agents::constraints::GuidelineExpander`] expands loose avoid terms
//!
//! All of them talk to an OpenAI-compatible chat endpoint through
//! [`llm::ChatModel`].

pub mod agents;
pub mod config;
pub mod llm;
pub mod prompts;
pub mod telemetry;

pub use agents::AgentFactory;
pub use config::{check_endpoint, AgentsConfig, LlmEndpoint};
pub use llm::{extract_json, ChatModel, ChatRequest, LlmError, OpenAiChat};
pub use telemetry::{append_telemetry, RunRecord, TelemetryError, TelemetryReader};
