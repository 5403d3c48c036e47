use std::path::PathBuf;
use std::time::Duration;

/// OpenAI-compatible chat endpoint the agents talk to.
#[derive(Debug, Clone)]
pub struct LlmEndpoint {
    /// Base URL including the version prefix, e.g. `http://localhost:8080/v1`
    pub url: String,
    pub model: String,
    /// Sent as a bearer token when present
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub temperature: f32,
}

/// Top-level agents configuration.
#[derive(Debug, Clone)]
pub struct AgentsConfig {
    pub endpoint: LlmEndpoint,
    /// Constraint guideline table; `None` means literal avoid terms only.
    pub constraints_path: Option<PathBuf>,
    /// Candidates requested from the substitution agent per exercise.
    pub substitution_top_k: usize,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            endpoint: LlmEndpoint {
                url: std::env::var("PLAN_LLM_URL")
                    .unwrap_or_else(|_| "http://localhost:8080/v1".into()),
                model: std::env::var("PLAN_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
                api_key: std::env::var("PLAN_LLM_API_KEY")
                    .ok()
                    .filter(|k| !k.trim().is_empty()),
                timeout: Duration::from_secs(
                    std::env::var("PLAN_LLM_TIMEOUT_SECS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(120),
                ),
                temperature: 0.2,
            },
            constraints_path: std::env::var("PLAN_CONSTRAINTS_PATH").ok().map(PathBuf::from),
            substitution_top_k: 15,
        }
    }
}

/// Check if an inference endpoint is reachable (GET /models).
pub async fn check_endpoint(url: &str) -> bool {
    let models_url = format!("{}/models", url.trim_end_matches('/'));
    match reqwest::Client::new()
        .get(&models_url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}
