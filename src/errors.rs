use thiserror::Error;

use crate::pipeline::PipelineStep;
use crate::types::PipelineId;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} API error {status}: {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("Missing API key for provider: {0}")]
    MissingApiKey(String),

    #[error("Provider configuration error: {0}")]
    Config(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Generation timed out after {0}s")]
    Timeout(u64),

    #[error("No provider configured. Set OPENAI_API_KEY, PROVIDER, or run a local Ollama")]
    NoProviderConfigured,
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Pipeline state not found: {0}")]
    NotFound(PipelineId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid schema for {step}: {message}")]
    Compile { step: PipelineStep, message: String },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("resume_from requires a pipeline id")]
    ResumeRequiresId,

    #[error("Step {step} requires a result from {requires}")]
    MissingPrerequisite {
        step: PipelineStep,
        requires: PipelineStep,
    },

    #[error("No usable candidate produced for {0}")]
    NoCandidate(PipelineStep),

    #[error("No pipeline state available; run the pipeline first")]
    NoState,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
