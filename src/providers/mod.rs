use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::time::Duration;

pub mod local;
pub mod openai;

use crate::config::ProviderSettings;
use crate::errors::ProviderError;
use crate::types::ModelId;
use reqwest::Client;

pub(crate) const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;

pub(crate) fn http_client(timeout_secs: u64) -> Result<Client, ProviderError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// Sampling and output constraints for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraints {
    pub temperature: f32,
    pub max_tokens: u32,
    pub response_format: ResponseFormat,
    pub json_schema: Option<Value>,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 4096,
            response_format: ResponseFormat::Text,
            json_schema: None,
        }
    }
}

impl Constraints {
    pub fn text(temperature: f32) -> Self {
        Self {
            temperature,
            ..Self::default()
        }
    }

    pub fn json(temperature: f32, schema: Option<Value>) -> Self {
        Self {
            temperature,
            response_format: ResponseFormat::Json,
            json_schema: schema,
            ..Self::default()
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub constraints: Constraints,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, constraints: Constraints) -> Self {
        Self {
            prompt: prompt.into(),
            constraints,
        }
    }
}

/// Text produced by one generation call and what it cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub content: String,
    pub cost: f64,
    pub total_tokens: u64,
    pub model_id: ModelId,
}

/// Trait for LLM providers
#[async_trait::async_trait]
pub trait LLMProvider: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, ProviderError>;

    /// Get the name of this provider
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &ModelId;

    /// Validate that this provider is properly configured
    fn validate_config(&self) -> Result<(), ProviderError>;
}

/// `MODEL` env var first, then the configured model.
fn select_model(env_model: Option<String>, configured: Option<&str>) -> Option<ModelId> {
    env_model
        .filter(|m| !m.trim().is_empty())
        .or_else(|| configured.map(str::to_string))
        .map(ModelId::new)
}

/// Create a provider based on configuration priority:
/// 1. `PROVIDER` environment variable
/// 2. `provider.name` from the config file
/// 3. `OPENAI_API_KEY` present
/// 4. A reachable local Ollama
/// 5. Error if none found
pub async fn create_provider(
    settings: &ProviderSettings,
) -> Result<Box<dyn LLMProvider>, ProviderError> {
    // Load .env file if available
    let _ = dotenvy::dotenv();

    if let Ok(provider_name) = env::var("PROVIDER") {
        return create_provider_by_name(&provider_name, settings);
    }

    if let Some(provider_name) = &settings.name {
        return create_provider_by_name(provider_name, settings);
    }

    if env::var("OPENAI_API_KEY").is_ok() {
        return create_provider_by_name("openai", settings);
    }

    if local::LocalProvider::is_available(settings.base_url.as_deref()).await {
        return create_provider_by_name("local", settings);
    }

    Err(ProviderError::NoProviderConfigured)
}

fn create_provider_by_name(
    name: &str,
    settings: &ProviderSettings,
) -> Result<Box<dyn LLMProvider>, ProviderError> {
    let model = select_model(env::var("MODEL").ok(), settings.model.as_deref());
    let provider: Box<dyn LLMProvider> = match name.to_lowercase().as_str() {
        "openai" => {
            let key = env::var("OPENAI_API_KEY")
                .map_err(|_| ProviderError::MissingApiKey("openai".to_string()))?;
            Box::new(openai::OpenAIProvider::new(key, model, settings)?)
        }
        "local" | "ollama" => Box::new(local::LocalProvider::new(model, settings)?),
        other => return Err(ProviderError::Config(format!("Unknown provider: {other}"))),
    };
    provider.validate_config()?;
    log::info!(
        "Using provider {} with model {}",
        provider.name(),
        provider.model()
    );
    Ok(provider)
}
