use serde_json::{Value, json};

use super::{
    DEFAULT_HTTP_TIMEOUT_SECS, Generation, GenerationRequest, LLMProvider, ResponseFormat,
    http_client,
};
use crate::config::ProviderSettings;
use crate::errors::ProviderError;
use crate::types::ModelId;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAIProvider {
    client: reqwest::Client,
    key: String,
    model: ModelId,
    base_url: String,
    cost_per_1k_tokens: f64,
}

impl OpenAIProvider {
    pub fn new(
        key: String,
        model: Option<ModelId>,
        settings: &ProviderSettings,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(DEFAULT_HTTP_TIMEOUT_SECS)?,
            key,
            model: model.unwrap_or_else(ModelId::gpt_4o),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            cost_per_1k_tokens: settings.cost_per_1k_tokens,
        })
    }

    fn request_body(&self, req: &GenerationRequest) -> Value {
        let constraints = &req.constraints;
        let mut body = json!({
            "model": self.model.as_str(),
            "messages": [{"role": "user", "content": req.prompt}],
            "temperature": constraints.temperature,
            "max_tokens": constraints.max_tokens.min(self.model.max_tokens()),
        });
        if constraints.response_format == ResponseFormat::Json {
            body["response_format"] = match &constraints.json_schema {
                Some(schema) => json!({
                    "type": "json_schema",
                    "json_schema": {"name": "step_output", "schema": schema},
                }),
                None => json!({"type": "json_object"}),
            };
        }
        body
    }

    fn parse_response(&self, response_json: &Value) -> Result<Generation, ProviderError> {
        let content = response_json
            .get("choices")
            .and_then(|arr| arr.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                ProviderError::InvalidResponse("No message content in response".to_string())
            })?;

        let total_tokens = response_json
            .get("usage")
            .and_then(|u| u.get("total_tokens"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        Ok(Generation {
            content: content.to_string(),
            cost: total_tokens as f64 / 1000.0 * self.cost_per_1k_tokens,
            total_tokens,
            model_id: self.model.clone(),
        })
    }
}

#[async_trait::async_trait]
impl LLMProvider for OpenAIProvider {
    async fn generate(&self, req: &GenerationRequest) -> Result<Generation, ProviderError> {
        let res = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.key)
            .header("Content-Type", "application/json")
            .json(&self.request_body(req))
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await?;
            return Err(ProviderError::Api {
                provider: "openai",
                status,
                body,
            });
        }

        let response_json: Value = res.json().await?;
        self.parse_response(&response_json)
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &ModelId {
        &self.model
    }

    fn validate_config(&self) -> Result<(), ProviderError> {
        if self.key.is_empty() {
            return Err(ProviderError::MissingApiKey("openai".to_string()));
        }
        Ok(())
    }
}
