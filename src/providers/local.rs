use serde_json::{Value, json};
use std::time::Duration;

use super::{
    DEFAULT_HTTP_TIMEOUT_SECS, Generation, GenerationRequest, LLMProvider, ResponseFormat,
    http_client,
};
use crate::config::ProviderSettings;
use crate::errors::ProviderError;
use crate::types::ModelId;

const DEFAULT_HOST: &str = "http://localhost:11434";

fn resolve_host(configured: Option<&str>) -> String {
    std::env::var("OLLAMA_HOST")
        .ok()
        .or_else(|| configured.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_HOST.to_string())
}

/// Ollama `/api/chat`. Local generation is free.
pub struct LocalProvider {
    client: reqwest::Client,
    host: String,
    model: ModelId,
}

impl LocalProvider {
    pub fn new(model: Option<ModelId>, settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let model = model
            .or_else(|| std::env::var("OLLAMA_MODEL").ok().map(ModelId::new))
            .ok_or_else(|| {
                ProviderError::Config(
                    "No local model configured. Set MODEL or OLLAMA_MODEL, or provider.model in periphgen.yaml"
                        .to_string(),
                )
            })?;

        Ok(Self {
            client: http_client(DEFAULT_HTTP_TIMEOUT_SECS)?,
            host: resolve_host(settings.base_url.as_deref()),
            model,
        })
    }

    pub async fn is_available(configured_host: Option<&str>) -> bool {
        let host = resolve_host(configured_host);
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
        {
            Ok(c) => c,
            Err(_) => return false,
        };

        match client.get(format!("{host}/api/tags")).send().await {
            Ok(res) => res.status().is_success(),
            Err(_) => false,
        }
    }

    fn request_body(&self, req: &GenerationRequest) -> Value {
        let mut body = json!({
            "model": self.model.as_str(),
            "messages": [{"role": "user", "content": req.prompt}],
            "stream": false,
            "options": {
                "temperature": req.constraints.temperature,
                "num_predict": req.constraints.max_tokens,
            },
        });
        if req.constraints.response_format == ResponseFormat::Json {
            body["format"] = json!("json");
        }
        body
    }

    fn parse_response(&self, response_json: &Value) -> Result<Generation, ProviderError> {
        let content = response_json
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                ProviderError::InvalidResponse("No message content in response".to_string())
            })?;

        let count = |key: &str| response_json.get(key).and_then(|v| v.as_u64()).unwrap_or(0);

        Ok(Generation {
            content: content.to_string(),
            cost: 0.0,
            total_tokens: count("prompt_eval_count") + count("eval_count"),
            model_id: self.model.clone(),
        })
    }
}

#[async_trait::async_trait]
impl LLMProvider for LocalProvider {
    async fn generate(&self, req: &GenerationRequest) -> Result<Generation, ProviderError> {
        let res = self
            .client
            .post(format!("{}/api/chat", self.host))
            .header("Content-Type", "application/json")
            .json(&self.request_body(req))
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await?;
            return Err(ProviderError::Api {
                provider: "ollama",
                status,
                body,
            });
        }

        let response_json: Value = res.json().await?;
        self.parse_response(&response_json)
    }

    fn name(&self) -> &str {
        "local"
    }

    fn model(&self) -> &ModelId {
        &self.model
    }

    fn validate_config(&self) -> Result<(), ProviderError> {
        if self.host.is_empty() {
            return Err(ProviderError::Config("Ollama host is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Constraints;

    fn provider() -> LocalProvider {
        LocalProvider::new(Some(ModelId::new("qwen2.5-coder")), &ProviderSettings::default())
            .unwrap()
    }

    #[test]
    fn json_requests_set_format() {
        let req = GenerationRequest::new("summarise", Constraints::json(0.3, None));
        let body = provider().request_body(&req);
        assert_eq!(body["format"], "json");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 4096);
    }

    #[test]
    fn tokens_sum_prompt_and_eval_counts() {
        let response = json!({
            "message": {"role": "assistant", "content": "public class X {}"},
            "prompt_eval_count": 120,
            "eval_count": 30
        });
        let generation = provider().parse_response(&response).unwrap();
        assert_eq!(generation.total_tokens, 150);
        assert_eq!(generation.cost, 0.0);
        assert_eq!(generation.model_id.as_str(), "qwen2.5-coder");
    }
}
