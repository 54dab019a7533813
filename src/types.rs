use chrono::Local;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn gpt_4o() -> Self {
        Self::new("gpt-4o")
    }

    pub fn multi_model() -> Self {
        Self::new("multi-model")
    }

    /// Output token ceiling for a model, leaving headroom under its context window.
    pub fn max_tokens(&self) -> u32 {
        let model = self.0.to_lowercase();
        match model.as_str() {
            m if m.contains("gpt-4o") => 16384,
            m if m.contains("gpt-4-turbo") => 4096,
            m if m.contains("gpt-4") => 4096,
            m if m.contains("gpt-5") => 32768,
            m if m.contains("llama") || m.contains("qwen") => 8192,
            _ => 4096,
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(String);

impl PipelineId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// `pipeline_<YYYYmmdd_HHMMSS>_<6 hex>`
    pub fn generate() -> Self {
        let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
        Self(format!(
            "pipeline_{}_{suffix:06x}",
            Local::now().format("%Y%m%d_%H%M%S")
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_pipeline_ids_have_prefix_and_suffix() {
        let id = PipelineId::generate();
        let parts: Vec<&str> = id.as_str().split('_').collect();
        assert_eq!(parts[0], "pipeline");
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[3].len(), 6);
    }

    #[test]
    fn pipeline_id_serializes_transparently() {
        let id = PipelineId::new("pipeline_x");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"pipeline_x\"");
    }

    #[test]
    fn model_max_tokens_has_fallback() {
        assert_eq!(ModelId::new("unknown-model").max_tokens(), 4096);
        assert_eq!(ModelId::gpt_4o().max_tokens(), 16384);
    }
}
