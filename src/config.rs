use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "periphgen.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub validation: ValidationConfig,
    pub provider: ProviderSettings,
}

impl AppConfig {
    /// Load `periphgen.yaml` from the working directory, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_at(Path::new(DEFAULT_CONFIG_PATH))
    }

    pub fn load_at(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let config = if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("parsing config {}", path.display()))?
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("parsing config {}", path.display()))?
        };
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    pub human_intervention: bool,
    pub state_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub register_mapping: RegisterMappingConfig,
    pub code_generation: CodeGenerationConfig,
    pub documentation_limits: DocumentationLimits,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            human_intervention: false,
            state_dir: PathBuf::from("pipeline_states"),
            log_dir: None,
            register_mapping: RegisterMappingConfig::default(),
            code_generation: CodeGenerationConfig::default(),
            documentation_limits: DocumentationLimits::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Seconds allowed for a single generation call.
    pub default: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { default: 120 }
    }
}

impl TimeoutConfig {
    pub fn generation(&self) -> Duration {
        Duration::from_secs(self.default)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_multiplier: f64,
    /// Seconds before the second attempt.
    pub initial_delay: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_multiplier: 2.0,
            initial_delay: 5.0,
        }
    }
}

impl RetryConfig {
    /// `initial_delay * backoff_multiplier^attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let secs = self.initial_delay * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(secs.max(0.0))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterMappingConfig {
    pub max_passes: u32,
    pub early_stop_score: f64,
    pub intervention_score: f64,
}

impl Default for RegisterMappingConfig {
    fn default() -> Self {
        Self {
            max_passes: 3,
            early_stop_score: 95.0,
            intervention_score: 70.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeGenerationConfig {
    pub max_method_sections: usize,
}

impl Default for CodeGenerationConfig {
    fn default() -> Self {
        Self {
            max_method_sections: 5,
        }
    }
}

/// Characters of documentation embedded into each prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentationLimits {
    pub summary: usize,
    pub extraction: usize,
    pub register_mapping: usize,
}

impl Default for DocumentationLimits {
    fn default() -> Self {
        Self {
            summary: 8000,
            extraction: 6000,
            register_mapping: 10000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_validation_score: f64,
    pub halt_min_score: f64,
    pub schema_directory: Option<PathBuf>,
    pub retry_score_ratio: f64,
    pub retry_max_errors: usize,
    pub halt_max_errors: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_validation_score: 70.0,
            halt_min_score: 60.0,
            schema_directory: None,
            retry_score_ratio: 0.8,
            retry_max_errors: 2,
            halt_max_errors: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// `openai` or `local`; auto-detected when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    pub cost_per_1k_tokens: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg = AppConfig::load_at(&tmp.path().join("periphgen.yaml")).unwrap();
        assert_eq!(cfg.pipeline.retry.max_attempts, 3);
        assert_eq!(cfg.validation.min_validation_score, 70.0);
        assert_eq!(cfg.pipeline.state_dir, PathBuf::from("pipeline_states"));
    }

    #[test]
    fn yaml_overrides_merge_with_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("periphgen.yaml");
        std::fs::write(
            &path,
            "pipeline:\n  retry:\n    max_attempts: 5\n  human_intervention: true\nvalidation:\n  min_validation_score: 80\n",
        )
        .unwrap();
        let cfg = AppConfig::load_at(&path).unwrap();
        assert_eq!(cfg.pipeline.retry.max_attempts, 5);
        assert_eq!(cfg.pipeline.retry.initial_delay, 5.0);
        assert!(cfg.pipeline.human_intervention);
        assert_eq!(cfg.validation.min_validation_score, 80.0);
        assert_eq!(cfg.validation.retry_max_errors, 2);
    }

    #[test]
    fn json_config_is_supported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{ "provider": { "name": "local", "model": "llama3" } }"#).unwrap();
        let cfg = AppConfig::load_at(&path).unwrap();
        assert_eq!(cfg.provider.name.as_deref(), Some("local"));
        assert_eq!(cfg.provider.model.as_deref(), Some("llama3"));
    }

    #[test]
    fn backoff_delays_grow_geometrically() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for(0), Duration::from_secs(5));
        assert_eq!(retry.delay_for(1), Duration::from_secs(10));
        assert_eq!(retry.delay_for(2), Duration::from_secs(20));
    }
}
