//! Scoring and consistency checks for step outputs.
//!
//! `ValidationEngine` owns one validator per step, an optional schema registry, a cache of the
//! raw output seen for each step (used by cross-step validation) and the validation history
//! that feeds reports. Validation never fails: every problem is reported as a
//! [`ValidationIssue`].

pub mod cross;
pub mod issue;
pub mod registers;
pub mod report;
pub mod schema;
pub mod steps;

pub use issue::{Severity, ValidationIssue, ValidationResult, score_for};
pub use registers::{RegisterInfo, RegisterMappingValidator};
pub use report::{ReportFormat, ValidationRecord, ValidationReport};
pub use schema::SchemaRegistry;
pub use steps::{
    ArchitectureValidator, CodeGenerationValidator, DataExtractionValidator,
    SectionSummaryValidator, StepValidator, TodoListValidator,
};

use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::config::ValidationConfig;
use crate::pipeline::PipelineStep;

const FINAL_OUTPUT_TRY_THRESHOLD: usize = 1000;

pub struct ValidationEngine {
    config: ValidationConfig,
    validators: BTreeMap<PipelineStep, Box<dyn StepValidator>>,
    code_validator: CodeGenerationValidator,
    schemas: SchemaRegistry,
    cache: BTreeMap<PipelineStep, Value>,
    history: Vec<ValidationRecord>,
}

impl ValidationEngine {
    /// Loads schemas from `config.schema_directory` when set.
    pub fn new(config: ValidationConfig) -> Self {
        let schemas = config
            .schema_directory
            .as_deref()
            .map(SchemaRegistry::load_dir)
            .unwrap_or_default();
        Self::with_schemas(config, schemas)
    }

    pub fn with_schemas(config: ValidationConfig, schemas: SchemaRegistry) -> Self {
        let mut validators: BTreeMap<PipelineStep, Box<dyn StepValidator>> = BTreeMap::new();
        validators.insert(PipelineStep::SectionSummary, Box::new(SectionSummaryValidator));
        validators.insert(PipelineStep::DataExtraction, Box::new(DataExtractionValidator));
        validators.insert(PipelineStep::RegisterMapping, Box::new(RegisterMappingValidator));
        validators.insert(PipelineStep::ArchitecturePlanning, Box::new(ArchitectureValidator));
        validators.insert(PipelineStep::TodoGeneration, Box::new(TodoListValidator));
        validators.insert(PipelineStep::CodeGeneration, Box::new(CodeGenerationValidator));
        Self {
            config,
            validators,
            code_validator: CodeGenerationValidator,
            schemas,
            cache: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate by step name (step tag or validator alias). Unknown names yield an invalid
    /// result with a single Error and leave cache and history untouched.
    pub fn validate_step(&mut self, step_name: &str, data: &Value) -> ValidationResult {
        match PipelineStep::from_name(step_name) {
            Some(step) => self.validate(step, data),
            None => {
                log::error!("Unknown step: {step_name}");
                ValidationResult::failure(format!("Unknown validation step: {step_name}"))
            }
        }
    }

    pub fn validate(&mut self, step: PipelineStep, data: &Value) -> ValidationResult {
        self.cache.insert(step, data.clone());

        let mut result = ValidationResult::new();
        self.schemas.check(step, data, &mut result);
        if let Some(validator) = self.validators.get(&step) {
            validator.validate_custom(data, &mut result);
        }
        result
            .metadata
            .insert("step".into(), Value::from(step.validator_name()));

        log::info!(
            "Validated {}: valid={}, score={:.1}",
            step.validator_name(),
            result.is_valid(),
            result.score()
        );
        self.history.push(ValidationRecord {
            step: Some(step),
            result: result.clone(),
        });
        result
    }

    /// Merge `outputs` into the step cache, then run the cross-step consistency checks.
    pub fn cross_validate(&mut self, outputs: &BTreeMap<PipelineStep, Value>) -> ValidationResult {
        for (step, data) in outputs {
            self.cache.insert(*step, data.clone());
        }

        let mut result = ValidationResult::new();
        result
            .metadata
            .insert("validation_type".into(), Value::from("cross_step"));
        cross::check_all(&self.cache, &mut result);

        self.history.push(ValidationRecord {
            step: None,
            result: result.clone(),
        });
        result
    }

    pub fn cached(&self, step: PipelineStep) -> Option<&Value> {
        self.cache.get(&step)
    }

    pub fn history(&self) -> &[ValidationRecord] {
        &self.history
    }

    /// True when any Error is present or the score is below `halt_min_score`.
    pub fn should_halt_pipeline(&self, result: &ValidationResult) -> bool {
        let errors = result.error_count();
        if errors > 0 {
            log::error!("Pipeline halt recommended: {errors} critical errors found");
            return true;
        }
        if result.score() < self.config.halt_min_score {
            log::error!(
                "Pipeline halt recommended: score {:.1} below threshold",
                result.score()
            );
            return true;
        }
        false
    }

    /// Run the code checks over a generated file on disk, plus completeness checks.
    pub fn validate_final_output(&self, path: &Path) -> ValidationResult {
        let mut result = ValidationResult::new();
        result
            .metadata
            .insert("validation_type".into(), Value::from("final_output"));

        if !path.exists() {
            result.add_issue(ValidationIssue::error(format!(
                "Output file not found: {}",
                path.display()
            )));
            return result;
        }
        let code = match fs::read_to_string(path) {
            Ok(code) => code,
            Err(e) => {
                result.add_issue(ValidationIssue::error(format!(
                    "Error reading output file: {e}"
                )));
                return result;
            }
        };

        self.code_validator.check_code(&code, &mut result);

        if code.contains("throw new NotImplementedException") {
            result.add_issue(
                ValidationIssue::error("Code contains NotImplementedException")
                    .suggest("Implement all methods completely"),
            );
        }
        if !code.contains("try") && code.len() > FINAL_OUTPUT_TRY_THRESHOLD {
            result.add_issue(
                ValidationIssue::warning("No error handling found in code")
                    .suggest("Add try-catch blocks for error handling"),
            );
        }
        if !code.contains("this.Log") && !code.contains("Logger") {
            result.add_issue(
                ValidationIssue::info("No logging found in code")
                    .suggest("Consider adding logging for debugging"),
            );
        }
        result
    }

    pub fn validation_report(&self) -> ValidationReport {
        ValidationReport::from_history(&self.history)
    }

    pub fn export_report(&self, path: &Path, format: ReportFormat) -> std::io::Result<()> {
        self.validation_report().export(path, format)
    }
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::with_schemas(ValidationConfig::default(), SchemaRegistry::default())
    }
}
