use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::issue::{ValidationIssue, ValidationResult};
use crate::errors::SchemaError;
use crate::pipeline::PipelineStep;

fn read_schema(path: &Path) -> Result<Value, SchemaError> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

/// Optional per-step JSON Schemas applied before the custom validators.
#[derive(Default)]
pub struct SchemaRegistry {
    validators: BTreeMap<PipelineStep, jsonschema::Validator>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `<dir>/<validator name>.json` for every step that has one. Unreadable or
    /// uncompilable schemas are logged and skipped.
    pub fn load_dir(dir: &Path) -> Self {
        let mut registry = Self::new();
        if !dir.is_dir() {
            log::debug!("schema directory {} not found", dir.display());
            return registry;
        }
        for step in PipelineStep::ALL {
            let path = dir.join(format!("{}.json", step.validator_name()));
            if !path.exists() {
                continue;
            }
            let loaded = read_schema(&path).and_then(|schema| registry.register(step, &schema));
            if let Err(e) = loaded {
                log::warn!("skipping schema {}: {e}", path.display());
            }
        }
        registry
    }

    pub fn register(&mut self, step: PipelineStep, schema: &Value) -> Result<(), SchemaError> {
        let validator =
            jsonschema::validator_for(schema).map_err(|e| SchemaError::Compile {
                step,
                message: e.to_string(),
            })?;
        self.validators.insert(step, validator);
        Ok(())
    }

    pub fn with_schema(mut self, step: PipelineStep, schema: &Value) -> Result<Self, SchemaError> {
        self.register(step, schema)?;
        Ok(self)
    }

    pub fn contains(&self, step: PipelineStep) -> bool {
        self.validators.contains_key(&step)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Each schema violation becomes an Error issue.
    pub fn check(&self, step: PipelineStep, data: &Value, result: &mut ValidationResult) {
        let Some(validator) = self.validators.get(&step) else {
            return;
        };
        let issues: Vec<ValidationIssue> = validator
            .iter_errors(data)
            .map(|error| {
                ValidationIssue::error(format!("Schema validation failed: {error}"))
                    .at(step.validator_name())
            })
            .collect();
        result.extend(issues);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn summary_schema() -> Value {
        json!({
            "type": "object",
            "properties": {"overview": {"type": "string"}},
            "required": ["overview"]
        })
    }

    #[test]
    fn schema_violations_become_errors() {
        let registry = SchemaRegistry::new()
            .with_schema(PipelineStep::SectionSummary, &summary_schema())
            .unwrap();
        let mut result = ValidationResult::new();
        registry.check(PipelineStep::SectionSummary, &json!({"overview": 3}), &mut result);
        assert!(!result.is_valid());
        assert!(result.issues()[0].message.starts_with("Schema validation failed"));
    }

    #[test]
    fn steps_without_schema_are_unchecked() {
        let registry = SchemaRegistry::new();
        let mut result = ValidationResult::new();
        registry.check(PipelineStep::SectionSummary, &json!(42), &mut result);
        assert!(result.is_valid());
    }

    #[test]
    fn uncompilable_schema_is_rejected_with_step() {
        let err = SchemaRegistry::new()
            .with_schema(PipelineStep::RegisterMapping, &json!({"type": 12}))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            SchemaError::Compile {
                step: PipelineStep::RegisterMapping,
                ..
            }
        ));
        assert!(err.to_string().contains("register_mapping"));
    }

    #[test]
    fn load_dir_picks_up_named_files_and_skips_broken_ones() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("section_summary.json"),
            serde_json::to_string(&summary_schema()).unwrap(),
        )
        .unwrap();
        std::fs::write(tmp.path().join("architecture.json"), "{ not json").unwrap();

        let registry = SchemaRegistry::load_dir(tmp.path());
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(PipelineStep::SectionSummary));
        assert!(!registry.contains(PipelineStep::ArchitecturePlanning));
    }
}
