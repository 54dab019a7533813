//! Halt and retry decisions, driven by validation outcomes.

use super::types::{PipelineStep, StepResult};
use crate::config::ValidationConfig;
use crate::validation::ValidationResult;

/// Whether a failed step stops the pipeline: critical steps always halt; otherwise a score
/// below `min_validation_score` or more than `halt_max_errors` errors halts.
pub fn should_halt_on_failure(
    step: PipelineStep,
    result: &StepResult,
    config: &ValidationConfig,
) -> bool {
    if step.is_critical() {
        return true;
    }
    let Some(validation) = &result.validation else {
        return false;
    };
    validation.score() < config.min_validation_score
        || validation.error_count() > config.halt_max_errors
}

/// Retry a validation failure only when it is close to passing: score within
/// `retry_score_ratio` of the threshold, or at most `retry_max_errors` errors.
pub fn should_retry_on_validation_failure(
    validation: &ValidationResult,
    config: &ValidationConfig,
) -> bool {
    validation.score() >= config.min_validation_score * config.retry_score_ratio
        || validation.error_count() <= config.retry_max_errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::payload::StepPayload;
    use crate::validation::ValidationIssue;
    use serde_json::json;

    fn validation(errors: usize, warnings: usize) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.extend((0..errors).map(|_| ValidationIssue::error("e")));
        result.extend((0..warnings).map(|_| ValidationIssue::warning("w")));
        result
    }

    fn failed(step: PipelineStep, validation: ValidationResult) -> StepResult {
        StepResult::validated(step, StepPayload::Raw(json!({})), validation, None)
    }

    #[test]
    fn critical_steps_always_halt() {
        let config = ValidationConfig::default();
        let result = failed(PipelineStep::RegisterMapping, validation(1, 0));
        assert!(should_halt_on_failure(PipelineStep::RegisterMapping, &result, &config));
        let result = StepResult::failed(PipelineStep::CodeGeneration, "timeout", 3);
        assert!(should_halt_on_failure(PipelineStep::CodeGeneration, &result, &config));
    }

    #[test]
    fn non_critical_halts_on_low_score_or_many_errors() {
        let config = ValidationConfig::default();
        // 2 errors: score 80, keep going
        let mild = failed(PipelineStep::SectionSummary, validation(2, 0));
        assert!(!should_halt_on_failure(PipelineStep::SectionSummary, &mild, &config));
        // 4 errors: 60 < 70
        let bad = failed(PipelineStep::SectionSummary, validation(4, 0));
        assert!(should_halt_on_failure(PipelineStep::SectionSummary, &bad, &config));
        // exception without validation
        let errored = StepResult::failed(PipelineStep::TodoGeneration, "boom", 3);
        assert!(!should_halt_on_failure(PipelineStep::TodoGeneration, &errored, &config));
    }

    #[test]
    fn error_count_threshold_applies_independently_of_score() {
        let config = ValidationConfig {
            min_validation_score: 0.0,
            ..ValidationConfig::default()
        };
        let result = failed(PipelineStep::DataExtraction, validation(4, 0));
        assert!(should_halt_on_failure(PipelineStep::DataExtraction, &result, &config));
        let result = failed(PipelineStep::DataExtraction, validation(3, 0));
        assert!(!should_halt_on_failure(PipelineStep::DataExtraction, &result, &config));
    }

    #[test]
    fn retry_eligibility() {
        let config = ValidationConfig::default();
        // score 66 >= 70 * 0.8
        let near = validation(3, 2);
        assert_eq!(near.score(), 66.0);
        assert!(should_retry_on_validation_failure(&near, &config));
        // score 30 with 4 errors: neither close nor minor
        let far = validation(4, 15);
        assert_eq!(far.score(), 30.0);
        assert!(!should_retry_on_validation_failure(&far, &config));
        // low score but only two errors
        let few = validation(2, 30);
        assert!(few.score() < 56.0);
        assert!(should_retry_on_validation_failure(&few, &config));
    }
}
