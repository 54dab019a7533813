use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::payload::StepPayload;
use crate::providers::Generation;
use crate::types::{ModelId, PipelineId};
use crate::validation::ValidationResult;

/// The six generation stages, in their fixed execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    SectionSummary,
    DataExtraction,
    RegisterMapping,
    ArchitecturePlanning,
    TodoGeneration,
    CodeGeneration,
}

impl PipelineStep {
    pub const ALL: [PipelineStep; 6] = [
        PipelineStep::SectionSummary,
        PipelineStep::DataExtraction,
        PipelineStep::RegisterMapping,
        PipelineStep::ArchitecturePlanning,
        PipelineStep::TodoGeneration,
        PipelineStep::CodeGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::SectionSummary => "section_summary",
            PipelineStep::DataExtraction => "data_extraction",
            PipelineStep::RegisterMapping => "register_mapping",
            PipelineStep::ArchitecturePlanning => "architecture_planning",
            PipelineStep::TodoGeneration => "todo_generation",
            PipelineStep::CodeGeneration => "code_generation",
        }
    }

    /// Name of the validator (and schema file) for this step.
    pub fn validator_name(&self) -> &'static str {
        match self {
            PipelineStep::ArchitecturePlanning => "architecture",
            PipelineStep::TodoGeneration => "todo_list",
            other => other.as_str(),
        }
    }

    /// Accepts step tags and validator names.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == name || step.validator_name() == name)
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Steps whose failure always halts the pipeline.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            PipelineStep::RegisterMapping | PipelineStep::CodeGeneration
        )
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unknown pipeline step: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
    Halted,
    Resumed,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::NotStarted => "not_started",
            PipelineStatus::InProgress => "in_progress",
            PipelineStatus::Completed => "completed",
            PipelineStatus::Failed => "failed",
            PipelineStatus::Halted => "halted",
            PipelineStatus::Resumed => "resumed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Completed | PipelineStatus::Failed | PipelineStatus::Halted
        )
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cost accounting for the generation calls behind one step result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMeta {
    pub model_id: ModelId,
    pub cost: f64,
    pub total_tokens: u64,
}

impl GenerationMeta {
    pub fn absorb(&mut self, other: &GenerationMeta) {
        self.cost += other.cost;
        self.total_tokens += other.total_tokens;
    }
}

impl From<&Generation> for GenerationMeta {
    fn from(generation: &Generation) -> Self {
        Self {
            model_id: generation.model_id.clone(),
            cost: generation.cost,
            total_tokens: generation.total_tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step: PipelineStep,
    pub status: PipelineStatus,
    pub data: Option<StepPayload>,
    pub validation: Option<ValidationResult>,
    pub generation: Option<GenerationMeta>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl StepResult {
    /// Completed when validation passed, Failed otherwise.
    pub fn validated(
        step: PipelineStep,
        data: StepPayload,
        validation: ValidationResult,
        generation: Option<GenerationMeta>,
    ) -> Self {
        let status = if validation.is_valid() {
            PipelineStatus::Completed
        } else {
            PipelineStatus::Failed
        };
        Self {
            step,
            status,
            data: Some(data),
            validation: Some(validation),
            generation,
            error: None,
            retry_count: 0,
            timestamp: Utc::now(),
            metadata: Map::new(),
        }
    }

    pub fn failed(step: PipelineStep, error: impl Into<String>, retry_count: u32) -> Self {
        Self {
            step,
            status: PipelineStatus::Failed,
            data: None,
            validation: None,
            generation: None,
            error: Some(error.into()),
            retry_count,
            timestamp: Utc::now(),
            metadata: Map::new(),
        }
    }

    pub fn score(&self) -> Option<f64> {
        self.validation.as_ref().map(ValidationResult::score)
    }

    pub fn is_failed(&self) -> bool {
        self.status == PipelineStatus::Failed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub pipeline_id: PipelineId,
    pub subject: String,
    pub current_step: Option<PipelineStep>,
    pub status: PipelineStatus,
    pub step_results: BTreeMap<PipelineStep, StepResult>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_cost: f64,
    pub total_tokens: u64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl PipelineState {
    pub fn new(pipeline_id: PipelineId, subject: impl Into<String>) -> Self {
        Self {
            pipeline_id,
            subject: subject.into(),
            current_step: None,
            status: PipelineStatus::NotStarted,
            step_results: BTreeMap::new(),
            start_time: Some(Utc::now()),
            end_time: None,
            total_cost: 0.0,
            total_tokens: 0,
            metadata: Map::new(),
        }
    }

    /// Store a step's final result and add its generation cost to the running totals.
    pub fn record(&mut self, result: StepResult) {
        if let Some(generation) = &result.generation {
            self.total_cost += generation.cost;
            self.total_tokens += generation.total_tokens;
        }
        self.step_results.insert(result.step, result);
    }

    pub fn result(&self, step: PipelineStep) -> Option<&StepResult> {
        self.step_results.get(&step)
    }

    pub fn payload(&self, step: PipelineStep) -> Option<&StepPayload> {
        self.result(step).and_then(|r| r.data.as_ref())
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        let start = self.start_time?;
        let end = self.end_time.unwrap_or_else(Utc::now);
        Some((end - start).num_milliseconds() as f64 / 1000.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepMetrics {
    pub status: PipelineStatus,
    pub validation_score: Option<f64>,
    pub retry_count: u32,
    pub execution_time: f64,
    pub model: Option<ModelId>,
    pub tokens: Option<u64>,
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub pipeline_id: PipelineId,
    pub subject: String,
    pub status: PipelineStatus,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub steps_completed: usize,
    pub steps_total: usize,
    pub step_metrics: BTreeMap<PipelineStep, StepMetrics>,
    pub duration_seconds: Option<f64>,
}

impl From<&PipelineState> for PipelineMetrics {
    fn from(state: &PipelineState) -> Self {
        let step_metrics = state
            .step_results
            .iter()
            .map(|(step, result)| {
                let metrics = StepMetrics {
                    status: result.status,
                    validation_score: result.score(),
                    retry_count: result.retry_count,
                    execution_time: result
                        .metadata
                        .get("execution_time")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0),
                    model: result.generation.as_ref().map(|g| g.model_id.clone()),
                    tokens: result.generation.as_ref().map(|g| g.total_tokens),
                    cost: result.generation.as_ref().map(|g| g.cost),
                };
                (*step, metrics)
            })
            .collect();

        Self {
            pipeline_id: state.pipeline_id.clone(),
            subject: state.subject.clone(),
            status: state.status,
            total_cost: state.total_cost,
            total_tokens: state.total_tokens,
            steps_completed: state.step_results.len(),
            steps_total: PipelineStep::ALL.len(),
            step_metrics,
            duration_seconds: state.duration_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_ordered() {
        for (idx, step) in PipelineStep::ALL.iter().enumerate() {
            assert_eq!(step.index(), idx);
        }
        assert!(PipelineStep::SectionSummary < PipelineStep::CodeGeneration);
    }

    #[test]
    fn step_names_accept_validator_aliases() {
        assert_eq!(
            PipelineStep::from_name("architecture"),
            Some(PipelineStep::ArchitecturePlanning)
        );
        assert_eq!(
            PipelineStep::from_name("todo_list"),
            Some(PipelineStep::TodoGeneration)
        );
        assert_eq!(
            "Register_Mapping".parse::<PipelineStep>(),
            Ok(PipelineStep::RegisterMapping)
        );
        assert!("bogus".parse::<PipelineStep>().is_err());
    }

    #[test]
    fn only_register_mapping_and_code_generation_are_critical() {
        let critical: Vec<_> = PipelineStep::ALL
            .into_iter()
            .filter(PipelineStep::is_critical)
            .collect();
        assert_eq!(
            critical,
            vec![PipelineStep::RegisterMapping, PipelineStep::CodeGeneration]
        );
    }

    #[test]
    fn record_accumulates_cost_and_tokens() {
        let mut state = PipelineState::new(PipelineId::new("p"), "Timer32");
        let mut result = StepResult::failed(PipelineStep::SectionSummary, "boom", 3);
        result.generation = Some(GenerationMeta {
            model_id: ModelId::new("m"),
            cost: 0.5,
            total_tokens: 100,
        });
        state.record(result.clone());
        result.step = PipelineStep::DataExtraction;
        state.record(result);
        assert_eq!(state.total_cost, 1.0);
        assert_eq!(state.total_tokens, 200);
        assert_eq!(state.step_results.len(), 2);
    }

    #[test]
    fn status_terminality() {
        assert!(PipelineStatus::Halted.is_terminal());
        assert!(!PipelineStatus::Resumed.is_terminal());
        assert_eq!(
            serde_json::to_string(&PipelineStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
    }

    #[test]
    fn metrics_summarise_state() {
        let mut state = PipelineState::new(PipelineId::new("p"), "Timer32");
        let mut result = StepResult::failed(PipelineStep::SectionSummary, "boom", 2);
        result
            .metadata
            .insert("execution_time".into(), Value::from(1.5));
        state.record(result);
        let metrics = PipelineMetrics::from(&state);
        assert_eq!(metrics.steps_completed, 1);
        assert_eq!(metrics.steps_total, 6);
        let step = &metrics.step_metrics[&PipelineStep::SectionSummary];
        assert_eq!(step.execution_time, 1.5);
        assert_eq!(step.retry_count, 2);
        assert!(step.validation_score.is_none());
    }
}
