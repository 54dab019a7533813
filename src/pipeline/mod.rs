//! The six-step generation pipeline.
//!
//! [`Pipeline::run`] walks the steps in order. Each step builds a prompt from earlier outputs,
//! calls the provider, and validates the response. Failed attempts are retried with backoff.
//! State is persisted after every step and the loop halts when the policy in [`policy`] says
//! so. Register mapping keeps the best of several independently generated candidates.

pub mod logging;
pub mod payload;
pub mod policy;
pub mod prompts;
pub mod schemas;
pub mod store;
pub mod types;

pub use logging::PipelineLogger;
pub use payload::StepPayload;
pub use store::{FileStateStore, MemoryStateStore, StateStore};
pub use types::{
    GenerationMeta, PipelineMetrics, PipelineState, PipelineStatus, PipelineStep, StepMetrics,
    StepResult,
};

use chrono::{Local, Utc};
use regex::Regex;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Instant;

use crate::config::{AppConfig, PipelineConfig, ValidationConfig};
use crate::errors::{PipelineError, ProviderError};
use crate::providers::{Constraints, Generation, GenerationRequest, LLMProvider};
use crate::types::{ModelId, PipelineId};
use crate::validation::{ReportFormat, ValidationEngine, ValidationResult};

const PARSE_FAILURE: &str = "Failed to parse JSON response";
const SECTION_MAX_TOKENS: u32 = 8192;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_+#-]*\s*\n(.*?)\n?```\s*$").expect("static regex")
});

/// Parse model output as JSON, tolerating a surrounding markdown fence.
fn parse_json(content: &str) -> Option<Value> {
    serde_json::from_str(content.trim())
        .ok()
        .or_else(|| serde_json::from_str(&strip_code_fence(content)).ok())
}

fn strip_code_fence(content: &str) -> String {
    match CODE_FENCE.captures(content) {
        Some(caps) => caps[1].to_string(),
        None => content.trim().to_string(),
    }
}

fn parse_failure() -> Value {
    json!({ "error": PARSE_FAILURE })
}

fn spend(total: &mut Option<GenerationMeta>, generation: &Generation) {
    let meta = GenerationMeta::from(generation);
    match total {
        Some(total) => {
            total.absorb(&meta);
            total.model_id = meta.model_id;
        }
        None => *total = Some(meta),
    }
}

/// Output of earlier steps a step depends on. A recorded step without data (it failed
/// outright) reads as an empty record.
fn prerequisite(
    state: &PipelineState,
    step: PipelineStep,
    requires: PipelineStep,
) -> Result<StepPayload, PipelineError> {
    match state.result(requires) {
        Some(result) => Ok(result
            .data
            .clone()
            .unwrap_or_else(|| StepPayload::Raw(Value::Object(Map::new())))),
        None => Err(PipelineError::MissingPrerequisite { step, requires }),
    }
}

struct Candidate {
    data: Value,
    validation: ValidationResult,
}

pub struct Pipeline {
    config: PipelineConfig,
    validation_config: ValidationConfig,
    provider: Box<dyn LLMProvider>,
    engine: ValidationEngine,
    store: Box<dyn StateStore>,
    logger: Option<PipelineLogger>,
    state: Option<PipelineState>,
}

impl Pipeline {
    pub fn new(config: &AppConfig, provider: Box<dyn LLMProvider>) -> Self {
        let logger = config
            .pipeline
            .log_dir
            .clone()
            .and_then(|dir| match PipelineLogger::new(dir) {
                Ok(logger) => Some(logger),
                Err(e) => {
                    log::warn!("event log disabled: {e}");
                    None
                }
            });
        Self {
            config: config.pipeline.clone(),
            validation_config: config.validation.clone(),
            provider,
            engine: ValidationEngine::new(config.validation.clone()),
            store: Box::new(FileStateStore::new(config.pipeline.state_dir.clone())),
            logger,
            state: None,
        }
    }

    pub fn with_store(mut self, store: Box<dyn StateStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_engine(mut self, engine: ValidationEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_logger(mut self, logger: PipelineLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn state(&self) -> Option<&PipelineState> {
        self.state.as_ref()
    }

    pub fn engine(&self) -> &ValidationEngine {
        &self.engine
    }

    pub fn store(&self) -> &dyn StateStore {
        self.store.as_ref()
    }

    /// Run the pipeline for `subject`.
    ///
    /// With `resume_from` the state stored under `pipeline_id` is reloaded and execution
    /// restarts at that step; an unrecognised step name restarts from the beginning.
    /// Operational failures inside the loop end the run with status Failed rather than an
    /// `Err`; only resume problems are returned as errors.
    pub async fn run(
        &mut self,
        subject: &str,
        documentation: &str,
        resume_from: Option<&str>,
        pipeline_id: Option<PipelineId>,
    ) -> Result<PipelineState, PipelineError> {
        log::info!("Starting pipeline for {subject}");

        let mut state = match (resume_from, pipeline_id) {
            (Some(_), None) => return Err(PipelineError::ResumeRequiresId),
            (Some(_), Some(id)) => {
                let mut state = self.store.load(&id)?;
                state.status = PipelineStatus::Resumed;
                state.end_time = None;
                state
            }
            (None, id) => PipelineState::new(id.unwrap_or_else(PipelineId::generate), subject),
        };
        if let Some(logger) = self.logger.as_mut() {
            logger.set_run_id(state.pipeline_id.as_str());
        }
        self.event("pipeline_start", json!({"subject": subject, "status": state.status}));

        if documentation.trim().is_empty() {
            log::error!("Documentation is empty");
            state.status = PipelineStatus::Failed;
            state
                .metadata
                .insert("error".into(), json!("Documentation is empty"));
            return Ok(self.finish(state));
        }

        let start_index = resume_from.map_or(0, |name| match PipelineStep::from_name(name) {
            Some(step) => step.index(),
            None => {
                log::error!("Invalid resume step: {name}");
                0
            }
        });

        state.status = PipelineStatus::InProgress;
        if let Err(err) = self.run_steps(&mut state, documentation, start_index).await {
            log::error!("Pipeline error: {err}");
            state.status = PipelineStatus::Failed;
            state.metadata.insert("error".into(), json!(err.to_string()));
            let trace = anyhow::Error::from(err);
            state
                .metadata
                .insert("traceback".into(), json!(format!("{trace:?}")));
        }

        if state.status == PipelineStatus::InProgress {
            state.status = PipelineStatus::Completed;
            let cross = self.cross_validate(&state);
            log::info!(
                "Cross-step validation: valid={}, score={:.1}",
                cross.is_valid(),
                cross.score()
            );
            state.metadata.insert(
                "cross_validation".into(),
                serde_json::to_value(&cross).unwrap_or(Value::Null),
            );
        }

        Ok(self.finish(state))
    }

    fn finish(&mut self, mut state: PipelineState) -> PipelineState {
        state.end_time = Some(Utc::now());
        if let Err(e) = self.store.save(&state) {
            log::error!("Error saving pipeline state: {e}");
        }
        log::info!(
            "Pipeline {} finished with status {}",
            state.pipeline_id,
            state.status
        );
        self.event(
            "pipeline_end",
            json!({
                "status": state.status,
                "total_cost": state.total_cost,
                "total_tokens": state.total_tokens,
            }),
        );
        self.state = Some(state.clone());
        state
    }

    async fn run_steps(
        &mut self,
        state: &mut PipelineState,
        documentation: &str,
        start_index: usize,
    ) -> Result<(), PipelineError> {
        for step in PipelineStep::ALL.into_iter().skip(start_index) {
            log::info!("Executing step: {step}");
            state.current_step = Some(step);
            self.event("step_start", json!({"step": step}));

            let result = self
                .execute_step_with_retry(step, documentation, state)
                .await?;
            self.event(
                "step_end",
                json!({
                    "step": step,
                    "status": result.status,
                    "score": result.score(),
                    "retry_count": result.retry_count,
                }),
            );
            if result.is_failed() {
                log::error!(
                    "Step {step} failed: {}",
                    result.error.as_deref().unwrap_or("validation failed")
                );
            }
            state.record(result);
            self.store.save(state)?;

            let halt = state.result(step).is_some_and(|result| {
                result.is_failed()
                    && policy::should_halt_on_failure(step, result, &self.validation_config)
            });
            if halt {
                log::error!("Halting pipeline after failed step {step}");
                self.event("halt", json!({"step": step}));
                state.status = PipelineStatus::Halted;
                break;
            }

            self.log_progress(state);
        }
        Ok(())
    }

    async fn execute_step_with_retry(
        &mut self,
        step: PipelineStep,
        documentation: &str,
        state: &PipelineState,
    ) -> Result<StepResult, PipelineError> {
        let retry = self.config.retry.clone();
        let max_attempts = retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            let started = Instant::now();
            match self.execute_step(step, documentation, state).await {
                Ok(mut result) => {
                    result.retry_count = attempt;
                    result.metadata.insert(
                        "execution_time".into(),
                        json!(started.elapsed().as_secs_f64()),
                    );
                    let retry_validation = result.validation.as_ref().is_some_and(|v| {
                        !v.is_valid()
                            && attempt + 1 < max_attempts
                            && policy::should_retry_on_validation_failure(
                                v,
                                &self.validation_config,
                            )
                    });
                    if !retry_validation {
                        return Ok(result);
                    }
                    log::warn!(
                        "Validation failed for {step} (score {:.1}), retrying...",
                        result.score().unwrap_or(0.0)
                    );
                }
                Err(err @ PipelineError::MissingPrerequisite { .. }) => return Err(err),
                Err(err) => {
                    log::error!("Error in step {step} (attempt {}): {err}", attempt + 1);
                    last_error = err.to_string();
                }
            }
            if attempt + 1 < max_attempts {
                tokio::time::sleep(retry.delay_for(attempt)).await;
            }
        }

        Ok(StepResult::failed(step, last_error, max_attempts))
    }

    async fn execute_step(
        &mut self,
        step: PipelineStep,
        documentation: &str,
        state: &PipelineState,
    ) -> Result<StepResult, PipelineError> {
        match step {
            PipelineStep::SectionSummary => self.section_summary(documentation).await,
            PipelineStep::DataExtraction => self.data_extraction(documentation, state).await,
            PipelineStep::RegisterMapping => self.register_mapping(documentation, state).await,
            PipelineStep::ArchitecturePlanning => self.architecture_planning(state).await,
            PipelineStep::TodoGeneration => self.todo_generation(state).await,
            PipelineStep::CodeGeneration => self.code_generation(state).await,
        }
    }

    async fn generate(
        &self,
        prompt: String,
        constraints: Constraints,
    ) -> Result<Generation, PipelineError> {
        let request = GenerationRequest::new(prompt, constraints);
        let timeout = self.config.timeouts.generation();
        match tokio::time::timeout(timeout, self.provider.generate(&request)).await {
            Ok(generation) => Ok(generation?),
            Err(_) => Err(ProviderError::Timeout(self.config.timeouts.default).into()),
        }
    }

    /// Generate, parse and validate a single JSON response.
    async fn json_step(
        &mut self,
        step: PipelineStep,
        prompt: String,
        temperature: f32,
    ) -> Result<StepResult, PipelineError> {
        let constraints = Constraints::json(temperature, schemas::response_schema(step));
        let generation = self.generate(prompt, constraints).await?;
        let data = parse_json(&generation.content).unwrap_or_else(parse_failure);
        Ok(self.validated(step, data, Some(GenerationMeta::from(&generation))))
    }

    fn validated(
        &mut self,
        step: PipelineStep,
        data: Value,
        generation: Option<GenerationMeta>,
    ) -> StepResult {
        let validation = self.engine.validate(step, &data);
        StepResult::validated(step, StepPayload::from_output(step, data), validation, generation)
    }

    async fn section_summary(&mut self, documentation: &str) -> Result<StepResult, PipelineError> {
        log::info!("Step 1: Generating section summaries");
        let prompt =
            prompts::section_summary(documentation, self.config.documentation_limits.summary);
        self.json_step(PipelineStep::SectionSummary, prompt, 0.3).await
    }

    async fn data_extraction(
        &mut self,
        documentation: &str,
        state: &PipelineState,
    ) -> Result<StepResult, PipelineError> {
        log::info!("Step 2: Extracting peripheral metadata");
        let step = PipelineStep::DataExtraction;
        let summary = prerequisite(state, step, PipelineStep::SectionSummary)?.summary();
        let prompt = prompts::data_extraction(
            documentation,
            &summary,
            self.config.documentation_limits.extraction,
        );
        self.json_step(step, prompt, 0.2).await
    }

    /// Best-of-N: each pass is generated from the best candidate so far and the highest score
    /// wins. Unparseable passes are skipped. Cost and tokens of every pass are charged to the
    /// accepted result.
    async fn register_mapping(
        &mut self,
        documentation: &str,
        state: &PipelineState,
    ) -> Result<StepResult, PipelineError> {
        log::info!("Step 3: Mapping registers and bit-fields");
        let step = PipelineStep::RegisterMapping;
        let metadata = prerequisite(state, step, PipelineStep::DataExtraction)?.metadata();
        let settings = self.config.register_mapping.clone();
        let limit = self.config.documentation_limits.register_mapping;

        let mut best: Option<Candidate> = None;
        let mut spent: Option<GenerationMeta> = None;
        let mut passes = 0;

        for pass in 0..settings.max_passes {
            log::info!("Register mapping pass {}/{}", pass + 1, settings.max_passes);
            passes = pass + 1;
            let prompt = prompts::register_mapping(
                documentation,
                &metadata,
                pass,
                best.as_ref().map(|c| &c.data),
                limit,
            );
            let constraints = Constraints::json(0.1, schemas::response_schema(step))
                .with_max_tokens(SECTION_MAX_TOKENS);
            let generation = self.generate(prompt, constraints).await?;
            spend(&mut spent, &generation);

            let Some(data) = parse_json(&generation.content) else {
                log::warn!("Register mapping pass {} returned unparseable output", pass + 1);
                continue;
            };
            let validation = self.engine.validate(step, &data);
            let score = validation.score();
            self.event("register_pass", json!({"pass": pass + 1, "score": score}));

            if best
                .as_ref()
                .is_none_or(|current| score > current.validation.score())
            {
                best = Some(Candidate { data, validation });
            }
            if score >= settings.early_stop_score {
                break;
            }
        }

        let Some(best) = best else {
            return Err(PipelineError::NoCandidate(step));
        };
        let best_score = best.validation.score();
        log::info!("Register mapping completed with score: {best_score:.1}");

        let mut result = StepResult::validated(
            step,
            StepPayload::from_output(step, best.data),
            best.validation,
            spent,
        );
        result.metadata.insert("passes".into(), json!(passes));

        if best_score < settings.intervention_score && self.config.human_intervention {
            self.request_human_intervention(&mut result, "Register mapping score below threshold");
        }
        Ok(result)
    }

    /// Flags the result for review. Execution continues with the result as is.
    fn request_human_intervention(&self, result: &mut StepResult, reason: &str) {
        log::warn!("Human intervention requested for {}: {reason}", result.step);
        result
            .metadata
            .insert("human_intervention_requested".into(), json!(true));
        result
            .metadata
            .insert("intervention_reason".into(), json!(reason));
        self.event(
            "intervention_requested",
            json!({"step": result.step, "reason": reason}),
        );
    }

    async fn architecture_planning(
        &mut self,
        state: &PipelineState,
    ) -> Result<StepResult, PipelineError> {
        log::info!("Step 4: Planning peripheral architecture");
        let step = PipelineStep::ArchitecturePlanning;
        let metadata = prerequisite(state, step, PipelineStep::DataExtraction)?.metadata();
        let registers = prerequisite(state, step, PipelineStep::RegisterMapping)?.register_map();
        let prompt = prompts::architecture(&metadata, &registers);
        self.json_step(step, prompt, 0.4).await
    }

    async fn todo_generation(&mut self, state: &PipelineState) -> Result<StepResult, PipelineError> {
        log::info!("Step 5: Generating implementation todo list");
        let step = PipelineStep::TodoGeneration;
        let summary = prerequisite(state, step, PipelineStep::SectionSummary)?.summary();
        let metadata = prerequisite(state, step, PipelineStep::DataExtraction)?.metadata();
        let registers = prerequisite(state, step, PipelineStep::RegisterMapping)?.register_map();
        let architecture =
            prerequisite(state, step, PipelineStep::ArchitecturePlanning)?.architecture();

        let prompt = prompts::todo_generation(&summary, &metadata, &architecture, &registers);
        let generation = self
            .generate(prompt, Constraints::json(0.5, None))
            .await?;
        let mut data = parse_json(&generation.content).unwrap_or_else(parse_failure);
        if let Some(obj) = data.as_object_mut() {
            if !obj.contains_key("todos") {
                if let Some(todos) = obj.remove("enhanced_todos") {
                    obj.insert("todos".into(), todos);
                }
            }
        }
        Ok(self.validated(step, data, Some(GenerationMeta::from(&generation))))
    }

    /// Section-by-section generation: header, class definition, register block, then one
    /// method per high-priority implementation task.
    async fn code_generation(&mut self, state: &PipelineState) -> Result<StepResult, PipelineError> {
        log::info!("Step 6: Generating C# implementation");
        let step = PipelineStep::CodeGeneration;
        let metadata = prerequisite(state, step, PipelineStep::DataExtraction)?.metadata();
        let registers = prerequisite(state, step, PipelineStep::RegisterMapping)?.register_map();
        let architecture =
            prerequisite(state, step, PipelineStep::ArchitecturePlanning)?.architecture();
        let todos = prerequisite(state, step, PipelineStep::TodoGeneration)?.todo_list();

        let mut requests = vec![
            (
                "header".to_string(),
                prompts::code_header(&metadata, &architecture),
                Constraints::text(0.1),
            ),
            (
                "class_definition".to_string(),
                prompts::class_definition(&metadata, &architecture),
                Constraints::text(0.1),
            ),
            (
                "registers".to_string(),
                prompts::register_definitions(&registers),
                Constraints::text(0.1).with_max_tokens(SECTION_MAX_TOKENS),
            ),
        ];
        let method_todos = todos
            .todos
            .iter()
            .filter(|todo| todo.is_high_priority())
            .take(self.config.code_generation.max_method_sections)
            .filter(|todo| todo.category == "implementation");
        for todo in method_todos {
            requests.push((
                format!("method_{}", todo.id),
                prompts::method_implementation(todo, &registers),
                Constraints::text(0.2),
            ));
        }

        let mut sections = Vec::with_capacity(requests.len());
        let mut spent: Option<GenerationMeta> = None;
        for (name, prompt, constraints) in requests {
            let generation = self.generate(prompt, constraints).await?;
            spend(&mut spent, &generation);
            sections.push((name, strip_code_fence(&generation.content)));
        }

        let code = prompts::assemble_code(&sections);
        let peripheral_name = if metadata.peripheral_name.is_empty() {
            "UnknownPeripheral".to_string()
        } else {
            metadata.peripheral_name.clone()
        };
        let data = json!({
            "code": code,
            "sections": sections.into_iter().collect::<BTreeMap<_, _>>(),
            "file_name": format!("{peripheral_name}.cs"),
            "peripheral_name": peripheral_name,
        });
        let generation = spent.map(|mut meta| {
            meta.model_id = ModelId::multi_model();
            meta
        });
        Ok(self.validated(step, data, generation))
    }

    fn cross_validate(&mut self, state: &PipelineState) -> ValidationResult {
        let outputs: BTreeMap<PipelineStep, Value> = state
            .step_results
            .iter()
            .filter_map(|(step, result)| result.data.as_ref().map(|d| (*step, d.to_value())))
            .collect();
        self.engine.cross_validate(&outputs)
    }

    fn log_progress(&self, state: &PipelineState) {
        let completed = state.step_results.len();
        let total = PipelineStep::ALL.len();
        let progress = completed as f64 / total as f64 * 100.0;
        log::info!("Pipeline progress: {progress:.1}% ({completed}/{total} steps)");

        if let (Some(start), Ok(done)) = (state.start_time, i32::try_from(completed)) {
            if done > 0 {
                let remaining = (total - completed) as i32;
                let per_step = (Utc::now() - start) / done;
                let eta = Local::now() + per_step * remaining;
                log::info!("Estimated completion: {}", eta.format("%H:%M:%S"));
            }
        }
        self.event(
            "progress",
            json!({"completed": completed, "total": total, "percent": progress}),
        );
    }

    fn event(&self, step: &str, data: Value) {
        if let Some(logger) = &self.logger {
            if let Err(e) = logger.log_event(step, data) {
                log::warn!("failed to write pipeline event: {e}");
            }
        }
    }

    pub fn metrics(&self) -> Option<PipelineMetrics> {
        self.state.as_ref().map(PipelineMetrics::from)
    }

    /// Write the generated code, validation report, pipeline state and metrics into `dir`.
    /// Returns the written paths keyed by kind.
    pub fn export_results(&self, dir: &Path) -> Result<BTreeMap<String, PathBuf>, PipelineError> {
        let state = self.state.as_ref().ok_or(PipelineError::NoState)?;
        fs::create_dir_all(dir)?;
        let mut exported = BTreeMap::new();

        if let Some(code) = state
            .payload(PipelineStep::CodeGeneration)
            .and_then(StepPayload::code)
            .filter(|code| !code.code.is_empty())
        {
            let file_name = if code.file_name.is_empty() {
                "peripheral.cs"
            } else {
                code.file_name.as_str()
            };
            let path = dir.join(file_name);
            fs::write(&path, &code.code)?;
            exported.insert("code".to_string(), path);
        }

        let report_path = dir.join(format!("{}_validation.json", state.subject));
        self.engine.export_report(&report_path, ReportFormat::Json)?;
        exported.insert("validation_report".to_string(), report_path);

        let state_path = dir.join(format!("{}_pipeline_state.json", state.subject));
        fs::write(&state_path, serde_json::to_string_pretty(state)?)?;
        exported.insert("pipeline_state".to_string(), state_path);

        let metrics_path = dir.join(format!("{}_metrics.json", state.subject));
        let metrics = PipelineMetrics::from(state);
        fs::write(&metrics_path, serde_json::to_string_pretty(&metrics)?)?;
        exported.insert("metrics".to_string(), metrics_path);

        log::info!("Exported {} files to {}", exported.len(), dir.display());
        Ok(exported)
    }
}
