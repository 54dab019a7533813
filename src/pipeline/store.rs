use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::types::PipelineState;
use crate::errors::StateError;
use crate::types::PipelineId;

/// Durable storage for pipeline state, one record per pipeline id.
///
/// Writers to the same id must be serialized by the caller.
pub trait StateStore: Send + Sync {
    fn save(&self, state: &PipelineState) -> Result<(), StateError>;
    fn load(&self, id: &PipelineId) -> Result<PipelineState, StateError>;
    fn exists(&self, id: &PipelineId) -> bool;
}

/// Stores `<dir>/<pipeline_id>.json`, replacing the file atomically on every save.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &PipelineId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl StateStore for FileStateStore {
    fn save(&self, state: &PipelineState) -> Result<(), StateError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&state.pipeline_id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(state)?;
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;
        log::debug!("Saved pipeline state to {}", path.display());
        Ok(())
    }

    fn load(&self, id: &PipelineId) -> Result<PipelineState, StateError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(StateError::NotFound(id.clone()));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn exists(&self, id: &PipelineId) -> bool {
        self.path_for(id).exists()
    }
}

/// In-process store. States go through the same JSON encoding as the file store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: Mutex<HashMap<PipelineId, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StateError {
    StateError::Io(std::io::Error::other("state store mutex poisoned"))
}

impl StateStore for MemoryStateStore {
    fn save(&self, state: &PipelineState) -> Result<(), StateError> {
        let content = serde_json::to_string(state)?;
        self.states
            .lock()
            .map_err(|_| poisoned())?
            .insert(state.pipeline_id.clone(), content);
        Ok(())
    }

    fn load(&self, id: &PipelineId) -> Result<PipelineState, StateError> {
        let states = self.states.lock().map_err(|_| poisoned())?;
        let content = states
            .get(id)
            .ok_or_else(|| StateError::NotFound(id.clone()))?;
        Ok(serde_json::from_str(content)?)
    }

    fn exists(&self, id: &PipelineId) -> bool {
        self.states
            .lock()
            .map(|s| s.contains_key(id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::payload::{RegisterEntry, RegisterMap, StepPayload};
    use crate::pipeline::types::{GenerationMeta, PipelineStatus, PipelineStep, StepResult};
    use crate::types::ModelId;
    use crate::validation::{ValidationIssue, ValidationResult};
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_state() -> PipelineState {
        let mut state = PipelineState::new(PipelineId::new("pipeline_test"), "Timer32");
        let mut validation = ValidationResult::new();
        validation.add_issue(ValidationIssue::warning("Register name 'ctrl' doesn't follow naming convention"));
        let payload = StepPayload::RegisterMapping(RegisterMap {
            registers: vec![RegisterEntry {
                name: "ctrl".into(),
                address: json!("0x00"),
                size: Some(32),
                access: "RW".into(),
                ..Default::default()
            }],
            ..Default::default()
        });
        let mut result = StepResult::validated(
            PipelineStep::RegisterMapping,
            payload,
            validation,
            Some(GenerationMeta {
                model_id: ModelId::new("gpt-4o"),
                cost: 0.25,
                total_tokens: 1200,
            }),
        );
        result.metadata.insert("execution_time".into(), json!(2.5));
        state.record(result);
        state.status = PipelineStatus::Halted;
        state
    }

    #[test]
    fn file_store_round_trips_full_state() {
        let tmp = TempDir::new().unwrap();
        let store = FileStateStore::new(tmp.path().join("states"));
        let state = sample_state();
        store.save(&state).unwrap();

        assert!(store.exists(&state.pipeline_id));
        assert!(!store.path_for(&state.pipeline_id).with_extension("json.tmp").exists());

        let loaded = store.load(&state.pipeline_id).unwrap();
        assert_eq!(loaded.status, PipelineStatus::Halted);
        assert_eq!(loaded.total_tokens, 1200);
        let result = loaded.result(PipelineStep::RegisterMapping).unwrap();
        assert_eq!(result.score(), Some(98.0));
        assert_eq!(result.validation.as_ref().unwrap().warning_count(), 1);
        assert_eq!(
            result.data.as_ref().unwrap().register_map().names(),
            vec!["ctrl"]
        );
        assert_eq!(result.generation.as_ref().unwrap().model_id.as_str(), "gpt-4o");
    }

    #[test]
    fn missing_state_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = FileStateStore::new(tmp.path());
        let err = store.load(&PipelineId::new("nope")).unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    #[test]
    fn save_overwrites_previous_record() {
        let store = MemoryStateStore::new();
        let mut state = sample_state();
        store.save(&state).unwrap();
        state.status = PipelineStatus::Completed;
        store.save(&state).unwrap();
        assert_eq!(store.len(), 1);
        let loaded = store.load(&state.pipeline_id).unwrap();
        assert_eq!(loaded.status, PipelineStatus::Completed);
    }
}
