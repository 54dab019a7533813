use serde_json::{Map, Value};
use std::fs::create_dir_all;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::observability::append_jsonl;

/// Per-run JSONL event log written to `<log_dir>/events.jsonl`.
pub struct PipelineLogger {
    run_id: Option<String>,
    path: PathBuf,
    lock: Mutex<()>,
}

impl PipelineLogger {
    pub fn new(log_dir: PathBuf) -> io::Result<Self> {
        create_dir_all(&log_dir)?;
        Ok(Self {
            run_id: None,
            path: log_dir.join("events.jsonl"),
            lock: Mutex::new(()),
        })
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn set_run_id(&mut self, run_id: impl Into<String>) {
        self.run_id = Some(run_id.into());
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn log_event(&self, step: &str, data: Value) -> io::Result<()> {
        let mut event = Map::new();
        event.insert("step".to_string(), Value::String(step.to_string()));
        event.insert("data".to_string(), data);
        if let Some(run_id) = &self.run_id {
            event.insert("run_id".to_string(), Value::String(run_id.clone()));
        }

        let _guard = self
            .lock
            .lock()
            .map_err(|_| io::Error::other("logger mutex poisoned"))?;
        append_jsonl(&self.path, &Value::Object(event))
    }
}

#[cfg(test)]
mod tests {
    use super::PipelineLogger;

    #[test]
    fn test_jsonl_event_written() {
        let dir = tempfile::tempdir().unwrap();
        let logger = PipelineLogger::new(dir.path().to_path_buf())
            .unwrap()
            .with_run_id("pipeline_test");
        logger
            .log_event("register_mapping", serde_json::json!({"pass": 1}))
            .unwrap();
        let entries = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
        assert!(entries.contains("\"step\":\"register_mapping\""));
        assert!(entries.contains("\"run_id\":\"pipeline_test\""));
    }
}
