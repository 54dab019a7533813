use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Internal logs are opt-in via RUST_LOG; `fallback` applies when it is unset.
pub fn init_logging(fallback: log::LevelFilter) {
    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var("RUST_LOG").is_err() {
        builder.filter_level(fallback);
    }
    let _ = builder.try_init();
}

/// Append `value` to a JSONL file as `{"ts": <millis>, ...value}`, creating parent dirs.
pub fn append_jsonl(path: &Path, value: &Value) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut record = serde_json::Map::new();
    record.insert("ts".to_string(), Value::Number(now_millis().into()));
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                record.insert(k.clone(), v.clone());
            }
        }
        other => {
            record.insert("event".to_string(), other.clone());
        }
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(
        file,
        "{}",
        serde_json::to_string(&Value::Object(record)).map_err(io::Error::other)?
    )?;
    // Reaches the OS buffer only; no fsync.
    file.flush()?;
    Ok(())
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
