use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

pub type EventPayload = Map<String, Value>;

pub const ANALYSIS_STARTED: &str = "analysis_started";
pub const ANALYSIS_REQUEST: &str = "analysis_request";
pub const ANALYSIS_FINISHED: &str = "analysis_finished";
pub const ANALYSIS_FAILED: &str = "analysis_failed";
pub const SESSION_IMAGES_CHANGED: &str = "session_images_changed";

/// Append-only writer for `events.jsonl`.
///
/// - default fields are `type`, `session_id`, `ts`
/// - caller payload is merged last and can override defaults
/// - one compact JSON object per line
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }

        if let Some(parent) = self.inner.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }
}

/// Replaces inline binary payloads with a size marker so request bodies can
/// be logged without the encoded images.
pub fn redact_inline_data(value: &Value) -> Value {
    match value {
        Value::Array(rows) => Value::Array(rows.iter().map(redact_inline_data).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, row) in map {
                if key == "data" {
                    if let Some(text) = row.as_str() {
                        out.insert(
                            key.clone(),
                            Value::String(format!("<omitted {} chars>", text.len())),
                        );
                        continue;
                    }
                }
                out.insert(key.clone(), redact_inline_data(row));
            }
            Value::Object(out)
        }
        _ => value.clone(),
    }
}

/// Fresh identifier for one CLI invocation or interactive session.
pub fn new_session_id() -> String {
    format!("session-{}", Uuid::new_v4().simple())
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
