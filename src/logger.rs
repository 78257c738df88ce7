use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::diff::diff_json;

/// How API responses are written to the traffic log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLogMode {
    /// Every response body in full.
    Full,
    /// First response per endpoint in full, afterwards only the changes.
    Diffed,
}

pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    previous: HashMap<String, Value>,
}

fn stamp(dir: &str, path: &str) -> Map<String, Value> {
    let mut entry = Map::new();
    entry.insert("ts".into(), json!(Utc::now().to_rfc3339()));
    entry.insert("dir".into(), json!(dir));
    entry.insert("path".into(), json!(path));
    entry
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            previous: HashMap::new(),
        })
    }

    pub fn log_request(&mut self, method: &str, path: &str, body: Option<&Value>) {
        let mut entry = stamp("req", path);
        entry.insert("method".into(), json!(method));
        entry.insert("body".into(), json!(body));
        self.write_line(&Value::Object(entry));
    }

    /// Non-2xx answers and empty bodies are logged by status only.
    pub fn log_response(&mut self, path: &str, status: u16, body: &Value) {
        let mut entry = stamp("res", path);
        entry.insert("status".into(), json!(status));

        if (200..300).contains(&status) && !body.is_null() {
            match (self.mode, self.previous.get(path)) {
                (MessageLogMode::Diffed, Some(prev)) => {
                    let mut changes = Vec::new();
                    diff_json(prev, body, "", &mut changes);
                    let changes: Vec<Value> = changes
                        .into_iter()
                        .map(|(path, old, new)| json!({ "path": path, "old": old, "new": new }))
                        .collect();
                    entry.insert("changes".into(), Value::Array(changes));
                }
                (mode, _) => {
                    if mode == MessageLogMode::Diffed {
                        entry.insert("full".into(), Value::Bool(true));
                    }
                    entry.insert("body".into(), body.clone());
                }
            }
            if self.mode == MessageLogMode::Diffed {
                self.previous.insert(path.to_string(), body.clone());
            }
        }

        self.write_line(&Value::Object(entry));
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write log entry: {e}");
        }
    }
}
