//! Tracing layer that appends events to a JSONL file.

use std::fmt::Write as FmtWrite;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// One diagnostic event as written to the JSONL file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    /// RFC 3339 timestamp with milliseconds
    pub ts: String,
    pub level: String,
    /// Server instance name (e.g. "ringlogd")
    pub instance: String,
    pub target: String,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Value>,
}

impl DiagnosticRecord {
    pub fn new(
        level: impl Into<String>,
        instance: impl Into<String>,
        target: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level: level.into(),
            instance: instance.into(),
            target: target.into(),
            msg: msg.into(),
            fields: None,
        }
    }
}

/// A tracing Layer that writes every event to `<dir>/<date>_<instance>.jsonl`.
pub struct JsonlLayer {
    instance: String,
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlLayer {
    pub fn new(logs_dir: impl AsRef<Path>, instance: impl Into<String>) -> std::io::Result<Self> {
        let instance = instance.into();
        let logs_dir = logs_dir.as_ref();
        fs::create_dir_all(logs_dir)?;

        let date = chrono::Local::now().format("%Y-%m-%d");
        let path = logs_dir.join(format!("{}_{}.jsonl", date, instance));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            instance,
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.path
    }

    fn write_record(&self, record: &DiagnosticRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        writer.flush()
    }
}

impl<S> Layer<S> for JsonlLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut record = DiagnosticRecord::new(
            metadata.level().as_str().to_lowercase(),
            self.instance.as_str(),
            metadata.target(),
            visitor.message.unwrap_or_default(),
        );
        if !visitor.fields.is_empty() {
            record.fields = Some(Value::Object(visitor.fields));
        }

        // Logging must never take the server down
        let _ = self.write_record(&record);
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let mut buf = String::new();
        let _ = write!(&mut buf, "{:?}", value);
        if field.name() == "message" {
            self.message = Some(buf);
        } else {
            self.insert(field, Value::String(buf));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field, Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing_subscriber::prelude::*;

    #[test]
    fn test_jsonl_layer_captures_events() {
        let temp = TempDir::new().unwrap();
        let layer = JsonlLayer::new(temp.path().join("logs"), "ringlogd").unwrap();
        let log_path = layer.log_path().to_path_buf();

        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(conn = 3u64, "Accepted connection from {}", "127.0.0.1");
            tracing::warn!(entry_index = 9u64, "Seek rejected");
        });

        let content = std::fs::read_to_string(&log_path).unwrap();
        let records: Vec<DiagnosticRecord> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, "info");
        assert_eq!(records[0].instance, "ringlogd");
        assert_eq!(records[0].msg, "Accepted connection from 127.0.0.1");
        assert_eq!(records[0].fields.as_ref().unwrap()["conn"], 3);
        assert_eq!(records[1].level, "warn");
        assert_eq!(records[1].msg, "Seek rejected");
    }
}
