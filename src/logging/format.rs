// src/logging/format.rs
//! Renders tracing events as JSON objects or single text lines.

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use super::trace::get_trace_context;
use crate::config::LogFormat;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Fields with a meaning of their own, set by `Logger`.
const LOGGER_FIELD: &str = "logger";
const CONTEXT_FIELD: &str = "context";
const CALLER_FILE_FIELD: &str = "caller_file";
const CALLER_LINE_FIELD: &str = "caller_line";

/// One structured log record.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: String,
    pub logger_name: String,
    pub level: &'static str,
    pub message: String,
    pub source_file: Option<String>,
    pub source_line: Option<u32>,
    pub context: Map<String, Value>,
    pub trace: HashMap<String, String>,
}

impl LogRecord {
    pub fn from_event(event: &Event<'_>) -> Self {
        let metadata = event.metadata();
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        Self {
            timestamp: chrono::Utc::now().format(TIME_FORMAT).to_string(),
            logger_name: visitor
                .logger
                .unwrap_or_else(|| metadata.target().to_string()),
            level: level_name(metadata.level()),
            message: visitor.message.unwrap_or_default(),
            source_file: visitor
                .caller_file
                .or_else(|| metadata.file().map(str::to_string)),
            source_line: visitor.caller_line.or_else(|| metadata.line()),
            context: visitor.fields,
            trace: get_trace_context(),
        }
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("timestamp".into(), self.timestamp.clone().into());
        object.insert("logger_name".into(), self.logger_name.clone().into());
        object.insert("level".into(), self.level.into());
        object.insert("message".into(), self.message.clone().into());
        object.insert(
            "source_file".into(),
            self.source_file.clone().map_or(Value::Null, Value::from),
        );
        object.insert(
            "source_line".into(),
            self.source_line.map_or(Value::Null, Value::from),
        );

        for (key, value) in &self.context {
            object.entry(key.clone()).or_insert_with(|| value.clone());
        }
        for (key, value) in &self.trace {
            object
                .entry(key.clone())
                .or_insert_with(|| Value::from(value.clone()));
        }

        Value::Object(object)
    }

    /// `timestamp - logger - LEVEL - message key=value ... - [file:line]`
    pub fn to_text(&self) -> String {
        let mut line = format!(
            "{} - {} - {} - {}",
            self.timestamp,
            self.logger_name,
            self.level,
            single_line(&self.message)
        );

        for (key, value) in &self.context {
            line.push(' ');
            line.push_str(key);
            line.push('=');
            match value {
                Value::String(s) => line.push_str(&single_line(s)),
                other => line.push_str(&other.to_string()),
            }
        }

        let mut trace: Vec<_> = self.trace.iter().collect();
        trace.sort();
        for (key, value) in trace {
            line.push_str(&format!(" {key}={value}"));
        }

        line.push_str(&format!(
            " - [{}:{}]",
            self.source_file.as_deref().unwrap_or("<unknown>"),
            self.source_line.map_or_else(|| "?".to_string(), |l| l.to_string())
        ));
        line
    }
}

// A text record must stay on one line.
fn single_line(text: &str) -> String {
    text.replace('\r', "\\r").replace('\n', "\\n")
}

fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "TRACE",
        Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARNING",
        Level::ERROR => "ERROR",
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: Option<String>,
    logger: Option<String>,
    caller_file: Option<String>,
    caller_line: Option<u32>,
    fields: Map<String, Value>,
}

impl RecordVisitor {
    fn record_value(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }

    fn record_text(&mut self, field: &Field, text: String) {
        match field.name() {
            "message" => self.message = Some(text),
            LOGGER_FIELD => self.logger = Some(text),
            CALLER_FILE_FIELD => self.caller_file = Some(text),
            CONTEXT_FIELD => match serde_json::from_str::<Map<String, Value>>(&text) {
                Ok(context) => self.fields.extend(context),
                Err(_) => self.record_value(field, Value::String(text)),
            },
            _ => self.record_value(field, Value::String(text)),
        }
    }
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_text(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_value(field, Value::Bool(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_value(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == CALLER_LINE_FIELD {
            self.caller_line = u32::try_from(value).ok();
            return;
        }
        self.record_value(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        // NaN and infinities have no JSON representation.
        let value = serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number);
        self.record_value(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.record_text(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_text(field, format!("{value:?}"));
    }
}

/// Event formatter installed on the stdout sink.
#[derive(Debug, Clone, Copy)]
pub struct RecordFormat {
    format: LogFormat,
}

impl RecordFormat {
    pub fn new(format: LogFormat) -> Self {
        Self { format }
    }
}

impl<S, N> FormatEvent<S, N> for RecordFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let record = LogRecord::from_event(event);
        match self.format {
            LogFormat::Json => writeln!(writer, "{}", record.to_json()),
            LogFormat::Text => writeln!(writer, "{}", record.to_text()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> LogRecord {
        let mut context = Map::new();
        context.insert("method".into(), json!("GET"));
        context.insert("status_code".into(), json!(200));
        context.insert("message".into(), json!("shadowed"));

        LogRecord {
            timestamp: "2024-01-01 00:00:00".into(),
            logger_name: "reqlog::middleware".into(),
            level: "INFO",
            message: "Request completed".into(),
            source_file: Some("src/middleware/logging.rs".into()),
            source_line: Some(42),
            context,
            trace: HashMap::new(),
        }
    }

    #[test]
    fn test_json_shape() {
        let value = record().to_json();

        assert_eq!(value["timestamp"], "2024-01-01 00:00:00");
        assert_eq!(value["logger_name"], "reqlog::middleware");
        assert_eq!(value["level"], "INFO");
        assert_eq!(value["source_file"], "src/middleware/logging.rs");
        assert_eq!(value["source_line"], 42);
        assert_eq!(value["method"], "GET");
        assert_eq!(value["status_code"], 200);
        // Context never overrides the record's own fields.
        assert_eq!(value["message"], "Request completed");
        assert!(value.get("trace_id").is_none());
    }

    #[test]
    fn test_json_includes_trace_ids() {
        let mut record = record();
        record.trace.insert("trace_id".into(), "abc".into());
        record.trace.insert("span_id".into(), "def".into());

        let value = record.to_json();
        assert_eq!(value["trace_id"], "abc");
        assert_eq!(value["span_id"], "def");
    }

    #[test]
    fn test_text_line() {
        let mut record = record();
        record.context.remove("message");

        let line = record.to_text();
        assert!(line.starts_with(
            "2024-01-01 00:00:00 - reqlog::middleware - INFO - Request completed"
        ));
        assert!(line.contains("method=GET"));
        assert!(line.contains("status_code=200"));
        assert!(line.ends_with(" - [src/middleware/logging.rs:42]"));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_text_line_escapes_newlines() {
        let mut record = record();
        record.context.clear();
        record
            .context
            .insert("backtrace".into(), json!("frame one\nframe two"));

        let line = record.to_text();
        assert!(line.contains("backtrace=frame one\\nframe two"));
        assert_eq!(line.lines().count(), 1);
    }

    #[test]
    fn test_level_names() {
        assert_eq!(level_name(&Level::WARN), "WARNING");
        assert_eq!(level_name(&Level::ERROR), "ERROR");
    }
}
