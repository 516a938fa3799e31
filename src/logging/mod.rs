// src/logging/mod.rs
//! Structured logging.
//!
//! JSON records in production (or whenever `LOG_FORMAT=json`), one readable
//! line per record otherwise. Everything goes to a single stdout sink. Each
//! record is formatted into one buffer and handed to the locked stdout
//! handle in a single `write_all`, so concurrent requests never interleave
//! partial lines.

mod format;
pub mod trace;

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Identity, Layered, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{reload, EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LogLevel, Settings};

pub use format::{LogRecord, RecordFormat};
pub use trace::{get_trace_context, TraceContext};

/// Free-form context attached to a record.
pub type Context = Map<String, Value>;

/// Third-party targets pinned regardless of the configured level.
const PINNED_DIRECTIVES: &str = "tower_http=info,hyper=warn";

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("failed to install log subscriber: {0}")]
    Init(#[from] TryInitError),

    #[error("failed to reconfigure logging: {0}")]
    Reload(#[from] reload::Error),
}

type FilteredRegistry = Layered<reload::Layer<EnvFilter, Registry>, Registry>;
type SinkLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

struct Installed {
    filter: reload::Handle<EnvFilter, Registry>,
    sink: reload::Handle<SinkLayer, FilteredRegistry>,
}

static INSTALLED: OnceCell<Installed> = OnceCell::new();

// Installs the global subscriber with everything off and no sink;
// `setup_logging_with` fills both in.
fn install() -> Result<Installed, LoggingError> {
    let (filter, filter_handle) = reload::Layer::new(EnvFilter::new("off"));
    let (sink, sink_handle) = reload::Layer::new(Box::new(Identity::new()) as SinkLayer);

    tracing_subscriber::registry()
        .with(filter)
        .with(sink)
        .try_init()?;

    Ok(Installed {
        filter: filter_handle,
        sink: sink_handle,
    })
}

// A default directive only applies when no other directive parses, so the
// configured level goes into the directive string itself.
fn build_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::builder().parse_lossy(format!("{},{PINNED_DIRECTIVES}", level.level_filter()))
}

/// Formatting layer over any writer. `setup_logging` uses stdout; tests
/// hand in a buffer.
pub fn sink_layer<S, W>(format: LogFormat, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .event_format(RecordFormat::new(format))
        .with_writer(writer)
        .boxed()
}

/// Configure process-wide logging from `settings`, writing to stdout.
///
/// The first call installs the global subscriber. Every call then swaps the
/// level filter and the sink in place, so there is never more than one
/// sink and nothing is written twice. Returns the format in effect.
pub fn setup_logging(settings: &Settings) -> Result<LogFormat, LoggingError> {
    setup_logging_with(settings, std::io::stdout)
}

/// [`setup_logging`] with the sink writing to `writer`.
pub fn setup_logging_with<W>(settings: &Settings, writer: W) -> Result<LogFormat, LoggingError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let format = settings.effective_log_format();

    let installed = INSTALLED.get_or_try_init(install)?;
    installed.filter.reload(build_filter(settings.log_level))?;
    installed
        .sink
        .reload(sink_layer::<FilteredRegistry, _>(format, writer))?;

    get_logger(module_path!()).info(
        "Logging configured",
        &context([
            ("environment", settings.environment.as_str().into()),
            ("log_level", settings.log_level.as_str().into()),
            ("log_format", format.as_str().into()),
        ]),
    );

    Ok(format)
}

/// Build a [`Context`] from key/value pairs.
pub fn context<const N: usize>(pairs: [(&str, Value); N]) -> Context {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Named logger handle.
///
/// Works before [`setup_logging`] has run, but records emitted then go to
/// whatever subscriber is active, which by default discards them.
pub fn get_logger(name: impl Into<Arc<str>>) -> Logger {
    Logger { name: name.into() }
}

#[derive(Debug, Clone)]
pub struct Logger {
    name: Arc<str>,
}

/// Renders a context map as compact JSON for the record formatter.
struct ContextFields<'a>(&'a Context);

impl fmt::Display for ContextFields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self.0).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// Emit one event. The level has to be a constant at each callsite, hence
/// one arm per level.
fn emit(
    logger: &Logger,
    level: tracing::Level,
    message: &dyn fmt::Display,
    context: &Context,
    caller: &Location<'_>,
) {
    let name: &str = &logger.name;
    let fields = ContextFields(context);
    let (file, line) = (caller.file(), caller.line());

    match level {
        tracing::Level::ERROR => tracing::error!(
            logger = name, context = %fields, caller_file = file, caller_line = line, "{}", message
        ),
        tracing::Level::WARN => tracing::warn!(
            logger = name, context = %fields, caller_file = file, caller_line = line, "{}", message
        ),
        tracing::Level::INFO => tracing::info!(
            logger = name, context = %fields, caller_file = file, caller_line = line, "{}", message
        ),
        tracing::Level::DEBUG => tracing::debug!(
            logger = name, context = %fields, caller_file = file, caller_line = line, "{}", message
        ),
        tracing::Level::TRACE => tracing::trace!(
            logger = name, context = %fields, caller_file = file, caller_line = line, "{}", message
        ),
    }
}

impl Logger {
    pub fn name(&self) -> &str {
        &self.name
    }

    #[track_caller]
    pub fn debug(&self, message: impl fmt::Display, context: &Context) {
        emit(self, tracing::Level::DEBUG, &message, context, Location::caller());
    }

    #[track_caller]
    pub fn info(&self, message: impl fmt::Display, context: &Context) {
        emit(self, tracing::Level::INFO, &message, context, Location::caller());
    }

    #[track_caller]
    pub fn warning(&self, message: impl fmt::Display, context: &Context) {
        emit(self, tracing::Level::WARN, &message, context, Location::caller());
    }

    #[track_caller]
    pub fn error(&self, message: impl fmt::Display, context: &Context) {
        emit(self, tracing::Level::ERROR, &message, context, Location::caller());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io;
    use std::sync::Mutex;

    /// Collects everything the sink writes.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn lines(&self) -> Vec<String> {
            let bytes = self.0.lock().unwrap();
            String::from_utf8_lossy(&bytes)
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn with_sink<F: FnOnce()>(format: LogFormat, f: F) -> Vec<String> {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry()
            .with(sink_layer::<Registry, _>(format, captured.clone()));
        tracing::subscriber::with_default(subscriber, f);
        captured.lines()
    }

    #[test]
    fn test_logger_json_record() {
        let lines = with_sink(LogFormat::Json, || {
            get_logger("reqlog::tests").info(
                "hello",
                &context([("answer", json!(42)), ("query", json!({"a": "1"}))]),
            );
        });

        assert_eq!(lines.len(), 1);
        let record: Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(record["logger_name"], "reqlog::tests");
        assert_eq!(record["level"], "INFO");
        assert_eq!(record["message"], "hello");
        assert_eq!(record["answer"], 42);
        assert_eq!(record["query"]["a"], "1");
        assert!(record["source_file"].as_str().unwrap().ends_with("mod.rs"));
        assert!(record["source_line"].as_u64().unwrap() > 0);
        assert!(record.get("caller_file").is_none());
        assert!(record.get("logger").is_none());
    }

    #[test]
    fn test_logger_text_record() {
        let lines = with_sink(LogFormat::Text, || {
            get_logger("reqlog::tests").warning("careful", &context([("path", json!("/x"))]));
        });

        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(" - reqlog::tests - WARNING - careful path=/x - ["));
    }

    #[test]
    fn test_plain_tracing_events_use_target() {
        let lines = with_sink(LogFormat::Json, || {
            tracing::error!(code = 7, "plain event");
        });

        let record: Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(record["logger_name"], module_path!());
        assert_eq!(record["level"], "ERROR");
        assert_eq!(record["code"], 7);
    }

    #[test]
    fn test_logger_without_subscriber_is_silent() {
        // No subscriber in scope: the record is dropped, nothing panics.
        get_logger("reqlog::orphan").info("dropped", &Context::new());
    }

    #[test]
    fn test_filter_applies_configured_level() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry()
            .with(build_filter(LogLevel::Warning))
            .with(sink_layer::<Layered<EnvFilter, Registry>, _>(
                LogFormat::Json,
                captured.clone(),
            ));

        tracing::subscriber::with_default(subscriber, || {
            let logger = get_logger("reqlog::tests");
            logger.info("too quiet", &Context::new());
            logger.warning("loud enough", &Context::new());
            logger.error("louder", &Context::new());
        });

        let messages: Vec<String> = captured
            .lines()
            .iter()
            .map(|line| {
                let record: Value = serde_json::from_str(line).unwrap();
                record["message"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(messages, vec!["loud enough", "louder"]);
    }

    #[test]
    fn test_context_builder() {
        let ctx = context([("a", json!(1)), ("b", json!("two"))]);
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx["b"], "two");
    }
}
