// src/config.rs
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

/// Variable that selects the dotenv file and the reported environment.
pub const ENVIRONMENT_VAR: &str = "ENVIRONMENT";

/// Every key `Settings` understands. Anything else in the environment or
/// in a dotenv file is ignored.
const SETTINGS_KEYS: &[&str] = &[
    "environment",
    "debug",
    "app_name",
    "app_version",
    "api_prefix",
    "host",
    "port",
    "database_url",
    "secret_key",
    "algorithm",
    "access_token_expire_minutes",
    "log_level",
    "log_format",
    "cors_origins",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenv::Error,
    },

    #[error("invalid settings: {0}")]
    Invalid(#[from] ::config::ConfigError),
}

/// Deployment environment, as read from `ENVIRONMENT`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum Environment {
    Dev,
    Prod,
    /// Any other value, kept verbatim.
    Other(String),
}

impl Environment {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "dev" => Environment::Dev,
            "prod" => Environment::Prod,
            other => Environment::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
            Environment::Other(name) => name,
        }
    }

    /// Dotenv file preferred for this environment.
    fn env_file(&self) -> &'static str {
        match self {
            Environment::Dev => ".env.dev",
            Environment::Prod => ".env.prod",
            Environment::Other(_) => ".env",
        }
    }
}

impl From<String> for Environment {
    fn from(raw: String) -> Self {
        Environment::parse(&raw)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum severity. Parsing is lenient: unknown names become `Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "TRACE" => LogLevel::Trace,
            "DEBUG" => LogLevel::Debug,
            "WARN" | "WARNING" => LogLevel::Warning,
            "ERROR" => LogLevel::Error,
            "CRITICAL" | "FATAL" => LogLevel::Critical,
            _ => LogLevel::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    /// tracing has no level above ERROR, so CRITICAL maps onto it.
    pub fn level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Error | LogLevel::Critical => LevelFilter::ERROR,
        }
    }
}

impl From<String> for LogLevel {
    fn from(raw: String) -> Self {
        LogLevel::parse(&raw)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output rendering. Anything other than `json` is text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Json => "json",
            LogFormat::Text => "text",
        }
    }
}

impl From<String> for LogFormat {
    fn from(raw: String) -> Self {
        if raw.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application settings snapshot.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub environment: Environment,
    pub debug: bool,

    pub app_name: String,
    pub app_version: String,
    pub api_prefix: String,

    pub host: String,
    pub port: u16,

    // Not used by the service yet
    pub database_url: String,
    pub secret_key: SecretString,
    pub algorithm: String,
    pub access_token_expire_minutes: u32,

    pub log_level: LogLevel,
    pub log_format: LogFormat,

    /// Comma-separated list of allowed origins, `*` for any.
    pub cors_origins: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::Dev,
            debug: false,
            app_name: "Reqlog Service".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            api_prefix: "/api/v1".to_string(),
            host: "0.0.0.0".to_string(),
            port: 9000,
            database_url: "sqlite:///./app.db".to_string(),
            secret_key: SecretString::new("your-secret-key-change-in-production".to_string()),
            algorithm: "HS256".to_string(),
            access_token_expire_minutes: 30,
            log_level: LogLevel::Info,
            log_format: LogFormat::Text,
            cors_origins: "*".to_string(),
        }
    }
}

impl Settings {
    /// Resolve settings from the current process environment and working
    /// directory. Not cached, see [`get_settings`].
    pub fn load() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        let dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        Self::resolve(&vars, &dir)
    }

    /// Resolve settings from an explicit variable map, looking for dotenv
    /// files in `dir`.
    ///
    /// Precedence is `vars` > dotenv file > built-in defaults. Keys are
    /// matched case-insensitively. `environment` always ends up equal to
    /// the `ENVIRONMENT` variable (default `dev`), whatever the file says.
    pub fn resolve(vars: &HashMap<String, String>, dir: &Path) -> Result<Self, ConfigError> {
        let environment = vars
            .get(ENVIRONMENT_VAR)
            .map(|raw| Environment::parse(raw))
            .unwrap_or(Environment::Dev);

        let file_values = match env_file_path(&environment, dir) {
            Some(path) => read_env_file(&path)?,
            None => ::config::Map::new(),
        };

        let resolved = ::config::Config::builder()
            .add_source(
                ::config::Environment::default()
                    .source(Some(file_values))
                    .ignore_empty(true),
            )
            .add_source(
                ::config::Environment::default()
                    .source(Some(known_keys(vars.iter())))
                    .ignore_empty(true),
            )
            .build()?;

        let mut settings: Settings = resolved.try_deserialize()?;
        settings.environment = environment;
        Ok(settings)
    }

    /// Defaults for the environment named by `ENVIRONMENT`.
    fn fallback() -> Self {
        let environment = std::env::var(ENVIRONMENT_VAR)
            .map(|raw| Environment::parse(&raw))
            .unwrap_or(Environment::Dev);

        Self {
            environment,
            ..Self::default()
        }
    }

    /// JSON when asked for explicitly, and always in production.
    pub fn use_json_logs(&self) -> bool {
        self.log_format == LogFormat::Json || self.environment == Environment::Prod
    }

    pub fn effective_log_format(&self) -> LogFormat {
        if self.use_json_logs() {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }

    pub fn cors_origin_list(&self) -> Vec<&str> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .collect()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `.env.<environment>` when present, else `.env` when present, else none.
fn env_file_path(environment: &Environment, dir: &Path) -> Option<PathBuf> {
    let preferred = dir.join(environment.env_file());
    if preferred.is_file() {
        return Some(preferred);
    }

    let generic = dir.join(".env");
    generic.is_file().then_some(generic)
}

fn read_env_file(path: &Path) -> Result<::config::Map<String, String>, ConfigError> {
    let to_error = |source| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    };

    let mut values = Vec::new();
    for entry in dotenv::from_path_iter(path).map_err(to_error)? {
        values.push(entry.map_err(to_error)?);
    }

    Ok(known_keys(values.iter().map(|(key, value)| (key, value))))
}

/// Lowercase the keys and keep only those naming a settings field.
fn known_keys<'a, I>(entries: I) -> ::config::Map<String, String>
where
    I: Iterator<Item = (&'a String, &'a String)>,
{
    entries
        .filter_map(|(key, value)| {
            let key = key.to_lowercase();
            SETTINGS_KEYS
                .contains(&key.as_str())
                .then(|| (key, value.clone()))
        })
        .collect()
}

static SETTINGS: OnceCell<Arc<Settings>> = OnceCell::new();

/// Process-wide settings, resolved on first use.
///
/// Fails only on the first call; once a snapshot is cached every call
/// returns the same `Arc` without reading the environment again.
pub fn try_get_settings() -> Result<Arc<Settings>, ConfigError> {
    SETTINGS
        .get_or_try_init(|| Settings::load().map(Arc::new))
        .map(Arc::clone)
}

/// Like [`try_get_settings`], but falls back to defaults when the
/// environment holds an unusable value.
pub fn get_settings() -> Arc<Settings> {
    SETTINGS
        .get_or_init(|| {
            Arc::new(Settings::load().unwrap_or_else(|err| {
                // Logging is not configured this early.
                eprintln!("falling back to default settings: {err}");
                Settings::fallback()
            }))
        })
        .clone()
}
