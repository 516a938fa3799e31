// src/server.rs
use std::sync::Arc;

use crate::config::Settings;
use crate::middleware::{ErrorReporter, NoopReporter};

/// Shared, read-only state handed to the middleware and the handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub reporter: Arc<dyn ErrorReporter>,
}

impl AppState {
    /// State without an error tracker.
    pub fn new(settings: Arc<Settings>) -> Self {
        Self::with_reporter(settings, Arc::new(NoopReporter))
    }

    pub fn with_reporter(settings: Arc<Settings>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { settings, reporter }
    }
}
