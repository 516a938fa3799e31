pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod middleware;
pub mod router;
pub mod server;

pub use config::{get_settings, try_get_settings, Settings};
pub use logging::{get_logger, get_trace_context, setup_logging};
pub use router::build_router;
pub use server::AppState;
