// src/router.rs
use axum::{
    http::HeaderValue,
    middleware as axum_middleware,
    routing::get,
    Router,
};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::Settings;
use crate::error::{install_panic_hook, panic_response};
use crate::handlers::{errors, health, items};
use crate::logging::{context, get_logger};
use crate::middleware::request_log;
use crate::server::AppState;

/// Build the application: routes, panic capture, CORS and request logging,
/// from the innermost layer out. CORS sits inside the request log so
/// preflights it answers are logged too.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/items/", get(items::list_items).post(items::create_item))
        .route("/items/:item_id", get(items::get_item))
        .route("/errors/", get(errors::throw_error));

    let router = Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/test", get(health::test_endpoint));

    let router = match normalize_prefix(&state.settings.api_prefix) {
        Some(prefix) => router.nest(&prefix, api),
        None => router.merge(api),
    };

    install_panic_hook();

    router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors_layer(&state.settings))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            request_log,
        ))
        .with_state(state)
}

/// `/api/v1/` and `api/v1` both become `/api/v1`. An empty prefix mounts
/// the API at the root.
fn normalize_prefix(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim().trim_matches('/');
    (!trimmed.is_empty()).then(|| format!("/{trimmed}"))
}

/// `*` allows any origin; otherwise only the listed, valid origins.
pub fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins = settings.cors_origin_list();
    if origins.is_empty() || origins.contains(&"*") {
        return CorsLayer::permissive();
    }

    let logger = get_logger(module_path!());
    let allowed: Vec<HeaderValue> = origins
        .into_iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                logger.warning(
                    "Ignoring invalid CORS origin",
                    &context([("origin", json!(origin))]),
                );
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("/api/v1"), Some("/api/v1".to_string()));
        assert_eq!(normalize_prefix("api/v1/"), Some("/api/v1".to_string()));
        assert_eq!(normalize_prefix("/"), None);
        assert_eq!(normalize_prefix(""), None);
    }
}
