// src/handlers/errors.rs
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::StatusCode;
use axum::Json;
use once_cell::sync::Lazy;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::logging::{context, get_logger, Logger};

pub const TEST_ERROR_DETAIL: &str = "This is a test error endpoint";

static LOGGER: Lazy<Logger> = Lazy::new(|| get_logger(module_path!()));

/// GET {prefix}/errors/
///
/// Always fails with a 500, for exercising error handling end to end.
pub async fn throw_error(
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Result<Json<Value>, AppError> {
    let client_ip = connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    LOGGER.info(
        "Error endpoint accessed",
        &context([
            ("endpoint", json!("/errors")),
            ("method", json!("GET")),
            ("client_ip", json!(client_ip)),
        ]),
    );

    Err(AppError::http(
        StatusCode::INTERNAL_SERVER_ERROR,
        TEST_ERROR_DETAIL,
    ))
}
