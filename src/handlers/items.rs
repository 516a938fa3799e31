// src/handlers/items.rs
//! Placeholder item endpoints. Nothing is stored.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::Path;
use axum::Json;
use serde_json::{json, Map, Value};

use crate::error::AppError;

/// GET {prefix}/items/
pub async fn list_items() -> Json<Value> {
    Json(json!({ "items": [] }))
}

/// GET {prefix}/items/:item_id
pub async fn get_item(item_id: Result<Path<i64>, PathRejection>) -> Result<Json<Value>, AppError> {
    let Path(item_id) = item_id.map_err(|rejection| AppError::Validation(rejection.body_text()))?;

    Ok(Json(json!({
        "item_id": item_id,
        "name": format!("Item {item_id}"),
    })))
}

/// POST {prefix}/items/
///
/// Echoes any JSON object back.
pub async fn create_item(
    item: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(item) = item.map_err(|rejection| AppError::Validation(rejection.body_text()))?;

    Ok(Json(json!({
        "message": "Item created",
        "item": item,
    })))
}
