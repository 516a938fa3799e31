// src/error.rs
use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::RefCell;
use std::panic;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use once_cell::sync::OnceCell;
use serde_json::json;
use thiserror::Error;

/// Errors returned by route handlers.
///
/// `Http` and `Validation` are handled outcomes: they become a normal error
/// response. `Internal` is an unhandled failure: besides the 500 response it
/// marks the response with a [`HandlerFailure`] for the request log
/// middleware. The placeholder routes never fail this way; `Internal` is for
/// handlers backed by storage or upstream calls.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{detail}")]
    Http { status: StatusCode, detail: String },

    #[error("{0}")]
    Validation(String),

    #[error("{error}")]
    Internal {
        kind: &'static str,
        error: anyhow::Error,
    },
}

impl AppError {
    pub fn http(status: StatusCode, detail: impl Into<String>) -> Self {
        AppError::Http {
            status,
            detail: detail.into(),
        }
    }

    /// Wrap an unexpected error, remembering its type name.
    pub fn internal<E>(error: E) -> Self
    where
        E: Into<anyhow::Error> + 'static,
    {
        AppError::Internal {
            kind: short_type_name::<E>(),
            error: error.into(),
        }
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    // Drop the module path but keep generic arguments intact.
    let base_end = full.find('<').unwrap_or(full.len());
    let start = full[..base_end].rfind("::").map_or(0, |i| i + 2);
    &full[start..]
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Http { status, detail } => {
                (status, Json(json!({ "detail": detail }))).into_response()
            }
            AppError::Validation(detail) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "detail": detail })),
            )
                .into_response(),
            AppError::Internal { kind, error } => {
                let mut response = (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "detail": "Internal Server Error" })),
                )
                    .into_response();
                response
                    .extensions_mut()
                    .insert(HandlerFailure::from_error(kind, &error));
                response
            }
        }
    }
}

/// An unhandled handler failure, carried on the response it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub kind: String,
    pub message: String,
    /// Messages of the error and its causes, outermost first.
    pub chain: Vec<String>,
    pub backtrace: Option<String>,
}

impl HandlerFailure {
    /// Uses the backtrace anyhow captured, or takes one here when
    /// `RUST_BACKTRACE` left capture disabled.
    pub fn from_error(kind: &str, error: &anyhow::Error) -> Self {
        let captured = error.backtrace();
        let backtrace = if captured.status() == BacktraceStatus::Captured {
            captured.to_string()
        } else {
            Backtrace::force_capture().to_string()
        };

        Self {
            kind: kind.to_string(),
            message: error.to_string(),
            chain: error.chain().map(ToString::to_string).collect(),
            backtrace: Some(backtrace),
        }
    }

    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic with a non-string payload".to_string());

        Self {
            kind: "panic".to_string(),
            message,
            chain: Vec::new(),
            backtrace: None,
        }
    }

    /// The failure recorded on `response`, if the handler failed.
    pub fn of(response: &Response) -> Option<&HandlerFailure> {
        response.extensions().get::<HandlerFailure>()
    }
}

thread_local! {
    static PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: OnceCell<()> = OnceCell::new();

/// Keep the backtrace of the latest panic on each thread so
/// [`panic_response`] can attach it. The previous hook still runs.
/// Installing more than once is a no-op.
pub fn install_panic_hook() {
    PANIC_HOOK.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture().to_string();
            let _ = PANIC_BACKTRACE.try_with(|slot| *slot.borrow_mut() = Some(backtrace));
            previous(info);
        }));
    });
}

// The panic is caught on the thread that raised it, so the hook's slot is
// still there when the response is built.
fn take_panic_backtrace() -> Option<String> {
    PANIC_BACKTRACE.with(|slot| slot.borrow_mut().take())
}

/// Response for a handler that panicked. Installed through
/// `CatchPanicLayer::custom`.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let mut failure = HandlerFailure::from_panic(payload.as_ref());
    failure.backtrace = take_panic_backtrace();

    let mut response = (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": "Internal Server Error" })),
    )
        .into_response();
    response.extensions_mut().insert(failure);
    response
}
