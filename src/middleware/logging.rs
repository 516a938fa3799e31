// src/middleware/logging.rs
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Query, Request, State},
    http::{header::USER_AGENT, HeaderValue},
    middleware::Next,
    response::Response,
};
use once_cell::sync::Lazy;
use serde_json::{json, Value};

use super::reporting::{self, ReportContext};
use crate::error::HandlerFailure;
use crate::logging::{context, get_logger, trace, Context, Logger, TraceContext};
use crate::server::AppState;

pub const PROCESS_TIME_HEADER: &str = "x-process-time";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const UNKNOWN: &str = "unknown";
const NO_REQUEST_ID: &str = "none";

static LOGGER: Lazy<Logger> = Lazy::new(|| get_logger(module_path!()));

/// What the middleware knows about one in-flight request.
#[derive(Debug, Clone)]
pub struct RequestTiming {
    start: Instant,
    pub method: String,
    pub path: String,
    pub query_params: HashMap<String, String>,
    pub client_ip: String,
    pub user_agent: String,
    pub request_id: String,
}

impl RequestTiming {
    pub fn capture(req: &Request) -> Self {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };

        Self {
            start: Instant::now(),
            method: req.method().to_string(),
            path: req.uri().path().to_string(),
            query_params: Query::<HashMap<String, String>>::try_from_uri(req.uri())
                .map(|Query(params)| params)
                .unwrap_or_default(),
            client_ip: req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            user_agent: header(USER_AGENT.as_str()).unwrap_or_else(|| UNKNOWN.to_string()),
            request_id: header(REQUEST_ID_HEADER).unwrap_or_else(|| NO_REQUEST_ID.to_string()),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn entry_context(&self) -> Context {
        context([
            ("method", self.method.clone().into()),
            ("path", self.path.clone().into()),
            ("query_params", json!(self.query_params)),
            ("client_ip", self.client_ip.clone().into()),
            ("user_agent", self.user_agent.clone().into()),
            ("request_id", self.request_id.clone().into()),
        ])
    }

    fn report_context(&self) -> ReportContext {
        ReportContext {
            method: self.method.clone(),
            path: self.path.clone(),
            query_params: self.query_params.clone(),
            client_ip: self.client_ip.clone(),
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

/// Elapsed milliseconds, two decimals.
pub fn process_time_ms(elapsed: Duration) -> f64 {
    round_to(elapsed.as_secs_f64() * 1000.0, 2)
}

/// Elapsed seconds, four decimals, as sent in `X-Process-Time`.
pub fn process_time_header(elapsed: Duration) -> String {
    format!("{:.4}", round_to(elapsed.as_secs_f64(), 4))
}

/// Logs every request on the way in and on the way out.
///
/// A response carrying a [`HandlerFailure`] takes the failure path: the
/// failure is reported, logged at ERROR and the response goes back untouched.
/// Every other response is logged at INFO and gets `X-Process-Time`.
pub async fn request_log(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let timing = RequestTiming::capture(&req);
    let trace_context = TraceContext::from_headers(req.headers());

    trace::scope(trace_context, async move {
        LOGGER.info("Incoming request", &timing.entry_context());

        let response = next.run(req).await;

        match HandlerFailure::of(&response) {
            None => on_success(&timing, response),
            Some(failure) => {
                on_failure(&state, &timing, failure);
                response
            }
        }
    })
    .await
}

fn on_success(timing: &RequestTiming, mut response: Response) -> Response {
    let elapsed = timing.elapsed();

    LOGGER.info(
        "Request completed",
        &context([
            ("method", timing.method.clone().into()),
            ("path", timing.path.clone().into()),
            ("status_code", response.status().as_u16().into()),
            ("process_time_ms", process_time_ms(elapsed).into()),
            ("client_ip", timing.client_ip.clone().into()),
        ]),
    );

    if let Ok(value) = HeaderValue::from_str(&process_time_header(elapsed)) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }
    response
}

fn on_failure(state: &AppState, timing: &RequestTiming, failure: &HandlerFailure) {
    let elapsed = timing.elapsed();

    if let Err(err) = reporting::report(state.reporter.as_ref(), failure, &timing.report_context())
    {
        LOGGER.warning(
            format!("Error reporting failed: {err}"),
            &context([
                ("method", timing.method.clone().into()),
                ("path", timing.path.clone().into()),
            ]),
        );
    }

    let mut fields = context([
        ("method", timing.method.clone().into()),
        ("path", timing.path.clone().into()),
        ("error_type", failure.kind.clone().into()),
        ("error_message", failure.message.clone().into()),
        ("process_time_ms", process_time_ms(elapsed).into()),
        ("client_ip", timing.client_ip.clone().into()),
    ]);
    if !failure.chain.is_empty() {
        fields.insert("error_chain".into(), json!(failure.chain));
    }
    if let Some(backtrace) = &failure.backtrace {
        fields.insert("backtrace".into(), Value::String(backtrace.clone()));
    }

    LOGGER.error("Request failed", &fields);
}
