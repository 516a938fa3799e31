#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use reqlog::config::{LogFormat, Settings};
use reqlog::logging::sink_layer;
use serde_json::Value;
use tower::ServiceExt; // For oneshot
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

pub const MIDDLEWARE_LOGGER: &str = "reqlog::middleware::logging";

/// In-memory log sink shared with the subscriber.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    pub fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Every record, parsed. Only meaningful for JSON capture.
    pub fn records(&self) -> Vec<Value> {
        self.lines()
            .iter()
            .map(|line| serde_json::from_str(line).expect("record is not JSON"))
            .collect()
    }

    /// Records emitted by the request log middleware.
    pub fn middleware_records(&self) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|record| record["logger_name"] == MIDDLEWARE_LOGGER)
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

/// Route this thread's records into a buffer for the guard's lifetime.
pub fn capture_logs(format: LogFormat) -> (Captured, DefaultGuard) {
    let captured = Captured::default();
    let subscriber =
        tracing_subscriber::registry().with(sink_layer::<Registry, _>(format, captured.clone()));
    let guard = tracing::subscriber::set_default(subscriber);
    (captured, guard)
}

pub fn test_settings() -> Arc<Settings> {
    Arc::new(Settings::default())
}

pub fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

pub async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.expect("Failed to send request")
}

pub async fn body_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");
    serde_json::from_slice(&body).expect("Body is not JSON")
}

pub async fn status_and_json(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = send(app, request).await;
    let status = response.status();
    (status, body_json(response).await)
}
