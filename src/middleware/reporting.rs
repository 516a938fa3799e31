// src/middleware/reporting.rs
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use thiserror::Error;

use crate::error::HandlerFailure;

/// Request details sent along with a reported failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportContext {
    pub method: String,
    pub path: String,
    pub query_params: HashMap<String, String>,
    pub client_ip: String,
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("error tracker rejected the report: {0}")]
    Rejected(String),

    #[error("error tracker panicked: {0}")]
    Panicked(String),
}

/// External error-tracking service.
pub trait ErrorReporter: Send + Sync {
    fn capture(&self, failure: &HandlerFailure, context: &ReportContext) -> Result<(), ReportError>;
}

/// Used when no error tracker is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ErrorReporter for NoopReporter {
    fn capture(&self, _: &HandlerFailure, _: &ReportContext) -> Result<(), ReportError> {
        Ok(())
    }
}

/// Call `reporter`, turning a panic inside it into a [`ReportError`].
pub fn report(
    reporter: &dyn ErrorReporter,
    failure: &HandlerFailure,
    context: &ReportContext,
) -> Result<(), ReportError> {
    catch_unwind(AssertUnwindSafe(|| reporter.capture(failure, context))).unwrap_or_else(
        |payload| {
            Err(ReportError::Panicked(
                HandlerFailure::from_panic(payload.as_ref()).message,
            ))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rejecting;

    impl ErrorReporter for Rejecting {
        fn capture(&self, _: &HandlerFailure, _: &ReportContext) -> Result<(), ReportError> {
            Err(ReportError::Rejected("quota exceeded".into()))
        }
    }

    struct Exploding;

    impl ErrorReporter for Exploding {
        fn capture(&self, _: &HandlerFailure, _: &ReportContext) -> Result<(), ReportError> {
            panic!("tracker crashed")
        }
    }

    fn failure() -> HandlerFailure {
        HandlerFailure {
            kind: "Boom".into(),
            message: "boom".into(),
            chain: vec![],
            backtrace: None,
        }
    }

    fn context() -> ReportContext {
        ReportContext {
            method: "GET".into(),
            path: "/".into(),
            query_params: HashMap::new(),
            client_ip: "unknown".into(),
        }
    }

    #[test]
    fn test_noop_reporter_succeeds() {
        assert!(report(&NoopReporter, &failure(), &context()).is_ok());
    }

    #[test]
    fn test_rejection_is_returned() {
        let err = report(&Rejecting, &failure(), &context()).unwrap_err();
        assert!(matches!(err, ReportError::Rejected(_)));
    }

    #[test]
    fn test_panic_is_contained() {
        let err = report(&Exploding, &failure(), &context()).unwrap_err();
        match err {
            ReportError::Panicked(message) => assert_eq!(message, "tracker crashed"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
