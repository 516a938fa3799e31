pub mod logging;
pub mod reporting;

pub use logging::{request_log, RequestTiming, PROCESS_TIME_HEADER, REQUEST_ID_HEADER};
pub use reporting::{ErrorReporter, NoopReporter, ReportContext, ReportError};
