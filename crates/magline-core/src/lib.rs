//! Magline Core - shared infrastructure for the MAG harvesting pipeline
//!
//! Error taxonomy for remote calls, the retry policy applied around them,
//! HTTP client construction, logging and progress plumbing.

pub mod error;
pub mod http;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod shutdown;

// Re-exports for convenience
pub use error::{FailureKind, RequestError, RetryError};
pub use http::{DEFAULT_ENDPOINT, HttpConfig, SHARED_RUNTIME, build_client};
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use retry::{Backoff, RetryPolicy, RetryPredicate, retry_always, retry_transient};
pub use shutdown::{is_shutdown_requested, request_shutdown, shutdown_flag};
