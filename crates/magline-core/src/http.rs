//! HTTP client construction and the shared runtime behind blocking calls.
//!
//! Requests use async reqwest internally, but every call is driven to
//! completion with `block_on` so callers see a plain synchronous interface.

use std::sync::LazyLock;
use std::time::Duration;

/// Default Academic Knowledge evaluate endpoint
pub const DEFAULT_ENDPOINT: &str =
    "https://api.labs.cognitive.microsoft.com/academic/v1.0/evaluate";

/// Connection and timeout settings for the query endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpConfig {
    pub endpoint: String,
    /// Total time allowed for one request, response body included
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Build an async HTTP client honouring the configured timeouts.
pub fn build_client(config: &HttpConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.timeout)
        .pool_max_idle_per_host(1)
        .build()
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});
