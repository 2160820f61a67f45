//! Remote query client for the evaluate endpoint
//!
//! [`Transport`] performs exactly one request; [`QueryClient`] applies the
//! retry policy around it. The split keeps the retry behaviour testable
//! against a scripted transport.

use magline_core::{HttpConfig, RequestError, RetryError, RetryPolicy, SHARED_RUNTIME};
use serde::Deserialize;

use crate::expr::Expression;

/// One raw entity as returned by the service, keyed by field code.
pub type Record = serde_json::Map<String, serde_json::Value>;

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// One response page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryPage {
    /// Expression echoed back by the service
    #[serde(default)]
    pub expr: String,
    #[serde(default)]
    pub entities: Vec<Record>,
}

/// Parameters of a single evaluate call.
#[derive(Debug, Clone, Copy)]
pub struct EvaluateRequest<'a> {
    pub expression: &'a Expression,
    pub attributes: &'a [String],
    pub count: usize,
    pub offset: usize,
    pub subscription_key: &'a str,
}

impl EvaluateRequest<'_> {
    /// URL-form body fields: `expr`, `count`, `offset`, `attributes`.
    pub fn form_params(&self) -> [(&'static str, String); 4] {
        [
            ("expr", self.expression.query().to_string()),
            ("count", self.count.to_string()),
            ("offset", self.offset.to_string()),
            ("attributes", self.attributes.join(",")),
        ]
    }
}

/// Performs one evaluate request, without retry.
pub trait Transport {
    fn evaluate(&self, request: &EvaluateRequest<'_>) -> Result<QueryPage, RequestError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn evaluate(&self, request: &EvaluateRequest<'_>) -> Result<QueryPage, RequestError> {
        (**self).evaluate(request)
    }
}

/// HTTP transport: form-encoded POST, JSON response.
#[derive(Debug, Clone)]
pub struct EvaluateClient {
    http: reqwest::Client,
    endpoint: String,
}

impl EvaluateClient {
    pub fn new(config: &HttpConfig) -> Result<Self, RequestError> {
        let http = magline_core::build_client(config).map_err(|e| RequestError::from_reqwest(&e))?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
        })
    }
}

impl Transport for EvaluateClient {
    fn evaluate(&self, request: &EvaluateRequest<'_>) -> Result<QueryPage, RequestError> {
        let body: Result<String, reqwest::Error> = SHARED_RUNTIME.handle().block_on(async {
            let resp = self
                .http
                .post(&self.endpoint)
                .header(SUBSCRIPTION_KEY_HEADER, request.subscription_key)
                .form(&request.form_params())
                .send()
                .await?
                .error_for_status()?;
            resp.text().await
        });
        let body = body.map_err(|e| RequestError::from_reqwest(&e))?;
        parse_page(&body)
    }
}

/// Decode a response body into a page.
pub fn parse_page(body: &str) -> Result<QueryPage, RequestError> {
    serde_json::from_str(body).map_err(|e| RequestError::Decode(e.to_string()))
}

/// Transport plus credential plus retry policy.
#[derive(Debug)]
pub struct QueryClient<T> {
    transport: T,
    subscription_key: String,
    retry: RetryPolicy,
}

impl<T: Transport> QueryClient<T> {
    pub fn new(transport: T, subscription_key: impl Into<String>) -> Self {
        Self {
            transport,
            subscription_key: subscription_key.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch one page, retrying transient failures per the policy.
    pub fn query(
        &self,
        expression: &Expression,
        attributes: &[String],
        count: usize,
        offset: usize,
    ) -> Result<QueryPage, RetryError> {
        let request = EvaluateRequest {
            expression,
            attributes,
            count,
            offset,
            subscription_key: &self.subscription_key,
        };
        let label = format!("evaluate offset={offset}");
        self.retry.run(&label, |_| self.transport.evaluate(&request))
    }
}
