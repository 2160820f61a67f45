//! Error types for remote query attempts and retry outcomes

/// Failure of a single request attempt against the query endpoint.
#[derive(Debug)]
pub enum RequestError {
    /// Transport failure or non-success status (status is `None` when the
    /// request never produced a response)
    Http {
        status: Option<u16>,
        message: String,
    },
    /// Connect or total request timeout
    Timeout(String),
    /// Response body was not the expected JSON
    Decode(String),
}

/// Coarse classification of a [`RequestError`], used by retry predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Transport,
    Timeout,
    /// 4xx response
    ClientStatus(u16),
    /// 5xx (or any other non-4xx, non-success) response
    ServerStatus(u16),
    Decode,
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Timeout(message) => write!(f, "timed out: {message}"),
            Self::Decode(message) => write!(f, "invalid response: {message}"),
        }
    }
}

impl std::error::Error for RequestError {}

impl RequestError {
    /// Create an error from a reqwest failure
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        let message = e.to_string();
        if e.is_timeout() {
            return Self::Timeout(message);
        }
        if e.is_decode() {
            return Self::Decode(message);
        }
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Http { status: None, .. } => FailureKind::Transport,
            Self::Http {
                status: Some(s @ 400..=499),
                ..
            } => FailureKind::ClientStatus(*s),
            Self::Http {
                status: Some(s), ..
            } => FailureKind::ServerStatus(*s),
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Decode(_) => FailureKind::Decode,
        }
    }
}

/// Outcome of a call that failed under a [`RetryPolicy`](crate::RetryPolicy).
#[derive(Debug)]
pub enum RetryError {
    /// Every allowed attempt failed; carries the last cause
    Exhausted { attempts: u32, last: RequestError },
    /// The policy declined to retry this failure
    Rejected { attempt: u32, cause: RequestError },
}

impl std::fmt::Display for RetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhausted { attempts, last } => {
                write!(f, "gave up after {attempts} attempts: {last}")
            }
            Self::Rejected { attempt, cause } => {
                write!(f, "not retryable (attempt {attempt}): {cause}")
            }
        }
    }
}

impl std::error::Error for RetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause())
    }
}

impl RetryError {
    /// The underlying failure of the final attempt.
    pub fn cause(&self) -> &RequestError {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Rejected { cause, .. } => cause,
        }
    }

    /// Number of attempts that were made.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Rejected { attempt, .. } => *attempt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_err(status: u16) -> RequestError {
        RequestError::Http {
            status: Some(status),
            message: "test".to_string(),
        }
    }

    #[test]
    fn kind_client_status() {
        assert_eq!(http_err(400).kind(), FailureKind::ClientStatus(400));
        assert_eq!(http_err(429).kind(), FailureKind::ClientStatus(429));
    }

    #[test]
    fn kind_server_status() {
        assert_eq!(http_err(500).kind(), FailureKind::ServerStatus(500));
        assert_eq!(http_err(503).kind(), FailureKind::ServerStatus(503));
    }

    #[test]
    fn kind_without_status_is_transport() {
        let err = RequestError::Http {
            status: None,
            message: "connection refused".to_string(),
        };
        assert_eq!(err.kind(), FailureKind::Transport);
    }

    #[test]
    fn kind_timeout_and_decode() {
        assert_eq!(
            RequestError::Timeout("60s".into()).kind(),
            FailureKind::Timeout
        );
        assert_eq!(
            RequestError::Decode("eof".into()).kind(),
            FailureKind::Decode
        );
    }

    #[test]
    fn display_http_with_status() {
        assert_eq!(format!("{}", http_err(404)), "HTTP 404: test");
    }

    #[test]
    fn display_http_without_status() {
        let err = RequestError::Http {
            status: None,
            message: "reset".to_string(),
        };
        assert_eq!(format!("{err}"), "HTTP error: reset");
    }

    #[test]
    fn retry_error_carries_last_cause() {
        let err = RetryError::Exhausted {
            attempts: 10,
            last: http_err(503),
        };
        assert_eq!(err.attempts(), 10);
        assert_eq!(err.cause().kind(), FailureKind::ServerStatus(503));
        assert_eq!(format!("{err}"), "gave up after 10 attempts: HTTP 503: test");
    }

    #[test]
    fn retry_error_rejected_display() {
        let err = RetryError::Rejected {
            attempt: 1,
            cause: http_err(400),
        };
        assert!(format!("{err}").contains("not retryable"));
        assert_eq!(err.attempts(), 1);
    }
}
