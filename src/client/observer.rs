//! Hook for reporting failed requests.

use reqwest::Method;
use serde_json::Value;
use tracing::error;

/// A request that ended in an error, as seen by an [`Observer`].
pub struct Failure<'a> {
    pub method: &'a Method,
    pub url: &'a str,
    /// JSON body sent with the request, if any.
    pub payload: Option<&'a Value>,
    /// Response body as received, when the server answered with a non-success status.
    pub raw_body: Option<&'a str>,
    pub error: &'a dyn std::fmt::Display,
}

pub trait Observer: Send + Sync {
    fn request_failed(&self, failure: &Failure<'_>);
}

/// Reports failures through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn request_failed(&self, failure: &Failure<'_>) {
        error!(
            message = "Request failed",
            method = %failure.method,
            url = failure.url,
            payload = ?failure.payload,
            response = ?failure.raw_body,
            error = %failure.error,
        );
    }
}
