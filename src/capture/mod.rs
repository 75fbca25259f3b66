//! Observation of API traffic during a test case

mod counter;
mod traffic;

pub use counter::{
    InFlightCounter, SettleDelay, DEFAULT_RECORD_SETTLE_MS, DEFAULT_REPLAY_SETTLE_MS,
};
pub use traffic::TrafficCapture;

use serde_json::Value;

/// One completed request as reported by the interception layer
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    /// HTTP method
    pub method: String,
    /// Absolute request URL
    pub url: String,
    /// Response status code
    pub status: u16,
    /// Request body, `null` if none
    pub request_body: Value,
    /// Response body, `null` if none
    pub response_body: Value,
}

impl Exchange {
    /// Exchange without bodies
    pub fn new(method: impl Into<String>, url: impl Into<String>, status: u16) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            status,
            request_body: Value::Null,
            response_body: Value::Null,
        }
    }

    /// Set the request body
    #[must_use]
    pub fn with_request_body(mut self, body: Value) -> Self {
        self.request_body = body;
        self
    }

    /// Set the response body
    #[must_use]
    pub fn with_response_body(mut self, body: Value) -> Self {
        self.response_body = body;
        self
    }
}

/// Request lifecycle hook driven by the interception layer
///
/// Every `on_request_start` must be followed by exactly one
/// `on_request_end` for the same request.
pub trait RequestObserver: Send + Sync {
    /// A request was sent
    fn on_request_start(&self);

    /// A response arrived
    fn on_request_end(&self, exchange: &Exchange);
}
