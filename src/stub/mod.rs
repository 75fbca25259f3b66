//! Interception routes for record and replay
//!
//! The interception transport itself lives outside this crate; it is reached
//! through the [`Interceptor`] trait.

mod installer;

pub use installer::{compile_patterns, replay_stubs, ReplayPlan, StubInstaller};

use regex::Regex;
use serde_json::Value;

use crate::Result;

/// Methods routed through unchanged while recording
pub const PASSTHROUGH_METHODS: [&str; 4] = ["GET", "POST", "PUT", "DELETE"];

/// Route that lets matching traffic reach the backend while making it observable
#[derive(Debug, Clone)]
pub struct PassthroughRoute {
    /// HTTP method
    pub method: &'static str,
    /// URL pattern
    pub pattern: Regex,
}

/// Canned response for one method and absolute URL
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseStub {
    /// HTTP method to match
    pub method: String,
    /// Absolute URL to match
    pub url: String,
    /// Status to respond with
    pub status: u16,
    /// Body to respond with
    pub body: Value,
}

/// Upstream interception API
pub trait Interceptor {
    /// Observe matching requests without altering them
    ///
    /// # Errors
    ///
    /// Returns error if the transport rejects the route
    fn route_passthrough(&mut self, route: PassthroughRoute) -> Result<()>;

    /// Answer matching requests with a fixed response
    ///
    /// # Errors
    ///
    /// Returns error if the transport rejects the stub
    fn install_stub(&mut self, stub: ResponseStub) -> Result<()>;
}
