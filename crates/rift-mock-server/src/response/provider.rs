//! Pluggable response content.

use crate::request::RecordedRequest;
use std::fmt;

/// Supplies status, headers and (possibly request-dependent) body text.
pub trait ResponseProvider: Send + Sync {
    fn status_code(&self) -> u16;

    fn body(&self, request: &RecordedRequest) -> String;

    fn headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Always answers with the same status, body and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedResponseProvider {
    status_code: u16,
    body: String,
    headers: Vec<(String, String)>,
}

impl FixedResponseProvider {
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: body.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }
}

impl ResponseProvider for FixedResponseProvider {
    fn status_code(&self) -> u16 {
        self.status_code
    }

    fn body(&self, _request: &RecordedRequest) -> String {
        self.body.clone()
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.headers.clone()
    }
}

/// Computes the body from the incoming request on every call.
pub struct FnResponseProvider<F> {
    status_code: u16,
    body_fn: F,
    headers: Vec<(String, String)>,
}

impl<F> FnResponseProvider<F>
where
    F: Fn(&RecordedRequest) -> String + Send + Sync,
{
    pub fn new(status_code: u16, body_fn: F) -> Self {
        Self {
            status_code,
            body_fn,
            headers: Vec::new(),
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }
}

impl<F> ResponseProvider for FnResponseProvider<F>
where
    F: Fn(&RecordedRequest) -> String + Send + Sync,
{
    fn status_code(&self) -> u16 {
        self.status_code
    }

    fn body(&self, request: &RecordedRequest) -> String {
        (self.body_fn)(request)
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.headers.clone()
    }
}

impl<F> fmt::Debug for FnResponseProvider<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnResponseProvider")
            .field("status_code", &self.status_code)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
