//! Request dispatching.
//!
//! A [`Dispatcher`] turns a [`RecordedRequest`] into a [`MockResponse`]. The
//! host layer owns one dispatcher per server:
//! - [`MockDispatcher`]: serves queued expectations from an [`ExpectationRegistry`]
//! - [`crate::crud::CrudStore`]: an in-memory resource store keyed by attributes

mod mock;
mod registry;

pub use mock::MockDispatcher;
pub use registry::ExpectationRegistry;

use crate::request::RecordedRequest;
use crate::response::MockResponse;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Malformed JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("Malformed JSON patch: {0}")]
    MalformedPatch(#[from] json_patch::PatchError),
}

pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, request: &RecordedRequest) -> Result<MockResponse, DispatchError>;

    /// Label used in logs and metrics.
    fn name(&self) -> &'static str {
        "custom"
    }
}
