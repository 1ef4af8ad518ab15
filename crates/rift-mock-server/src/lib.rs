// Library exports for tests and embedding

// ===== Request model and dispatching =====
pub mod dispatch;
pub mod request;
pub mod response;

// ===== Expectations and CRUD mode =====
pub mod crud;
pub mod expectation;

// ===== WebSocket sessions =====
pub mod websocket;

// ===== Hosting =====
pub mod config;
pub mod metrics;
pub mod server;

pub use config::MockServerConfig;
pub use crud::CrudStore;
pub use dispatch::{DispatchError, Dispatcher, ExpectationRegistry, MockDispatcher};
pub use expectation::{ExpectationBuilder, ExpectationFile};
pub use request::{HttpMethod, RecordedRequest, RequestKey};
pub use response::{MockResponse, ResponseEntry};
pub use server::{MockServer, ServerError};
pub use websocket::{SessionScript, WebSocketMessage, WebSocketSession};
