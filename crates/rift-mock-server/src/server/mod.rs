//! HTTP host for a [`Dispatcher`].
//!
//! ## Module Structure
//!
//! - `handler`: hyper request/response conversion around a dispatch
//! - `upgrade`: WebSocket handshake and the connection ↔ session bridge

mod handler;
mod upgrade;

pub use handler::{build_response, HttpBody, ServerContext};
pub use upgrade::{accept_key, is_websocket_upgrade};

use crate::config::MockServerConfig;
use crate::crud::{AttributeExtractor, CrudStore, ResponseComposer};
use crate::dispatch::{Dispatcher, ExpectationRegistry, MockDispatcher};
use crate::expectation::ExpectationBuilder;
use handler::handle_request;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Server is already running on {0}")]
    AlreadyStarted(SocketAddr),
    #[error("Failed to bind {0}: {1}")]
    BindError(String, std::io::Error),
}

struct Running {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// A mock server: one listener, one dispatcher.
///
/// In expectation mode (the default) [`expect`](Self::expect) registers
/// responses; in CRUD mode requests are answered by a [`CrudStore`].
pub struct MockServer {
    config: MockServerConfig,
    context: Arc<ServerContext>,
    registry: Option<Arc<ExpectationRegistry>>,
    crud: Option<Arc<CrudStore>>,
    running: Mutex<Option<Running>>,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    /// Expectation-mode server on an ephemeral localhost port.
    pub fn new() -> Self {
        Self::with_config(MockServerConfig::default())
    }

    /// Expectation-mode server.
    pub fn with_config(config: MockServerConfig) -> Self {
        let registry = Arc::new(ExpectationRegistry::new());
        let dispatcher = MockDispatcher::new(Arc::clone(&registry))
            .with_session_config(config.websocket.session_config());
        let mut server = Self::with_dispatcher(config, Arc::new(dispatcher));
        server.registry = Some(registry);
        server
    }

    /// CRUD-mode server backed by a fresh [`CrudStore`].
    pub fn crud(
        config: MockServerConfig,
        extractor: Arc<dyn AttributeExtractor>,
        composer: Arc<dyn ResponseComposer>,
    ) -> Self {
        let store = Arc::new(CrudStore::new(extractor, composer));
        let mut server = Self::with_dispatcher(config, Arc::clone(&store) as Arc<dyn Dispatcher>);
        server.crud = Some(store);
        server
    }

    /// Server answering every request with `dispatcher`.
    pub fn with_dispatcher(config: MockServerConfig, dispatcher: Arc<dyn Dispatcher>) -> Self {
        let context = Arc::new(ServerContext::new(dispatcher, config.chunked.max_chunk_size));
        Self {
            config,
            context,
            registry: None,
            crud: None,
            running: Mutex::new(None),
        }
    }

    /// Bind the listener and start accepting connections.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        if let Some(addr) = self.local_addr() {
            return Err(ServerError::AlreadyStarted(addr));
        }

        let address = self.config.listen.address();
        let listener = TcpListener::bind(address.as_str())
            .await
            .map_err(|e| ServerError::BindError(address.clone(), e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(address.clone(), e))?;

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let context = Arc::clone(&self.context);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer)) => {
                                let context = Arc::clone(&context);
                                tokio::spawn(async move {
                                    let io = TokioIo::new(stream);
                                    let service = service_fn(move |req| {
                                        handle_request(req, Arc::clone(&context))
                                    });
                                    if let Err(e) = http1::Builder::new()
                                        .serve_connection(io, service)
                                        .with_upgrades()
                                        .await
                                    {
                                        debug!("Connection error from {}: {}", peer, e);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Accept error on {}: {}", addr, e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Mock server on {} shutting down", addr);
                        break;
                    }
                }
            }
        });

        let mut running = self.running.lock();
        if let Some(existing) = running.as_ref() {
            let existing = existing.addr;
            handle.abort();
            return Err(ServerError::AlreadyStarted(existing));
        }
        *running = Some(Running {
            addr,
            shutdown_tx,
            handle,
        });
        info!("Mock server listening on {}", addr);
        Ok(addr)
    }

    /// Stop accepting connections. Connections already open finish on their own.
    pub async fn shutdown(&self) {
        let running = self.running.lock().take();
        if let Some(running) = running {
            let _ = running.shutdown_tx.send(());
            if let Err(e) = running.handle.await {
                debug!("Accept loop ended abnormally: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|r| r.addr)
    }

    /// Bound port, or 0 before [`start`](Self::start).
    pub fn port(&self) -> u16 {
        self.local_addr().map_or(0, |addr| addr.port())
    }

    pub fn host_name(&self) -> &str {
        &self.config.listen.host
    }

    /// `http://host:port` followed by `path`.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.host_name(), self.port(), path)
    }

    /// Requests received since construction.
    pub fn request_count(&self) -> u64 {
        self.context.request_count.load(Ordering::Relaxed)
    }

    pub fn registry(&self) -> Option<&Arc<ExpectationRegistry>> {
        self.registry.as_ref()
    }

    /// Store behind a CRUD-mode server.
    pub fn crud_store(&self) -> Option<&Arc<CrudStore>> {
        self.crud.as_ref()
    }

    /// Start an expectation; `None` for servers without a registry.
    pub fn expect(&self) -> Option<ExpectationBuilder> {
        self.registry
            .as_ref()
            .map(|registry| ExpectationBuilder::new(Arc::clone(registry)))
    }

    pub fn config(&self) -> &MockServerConfig {
        &self.config
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            let _ = running.shutdown_tx.send(());
        }
    }
}
