//! Configuration types for the mock server.

mod listen;
mod transport;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use listen::ListenConfig;
pub use transport::{ChunkedConfig, WebSocketConfig};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MockServerConfig {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub chunked: ChunkedConfig,
}

impl MockServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: MockServerConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.listen.host.trim().is_empty() {
            anyhow::bail!("'listen.host' must not be empty");
        }

        if self.chunked.max_chunk_size == 0 {
            anyhow::bail!("'chunked.max_chunk_size' must be greater than 0");
        }

        if self.websocket.close_timeout_ms == 0 {
            anyhow::bail!(
                "'websocket.close_timeout_ms' must be greater than 0; \
                 sessions would drop scheduled messages on every close"
            );
        }

        Ok(())
    }
}
