//! WebSocket and chunked transfer settings.

use crate::response::DEFAULT_MAX_CHUNK_SIZE;
use crate::websocket::SessionConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebSocketConfig {
    /// How long a graceful close waits for scheduled messages
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

fn default_close_timeout_ms() -> u64 {
    60_000
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            close_timeout_ms: default_close_timeout_ms(),
        }
    }
}

impl WebSocketConfig {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            close_timeout: self.close_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkedConfig {
    /// Largest chunk written for a chunked body, in bytes
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
}

fn default_max_chunk_size() -> usize {
    DEFAULT_MAX_CHUNK_SIZE
}

impl Default for ChunkedConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
        }
    }
}
