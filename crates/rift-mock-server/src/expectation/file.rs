//! Declarative expectations loaded from YAML or JSON.
//!
//! ```yaml
//! expectations:
//!   - method: GET
//!     path: /api/items
//!     status: 200
//!     body: {"items": []}
//!     headers:
//!       X-Mock: "true"
//!     times: 2          # omit to serve forever
//!   - path: /stream
//!     chunks: ["part-1", "part-2"]
//!   - path: /ws
//!     websocket:
//!       open: ["welcome"]
//!       replies:
//!         - on: ping
//!           emit: pong
//! ```

use super::ExpectationBuilder;
use crate::dispatch::ExpectationRegistry;
use crate::request::HttpMethod;
use crate::websocket::{SessionScript, WebSocketScriptBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExpectationFile {
    #[serde(default)]
    pub expectations: Vec<ExpectationSpec>,
}

/// Response body: plain text, or any other JSON value serialized as JSON.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ResponseBodySpec {
    Text(String),
    Json(serde_json::Value),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExpectationSpec {
    #[serde(default = "default_method")]
    pub method: HttpMethod,
    pub path: String,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<ResponseBodySpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Fragments of a chunked body; takes precedence over `body`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<Vec<String>>,
    /// Upgrade to a scripted WebSocket; takes precedence over `chunks`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub websocket: Option<WebSocketSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    /// Number of times to serve; `None` serves forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub times: Option<usize>,
}

fn default_method() -> HttpMethod {
    HttpMethod::Any
}

fn default_status() -> u16 {
    200
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WebSocketSpec {
    #[serde(default)]
    pub open: Vec<String>,
    #[serde(default)]
    pub timed: Vec<TimedMessageSpec>,
    #[serde(default)]
    pub replies: Vec<ReplySpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimedMessageSpec {
    pub delay_ms: u64,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReplySpec {
    pub on: String,
    pub emit: String,
    #[serde(default)]
    pub always: bool,
}

impl WebSocketSpec {
    pub fn to_script(&self) -> SessionScript {
        let mut builder = WebSocketScriptBuilder::new().open(self.open.iter().cloned());
        for timed in &self.timed {
            builder = builder
                .wait_for(Duration::from_millis(timed.delay_ms))
                .and_emit(timed.message.as_str());
        }
        for reply in &self.replies {
            let pending = builder.expect(reply.on.as_str()).and_emit(reply.emit.as_str());
            builder = if reply.always {
                pending.always()
            } else {
                pending.once()
            };
        }
        builder.build()
    }
}

impl ExpectationFile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let file = Self::from_yaml_str(&contents)?;
        info!(
            "Loaded {} expectation(s) from {}",
            file.expectations.len(),
            path.display()
        );
        Ok(file)
    }

    /// Parse YAML (or JSON, which YAML accepts) and validate.
    pub fn from_yaml_str(contents: &str) -> Result<Self, anyhow::Error> {
        let file: ExpectationFile = serde_yaml::from_str(contents)?;
        file.validate()?;
        Ok(file)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        for (index, spec) in self.expectations.iter().enumerate() {
            if !spec.path.starts_with('/') {
                anyhow::bail!(
                    "Expectation #{} has path '{}'; paths must start with '/'",
                    index,
                    spec.path
                );
            }
            if !(100..=599).contains(&spec.status) {
                anyhow::bail!(
                    "Expectation #{} has invalid status {}",
                    index,
                    spec.status
                );
            }
            if spec.times == Some(0) {
                anyhow::bail!("Expectation #{} has times: 0 and would never be served", index);
            }
        }
        Ok(())
    }

    /// Register every expectation with `registry`.
    pub fn register(&self, registry: &Arc<ExpectationRegistry>) -> Result<usize, anyhow::Error> {
        for spec in &self.expectations {
            spec.register(registry)?;
        }
        Ok(self.expectations.len())
    }
}

impl ExpectationSpec {
    fn register(&self, registry: &Arc<ExpectationRegistry>) -> Result<(), anyhow::Error> {
        let mut builder = ExpectationBuilder::new(Arc::clone(registry))
            .method(self.method)
            .with_path(self.path.as_str());

        builder = if let Some(websocket) = &self.websocket {
            builder.and_upgrade_to_websocket(websocket.to_script())
        } else if let Some(chunks) = &self.chunks {
            builder.and_return_chunked(self.status, chunks.iter().cloned())
        } else {
            match &self.body {
                Some(ResponseBodySpec::Text(text)) => builder.and_return(self.status, text.as_str()),
                Some(ResponseBodySpec::Json(value)) => builder.and_return_json(self.status, value)?,
                None => builder.and_return(self.status, ""),
            }
        };

        for (name, value) in &self.headers {
            builder = builder.with_header(name.as_str(), value.as_str());
        }
        if let Some(ms) = self.delay_ms {
            builder = builder.delay(Duration::from_millis(ms));
        }

        match self.times {
            Some(times) => builder.times(times),
            None => builder.always(),
        }
        Ok(())
    }
}
