//! In-memory resource store answering CRUD verbs.

use super::attribute_set::AttributeSet;
use super::composer::{JsonListComposer, ResponseComposer};
use super::extractor::{AttributeExtractor, JsonAttributeExtractor};
use crate::dispatch::{DispatchError, Dispatcher};
use crate::metrics;
use crate::request::RecordedRequest;
use crate::response::MockResponse;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredResource {
    key: AttributeSet,
    body: String,
}

/// Resources keyed by the attributes of their path and body.
///
/// Each verb runs its whole read-modify-write under one lock. Resources keep
/// insertion order, so composed GET bodies list them oldest first.
pub struct CrudStore {
    resources: Mutex<Vec<StoredResource>>,
    extractor: Arc<dyn AttributeExtractor>,
    composer: Arc<dyn ResponseComposer>,
}

impl Default for CrudStore {
    fn default() -> Self {
        Self::new(Arc::new(JsonAttributeExtractor), Arc::new(JsonListComposer))
    }
}

impl CrudStore {
    pub fn new(extractor: Arc<dyn AttributeExtractor>, composer: Arc<dyn ResponseComposer>) -> Self {
        Self {
            resources: Mutex::new(Vec::new()),
            extractor,
            composer,
        }
    }

    /// Store `body` under the attributes of `path` and `body`; 202 echoing the body.
    pub fn handle_create(&self, path: &str, body: &str) -> MockResponse {
        let key = self.features(path, body);
        debug!("CRUD create {}", key);
        let mut resources = self.resources.lock();
        upsert(&mut resources, key, body.to_string());
        MockResponse::new(202).with_body(body.to_string())
    }

    /// Apply a JSON Patch document to each resource `path` selects.
    ///
    /// Every matched resource is patched on its own and re-keyed from its
    /// updated body. Parse or apply failures on any of them leave the store
    /// untouched.
    pub fn handle_patch(&self, path: &str, patch: &str) -> Result<MockResponse, DispatchError> {
        let query = self.extractor.from_path(path);
        let mut resources = self.resources.lock();

        let matched: Vec<&StoredResource> =
            resources.iter().filter(|r| r.key.matches(&query)).collect();
        if matched.is_empty() {
            return Ok(MockResponse::not_found());
        }

        let patch: json_patch::Patch = serde_json::from_str(patch)?;
        let requested = query.present_only();
        let mut updated = Vec::with_capacity(matched.len());
        for resource in matched {
            let mut document: serde_json::Value = serde_json::from_str(&resource.body)?;
            json_patch::patch(&mut document, &patch.0)?;
            let body = serde_json::to_string(&document)?;

            let carried = resource
                .key
                .without_keys_of(&self.extractor.from_resource(&resource.body));
            let key = AttributeSet::merge([
                &carried,
                &requested,
                &self.extractor.from_resource(&body),
            ])
            .present_only();
            updated.push(StoredResource { key, body });
        }

        resources.retain(|r| !r.key.matches(&query));
        let bodies: Vec<String> = updated.iter().map(|r| r.body.clone()).collect();
        for resource in updated {
            debug!("CRUD patch {} -> {}", query, resource.key);
            upsert(&mut resources, resource.key, resource.body);
        }

        let body = match bodies.as_slice() {
            [single] => single.clone(),
            _ => self.composer.compose(&bodies),
        };
        Ok(MockResponse::new(202).with_body(body))
    }

    /// 404 on no match, the body on one match, a composed body otherwise.
    pub fn handle_get(&self, path: &str) -> MockResponse {
        let query = self.extractor.from_path(path);
        let resources = self.resources.lock();
        match self.lookup(&resources, &query) {
            Some(body) => MockResponse::new(200).with_body(body),
            None => MockResponse::not_found(),
        }
    }

    /// Remove every resource `path` selects; 404 when nothing matched.
    pub fn handle_delete(&self, path: &str) -> MockResponse {
        let query = self.extractor.from_path(path);
        let mut resources = self.resources.lock();
        let before = resources.len();
        resources.retain(|r| !r.key.matches(&query));
        let removed = before - resources.len();
        debug!("CRUD delete {} removed {}", query, removed);
        if removed == 0 {
            MockResponse::not_found()
        } else {
            MockResponse::new(200)
        }
    }

    pub fn len(&self) -> usize {
        self.resources.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.lock().is_empty()
    }

    /// Stored keys and bodies in insertion order.
    pub fn snapshot(&self) -> Vec<(AttributeSet, String)> {
        self.resources
            .lock()
            .iter()
            .map(|r| (r.key.clone(), r.body.clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.resources.lock().clear();
    }

    fn features(&self, path: &str, body: &str) -> AttributeSet {
        AttributeSet::merge([
            &self.extractor.from_path(path),
            &self.extractor.from_resource(body),
        ])
        .present_only()
    }

    fn lookup(&self, resources: &[StoredResource], query: &AttributeSet) -> Option<String> {
        let bodies: Vec<String> = resources
            .iter()
            .filter(|r| r.key.matches(query))
            .map(|r| r.body.clone())
            .collect();
        match bodies.len() {
            0 => None,
            1 => bodies.into_iter().next(),
            _ => Some(self.composer.compose(&bodies)),
        }
    }
}

fn upsert(resources: &mut Vec<StoredResource>, key: AttributeSet, body: String) {
    match resources.iter_mut().find(|r| r.key == key) {
        Some(existing) => existing.body = body,
        None => resources.push(StoredResource { key, body }),
    }
}

impl Dispatcher for CrudStore {
    fn dispatch(&self, request: &RecordedRequest) -> Result<MockResponse, DispatchError> {
        let verb = request.method.to_ascii_uppercase();
        let path = request.path.as_str();
        let result = match verb.as_str() {
            "POST" | "PUT" => Ok(self.handle_create(path, &request.body_utf8())),
            "PATCH" => self.handle_patch(path, &request.body_utf8()),
            "GET" => Ok(self.handle_get(path)),
            "DELETE" => Ok(self.handle_delete(path)),
            _ => {
                debug!("CRUD store does not support {}", verb);
                metrics::record_crud_operation(&verb, "unsupported");
                return Ok(MockResponse::new(405));
            }
        };
        let outcome = match &result {
            Ok(response) if response.status == 404 => "not_found",
            Ok(_) => "ok",
            Err(_) => "error",
        };
        metrics::record_crud_operation(&verb, outcome);
        result
    }

    fn name(&self) -> &'static str {
        "crud"
    }
}

impl fmt::Debug for CrudStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrudStore")
            .field("resources", &self.len())
            .finish_non_exhaustive()
    }
}
