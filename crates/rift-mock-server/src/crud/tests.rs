//! Tests for the CRUD store.

use super::*;
use crate::dispatch::{DispatchError, Dispatcher};
use crate::request::RecordedRequest;
use std::sync::Arc;

fn body(response: &crate::response::MockResponse) -> String {
    response.body_text().unwrap_or_default()
}

fn json(text: &str) -> serde_json::Value {
    serde_json::from_str(text).unwrap()
}

#[test]
fn test_create_then_get_returns_body_unchanged() {
    let store = CrudStore::default();
    let created = store.handle_create("/items", r#"{"id":"1","name":"a"}"#);
    assert_eq!(created.status, 202);
    assert_eq!(body(&created), r#"{"id":"1","name":"a"}"#);

    let fetched = store.handle_get("/items?id=1");
    assert_eq!(fetched.status, 200);
    assert_eq!(body(&fetched), r#"{"id":"1","name":"a"}"#);
}

#[test]
fn test_delete_then_get_is_404() {
    let store = CrudStore::default();
    store.handle_create("/items", r#"{"id":"1","name":"a"}"#);

    assert_eq!(store.handle_delete("/items?id=1").status, 200);
    assert_eq!(store.handle_get("/items?id=1").status, 404);
    assert_eq!(store.handle_delete("/items?id=1").status, 404);
    assert!(store.is_empty());
}

#[test]
fn test_create_with_same_features_overwrites() {
    let store = CrudStore::default();
    store.handle_create("/items", r#"{"id":"1"}"#);
    store.handle_create("/items", r#"{"id":"1"}"#);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_get_with_several_matches_composes_bodies() {
    let store = CrudStore::default();
    store.handle_create("/items", r#"{"id":"1","kind":"x"}"#);
    store.handle_create("/items", r#"{"id":"2","kind":"x"}"#);
    store.handle_create("/other", r#"{"id":"3","kind":"x"}"#);

    let response = store.handle_get("/items?kind=x");
    assert_eq!(response.status, 200);
    assert_eq!(
        body(&response),
        r#"[{"id":"1","kind":"x"},{"id":"2","kind":"x"}]"#
    );

    let everything = store.handle_get("/items");
    let parsed: serde_json::Value = serde_json::from_str(&body(&everything)).unwrap();
    assert_eq!(parsed.as_array().map(Vec::len), Some(2));
}

#[test]
fn test_get_honours_without_and_wildcard() {
    let store = CrudStore::default();
    store.handle_create("/items", r#"{"id":"1","owner":"ann"}"#);
    store.handle_create("/items", r#"{"id":"2"}"#);

    assert_eq!(body(&store.handle_get("/items?owner")), r#"{"id":"1","owner":"ann"}"#);
    assert_eq!(body(&store.handle_get("/items?owner=*")), r#"{"id":"1","owner":"ann"}"#);
    assert_eq!(body(&store.handle_get("/items?owner!=ann")), r#"{"id":"2"}"#);
    assert_eq!(store.handle_get("/items?id=1&owner!=ann").status, 404);
}

#[test]
fn test_patch_replaces_resource() {
    let store = CrudStore::default();
    store.handle_create("/items", r#"{"id":"1","v":1}"#);

    let patched = store
        .handle_patch("/items?id=1", r#"[{"op":"replace","path":"/v","value":2}]"#)
        .unwrap();
    assert_eq!(patched.status, 202);
    assert_eq!(body(&patched), r#"{"id":"1","v":2}"#);

    assert_eq!(body(&store.handle_get("/items?id=1")), r#"{"id":"1","v":2}"#);
    assert_eq!(store.len(), 1);
    assert_eq!(store.handle_get("/items?v=1").status, 404);
    assert_eq!(store.handle_get("/items?v=2").status, 200);
}

#[test]
fn test_patch_missing_resource_is_404() {
    let store = CrudStore::default();
    let response = store
        .handle_patch("/items?id=9", r#"[{"op":"replace","path":"/v","value":2}]"#)
        .unwrap();
    assert_eq!(response.status, 404);
}

#[test]
fn test_malformed_patch_leaves_store_untouched() {
    let store = CrudStore::default();
    store.handle_create("/items", r#"{"id":"1","v":1}"#);

    let err = store.handle_patch("/items?id=1", "not a patch").unwrap_err();
    assert!(matches!(err, DispatchError::MalformedJson(_)));

    let err = store
        .handle_patch("/items?id=1", r#"[{"op":"remove","path":"/missing"}]"#)
        .unwrap_err();
    assert!(matches!(err, DispatchError::MalformedPatch(_)));

    assert_eq!(body(&store.handle_get("/items?id=1")), r#"{"id":"1","v":1}"#);
}

#[test]
fn test_patch_over_several_matches_patches_each_resource() {
    let store = CrudStore::default();
    store.handle_create("/items", r#"{"id":"1","kind":"x"}"#);
    store.handle_create("/items", r#"{"id":"2","kind":"x"}"#);
    store.handle_create("/items", r#"{"id":"3","kind":"y"}"#);

    let patched = store
        .handle_patch("/items?kind=x", r#"[{"op":"add","path":"/flag","value":true}]"#)
        .unwrap();
    assert_eq!(patched.status, 202);
    assert_eq!(
        json(&body(&patched)),
        serde_json::json!([
            {"id": "1", "kind": "x", "flag": true},
            {"id": "2", "kind": "x", "flag": true}
        ])
    );

    assert_eq!(store.len(), 3);
    assert_eq!(
        json(&body(&store.handle_get("/items?id=1"))),
        serde_json::json!({"id": "1", "kind": "x", "flag": true})
    );
    assert_eq!(
        json(&body(&store.handle_get("/items?id=2&flag=true"))),
        serde_json::json!({"id": "2", "kind": "x", "flag": true})
    );
    assert_eq!(body(&store.handle_get("/items?id=3")), r#"{"id":"3","kind":"y"}"#);
}

#[test]
fn test_patch_failing_on_one_of_several_matches_changes_nothing() {
    let store = CrudStore::default();
    store.handle_create("/items", r#"{"id":"1","kind":"x","v":1}"#);
    store.handle_create("/items", r#"{"id":"2","kind":"x"}"#);

    let err = store
        .handle_patch("/items?kind=x", r#"[{"op":"replace","path":"/v","value":2}]"#)
        .unwrap_err();
    assert!(matches!(err, DispatchError::MalformedPatch(_)));
    assert_eq!(store.len(), 2);
    assert_eq!(body(&store.handle_get("/items?id=1")), r#"{"id":"1","kind":"x","v":1}"#);
}

#[test]
fn test_patch_with_wildcard_query_never_stores_a_wildcard() {
    let store = CrudStore::default();
    store.handle_create("/items", r#"{"id":"1","owner":"ann"}"#);

    let patched = store
        .handle_patch("/items?owner", r#"[{"op":"remove","path":"/owner"}]"#)
        .unwrap();
    assert_eq!(body(&patched), r#"{"id":"1"}"#);

    assert_eq!(store.handle_get("/items?owner=bob").status, 404);
    assert_eq!(store.handle_get("/items?owner").status, 404);
    assert_eq!(body(&store.handle_get("/items?owner!=bob")), r#"{"id":"1"}"#);
}

#[test]
fn test_create_with_wildcard_query_never_stores_a_wildcard() {
    let store = CrudStore::default();
    store.handle_create("/items?x=*", r#"{"id":"1"}"#);

    let (key, _) = &store.snapshot()[0];
    assert!(!key.contains_key(&Key::from("x")));
    assert_eq!(store.handle_get("/items?x=anything").status, 404);
}

#[test]
fn test_patch_keeps_attributes_from_the_create_path() {
    let store = CrudStore::default();
    store.handle_create("/items?tenant=t1", r#"{"id":"1","v":1}"#);

    store
        .handle_patch("/items?id=1", r#"[{"op":"replace","path":"/v","value":2}]"#)
        .unwrap();
    assert_eq!(body(&store.handle_get("/items?tenant=t1")), r#"{"id":"1","v":2}"#);
}

#[test]
fn test_concurrent_creates_are_all_stored() {
    let store = Arc::new(CrudStore::default());
    std::thread::scope(|scope| {
        for i in 0..16 {
            let store = Arc::clone(&store);
            scope.spawn(move || {
                store.handle_create("/items", &format!(r#"{{"id":"{i}"}}"#));
            });
        }
    });
    assert_eq!(store.len(), 16);
}

#[test]
fn test_dispatch_maps_verbs() {
    let store = CrudStore::default();
    let post = RecordedRequest::new("POST", "/items").with_body(r#"{"id":"1"}"#);
    assert_eq!(store.dispatch(&post).unwrap().status, 202);

    let put = RecordedRequest::new("put", "/items").with_body(r#"{"id":"2"}"#);
    assert_eq!(store.dispatch(&put).unwrap().status, 202);

    let get = RecordedRequest::new("GET", "/items?id=2");
    assert_eq!(body(&store.dispatch(&get).unwrap()), r#"{"id":"2"}"#);

    let patch = RecordedRequest::new("PATCH", "/items?id=2")
        .with_body(r#"[{"op":"add","path":"/x","value":true}]"#);
    assert_eq!(store.dispatch(&patch).unwrap().status, 202);

    let delete = RecordedRequest::new("DELETE", "/items");
    assert_eq!(store.dispatch(&delete).unwrap().status, 200);
    assert!(store.is_empty());

    let head = RecordedRequest::new("HEAD", "/items");
    assert_eq!(store.dispatch(&head).unwrap().status, 405);
    assert_eq!(store.name(), "crud");
}

struct UpperCaseComposer;

impl ResponseComposer for UpperCaseComposer {
    fn compose(&self, items: &[String]) -> String {
        items.join("|").to_uppercase()
    }
}

#[test]
fn test_custom_composer() {
    let store = CrudStore::new(Arc::new(JsonAttributeExtractor), Arc::new(UpperCaseComposer));
    store.handle_create("/a", r#"{"n":"x"}"#);
    store.handle_create("/a", r#"{"n":"y"}"#);
    assert_eq!(body(&store.handle_get("/a")), r#"{"N":"X"}|{"N":"Y"}"#);
}

#[test]
fn test_snapshot_keys_hold_present_attributes_only() {
    let store = CrudStore::default();
    store.handle_create("/items?skip!=1", r#"{"id":"1"}"#);
    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 1);
    let (key, _) = &snapshot[0];
    assert!(key.contains_key(&Key::from("id")));
    assert!(key.contains_key(&path_key()));
    assert!(!key.contains_key(&Key::from("skip")));
}
