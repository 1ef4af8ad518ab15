//! Combining several stored bodies into one response body.

/// Builds a single body when a query hits more than one stored resource.
pub trait ResponseComposer: Send + Sync {
    fn compose(&self, items: &[String]) -> String;
}

/// Wraps raw JSON bodies in a JSON array, preserving order.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonListComposer;

impl ResponseComposer for JsonListComposer {
    fn compose(&self, items: &[String]) -> String {
        format!("[{}]", items.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_list_composer() {
        let composed = JsonListComposer.compose(&[r#"{"id":"1"}"#.into(), r#"{"id":"2"}"#.into()]);
        assert_eq!(composed, r#"[{"id":"1"},{"id":"2"}]"#);

        let parsed: serde_json::Value = serde_json::from_str(&composed).unwrap();
        assert_eq!(parsed.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_json_list_composer_empty() {
        assert_eq!(JsonListComposer.compose(&[]), "[]");
    }
}
