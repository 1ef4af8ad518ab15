//! Attribute extraction from request paths and stored resources.

use super::attribute::{Attribute, Key, Value};
use super::attribute_set::AttributeSet;

/// Attribute name under which [`JsonAttributeExtractor`] stores the request path.
pub const PATH_ATTRIBUTE: &str = "path";

/// Turns paths and resource bodies into [`AttributeSet`]s.
pub trait AttributeExtractor: Send + Sync {
    /// Attributes (or query attributes) carried by a request path.
    fn from_path(&self, path: &str) -> AttributeSet;

    /// Attributes describing a stored resource body.
    fn from_resource(&self, resource: &str) -> AttributeSet;
}

/// Default extractor for JSON resources.
///
/// - path: the part before `?` becomes the `path` attribute; each query pair
///   `k=v` is a `With` attribute, `k!=v` a `Without` attribute, a bare `k`
///   requires presence with any value and `*` is the wildcard value.
/// - resource: scalar fields of a JSON object, nested objects flattened with
///   dotted keys (`metadata.name`). Arrays and nulls are skipped; non-object
///   bodies yield an empty set.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonAttributeExtractor;

impl JsonAttributeExtractor {
    pub fn new() -> Self {
        Self
    }

    fn flatten(prefix: &str, value: &serde_json::Value, out: &mut Vec<Attribute>) {
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Object(map) => {
                for (name, nested) in map {
                    let key = if prefix.is_empty() {
                        name.clone()
                    } else {
                        format!("{prefix}.{name}")
                    };
                    Self::flatten(&key, nested, out);
                }
                return;
            }
            serde_json::Value::Null | serde_json::Value::Array(_) => return,
        };
        out.push(Attribute::new(prefix, Value::literal(text)));
    }
}

/// Form-style decoding: `+` is a space, then percent escapes.
fn decode(component: &str) -> String {
    let spaced = component.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|c| c.into_owned())
        .unwrap_or(spaced)
}

impl AttributeExtractor for JsonAttributeExtractor {
    fn from_path(&self, path: &str) -> AttributeSet {
        let (base, query) = match path.split_once('?') {
            Some((base, query)) => (base, Some(query)),
            None => (path, None),
        };
        let base = match base.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };

        let mut attributes = vec![Attribute::new(PATH_ATTRIBUTE, Value::literal(base))];
        for pair in query.unwrap_or("").split('&').filter(|p| !p.is_empty()) {
            let attribute = if let Some((key, value)) = pair.split_once("!=") {
                Attribute::without(decode(key), decode(value))
            } else if let Some((key, value)) = pair.split_once('=') {
                Attribute::new(decode(key), decode(value))
            } else {
                Attribute::new(decode(pair), Value::Wildcard)
            };
            attributes.push(attribute);
        }
        attributes.into_iter().collect()
    }

    fn from_resource(&self, resource: &str) -> AttributeSet {
        match serde_json::from_str::<serde_json::Value>(resource) {
            Ok(value @ serde_json::Value::Object(_)) => {
                let mut attributes = Vec::new();
                Self::flatten("", &value, &mut attributes);
                attributes.into_iter().collect()
            }
            _ => AttributeSet::new(),
        }
    }
}

/// Key of the `path` attribute produced by [`JsonAttributeExtractor`].
pub fn path_key() -> Key {
    Key::from(PATH_ATTRIBUTE)
}
