//! Keys, values and attributes of the CRUD attribute model.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Literal text that parses to [`Value::Wildcard`].
pub const WILDCARD: &str = "*";

/// Attribute name. Plain string equality, never a wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(String);

impl Key {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attribute value.
///
/// `Eq` and `Hash` are structural. Wildcard semantics only apply through
/// [`Value::matches`], so values stay safe to use inside hashed collections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Literal(String),
    Wildcard,
}

impl Value {
    /// Parse a value; the text `"*"` becomes [`Value::Wildcard`].
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        if text == WILDCARD {
            Value::Wildcard
        } else {
            Value::Literal(text)
        }
    }

    /// A literal value, even when the text is `"*"`.
    pub fn literal(text: impl Into<String>) -> Self {
        Value::Literal(text.into())
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Value::Wildcard)
    }

    /// A wildcard on either side matches anything; literals match by text.
    pub fn matches(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Wildcard, _) | (_, Value::Wildcard) => true,
            (Value::Literal(a), Value::Literal(b)) => a == b,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Value::Literal(text) => text,
            Value::Wildcard => WILDCARD,
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a query attribute must be present or absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttributeType {
    #[default]
    With,
    Without,
}

/// A key/value pair with a matching modifier.
///
/// Identity (`Eq`, `Hash`) covers key and value only; the [`AttributeType`]
/// is consulted by [`AttributeSet::matches`](super::AttributeSet::matches).
#[derive(Debug, Clone)]
pub struct Attribute {
    key: Key,
    value: Value,
    kind: AttributeType,
}

impl Attribute {
    pub fn new(key: impl Into<Key>, value: impl Into<Value>) -> Self {
        Self::with_type(key, value, AttributeType::With)
    }

    /// Attribute that must NOT be present for a query to match.
    pub fn without(key: impl Into<Key>, value: impl Into<Value>) -> Self {
        Self::with_type(key, value, AttributeType::Without)
    }

    pub fn with_type(key: impl Into<Key>, value: impl Into<Value>, kind: AttributeType) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            kind,
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn kind(&self) -> AttributeType {
        self.kind
    }

    /// Same key and matching values (wildcards honoured).
    pub fn matches(&self, other: &Attribute) -> bool {
        self.key == other.key && self.value.matches(&other.value)
    }
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.value == other.value
    }
}

impl Eq for Attribute {}

impl Hash for Attribute {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.value.hash(state);
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.kind {
            AttributeType::With => "=",
            AttributeType::Without => "!=",
        };
        write!(f, "{}{}{}", self.key, op, self.value)
    }
}
