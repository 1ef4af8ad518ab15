//! Keyed attribute collections used as CRUD record identity and as queries.

use super::attribute::{Attribute, AttributeType, Key};
use std::collections::BTreeMap;
use std::fmt;

/// One [`Attribute`] per [`Key`]; later writes replace earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AttributeSet {
    attributes: BTreeMap<Key, Attribute>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union of `sets`; on key collision the later set wins.
    pub fn merge<'a>(sets: impl IntoIterator<Item = &'a AttributeSet>) -> AttributeSet {
        let mut attributes = BTreeMap::new();
        for set in sets {
            for (key, attribute) in &set.attributes {
                attributes.insert(key.clone(), attribute.clone());
            }
        }
        AttributeSet { attributes }
    }

    /// Copy of this set with `attrs` upserted by key.
    pub fn add(&self, attrs: impl IntoIterator<Item = Attribute>) -> AttributeSet {
        let mut attributes = self.attributes.clone();
        for attribute in attrs {
            attributes.insert(attribute.key().clone(), attribute);
        }
        AttributeSet { attributes }
    }

    /// Does this (stored) set satisfy every attribute of `candidate` (the query)?
    ///
    /// `With` attributes must be present with a matching value; `Without`
    /// attributes must not be. An empty candidate matches everything.
    pub fn matches(&self, candidate: &AttributeSet) -> bool {
        candidate.attributes.values().all(|wanted| {
            let present = self
                .attributes
                .get(wanted.key())
                .is_some_and(|have| have.value().matches(wanted.value()));
            match wanted.kind() {
                AttributeType::With => present,
                AttributeType::Without => !present,
            }
        })
    }

    /// Only the `With` attributes with literal values. Stored record keys
    /// never carry negations or wildcards.
    pub fn present_only(&self) -> AttributeSet {
        self.attributes
            .values()
            .filter(|a| a.kind() == AttributeType::With && !a.value().is_wildcard())
            .cloned()
            .collect()
    }

    /// Copy of this set minus every key that `other` holds.
    pub fn without_keys_of(&self, other: &AttributeSet) -> AttributeSet {
        self.attributes
            .values()
            .filter(|a| !other.contains_key(a.key()))
            .cloned()
            .collect()
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn get(&self, key: &Key) -> Option<&Attribute> {
        self.attributes.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl FromIterator<Attribute> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = Attribute>>(iter: I) -> Self {
        AttributeSet::new().add(iter)
    }
}

impl<const N: usize> From<[Attribute; N]> for AttributeSet {
    fn from(attributes: [Attribute; N]) -> Self {
        attributes.into_iter().collect()
    }
}

impl fmt::Display for AttributeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, attribute) in self.attributes.values().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{attribute}")?;
        }
        f.write_str("}")
    }
}
