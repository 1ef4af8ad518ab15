//! CRUD mode: an in-memory resource store addressed by attributes.
//!
//! ## Module Structure
//!
//! - `attribute`: keys, values (with the `*` wildcard) and attributes
//! - `attribute_set`: keyed attribute collections and query matching
//! - `extractor`: attributes from request paths and resource bodies
//! - `composer`: combining several matched bodies into one
//! - `store`: the [`CrudStore`] dispatcher

mod attribute;
mod attribute_set;
mod composer;
mod extractor;
mod store;

#[cfg(test)]
mod tests;

pub use attribute::{Attribute, AttributeType, Key, Value, WILDCARD};
pub use attribute_set::AttributeSet;
pub use composer::{JsonListComposer, ResponseComposer};
pub use extractor::{path_key, AttributeExtractor, JsonAttributeExtractor, PATH_ATTRIBUTE};
pub use store::CrudStore;
