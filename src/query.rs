//! The `Query` model (spec.md §3): opaque, pure data, round-trips through
//! its domain's string form.

use std::any::Any;
use std::fmt;

use crate::object::Class;

/// A resolvable descriptor for a set of Objects of one Class.
///
/// A Query has no store binding — `crate::store::Store::get` is what
/// turns a Query into Objects. Implementations must satisfy the
/// round-trip invariant (spec.md §8 #6):
/// `domain.parse_query(&q.to_query_string()) == Ok(q)`.
pub trait Query: Send + Sync + fmt::Debug {
    /// The class this query resolves to.
    fn class(&self) -> Class;

    /// The domain-specific string form. Must round-trip through the
    /// owning Domain's `parse_query`.
    fn to_query_string(&self) -> String;

    /// Clone through the trait object, needed so the same Query can be
    /// grouped/deduplicated and dispatched to a Store without consuming
    /// the original.
    fn clone_query(&self) -> Box<dyn Query>;

    /// Downcast support for Stores that need their own concrete Query type
    /// back (e.g. to read a structured filter rather than re-parsing the
    /// query string).
    fn as_any(&self) -> &dyn Any;
}

impl Clone for Box<dyn Query> {
    fn clone(&self) -> Self {
        self.clone_query()
    }
}

impl PartialEq for Box<dyn Query> {
    fn eq(&self, other: &Self) -> bool {
        self.class() == other.class() && self.to_query_string() == other.to_query_string()
    }
}
impl Eq for Box<dyn Query> {}

impl std::hash::Hash for Box<dyn Query> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.class().hash(state);
        self.to_query_string().hash(state);
    }
}

impl fmt::Display for Box<dyn Query> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_query_string())
    }
}
