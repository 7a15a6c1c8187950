//! The `Class` / `Object` / `Domain` model (spec.md §3).
//!
//! Grounded on the teacher's `Catalog` (`src/catalog.rs`), which keys
//! relation schemas by name the way a [`Class`] keys an [`Object`]'s
//! shape here — generalized from a single flat namespace of relation
//! names to a two-part `(domain, name)` pair, since korrel8r spans
//! multiple domains that can reuse a local class name.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::query::Query;
use crate::value::FieldValue;

/// A `(Domain, local-name)` pair identifying a kind of Object.
///
/// `Class` is `Copy`/`Eq`/`Hash` so it doubles as its own map key —
/// `crate::rule_index::RuleIndex` and `crate::graph::Graph` both key
/// directly on `Class` rather than through a separate id newtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Class {
    pub domain: &'static str,
    pub name: &'static str,
}

impl Class {
    pub const fn new(domain: &'static str, name: &'static str) -> Self {
        Class { domain, name }
    }

    /// `<domain>:<class>`, the form used in rule documents and by
    /// `Engine::class` (spec.md §6).
    pub fn full_name(&self) -> String {
        format!("{}:{}", self.domain, self.name)
    }

    /// Parse a `<domain>:<class>` string against a known class list.
    pub fn parse<'a>(full_name: &str, known: impl IntoIterator<Item = &'a Class>) -> Option<Class> {
        let (domain, name) = full_name.split_once(':')?;
        known
            .into_iter()
            .find(|c| c.domain == domain && c.name == name)
            .copied()
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

/// Opaque per-domain observation value (spec.md §3).
///
/// Objects are domain-owned; the engine only reaches into them through
/// `id()` (dedup identity) and `field()` (template navigation) — the
/// "small, explicit reflection-like interface" spec.md §9 asks for,
/// rather than full runtime reflection.
pub trait Object: Send + Sync + fmt::Debug {
    /// The class this object belongs to.
    fn class(&self) -> Class;

    /// Identity value used to deduplicate objects of this class within a
    /// Graph. Two objects with equal `id()` under the same `Class` are
    /// the same observation (spec.md §3 invariant).
    fn id(&self) -> String;

    /// Dotted-path field access for rule templates (spec.md §4.2, §9).
    fn field(&self, path: &str) -> Option<FieldValue>;

    /// This object's observation time, if it has one. Enforced by the
    /// Engine against `Constraint`'s time window when the Store doesn't
    /// push the filter down itself (spec.md §4.1). Domains with no time
    /// axis (e.g. `k8s:Pod`) keep the default `None`, which
    /// `Constraint::allows_time` treats as unconstrained.
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Downcast support for domains that want to recover their concrete
    /// object type outside of the engine (e.g. in a domain's own tests).
    fn as_any(&self) -> &dyn Any;
}

/// Shared, cheaply-cloneable handle to an [`Object`].
///
/// The Graph stores these; the engine never owns an Object outright,
/// only references, so the same object can sit in multiple edges.
pub type ObjectRef = Arc<dyn Object>;

/// Bundles classes, a query parser, and a store factory (spec.md §3).
///
/// A `Domain`'s identity is its `name()`; names are globally unique within
/// a [`crate::domain::DomainRegistry`].
pub trait Domain: Send + Sync {
    fn name(&self) -> &'static str;

    /// All classes this domain defines.
    fn classes(&self) -> &[Class];

    /// Resolve a local class name within this domain.
    fn class(&self, name: &str) -> Option<Class> {
        self.classes().iter().find(|c| c.name == name).copied()
    }

    /// Parse a domain-specific query string into a `Query` value.
    ///
    /// Must round-trip: `domain.parse_query(&q.to_query_string()).unwrap() == q`
    /// (spec.md §8 invariant 6).
    fn parse_query(&self, s: &str) -> Result<Box<dyn Query>, StoreError>;

    /// Construct a Store for this domain from an opaque connection config.
    fn new_store(
        &self,
        config: serde_json::Value,
    ) -> Result<Arc<dyn crate::store::Store>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_full_name_round_trips_through_parse() {
        const A: Class = Class::new("mock", "A");
        const B: Class = Class::new("mock", "B");
        let known = [A, B];
        let parsed = Class::parse(&A.full_name(), &known).unwrap();
        assert_eq!(parsed, A);
    }

    #[test]
    fn class_parse_rejects_unknown_domain() {
        const A: Class = Class::new("mock", "A");
        let known = [A];
        assert!(Class::parse("other:A", &known).is_none());
    }
}
