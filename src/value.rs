//! `FieldValue`: the small dynamic value type [`crate::object::Object`]
//! fields resolve to, and that the [`crate::template`] engine navigates.
//!
//! Plays the role the teacher's `value::Value` enum plays for Datalog
//! tuple columns, generalized to nested maps/lists since Kubernetes
//! objects and log records are not flat tuples.

use std::collections::BTreeMap;
use std::fmt;

/// A value reachable by dotted-path navigation on an [`crate::object::Object`].
///
/// `Map` uses a [`BTreeMap`] rather than a hash map so that
/// [`crate::template`]'s `range` iterates keys in sorted lexicographic
/// order for free — spec.md §9 requires this for determinism.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, FieldValue>> {
        match self {
            FieldValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Navigate one path segment deeper: `map.child`, or `list.<index>`.
    pub fn get(&self, segment: &str) -> Option<&FieldValue> {
        match self {
            FieldValue::Map(m) => m.get(segment),
            FieldValue::List(l) => segment.parse::<usize>().ok().and_then(|i| l.get(i)),
            _ => None,
        }
    }

    /// Resolve a dotted path (`spec.selector.matchLabels`) from this value.
    pub fn path(&self, path: &str) -> Option<&FieldValue> {
        if path.is_empty() {
            return Some(self);
        }
        let mut current = self;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current)
    }

    /// Render as the string a template would splice in.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Int(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Str(s) => s.clone(),
            FieldValue::List(items) => items
                .iter()
                .map(FieldValue::render)
                .collect::<Vec<_>>()
                .join(","),
            FieldValue::Map(_) => String::new(),
        }
    }

    /// Convert a [`serde_json::Value`] into a `FieldValue`, the usual way
    /// bundled domains build Object field trees from deserialized data.
    pub fn from_json(v: &serde_json::Value) -> FieldValue {
        match v {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => FieldValue::Str(s.clone()),
            serde_json::Value::Array(items) => {
                FieldValue::List(items.iter().map(FieldValue::from_json).collect())
            }
            serde_json::Value::Object(map) => FieldValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FieldValue {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), FieldValue::from("a"));
        labels.insert("tier".to_string(), FieldValue::from("web"));
        let mut selector = BTreeMap::new();
        selector.insert("matchLabels".to_string(), FieldValue::Map(labels));
        let mut spec = BTreeMap::new();
        spec.insert("selector".to_string(), FieldValue::Map(selector));
        let mut root = BTreeMap::new();
        root.insert("spec".to_string(), FieldValue::Map(spec));
        FieldValue::Map(root)
    }

    #[test]
    fn path_navigates_nested_maps() {
        let v = sample();
        let labels = v.path("spec.selector.matchLabels").unwrap();
        assert_eq!(labels.get("app").unwrap().render(), "a");
    }

    #[test]
    fn path_missing_segment_is_none() {
        let v = sample();
        assert!(v.path("spec.selector.nope").is_none());
    }

    #[test]
    fn from_json_round_trips_shape() {
        let j: serde_json::Value = serde_json::json!({
            "namespace": "ns1",
            "labels": {"app": "a"},
        });
        let v = FieldValue::from_json(&j);
        assert_eq!(v.path("namespace").unwrap().render(), "ns1");
        assert_eq!(v.path("labels.app").unwrap().render(), "a");
    }
}
