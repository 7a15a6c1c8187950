//! An in-memory domain used by unit tests and by [`super::k8s`],
//! [`super::log`], [`super::alert`] as their shared building block.
//!
//! Grounded on the teacher's `Catalog` (`src/catalog.rs`): a plain
//! `HashMap`-backed registry with no external I/O, built up by plain
//! `insert`/`register` calls and exercised directly in its own unit
//! tests rather than through a real storage engine.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::constraint::Constraint;
use crate::error::StoreError;
use crate::object::{Class, Domain, Object, ObjectRef};
use crate::query::Query;
use crate::store::{Appender, Store};
use crate::value::FieldValue;

#[derive(Debug, Clone)]
pub struct MockObject {
    class: Class,
    id: String,
    fields: BTreeMap<String, FieldValue>,
}

impl MockObject {
    pub fn new(class: Class, id: &str, fields: BTreeMap<String, FieldValue>) -> Self {
        MockObject {
            class,
            id: id.to_string(),
            fields,
        }
    }
}

impl Object for MockObject {
    fn class(&self) -> Class {
        self.class
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn field(&self, path: &str) -> Option<FieldValue> {
        FieldValue::Map(self.fields.clone()).path(path).cloned()
    }

    /// Parses a `"timestamp"` field (RFC 3339) if the fixture set one;
    /// objects with no such field are timeless as far as `Constraint` is
    /// concerned.
    fn timestamp(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        match self.fields.get("timestamp") {
            Some(FieldValue::Str(s)) => chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&chrono::Utc)),
            _ => None,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A query that matches objects in a [`MockStore`] by exact field value,
/// or every object of the class when `filter` is `None`.
#[derive(Debug, Clone)]
pub struct MockQuery {
    class: Class,
    pub filter: Option<(String, String)>,
}

impl MockQuery {
    pub fn all(class: Class) -> Self {
        MockQuery {
            class,
            filter: None,
        }
    }

    pub fn matching(class: Class, field: impl Into<String>, value: impl Into<String>) -> Self {
        MockQuery {
            class,
            filter: Some((field.into(), value.into())),
        }
    }
}

impl Query for MockQuery {
    fn class(&self) -> Class {
        self.class
    }

    fn to_query_string(&self) -> String {
        match &self.filter {
            None => self.class.name.to_string(),
            Some((field, value)) => format!("{}?{}={}", self.class.name, field, value),
        }
    }

    fn clone_query(&self) -> Box<dyn Query> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn parse_mock_query(class: Class, s: &str) -> Result<MockQuery, StoreError> {
    match s.split_once('?') {
        None => Ok(MockQuery::all(class)),
        Some((_, qs)) => {
            let (field, value) = qs
                .split_once('=')
                .ok_or_else(|| StoreError::BadQuery(format!("malformed query string '{s}'")))?;
            Ok(MockQuery::matching(class, field, value))
        }
    }
}

/// An in-memory [`Store`] seeded with a fixed object set, used by the
/// bundled [`super::k8s`]/[`super::log`]/[`super::alert`] domains and by
/// tests that need a deterministic backend.
#[derive(Debug, Default)]
pub struct MockStore {
    objects: Vec<ObjectRef>,
}

impl MockStore {
    pub fn new(objects: Vec<ObjectRef>) -> Self {
        MockStore { objects }
    }
}

#[async_trait]
impl Store for MockStore {
    async fn get(
        &self,
        query: &dyn Query,
        _constraint: &Constraint,
        appender: &mut Appender,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let filter = query
            .as_any()
            .downcast_ref::<MockQuery>()
            .and_then(|q| q.filter.clone());
        for object in &self.objects {
            if object.class() != query.class() {
                continue;
            }
            if let Some((field, value)) = &filter {
                match object.field(field) {
                    Some(v) if v.render() == *value => {}
                    _ => continue,
                }
            }
            if !appender.push(object.clone()) {
                break;
            }
        }
        Ok(())
    }
}

/// A bundled, in-memory domain: one or more [`Class`]es served entirely out
/// of a fixed object set, no external process involved (spec.md's
/// Non-goals exclude real backend clients; this is the stand-in the
/// engine's own tests and the bundled domains are built on).
pub struct MockDomain {
    name: &'static str,
    classes: Vec<Class>,
    objects: Vec<ObjectRef>,
}

impl MockDomain {
    pub fn new(name: &'static str, classes: Vec<Class>, objects: Vec<ObjectRef>) -> Self {
        MockDomain {
            name,
            classes,
            objects,
        }
    }
}

impl Domain for MockDomain {
    fn name(&self) -> &'static str {
        self.name
    }

    fn classes(&self) -> &[Class] {
        &self.classes
    }

    fn parse_query(&self, s: &str) -> Result<Box<dyn Query>, StoreError> {
        let class_name = s.split('?').next().unwrap_or(s);
        let class = self.class(class_name).ok_or_else(|| StoreError::BadQuery(
            format!("unknown class '{class_name}' in domain '{}'", self.name),
        ))?;
        Ok(Box::new(parse_mock_query(class, s)?))
    }

    fn new_store(
        &self,
        _config: serde_json::Value,
    ) -> Result<Arc<dyn Store>, StoreError> {
        Ok(Arc::new(MockStore::new(self.objects.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THING: Class = Class::new("mock", "Thing");

    #[test]
    fn query_string_round_trips() {
        let q = MockQuery::matching(THING, "name", "a");
        let s = q.to_query_string();
        let parsed = parse_mock_query(THING, &s).unwrap();
        assert_eq!(parsed.filter, q.filter);
    }

    #[tokio::test]
    async fn store_filters_by_field() {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), FieldValue::from("a"));
        let a = Arc::new(MockObject::new(THING, "1", fields));
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), FieldValue::from("b"));
        let b = Arc::new(MockObject::new(THING, "2", fields));
        let store = MockStore::new(vec![a.clone(), b]);
        let query = MockQuery::matching(THING, "name", "a");
        let mut appender = Appender::new(None);
        store
            .get(
                &query,
                &Constraint::default(),
                &mut appender,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let results = appender.into_inner();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id(), "1");
    }
}
