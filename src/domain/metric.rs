//! A minimal, in-memory stand-in for a metrics domain (spec.md §3 example
//! domains). Real Prometheus/metrics-backend access is out of scope; this
//! gives rules something concrete to query against.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::mock::MockDomain;
use crate::object::{Class, Object};
use crate::value::FieldValue;

use super::mock::MockObject;

pub const METRIC: Class = Class::new("metric", "Metric");

fn sample(namespace: &str, pod: &str, name: &str, value: f64) -> MockObject {
    let mut fields = BTreeMap::new();
    fields.insert("namespace".to_string(), FieldValue::from(namespace));
    fields.insert("pod".to_string(), FieldValue::from(pod));
    fields.insert("name".to_string(), FieldValue::from(name));
    fields.insert("value".to_string(), FieldValue::Float(value));
    MockObject::new(METRIC, &format!("{namespace}/{pod}/{name}"), fields)
}

/// The bundled `metric` domain: `Metric` samples, seeded to correlate
/// with the `k8s:Pod` fixtures by `namespace` + `pod`.
pub fn domain() -> MockDomain {
    let objects: Vec<Arc<dyn Object>> = vec![
        Arc::new(sample("ns1", "web-1", "container_memory_usage_bytes", 512_000_000.0)),
        Arc::new(sample("ns1", "web-2", "container_memory_usage_bytes", 128_000_000.0)),
    ];
    MockDomain::new("metric", vec![METRIC], objects)
}
