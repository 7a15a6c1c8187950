//! A minimal, in-memory stand-in for an alerting domain (spec.md §3
//! example domains). Real alertmanager access is out of scope; this
//! gives rules something concrete to query against.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::mock::MockDomain;
use crate::object::{Class, Object};
use crate::value::FieldValue;

use super::mock::MockObject;

pub const ALERT: Class = Class::new("alert", "Alert");

fn firing(namespace: &str, pod: &str, name: &str, severity: &str) -> MockObject {
    let mut fields = BTreeMap::new();
    fields.insert("namespace".to_string(), FieldValue::from(namespace));
    fields.insert("pod".to_string(), FieldValue::from(pod));
    fields.insert("name".to_string(), FieldValue::from(name));
    fields.insert("severity".to_string(), FieldValue::from(severity));
    MockObject::new(ALERT, &format!("{namespace}/{pod}/{name}"), fields)
}

/// The bundled `alert` domain: `Alert`, seeded to correlate with the
/// `k8s:Pod` and `log:Application` fixtures by `namespace` + `pod`.
pub fn domain() -> MockDomain {
    let objects: Vec<Arc<dyn Object>> = vec![Arc::new(firing(
        "ns1",
        "web-1",
        "PodCrashLooping",
        "critical",
    ))];
    MockDomain::new("alert", vec![ALERT], objects)
}
