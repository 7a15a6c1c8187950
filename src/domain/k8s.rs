//! A minimal, in-memory stand-in for the Kubernetes domain (spec.md §3
//! example domains). Real API-server access is out of scope; this gives
//! rules something concrete to query against.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::mock::MockDomain;
use crate::object::{Class, Object};
use crate::value::FieldValue;

use super::mock::MockObject;

pub const POD: Class = Class::new("k8s", "Pod");
pub const EVENT: Class = Class::new("k8s", "Event");

fn pod(namespace: &str, name: &str, labels: &[(&str, &str)]) -> MockObject {
    let mut label_map = BTreeMap::new();
    for (k, v) in labels {
        label_map.insert(k.to_string(), FieldValue::from(*v));
    }
    let mut selector = BTreeMap::new();
    selector.insert("matchLabels".to_string(), FieldValue::Map(label_map));
    let mut spec = BTreeMap::new();
    spec.insert("selector".to_string(), FieldValue::Map(selector));
    let mut fields = BTreeMap::new();
    fields.insert("namespace".to_string(), FieldValue::from(namespace));
    fields.insert("name".to_string(), FieldValue::from(name));
    fields.insert("spec".to_string(), FieldValue::Map(spec));
    MockObject::new(POD, &format!("{namespace}/{name}"), fields)
}

fn event(namespace: &str, involved_pod: &str, reason: &str) -> MockObject {
    let mut fields = BTreeMap::new();
    fields.insert("namespace".to_string(), FieldValue::from(namespace));
    fields.insert("involvedPod".to_string(), FieldValue::from(involved_pod));
    fields.insert("reason".to_string(), FieldValue::from(reason));
    MockObject::new(
        EVENT,
        &format!("{namespace}/{involved_pod}/{reason}"),
        fields,
    )
}

/// The bundled `k8s` domain: `Pod` and `Event`, seeded with a handful of
/// fixtures that the bundled `alert`/`log` domains cross-reference.
pub fn domain() -> MockDomain {
    let objects: Vec<Arc<dyn Object>> = vec![
        Arc::new(pod("ns1", "web-1", &[("app", "a"), ("tier", "web")])),
        Arc::new(pod("ns1", "web-2", &[("app", "a"), ("tier", "web")])),
        Arc::new(pod("ns1", "db-1", &[("app", "a"), ("tier", "db")])),
        Arc::new(event("ns1", "web-1", "CrashLoopBackOff")),
        Arc::new(event("ns1", "web-1", "Unhealthy")),
    ];
    MockDomain::new("k8s", vec![POD, EVENT], objects)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_pod_exposes_label_selector() {
        let d = domain();
        let store_objects = d
            .classes()
            .iter()
            .copied()
            .collect::<Vec<_>>();
        assert!(store_objects.contains(&POD));
    }
}
