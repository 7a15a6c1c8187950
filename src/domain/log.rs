//! A minimal, in-memory stand-in for an application-log domain (spec.md
//! §3 example domains). Real log-store access (Loki et al.) is out of
//! scope; this gives rules something concrete to query against.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::mock::MockDomain;
use crate::object::{Class, Object};
use crate::value::FieldValue;

use super::mock::MockObject;

pub const APPLICATION: Class = Class::new("log", "Application");

fn entry(namespace: &str, pod: &str, message: &str, timestamp: &str) -> MockObject {
    let mut fields = BTreeMap::new();
    fields.insert("namespace".to_string(), FieldValue::from(namespace));
    fields.insert("pod".to_string(), FieldValue::from(pod));
    fields.insert("message".to_string(), FieldValue::from(message));
    fields.insert("timestamp".to_string(), FieldValue::from(timestamp));
    // crc32 over the body keeps the id short and stable without embedding
    // the raw message (which may contain "/" and collide with the path-ish
    // namespace/pod prefix).
    let digest = crc32fast::hash(message.as_bytes());
    MockObject::new(APPLICATION, &format!("{namespace}/{pod}/{digest:08x}"), fields)
}

/// The bundled `log` domain: `Application` log lines, seeded to
/// correlate with `k8s:Pod` fixtures by `namespace` + `pod`. Each entry
/// carries an RFC 3339 `timestamp` field so `Constraint`'s time window
/// has something to filter (spec.md §4.1).
pub fn domain() -> MockDomain {
    let objects: Vec<Arc<dyn Object>> = vec![
        Arc::new(entry(
            "ns1",
            "web-1",
            "connection refused to db-1:5432",
            "2024-01-01T00:00:00Z",
        )),
        Arc::new(entry(
            "ns1",
            "web-1",
            "retrying after backoff",
            "2024-01-01T00:00:05Z",
        )),
        Arc::new(entry(
            "ns1",
            "web-2",
            "started accepting connections",
            "2024-01-01T00:01:00Z",
        )),
    ];
    MockDomain::new("log", vec![APPLICATION], objects)
}
