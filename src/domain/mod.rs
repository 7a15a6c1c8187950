//! Bundled domains and the domain registry (spec.md §3, §4.6).
//!
//! Real backend clients (actual Kubernetes/Loki/Prometheus wire protocols)
//! are an explicit Non-goal; [`k8s`], [`log`], [`alert`], and [`metric`]
//! are in-memory domains built on [`mock::MockStore`] that give the engine
//! something concrete to traverse in tests and examples, the way the
//! teacher's own integration tests build small in-memory relations rather
//! than standing up a real database.

pub mod alert;
pub mod k8s;
pub mod log;
pub mod metric;
pub mod mock;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::object::{Class, Domain};

/// Looks domains up by name (spec.md §4.6: rule documents reference
/// classes as `<domain>:<class>` strings resolved against this registry).
#[derive(Default)]
pub struct DomainRegistry {
    domains: HashMap<&'static str, Arc<dyn Domain>>,
}

impl DomainRegistry {
    pub fn new() -> Self {
        DomainRegistry::default()
    }

    /// A registry pre-loaded with the bundled `mock`/`k8s`/`log`/`alert`/
    /// `metric` domains, handy for tests and examples that don't need
    /// custom fixtures.
    pub fn with_bundled_domains() -> Self {
        let mut registry = DomainRegistry::new();
        registry.register(Arc::new(k8s::domain()));
        registry.register(Arc::new(log::domain()));
        registry.register(Arc::new(alert::domain()));
        registry.register(Arc::new(metric::domain()));
        registry
    }

    pub fn register(&mut self, domain: Arc<dyn Domain>) {
        self.domains.insert(domain.name(), domain);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Domain>> {
        self.domains.get(name).cloned()
    }

    /// Resolve a `<domain>:<class>` string (spec.md §6).
    pub fn resolve_class(&self, full_name: &str) -> Result<Class, ConfigError> {
        let (domain_name, class_name) = full_name
            .split_once(':')
            .ok_or_else(|| ConfigError::BadStoreConfig(format!("malformed class reference '{full_name}'")))?;
        let domain = self
            .get(domain_name)
            .ok_or_else(|| ConfigError::UnknownDomain(domain_name.to_string()))?;
        domain.class(class_name).ok_or_else(|| ConfigError::UnknownClass {
            domain: domain_name.to_string(),
            class: class_name.to_string(),
        })
    }

    pub fn domains(&self) -> impl Iterator<Item = &Arc<dyn Domain>> {
        self.domains.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_bundled_class() {
        let registry = DomainRegistry::with_bundled_domains();
        let class = registry.resolve_class("k8s:Pod").unwrap();
        assert_eq!(class.name, "Pod");
    }

    #[test]
    fn rejects_unknown_domain() {
        let registry = DomainRegistry::with_bundled_domains();
        assert!(matches!(
            registry.resolve_class("nope:Pod"),
            Err(ConfigError::UnknownDomain(_))
        ));
    }
}
