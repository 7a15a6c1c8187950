//! Rule-document loader: YAML or JSON documents describing Stores and
//! Rules, with alias and `include` resolution (spec.md §4.6).
//!
//! Grounded on the teacher's catalog loader (`src/catalog.rs`), which
//! reads a document of named relation schemas and validates references
//! eagerly; generalized here to rule documents that reference classes by
//! `<domain>:<class>` string, optionally through a named alias, and that
//! may `include` further documents.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::domain::DomainRegistry;
use crate::error::ConfigError;
use crate::object::Class;
use crate::query::Query;
use crate::rule::{GoalParser, Rule};
use crate::rule_index::RuleIndex;
use crate::store::Store;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct RuleDocument {
    aliases: HashMap<String, Vec<String>>,
    rules: Vec<RuleSpec>,
    stores: Vec<StoreSpec>,
    include: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleSpec {
    name: String,
    start: Vec<String>,
    goal: Vec<String>,
    template: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoreSpec {
    domain: String,
    #[serde(default)]
    config: serde_json::Value,
}

/// Everything a rule document resolves to: a compiled rule set and one
/// Store per domain it configured.
pub struct LoadedRules {
    pub index: RuleIndex,
    pub stores: HashMap<&'static str, Arc<dyn Store>>,
}

/// Parse `text` as YAML, falling back to JSON — YAML is a superset of
/// JSON for our purposes, but trying JSON first gives a clearer error
/// message for documents that are meant to be JSON (spec.md §4.6).
fn parse_document(path: &Path, text: &str) -> Result<RuleDocument, ConfigError> {
    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    if is_json {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    } else {
        serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

/// Resolve a list of `<domain>:<class>` strings, each optionally an
/// alias name defined in `aliases`, into concrete [`Class`]es.
fn resolve_classes(
    refs: &[String],
    aliases: &HashMap<String, Vec<String>>,
    registry: &DomainRegistry,
) -> Result<Vec<Class>, ConfigError> {
    let mut classes = Vec::new();
    for r in refs {
        if let Some(expanded) = aliases.get(r) {
            classes.extend(resolve_classes(expanded, aliases, registry)?);
        } else if r.contains(':') {
            classes.push(registry.resolve_class(r)?);
        } else {
            return Err(ConfigError::UnresolvedAlias(r.clone()));
        }
    }
    Ok(classes)
}

/// Build a [`GoalParser`] that dispatches to whichever domain owns the
/// rendered query's class, resolved at call time through `registry`.
/// Boxed/closed-over rather than a plain `fn` pointer, since it must
/// capture the registry (see [`crate::rule::GoalParser`]'s doc comment).
fn goal_parser(registry: Arc<DomainRegistry>, goal_classes: Vec<Class>) -> GoalParser {
    Arc::new(move |rendered: &str| -> Option<Box<dyn Query>> {
        for class in &goal_classes {
            if let Some(domain) = registry.get(class.domain) {
                if let Ok(query) = domain.parse_query(rendered) {
                    if query.class() == *class {
                        return Some(query);
                    }
                }
            }
        }
        None
    })
}

/// Load one rule document (and, transitively, anything it `include`s)
/// against `registry`. Fails fast on any unknown domain/class, duplicate
/// rule name, or malformed document (spec.md §4.6, §7 — these are fatal
/// [`ConfigError`]s, not per-rule failures).
///
/// Takes `registry` already behind an `Arc` since each rule's
/// [`GoalParser`] closes over a clone of it to resolve goal queries at
/// traversal time.
pub fn load_rule_document(
    path: &Path,
    registry: &Arc<DomainRegistry>,
) -> Result<LoadedRules, ConfigError> {
    let mut index = RuleIndex::new();
    let mut stores = HashMap::new();
    let mut visited = HashSet::new();
    load_into(path, registry, &mut index, &mut stores, &mut visited)?;
    Ok(LoadedRules { index, stores })
}

fn load_into(
    path: &Path,
    registry: &Arc<DomainRegistry>,
    index: &mut RuleIndex,
    stores: &mut HashMap<&'static str, Arc<dyn Store>>,
    visited: &mut HashSet<PathBuf>,
) -> Result<(), ConfigError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical) {
        return Ok(());
    }
    let text = std::fs::read_to_string(path)?;
    let doc = parse_document(path, &text)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    for include in &doc.include {
        load_into(&base.join(include), registry, index, stores, visited)?;
    }

    for store_spec in doc.stores {
        let domain = registry
            .get(&store_spec.domain)
            .ok_or_else(|| ConfigError::UnknownDomain(store_spec.domain.clone()))?;
        let store = domain
            .new_store(store_spec.config)
            .map_err(|e| ConfigError::BadStoreConfig(e.to_string()))?;
        stores.insert(domain.name(), store);
    }

    for rule_spec in doc.rules {
        let start_classes = resolve_classes(&rule_spec.start, &doc.aliases, registry)?;
        let goal_classes = resolve_classes(&rule_spec.goal, &doc.aliases, registry)?;
        if start_classes.is_empty() {
            return Err(ConfigError::EmptyClassSet(rule_spec.name));
        }
        if goal_classes.is_empty() {
            return Err(ConfigError::EmptyClassSet(rule_spec.name));
        }
        let parser = goal_parser(registry.clone(), goal_classes.clone());
        let rule = Rule::compile(
            rule_spec.name,
            start_classes,
            goal_classes,
            &rule_spec.template,
            parser,
        )?;
        // Merged depth-first: this document's own rules are added after
        // its includes have already been loaded, so a same-named rule
        // here overrides the one the include contributed (spec.md §6).
        index.add_or_replace_rule(rule);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::k8s;
    use std::io::Write;

    fn registry() -> Arc<DomainRegistry> {
        Arc::new(DomainRegistry::with_bundled_domains())
    }

    #[test]
    fn loads_rules_and_builds_stores() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            r#"
aliases:
  pods: ["k8s:Pod"]
stores:
  - domain: k8s
    config: {{}}
  - domain: log
    config: {{}}
rules:
  - name: podToEvent
    start: ["pods"]
    goal: ["k8s:Event"]
    template: "Event"
"#
        )
        .unwrap();
        let registry = registry();
        let loaded = load_rule_document(file.path(), &registry).unwrap();
        assert_eq!(loaded.index.len(), 1);
        assert!(loaded.stores.contains_key("k8s"));
        assert!(loaded.stores.contains_key("log"));
    }

    #[test]
    fn unknown_domain_in_store_is_fatal() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(file, "stores:\n  - domain: nope\n    config: {{}}\n").unwrap();
        let registry = registry();
        let err = load_rule_document(file.path(), &registry).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDomain(_)));
    }

    #[test]
    fn empty_class_set_is_fatal() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            "rules:\n  - name: bad\n    start: []\n    goal: [\"k8s:Event\"]\n    template: \"Event\"\n"
        )
        .unwrap();
        let registry = registry();
        let err = load_rule_document(file.path(), &registry).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyClassSet(_)));
    }

    #[test]
    fn include_is_resolved_relative_to_including_file() {
        let dir = tempfile::tempdir().unwrap();
        let included_path = dir.path().join("base.yaml");
        std::fs::write(
            &included_path,
            "stores:\n  - domain: k8s\n    config: {}\n",
        )
        .unwrap();
        let main_path = dir.path().join("main.yaml");
        std::fs::write(&main_path, "include: [\"base.yaml\"]\n").unwrap();
        let registry = registry();
        let loaded = load_rule_document(&main_path, &registry).unwrap();
        assert!(loaded.stores.contains_key("k8s"));
    }

    #[test]
    fn including_document_overrides_included_rule_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let included_path = dir.path().join("base.yaml");
        std::fs::write(
            &included_path,
            "rules:\n  - name: podToEvent\n    start: [\"k8s:Pod\"]\n    goal: [\"k8s:Event\"]\n    template: \"Event\"\n",
        )
        .unwrap();
        let main_path = dir.path().join("main.yaml");
        std::fs::write(
            &main_path,
            "include: [\"base.yaml\"]\nrules:\n  - name: podToEvent\n    start: [\"k8s:Event\"]\n    goal: [\"k8s:Pod\"]\n    template: \"Pod\"\n",
        )
        .unwrap();
        let registry = registry();
        let loaded = load_rule_document(&main_path, &registry).unwrap();
        assert_eq!(loaded.index.len(), 1);
        let overridden = &loaded.index.applicable_from(k8s::domain().class("Event").unwrap())[0];
        assert_eq!(overridden.name, "podToEvent");
    }
}
