//! Signal-correlation engine: turns seed Objects plus a rule set into a
//! [`Graph`](graph::Graph) of correlated Objects across heterogeneous
//! observability backends (spec.md OVERVIEW).
//!
//! Crate layout mirrors the data model spec.md §3 lays out:
//!
//! - [`value`] — the dynamic [`value::FieldValue`] tree Objects expose.
//! - [`object`] — [`object::Class`], [`object::Object`], [`object::Domain`].
//! - [`query`] — the [`query::Query`] trait.
//! - [`store`] — the [`store::Store`] I/O boundary and retry policy.
//! - [`constraint`] — traversal-wide limits.
//! - [`template`] — the rule template mini-language.
//! - [`rule`] / [`rule_index`] — compiled rules and the rule set they live in.
//! - [`graph`] — the accumulated traversal result.
//! - [`engine`] — `Neighbours`/`Goals` traversal.
//! - [`domain`] — bundled in-memory example domains (`k8s`, `log`, `alert`, `metric`).
//! - [`config`] — layered runtime configuration and the rule-document loader.
//! - [`error`] — the crate-wide error taxonomy.
//! - [`logging`] — `tracing` subscriber setup.

pub mod config;
pub mod constraint;
pub mod domain;
pub mod engine;
pub mod error;
pub mod graph;
pub mod logging;
pub mod object;
pub mod query;
pub mod rule;
pub mod rule_index;
pub mod store;
pub mod template;
pub mod value;

pub use config::Config;
pub use constraint::Constraint;
pub use domain::DomainRegistry;
pub use engine::{Engine, EngineConfig};
pub use error::{ConfigError, EngineError, RuleError, StoreError};
pub use graph::Graph;
pub use object::{Class, Domain, Object, ObjectRef};
pub use query::Query;
pub use rule::Rule;
pub use rule_index::RuleIndex;
pub use store::Store;
