//! Crate-wide error taxonomy.
//!
//! Mirrors the fatal/non-fatal split the engine relies on: [`ConfigError`]
//! and [`EngineError`] abort their caller, while [`StoreError`] and
//! [`RuleError`] are captured per (rule, object) pair and surfaced on the
//! [`crate::graph::Graph`] instead of aborting a traversal.

use thiserror::Error;

/// Failures a [`crate::store::Store`] can report for one `get` call.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Transient I/O failure. Retried with backoff before becoming fatal
    /// for the (rule, object) pair that triggered it.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The query could not be parsed or executed by this store.
    #[error("bad query: {0}")]
    BadQuery(String),

    /// The query's class does not belong to this store's domain.
    #[error("query class {query_class} not served by domain {domain}")]
    ClassMismatch {
        domain: &'static str,
        query_class: String,
    },

    /// The store was asked to abort via cancellation.
    #[error("store call cancelled")]
    Cancelled,
}

/// Result alias for [`crate::store::Store`] implementations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures produced while applying a [`crate::rule::Rule`] to one object.
///
/// All variants are non-fatal: the engine records them on the Graph
/// (spec.md §7) and continues traversal with the next object/rule.
#[derive(Error, Debug, Clone)]
pub enum RuleError {
    /// Template referenced an unknown pipeline stage or failed to compile.
    /// Raised at rule *load* time, which makes it fatal in that context
    /// even though the variant lives in the non-fatal enum (load-time
    /// compilation happens once, outside any traversal).
    #[error("template compile error in rule '{rule}': {message}")]
    TemplateCompile { rule: String, message: String },

    /// Template executed but referenced a field the object does not have,
    /// or some other runtime evaluation failure.
    #[error("template execution failed for rule '{rule}': {message}")]
    TemplateFailed { rule: String, message: String },

    /// The template produced a non-empty string that failed to parse as a
    /// Query through the goal domain's parser.
    #[error("rule '{rule}' produced an invalid query: {message}")]
    QueryInvalid { rule: String, message: String },

    /// The template produced a Query whose class is not in the rule's
    /// goal set.
    #[error("rule '{rule}' produced a query of class {produced}, not in its goal set")]
    GoalMismatch { rule: String, produced: String },

    /// The backing store failed after exhausting retries.
    #[error("store failed for rule '{rule}': {source}")]
    Store {
        rule: String,
        #[source]
        source: StoreError,
    },
}

/// Result alias for rule application.
pub type RuleResult<T> = Result<T, RuleError>;

/// Fatal, load-time configuration errors (spec.md §4.6, §7).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown domain '{0}'")]
    UnknownDomain(String),

    #[error("unknown class '{class}' in domain '{domain}'")]
    UnknownClass { domain: String, class: String },

    #[error("duplicate rule name '{0}'")]
    DuplicateRule(String),

    #[error("empty class set in rule '{0}'")]
    EmptyClassSet(String),

    #[error("unresolved alias '{0}'")]
    UnresolvedAlias(String),

    #[error("malformed store configuration: {0}")]
    BadStoreConfig(String),

    #[error(transparent)]
    Template(#[from] RuleError),

    #[error("failed to read configuration document: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration document ({path}): {message}")]
    Parse { path: String, message: String },

    #[error(transparent)]
    Figment(#[from] figment::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Fatal engine errors: abort the traversal entirely and are returned
/// instead of a [`crate::graph::Graph`] (spec.md §7).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unknown domain '{0}'")]
    UnknownDomain(String),

    #[error("unknown class '{0}'")]
    UnknownClass(String),

    /// `Engine::query` was given a string it could not parse into a
    /// `Query` (spec.md §6, §7).
    #[error("bad query: {0}")]
    BadQuery(String),

    #[error("traversal cancelled")]
    Cancelled,

    #[error("traversal timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type EngineResult<T> = Result<T, EngineError>;
