//! `Engine`: the bounded-concurrency traversal driver (spec.md §4.4, §5).
//!
//! Concurrency is bounded the way the teacher bounds concurrent
//! connections in `src/protocol/rest/mod.rs`: a `tokio::sync::Semaphore`
//! gates how many tasks may run at once, sized from config rather than a
//! hardcoded constant. Tasks are owned by a `JoinSet`, and only the loop
//! draining `JoinSet::join_next` ever touches shared state — here, the
//! [`Graph`] being built — so no lock is needed around it. The
//! cancel/timeout race mirrors the cooperative-cancellation split in the
//! teacher's `src/execution/timeout.rs`: an explicit cancel flag checked
//! independently of the deadline, so a caller-triggered cancel and an
//! elapsed budget are reported as distinct outcomes rather than conflated
//! into one "stopped early" error.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::constraint::Constraint;
use crate::domain::DomainRegistry;
use crate::error::{EngineError, EngineResult};
use crate::graph::{Graph, RuleFailure};
use crate::object::{Class, ObjectRef};
use crate::query::Query;
use crate::rule::RuleOutcome;
use crate::rule_index::RuleIndex;
use crate::store::{get_with_retry, RetryPolicy, Store};

/// Tunables for one [`Engine`] (spec.md §5).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Max concurrent in-flight Store calls.
    pub worker_concurrency: usize,
    /// Wall-clock budget for one rule-step's Store call, retries included
    /// (spec.md §5).
    pub per_query_timeout: Duration,
    pub retry_policy: RetryPolicy,
    /// Upper bound on chain length `Goals` will consider when pruning
    /// rules to those that can reach a requested goal class.
    pub max_goal_chain: usize,
    /// Wall-clock budget for an entire traversal (spec.md §5): a
    /// `Neighbours`/`Goals` call that blows this budget returns
    /// `EngineError::Timeout` rather than the partial Graph, since a
    /// caller that asked for a bounded traversal should get a clear
    /// failure rather than silently-partial results.
    pub total_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            worker_concurrency: num_cpus::get().max(1),
            per_query_timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
            max_goal_chain: 6,
            total_timeout: Duration::from_secs(120),
        }
    }
}

/// Drives `Neighbours`/`Goals` traversals (spec.md §4.4) over a fixed
/// rule set and a fixed set of per-domain Stores.
pub struct Engine {
    rules: Arc<RuleIndex>,
    stores: Arc<HashMap<&'static str, Arc<dyn Store>>>,
    domains: Arc<DomainRegistry>,
    config: EngineConfig,
}

type LevelResult = (usize, String, Class, Result<Vec<ObjectRef>, crate::error::StoreError>);

impl Engine {
    pub fn new(
        rules: Arc<RuleIndex>,
        stores: HashMap<&'static str, Arc<dyn Store>>,
        domains: Arc<DomainRegistry>,
        config: EngineConfig,
    ) -> Self {
        Engine {
            rules,
            stores: Arc::new(stores),
            domains,
            config,
        }
    }

    /// Resolve a `<domain>:<class>` string against this Engine's domains
    /// (spec.md §6 `Engine.Class`). Delegates to
    /// `DomainRegistry::resolve_class`, translating its fatal
    /// [`crate::error::ConfigError`] into the engine-facing
    /// `EngineError::UnknownClass`/`UnknownDomain` variants.
    pub fn class(&self, full_name: &str) -> EngineResult<Class> {
        self.domains.resolve_class(full_name).map_err(|err| match err {
            crate::error::ConfigError::UnknownDomain(domain) => EngineError::UnknownDomain(domain),
            crate::error::ConfigError::UnknownClass { domain, class } => {
                EngineError::UnknownClass(format!("{domain}:{class}"))
            }
            other => EngineError::UnknownClass(other.to_string()),
        })
    }

    /// Parse a `<domain>:<local-query-string>` string into a `Query`
    /// (spec.md §6 `Engine.Query`), the same convention `Class::full_name`
    /// and `DomainRegistry::resolve_class` use for `<domain>:<class>`: the
    /// part before the first `:` selects the domain, the remainder is
    /// handed to that domain's own `Domain::parse_query`.
    pub fn query(&self, query_string: &str) -> EngineResult<Box<dyn Query>> {
        let (domain_name, rest) = query_string
            .split_once(':')
            .ok_or_else(|| EngineError::BadQuery(format!("malformed query string '{query_string}'")))?;
        let domain = self
            .domains
            .get(domain_name)
            .ok_or_else(|| EngineError::UnknownDomain(domain_name.to_string()))?;
        domain
            .parse_query(rest)
            .map_err(|err| EngineError::BadQuery(err.to_string()))
    }

    /// Breadth-first expansion of `seed` by up to `depth` hops, with no
    /// goal in mind (spec.md §4.4 `Neighbours`).
    pub async fn neighbours(
        &self,
        seed: Vec<ObjectRef>,
        depth: usize,
        constraint: Constraint,
    ) -> EngineResult<Graph> {
        self.neighbours_with_cancel(seed, depth, constraint, CancellationToken::new())
            .await
    }

    /// Like [`Engine::neighbours`], but the caller supplies the
    /// `CancellationToken` instead of the Engine creating its own.
    /// Cancelling it before anything has merged fails the call with
    /// `EngineError::Cancelled`; cancelling it mid-traversal instead
    /// returns `Ok` with a partial Graph whose `Graph::cancelled()` is
    /// true (spec.md §5, §7, §8 scenario S6).
    pub async fn neighbours_with_cancel(
        &self,
        seed: Vec<ObjectRef>,
        depth: usize,
        constraint: Constraint,
        cancel: CancellationToken,
    ) -> EngineResult<Graph> {
        // A zero-hop call never dispatches a rule, so there is nothing a
        // seed class/domain could be "unknown" to yet.
        if depth > 0 {
            self.validate_known(seed.iter().map(|o| o.class()))?;
        }
        self.with_overall_timeout(cancel.clone(), self.traverse(seed, depth, None, constraint, cancel))
            .await
    }

    /// Every class in `classes` must be mentioned by at least one rule
    /// (as a start or goal class) and belong to a domain this Engine has a
    /// configured Store for — otherwise no rule could ever resolve it
    /// further (spec.md §7: unknown class/domain is a fatal `EngineError`,
    /// not a per-rule failure, since it means the caller, not a rule, is
    /// wrong).
    fn validate_known(&self, classes: impl Iterator<Item = Class>) -> EngineResult<()> {
        for class in classes {
            if !self.stores.contains_key(class.domain) {
                return Err(EngineError::UnknownDomain(class.domain.to_string()));
            }
            if !self.rules.knows_class(class) {
                return Err(EngineError::UnknownClass(class.full_name()));
            }
        }
        Ok(())
    }

    /// Breadth-first expansion of `seed`, pruned to rule chains that can
    /// reach one of `goal_classes` within `EngineConfig::max_goal_chain`
    /// hops, stopping early once every requested goal class has at least
    /// one node in the result (spec.md §4.4 `Goals`; the early-stop
    /// behavior is this crate's resolution of that section's Open
    /// Question, recorded in DESIGN.md).
    pub async fn goals(
        &self,
        seed: Vec<ObjectRef>,
        goal_classes: Vec<Class>,
        constraint: Constraint,
    ) -> EngineResult<Graph> {
        let cancel = CancellationToken::new();
        if self.config.max_goal_chain > 0 {
            self.validate_known(seed.iter().map(|o| o.class()))?;
        }
        self.validate_known(goal_classes.iter().copied())?;
        let mut allowed = HashSet::new();
        for &seed_class in &{
            let mut classes: Vec<Class> = seed.iter().map(|o| o.class()).collect();
            classes.sort_by_key(|c| c.full_name());
            classes.dedup();
            classes
        } {
            for &goal in &goal_classes {
                for path in self
                    .rules
                    .paths_between(seed_class, goal, self.config.max_goal_chain)
                {
                    allowed.extend(path);
                }
            }
        }
        if allowed.is_empty() {
            debug!("no rule chain reaches any requested goal class from the seed set");
        }
        self.with_overall_timeout(
            cancel.clone(),
            self.traverse(
                seed,
                self.config.max_goal_chain,
                Some((goal_classes, allowed)),
                constraint,
                cancel,
            ),
        )
        .await
    }

    /// Race `fut` against `EngineConfig::total_timeout`. Cancellation is
    /// handled cooperatively inside `traverse` itself (spec.md §8 scenario
    /// S6: a cancel that lands mid-traversal should leave the Graph
    /// merged so far intact, not throw it away), so this only needs to
    /// step in for the hard deadline: if the budget runs out first, it
    /// triggers `cancel` itself (aborting every in-flight rule-step) and
    /// reports `EngineError::Timeout` instead of the traversal's own
    /// result (spec.md §5, §7).
    async fn with_overall_timeout(
        &self,
        cancel: CancellationToken,
        fut: impl std::future::Future<Output = EngineResult<Graph>>,
    ) -> EngineResult<Graph> {
        match tokio::time::timeout(self.config.total_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                Err(EngineError::Timeout(self.config.total_timeout))
            }
        }
    }

    async fn traverse(
        &self,
        seed: Vec<ObjectRef>,
        depth: usize,
        goal: Option<(Vec<Class>, HashSet<String>)>,
        constraint: Constraint,
        cancel: CancellationToken,
    ) -> EngineResult<Graph> {
        let mut graph = Graph::new();
        let mut frontier: Vec<(usize, ObjectRef)> = Vec::new();
        for object in seed {
            let index = graph.insert(object.clone(), 0);
            frontier.push((index, object));
        }
        frontier.sort_by(|a, b| a.1.id().cmp(&b.1.id()));

        // Cancelled before any level has been merged: nothing to salvage,
        // so this is a hard failure rather than a (trivially empty)
        // partial Graph (spec.md §7).
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        if let Some((goals, _)) = &goal {
            if goals.iter().all(|g| graph.class_count(*g) > 0) && !goals.is_empty() {
                return Ok(graph);
            }
        }

        for current_depth in 0..depth {
            if !graph.within_limits(&constraint) || frontier.is_empty() {
                break;
            }
            let allowed_rules = goal.as_ref().map(|(_, rules)| rules);
            let (results, rule_errors) = self
                .run_level(&frontier, allowed_rules, &constraint, &cancel)
                .await?;
            for failure in rule_errors {
                graph.record_error(failure);
            }
            frontier = self.merge_level(&mut graph, results, current_depth + 1, &constraint);

            // Cancelled while that level's Store calls were in flight: keep
            // what was already merged and stop expanding further, rather
            // than discarding it (spec.md §8 scenario S6).
            if cancel.is_cancelled() {
                graph.mark_cancelled();
                break;
            }

            if let Some((goals, _)) = &goal {
                if !goals.is_empty() && goals.iter().all(|g| graph.class_count(*g) > 0) {
                    break;
                }
            }
        }
        Ok(graph)
    }

    /// Render one candidate query per (frontier object, applicable rule)
    /// pair, then group by Store and dedup identical rendered queries
    /// before dispatching (spec.md §4.4): two objects whose rule produces
    /// the same query share a single Store call, retry counter, and
    /// outcome instead of racing independent ones (spec.md §8 invariant
    /// 5 — determinism under flaky retries would otherwise depend on task
    /// scheduling). Bounded to `worker_concurrency` concurrent Store
    /// calls; every task's only shared state is the read-only `Arc`s it's
    /// given, so there is no lock to take.
    async fn run_level(
        &self,
        frontier: &[(usize, ObjectRef)],
        allowed_rules: Option<&HashSet<String>>,
        constraint: &Constraint,
        cancel: &CancellationToken,
    ) -> EngineResult<(Vec<LevelResult>, Vec<RuleFailure>)> {
        let mut rule_errors = Vec::new();
        let mut grouped: HashMap<Box<dyn Query>, Vec<(usize, String)>> = HashMap::new();

        for &(from_index, ref object) in frontier {
            for rule in self.rules.applicable_from(object.class()) {
                if let Some(allowed) = allowed_rules {
                    if !allowed.contains(&rule.name) {
                        continue;
                    }
                }
                let outcome = match rule.apply(object) {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        rule_errors.push(RuleFailure {
                            rule: rule.name.clone(),
                            object_id: Some(object.id()),
                            error: err,
                        });
                        continue;
                    }
                };
                let query = match outcome {
                    RuleOutcome::Guarded => continue,
                    RuleOutcome::Query(q) => q,
                };
                grouped
                    .entry(query)
                    .or_default()
                    .push((from_index, rule.name.clone()));
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.config.worker_concurrency.max(1)));
        let mut join_set: JoinSet<(Vec<(usize, String)>, Class, Result<Vec<ObjectRef>, crate::error::StoreError>)> =
            JoinSet::new();

        for (query, consumers) in grouped {
            let query_class = query.class();
            let store = self.stores.get(query_class.domain).cloned();
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
            let constraint = constraint.clone();
            let cancel = cancel.clone();
            let retry_policy = self.config.retry_policy;
            let timeout_dur = self.config.per_query_timeout;
            let step_limit = constraint.per_rule_step_limit;
            join_set.spawn(async move {
                let _permit = permit;
                let result = match store {
                    None => Err(crate::error::StoreError::ClassMismatch {
                        domain: query_class.domain,
                        query_class: query_class.full_name(),
                    }),
                    Some(store) => {
                        let fut = get_with_retry(
                            store.as_ref(),
                            query.as_ref(),
                            &constraint,
                            step_limit,
                            &cancel,
                            retry_policy,
                        );
                        match tokio::time::timeout(timeout_dur, fut).await {
                            Ok(result) => result,
                            Err(_) => Err(crate::error::StoreError::Unavailable(
                                "rule step timed out".to_string(),
                            )),
                        }
                    }
                };
                (consumers, query_class, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((consumers, query_class, result)) => {
                    for (from_index, rule_name) in consumers {
                        results.push((from_index, rule_name, query_class, result.clone()));
                    }
                }
                Err(join_err) => {
                    warn!(error = %join_err, "rule-step task panicked");
                }
            }
        }
        // Re-sort into a stable order: task completion order is racy, but
        // the merge must be deterministic (spec.md §9).
        results.sort_by(|a, b| (a.0, &a.1, a.2.full_name()).cmp(&(b.0, &b.1, b.2.full_name())));
        Ok((results, rule_errors))
    }

    /// The single writer: folds one level's (already sorted) results into
    /// `graph`, inserting nodes, adding edges, and recording any Store
    /// failure as a non-fatal [`RuleFailure`] (spec.md §7).
    fn merge_level(
        &self,
        graph: &mut Graph,
        results: Vec<LevelResult>,
        depth: usize,
        constraint: &Constraint,
    ) -> Vec<(usize, ObjectRef)> {
        let mut next_frontier = Vec::new();
        for (from_index, rule_name, _query_class, result) in results {
            match result {
                Ok(mut objects) => {
                    objects.sort_by(|a, b| a.id().cmp(&b.id()));
                    for object in objects {
                        if let Some(ts) = object.timestamp() {
                            if !constraint.allows_time(ts) {
                                continue;
                            }
                        }
                        if let Some(per_class) = constraint.per_class_limit {
                            if graph.class_count(object.class()) >= per_class
                                && !graph.contains(object.class(), &object.id())
                            {
                                continue;
                            }
                        }
                        if !graph.within_limits(constraint) {
                            break;
                        }
                        let already_known = graph.contains(object.class(), &object.id());
                        let to_index = graph.insert(object.clone(), depth);
                        graph.add_edge(from_index, to_index, rule_name.clone());
                        if !already_known {
                            next_frontier.push((to_index, object));
                        }
                    }
                }
                Err(source) => {
                    graph.record_error(RuleFailure {
                        rule: rule_name.clone(),
                        object_id: graph.nodes().get(from_index).map(|n| n.object.id()),
                        error: crate::error::RuleError::Store {
                            rule: rule_name,
                            source,
                        },
                    });
                }
            }
        }
        next_frontier.sort_by(|a, b| a.1.id().cmp(&b.1.id()));
        next_frontier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::k8s;
    use crate::domain::mock::{MockObject, MockQuery};
    use crate::rule::Rule;
    use std::collections::BTreeMap;

    fn parser() -> crate::rule::GoalParser {
        std::sync::Arc::new(|s: &str| {
            let class_name = s.split('?').next()?;
            let class = k8s::domain().class(class_name)?;
            Some(Box::new(MockQuery::all(class)) as Box<dyn crate::query::Query>)
        })
    }

    #[tokio::test]
    async fn neighbours_expands_one_hop() {
        let mut index = RuleIndex::new();
        index
            .add_rule(Rule::compile("pod_to_event", vec![k8s::POD], vec![k8s::EVENT], "Event", parser()).unwrap())
            .unwrap();
        let mut stores: HashMap<&'static str, Arc<dyn Store>> = HashMap::new();
        stores.insert("k8s", k8s::domain().new_store(serde_json::Value::Null).unwrap());

        let engine = Engine::new(Arc::new(index), stores, Arc::new(crate::domain::DomainRegistry::with_bundled_domains()), EngineConfig::default());
        let seed = vec![Arc::new(MockObject::new(k8s::POD, "ns1/web-1", BTreeMap::new())) as ObjectRef];
        let graph = engine
            .neighbours(seed, 1, Constraint::unbounded())
            .await
            .unwrap();
        assert!(graph.class_count(k8s::EVENT) > 0);
        assert!(!graph.edges().is_empty());
    }

    #[tokio::test]
    async fn neighbours_with_zero_depth_returns_only_seed() {
        let index = RuleIndex::new();
        let stores: HashMap<&'static str, Arc<dyn Store>> = HashMap::new();
        let engine = Engine::new(Arc::new(index), stores, Arc::new(crate::domain::DomainRegistry::with_bundled_domains()), EngineConfig::default());
        let seed = vec![Arc::new(MockObject::new(k8s::POD, "ns1/web-1", BTreeMap::new())) as ObjectRef];
        let graph = engine
            .neighbours(seed, 0, Constraint::unbounded())
            .await
            .unwrap();
        assert_eq!(graph.nodes().len(), 1);
        assert!(graph.edges().is_empty());
    }

    #[tokio::test]
    async fn goals_stops_once_goal_class_present() {
        let mut index = RuleIndex::new();
        index
            .add_rule(Rule::compile("pod_to_event", vec![k8s::POD], vec![k8s::EVENT], "Event", parser()).unwrap())
            .unwrap();
        let mut stores: HashMap<&'static str, Arc<dyn Store>> = HashMap::new();
        stores.insert("k8s", k8s::domain().new_store(serde_json::Value::Null).unwrap());

        let engine = Engine::new(Arc::new(index), stores, Arc::new(crate::domain::DomainRegistry::with_bundled_domains()), EngineConfig::default());
        let seed = vec![Arc::new(MockObject::new(k8s::POD, "ns1/web-1", BTreeMap::new())) as ObjectRef];
        let graph = engine
            .goals(seed, vec![k8s::EVENT], Constraint::unbounded())
            .await
            .unwrap();
        assert!(graph.class_count(k8s::EVENT) > 0);
    }

    #[tokio::test]
    async fn neighbours_rejects_seed_from_unconfigured_domain() {
        let mut index = RuleIndex::new();
        index
            .add_rule(Rule::compile("pod_to_event", vec![k8s::POD], vec![k8s::EVENT], "Event", parser()).unwrap())
            .unwrap();
        // No store registered for "k8s" at all.
        let stores: HashMap<&'static str, Arc<dyn Store>> = HashMap::new();
        let engine = Engine::new(Arc::new(index), stores, Arc::new(crate::domain::DomainRegistry::with_bundled_domains()), EngineConfig::default());
        let seed = vec![Arc::new(MockObject::new(k8s::POD, "ns1/web-1", BTreeMap::new())) as ObjectRef];
        let err = engine.neighbours(seed, 1, Constraint::unbounded()).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownDomain(_)));
    }

    #[tokio::test]
    async fn neighbours_rejects_seed_class_no_rule_mentions() {
        let index = RuleIndex::new();
        let mut stores: HashMap<&'static str, Arc<dyn Store>> = HashMap::new();
        stores.insert("k8s", k8s::domain().new_store(serde_json::Value::Null).unwrap());
        let engine = Engine::new(Arc::new(index), stores, Arc::new(crate::domain::DomainRegistry::with_bundled_domains()), EngineConfig::default());
        let seed = vec![Arc::new(MockObject::new(k8s::POD, "ns1/web-1", BTreeMap::new())) as ObjectRef];
        let err = engine.neighbours(seed, 1, Constraint::unbounded()).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownClass(_)));
    }

    #[tokio::test]
    async fn neighbours_with_cancel_reports_cancelled_not_timeout() {
        let mut index = RuleIndex::new();
        index
            .add_rule(Rule::compile("pod_to_event", vec![k8s::POD], vec![k8s::EVENT], "Event", parser()).unwrap())
            .unwrap();
        let mut stores: HashMap<&'static str, Arc<dyn Store>> = HashMap::new();
        stores.insert("k8s", k8s::domain().new_store(serde_json::Value::Null).unwrap());
        let engine = Engine::new(Arc::new(index), stores, Arc::new(crate::domain::DomainRegistry::with_bundled_domains()), EngineConfig::default());
        let seed = vec![Arc::new(MockObject::new(k8s::POD, "ns1/web-1", BTreeMap::new())) as ObjectRef];
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = engine
            .neighbours_with_cancel(seed, 1, Constraint::unbounded(), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }
}
