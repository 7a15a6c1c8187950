//! `RuleIndex`: the compiled rule set, queryable by start class and by
//! reachable goal-class paths (spec.md §4.3).

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::warn;

use crate::error::ConfigError;
use crate::object::Class;
use crate::rule::Rule;

/// A sequence of rule names applied in order, from some start Object's
/// class to a goal class (spec.md §4.3, §4.4's `Goals` traversal).
pub type RulePath = Vec<String>;

/// Rules indexed by their start classes, for `ApplicableFrom`, and a
/// class-to-class adjacency used by `PathsBetween` (spec.md §4.3).
#[derive(Default)]
pub struct RuleIndex {
    rules: Vec<Rule>,
    by_start_class: HashMap<Class, Vec<usize>>,
}

impl RuleIndex {
    pub fn new() -> Self {
        RuleIndex::default()
    }

    /// Register a rule, keyed by each of its start classes. Rejects
    /// duplicate rule names (spec.md §4.6) and warns on a rule whose
    /// start and goal class sets overlap — a self-loop is permitted
    /// (Open Question resolved in SPEC_FULL.md §Open Questions) but
    /// surprising enough to log at load time.
    pub fn add_rule(&mut self, rule: Rule) -> Result<(), ConfigError> {
        if self.rules.iter().any(|r| r.name == rule.name) {
            return Err(ConfigError::DuplicateRule(rule.name));
        }
        self.insert_rule(rule);
        Ok(())
    }

    /// Register a rule, replacing any earlier rule of the same name
    /// instead of erroring (spec.md §6: `include` documents are "merged
    /// depth-first, later entries override earlier by rule name"). Used
    /// by `crate::config::rules::load_into` once a document's includes
    /// have been loaded, so the including document's own rules win over
    /// anything pulled in transitively.
    pub fn add_or_replace_rule(&mut self, rule: Rule) {
        if let Some(existing) = self.rules.iter().position(|r| r.name == rule.name) {
            self.rules.remove(existing);
            for indices in self.by_start_class.values_mut() {
                indices.retain(|&i| i != existing);
                for i in indices.iter_mut() {
                    if *i > existing {
                        *i -= 1;
                    }
                }
            }
        }
        self.insert_rule(rule);
    }

    fn insert_rule(&mut self, rule: Rule) {
        if rule
            .start_classes
            .iter()
            .any(|c| rule.goal_classes.contains(c))
        {
            warn!(rule = %rule.name, "rule's start and goal class sets overlap (self-loop)");
        }
        let index = self.rules.len();
        for class in &rule.start_classes {
            self.by_start_class.entry(*class).or_default().push(index);
        }
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every rule applicable to an Object of `class`, in load order
    /// (spec.md §4.3, §9 determinism).
    pub fn applicable_from(&self, class: Class) -> Vec<&Rule> {
        self.by_start_class
            .get(&class)
            .into_iter()
            .flatten()
            .map(|&i| &self.rules[i])
            .collect()
    }

    /// Whether any rule in this index mentions `class`, as either a start
    /// or a goal class. Used by `Engine` to reject traversals seeded from,
    /// or aimed at, a class this rule set has nothing to say about
    /// (spec.md §7's fatal `EngineError::UnknownClass`).
    pub fn knows_class(&self, class: Class) -> bool {
        self.rules
            .iter()
            .any(|r| r.start_classes.contains(&class) || r.goal_classes.contains(&class))
    }

    /// Every chain of rules, up to `max_depth` steps, whose start class
    /// is `start` and whose final goal class is `goal`, free of repeated
    /// Classes (spec.md §4.3: this keeps trivial cycles out of the index
    /// so `Engine::goals` never admits a self-loop rule into its allowed
    /// set). Breadth-first so shorter paths are found — and therefore
    /// ordered — first; ties broken by rule load order, for determinism
    /// (spec.md §9).
    pub fn paths_between(&self, start: Class, goal: Class, max_depth: usize) -> Vec<RulePath> {
        let mut results = Vec::new();
        let mut queue: VecDeque<(Class, RulePath, HashSet<Class>)> = VecDeque::new();
        queue.push_back((start, Vec::new(), HashSet::from([start])));
        while let Some((current, path, visited)) = queue.pop_front() {
            if current == goal && !path.is_empty() {
                results.push(path.clone());
            }
            if path.len() >= max_depth {
                continue;
            }
            for rule in self.applicable_from(current) {
                for &next_class in &rule.goal_classes {
                    if visited.contains(&next_class) {
                        continue;
                    }
                    let mut next_path = path.clone();
                    next_path.push(rule.name.clone());
                    let mut next_visited = visited.clone();
                    next_visited.insert(next_class);
                    queue.push_back((next_class, next_path, next_visited));
                }
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::k8s;
    use crate::domain::mock::MockQuery;

    fn parser() -> crate::rule::GoalParser {
        std::sync::Arc::new(|s: &str| {
            let class_name = s.split('?').next()?;
            let class = k8s::domain().class(class_name)?;
            Some(Box::new(MockQuery::all(class)) as Box<dyn crate::query::Query>)
        })
    }

    fn rule(name: &str, start: Class, goal: Class) -> Rule {
        Rule::compile(name, vec![start], vec![goal], goal.name, parser()).unwrap()
    }

    #[test]
    fn applicable_from_respects_load_order() {
        let mut index = RuleIndex::new();
        index.add_rule(rule("r1", k8s::POD, k8s::EVENT)).unwrap();
        index.add_rule(rule("r2", k8s::POD, k8s::EVENT)).unwrap();
        let rules = index.applicable_from(k8s::POD);
        assert_eq!(rules.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), vec!["r1", "r2"]);
    }

    #[test]
    fn duplicate_rule_name_rejected() {
        let mut index = RuleIndex::new();
        index.add_rule(rule("r1", k8s::POD, k8s::EVENT)).unwrap();
        let err = index.add_rule(rule("r1", k8s::EVENT, k8s::POD)).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateRule(_)));
    }

    #[test]
    fn paths_between_finds_shortest_first() {
        let mut index = RuleIndex::new();
        index.add_rule(rule("direct", k8s::POD, k8s::EVENT)).unwrap();
        let paths = index.paths_between(k8s::POD, k8s::EVENT, 3);
        assert_eq!(paths, vec![vec!["direct".to_string()]]);
    }

    #[test]
    fn paths_between_respects_max_depth() {
        let index = RuleIndex::new();
        let paths = index.paths_between(k8s::POD, k8s::EVENT, 0);
        assert!(paths.is_empty());
    }

    #[test]
    fn paths_between_excludes_paths_that_revisit_a_class() {
        const THIRD: Class = Class::new("mock", "Third");
        let mut index = RuleIndex::new();
        index.add_rule(rule("pod_to_event", k8s::POD, k8s::EVENT)).unwrap();
        index.add_rule(rule("event_to_pod", k8s::EVENT, k8s::POD)).unwrap();
        index.add_rule(rule("event_to_third", k8s::EVENT, THIRD)).unwrap();
        let paths = index.paths_between(k8s::POD, THIRD, 4);
        assert_eq!(
            paths,
            vec![vec!["pod_to_event".to_string(), "event_to_third".to_string()]]
        );
        assert!(paths.iter().all(|p| !p.contains(&"event_to_pod".to_string())));
    }
}
