//! `Rule`: one source-class-set → template → goal-class-set edge
//! generator (spec.md §4.2).
//!
//! Grounded on the teacher's `Rule` type (`src/ast/mod.rs`) and its
//! catalog (`src/rule_catalog.rs`) in spirit only: both register a named
//! rule once at load time and apply it repeatedly at run time, but the
//! teacher's rule bodies are Datalog clauses over relations, while these
//! compile to [`crate::template::Template`] and apply to one
//! [`crate::object::Object`] at a time.

use std::sync::Arc;

use crate::error::RuleError;
use crate::object::{Class, Object};
use crate::query::Query;
use crate::template::Template;

/// Parses a rendered template string into a Query, for the domain that
/// owns a rule's goal classes. A boxed closure rather than a plain `fn`
/// pointer because `crate::config::rules` builds one per rule document
/// by closing over a [`crate::domain::DomainRegistry`] lookup.
pub type GoalParser = std::sync::Arc<dyn Fn(&str) -> Option<Box<dyn Query>> + Send + Sync>;

/// A compiled correlation rule (spec.md §4.2).
///
/// `name` is unique within a [`crate::rule_index::RuleIndex`] and is
/// surfaced on every [`crate::graph::Edge`] the rule produces and on
/// every [`RuleError`] it raises.
pub struct Rule {
    pub name: String,
    pub start_classes: Vec<Class>,
    pub goal_classes: Vec<Class>,
    template: Template,
    domain_of_goal: GoalParser,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("start_classes", &self.start_classes)
            .field("goal_classes", &self.goal_classes)
            .finish()
    }
}

/// What applying a rule to one object produced.
#[derive(Debug)]
pub enum RuleOutcome {
    /// The template rendered to an empty string: the rule does not apply
    /// to this object (spec.md §4.2 step 2). Not an error.
    Guarded,
    /// A query to resolve against a Store.
    Query(Box<dyn Query>),
}

impl Rule {
    /// Build a rule from its pieces (spec.md §4.2). `parse_goal_query`
    /// wraps the owning goal domain's `parse_query`, so a `Rule` doesn't
    /// need to hold a `dyn Domain` reference itself — `crate::config` is
    /// the only place that wires rules to domains.
    pub fn compile(
        name: impl Into<String>,
        start_classes: Vec<Class>,
        goal_classes: Vec<Class>,
        template_source: &str,
        parse_goal_query: GoalParser,
    ) -> Result<Rule, RuleError> {
        let name = name.into();
        if start_classes.is_empty() {
            return Err(RuleError::TemplateCompile {
                rule: name,
                message: "rule has an empty start-class set".to_string(),
            });
        }
        if goal_classes.is_empty() {
            return Err(RuleError::TemplateCompile {
                rule: name,
                message: "rule has an empty goal-class set".to_string(),
            });
        }
        let template = Template::compile(&name, template_source)?;
        Ok(Rule {
            name,
            start_classes,
            goal_classes,
            template,
            domain_of_goal: parse_goal_query,
        })
    }

    pub fn applies_to_class(&self, class: Class) -> bool {
        self.start_classes.contains(&class)
    }

    /// Apply the rule to `object` (spec.md §4.2): execute the template,
    /// guard out on an empty result, otherwise parse the rendered string
    /// as a Query through the goal domain and check it lands in this
    /// rule's goal-class set.
    pub fn apply(&self, object: &Arc<dyn Object>) -> Result<RuleOutcome, RuleError> {
        if !self.applies_to_class(object.class()) {
            return Ok(RuleOutcome::Guarded);
        }
        let rendered = self.template.execute(object.as_ref())?;
        if rendered.is_empty() {
            return Ok(RuleOutcome::Guarded);
        }
        let query = (self.domain_of_goal)(&rendered).ok_or_else(|| RuleError::QueryInvalid {
            rule: self.name.clone(),
            message: format!("could not parse rendered query '{rendered}'"),
        })?;
        if !self.goal_classes.contains(&query.class()) {
            return Err(RuleError::GoalMismatch {
                rule: self.name.clone(),
                produced: query.class().full_name(),
            });
        }
        Ok(RuleOutcome::Query(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::k8s;
    use crate::domain::mock::MockQuery;
    use std::collections::BTreeMap;

    fn parse_k8s() -> GoalParser {
        std::sync::Arc::new(|s: &str| {
            let class_name = s.split('?').next()?;
            let class = k8s::domain().class(class_name)?;
            Some(Box::new(MockQuery::all(class)) as Box<dyn Query>)
        })
    }

    #[test]
    fn rule_guards_out_on_wrong_start_class() {
        let rule = Rule::compile(
            "r1",
            vec![k8s::EVENT],
            vec![k8s::POD],
            "Pod",
            parse_k8s(),
        )
        .unwrap();
        let pod = Arc::new(crate::domain::mock::MockObject::new(
            k8s::POD,
            "p",
            BTreeMap::new(),
        )) as Arc<dyn Object>;
        assert!(matches!(rule.apply(&pod).unwrap(), RuleOutcome::Guarded));
    }

    #[test]
    fn rule_produces_query_for_matching_class() {
        let rule = Rule::compile(
            "r2",
            vec![k8s::POD],
            vec![k8s::EVENT],
            "Event",
            parse_k8s(),
        )
        .unwrap();
        let pod = Arc::new(crate::domain::mock::MockObject::new(
            k8s::POD,
            "p",
            BTreeMap::new(),
        )) as Arc<dyn Object>;
        match rule.apply(&pod).unwrap() {
            RuleOutcome::Query(q) => assert_eq!(q.class(), k8s::EVENT),
            RuleOutcome::Guarded => panic!("expected a query"),
        }
    }

    #[test]
    fn rule_with_empty_start_classes_rejected_at_compile() {
        let err = Rule::compile("r3", vec![], vec![k8s::POD], "Pod", parse_k8s()).unwrap_err();
        assert!(matches!(err, RuleError::TemplateCompile { .. }));
    }
}
