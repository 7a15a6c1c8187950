//! Rule template mini-language (spec.md §4.2, §9).
//!
//! A small, hand-rolled recursive-descent compiler/evaluator — grounded on
//! the teacher's `parser/mod.rs`, which is itself a hand-written lexer and
//! parser over `&str` rather than a PEG/grammar crate. Capabilities:
//! field navigation on the start Object, URL-query-safe escaping, range
//! over map-like fields (keys sorted lexicographically — spec.md §9's
//! determinism requirement, satisfied for free since
//! [`crate::value::FieldValue::Map`] is a `BTreeMap`), local variable
//! assignment, string concatenation.
//!
//! Grammar (see SPEC_FULL.md §4.2):
//! ```text
//! template := segment*
//! segment  := literal | "{{" expr "}}"
//! expr     := pipeline
//! pipeline := primary ("|" ident)*
//! primary  := field | var | string | concat
//! field    := "." ident ("." ident)*
//! var      := "$" ident
//! assign   := "$" ident ":=" expr            (inside a "{{ }}" block)
//! range    := "range" "$" ident "," "$" ident ":=" expr body "end"
//! concat   := primary (" + " primary)+
//! string   := '"' .. '"'
//! ```

use std::collections::HashMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::RuleError;
use crate::object::Object;
use crate::value::FieldValue;

/// Characters left unescaped by the `urlquery` pipeline stage: alphanumerics
/// plus the handful of characters a label-selector or path query string
/// uses structurally (`- _ . ~ = , : /`). Everything else is percent-encoded.
const URLQUERY_SAFE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'#')
    .add(b'?')
    .add(b'{')
    .add(b'}')
    .add(b'[')
    .add(b']')
    .add(b'\\')
    .add(b'^')
    .add(b'|')
    .add(b'&')
    .add(b'+')
    .add(b';')
    .add(b'@')
    .add(b'$')
    .add(b'\'')
    .add(b'!')
    .add(b'*')
    .add(b'(')
    .add(b')')
    .add(b'%');

fn percent_encode_component(s: &str) -> String {
    utf8_percent_encode(s, URLQUERY_SAFE).to_string()
}

const KNOWN_FILTERS: &[&str] = &["urlquery"];

#[derive(Debug, Clone)]
enum Expr {
    Field(String),
    Var(String),
    Str(String),
    Concat(Vec<Expr>),
}

#[derive(Debug, Clone)]
enum Node {
    Literal(String),
    Print(Expr, Vec<String>),
    Assign(String, Expr),
    Range {
        key_var: String,
        val_var: String,
        source: Expr,
        body: Vec<Node>,
    },
}

/// A compiled rule template. Templates are compiled once at rule load
/// (spec.md §4.2) and are deterministic functions of the Object they are
/// later executed against.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

impl Template {
    /// Compile `source`. `name` is the owning rule's name, used only to
    /// annotate errors.
    pub fn compile(name: &str, source: &str) -> Result<Template, RuleError> {
        let items = scan(source);
        let mut cursor = 0usize;
        let nodes = parse_nodes(name, &items, &mut cursor, false)?;
        if cursor != items.len() {
            return Err(RuleError::TemplateCompile {
                rule: name.to_string(),
                message: "unmatched 'end'".to_string(),
            });
        }
        Ok(Template {
            name: name.to_string(),
            nodes,
        })
    }

    /// Execute the template against `object`. An empty result means the
    /// rule guards out for this object (spec.md §4.2 step 2) — not an error.
    pub fn execute(&self, object: &dyn Object) -> Result<String, RuleError> {
        let mut scope = Scope {
            object,
            vars: HashMap::new(),
        };
        let mut out = String::new();
        exec_nodes(&self.name, &self.nodes, &mut scope, &mut out)?;
        Ok(out)
    }
}

struct Scope<'a> {
    object: &'a dyn Object,
    vars: HashMap<String, FieldValue>,
}

impl Scope<'_> {
    fn child(&self) -> Scope<'_> {
        Scope {
            object: self.object,
            vars: self.vars.clone(),
        }
    }
}

// --- scanning: split "literal text" from "{{ action }}" blocks ---

enum Item {
    Literal(String),
    Block(String),
}

fn scan(source: &str) -> Vec<Item> {
    let mut items = Vec::new();
    let mut rest = source;
    loop {
        match rest.find("{{") {
            None => {
                if !rest.is_empty() {
                    items.push(Item::Literal(rest.to_string()));
                }
                break;
            }
            Some(start) => {
                if start > 0 {
                    items.push(Item::Literal(rest[..start].to_string()));
                }
                let after_open = &rest[start + 2..];
                match after_open.find("}}") {
                    None => {
                        // Unterminated block: treat the rest as literal text,
                        // surfaced as a compile error by the parser when it
                        // never finds the matching tokens it expects.
                        items.push(Item::Literal(format!("{{{{{after_open}")));
                        break;
                    }
                    Some(end) => {
                        items.push(Item::Block(after_open[..end].trim().to_string()));
                        rest = &after_open[end + 2..];
                    }
                }
            }
        }
    }
    items
}

fn parse_nodes(
    rule: &str,
    items: &[Item],
    cursor: &mut usize,
    in_range: bool,
) -> Result<Vec<Node>, RuleError> {
    let mut nodes = Vec::new();
    while *cursor < items.len() {
        match &items[*cursor] {
            Item::Literal(text) => {
                nodes.push(Node::Literal(text.clone()));
                *cursor += 1;
            }
            Item::Block(raw) => {
                if raw == "end" {
                    if in_range {
                        return Ok(nodes);
                    }
                    return Err(RuleError::TemplateCompile {
                        rule: rule.to_string(),
                        message: "'end' without matching 'range'".to_string(),
                    });
                }
                if let Some(header) = raw.strip_prefix("range ") {
                    *cursor += 1;
                    let (key_var, val_var, source) = parse_range_header(rule, header)?;
                    let body = parse_nodes(rule, items, cursor, true)?;
                    if *cursor >= items.len() {
                        return Err(RuleError::TemplateCompile {
                            rule: rule.to_string(),
                            message: "'range' without matching 'end'".to_string(),
                        });
                    }
                    *cursor += 1; // consume the 'end' block
                    nodes.push(Node::Range {
                        key_var,
                        val_var,
                        source,
                        body,
                    });
                    continue;
                }
                if let Some(rest) = raw.strip_prefix('$') {
                    if let Some((var, expr_str)) = rest.split_once(":=") {
                        let var = var.trim().to_string();
                        let expr = parse_expr(rule, expr_str.trim())?;
                        nodes.push(Node::Assign(var, expr));
                        *cursor += 1;
                        continue;
                    }
                }
                let (expr_str, filters) = split_pipeline(raw);
                let expr = parse_expr(rule, expr_str)?;
                for filter in &filters {
                    if !KNOWN_FILTERS.contains(&filter.as_str()) {
                        return Err(RuleError::TemplateCompile {
                            rule: rule.to_string(),
                            message: format!("unknown template function '{filter}'"),
                        });
                    }
                }
                nodes.push(Node::Print(expr, filters));
                *cursor += 1;
            }
        }
    }
    Ok(nodes)
}

fn parse_range_header(rule: &str, header: &str) -> Result<(String, String, Expr), RuleError> {
    let (vars, expr_str) = header.split_once(":=").ok_or_else(|| RuleError::TemplateCompile {
        rule: rule.to_string(),
        message: "malformed 'range': expected '$k, $v := <field>'".to_string(),
    })?;
    let mut parts = vars.split(',').map(str::trim);
    let key_var = parts
        .next()
        .and_then(|p| p.strip_prefix('$'))
        .ok_or_else(|| RuleError::TemplateCompile {
            rule: rule.to_string(),
            message: "malformed 'range': missing key variable".to_string(),
        })?
        .to_string();
    let val_var = parts
        .next()
        .and_then(|p| p.strip_prefix('$'))
        .ok_or_else(|| RuleError::TemplateCompile {
            rule: rule.to_string(),
            message: "malformed 'range': missing value variable".to_string(),
        })?
        .to_string();
    let source = parse_expr(rule, expr_str.trim())?;
    Ok((key_var, val_var, source))
}

/// Split `<primary> | filter1 | filter2` on top-level `|`.
fn split_pipeline(raw: &str) -> (&str, Vec<String>) {
    let mut parts = raw.split('|');
    let head = parts.next().unwrap_or("").trim();
    let filters = parts.map(|p| p.trim().to_string()).collect();
    (head, filters)
}

fn parse_expr(rule: &str, s: &str) -> Result<Expr, RuleError> {
    let parts: Vec<&str> = s.split(" + ").map(str::trim).collect();
    if parts.len() == 1 {
        parse_primary(rule, parts[0])
    } else {
        let exprs = parts
            .into_iter()
            .map(|p| parse_primary(rule, p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Expr::Concat(exprs))
    }
}

fn parse_primary(rule: &str, s: &str) -> Result<Expr, RuleError> {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        return Ok(Expr::Str(s[1..s.len() - 1].to_string()));
    }
    if let Some(path) = s.strip_prefix('.') {
        if path.is_empty() {
            return Err(RuleError::TemplateCompile {
                rule: rule.to_string(),
                message: "bare '.' is not a supported field reference".to_string(),
            });
        }
        return Ok(Expr::Field(path.to_string()));
    }
    if let Some(name) = s.strip_prefix('$') {
        return Ok(Expr::Var(name.to_string()));
    }
    Err(RuleError::TemplateCompile {
        rule: rule.to_string(),
        message: format!("unrecognized template expression '{s}'"),
    })
}

fn eval_expr(expr: &Expr, scope: &Scope<'_>) -> FieldValue {
    match expr {
        Expr::Field(path) => scope.object.field(path).unwrap_or(FieldValue::Null),
        Expr::Var(name) => scope.vars.get(name).cloned().unwrap_or(FieldValue::Null),
        Expr::Str(s) => FieldValue::Str(s.clone()),
        Expr::Concat(parts) => {
            let joined: String = parts.iter().map(|p| eval_expr(p, scope).render()).collect();
            FieldValue::Str(joined)
        }
    }
}

fn apply_filters(value: FieldValue, filters: &[String]) -> String {
    let mut rendered = match value {
        FieldValue::Map(ref m) if filters.iter().any(|f| f == "urlquery") => {
            return m
                .iter()
                .map(|(k, v)| {
                    format!(
                        "{}={}",
                        percent_encode_component(k),
                        percent_encode_component(&v.render())
                    )
                })
                .collect::<Vec<_>>()
                .join(",");
        }
        other => other.render(),
    };
    for filter in filters {
        if filter == "urlquery" {
            rendered = percent_encode_component(&rendered);
        }
    }
    rendered
}

fn exec_nodes(
    rule: &str,
    nodes: &[Node],
    scope: &mut Scope<'_>,
    out: &mut String,
) -> Result<(), RuleError> {
    for node in nodes {
        match node {
            Node::Literal(text) => out.push_str(text),
            Node::Print(expr, filters) => {
                let value = eval_expr(expr, scope);
                out.push_str(&apply_filters(value, filters));
            }
            Node::Assign(name, expr) => {
                let value = eval_expr(expr, scope);
                scope.vars.insert(name.clone(), value);
            }
            Node::Range {
                key_var,
                val_var,
                source,
                body,
            } => {
                let collection = eval_expr(source, scope);
                let entries: Vec<(String, FieldValue)> = match collection {
                    FieldValue::Map(m) => m.into_iter().collect(),
                    FieldValue::List(items) => items
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| (i.to_string(), v))
                        .collect(),
                    _ => {
                        return Err(RuleError::TemplateFailed {
                            rule: rule.to_string(),
                            message: "'range' source is not map- or list-like".to_string(),
                        })
                    }
                };
                for (k, v) in entries {
                    let mut inner = scope.child();
                    inner.vars.insert(key_var.clone(), FieldValue::Str(k));
                    inner.vars.insert(val_var.clone(), v);
                    exec_nodes(rule, body, &mut inner, out)?;
                }
            }
        }
    }
    Ok(())
}
