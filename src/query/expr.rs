//! Aggregation expression type inference
//!
//! Inference is a small interpreter over the expression table: each
//! operator's arguments are checked against their declared shape and
//! inferred recursively, then the operator's return rule produces the
//! result type. Field references resolve with check-in-array semantics.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::config::DslConfig;
use crate::operators::{expr_operator, scalar_for_alias, ExprArgs, ExprOperator, ExprReturn};
use crate::path::{resolve, ResolveOptions};
use crate::schema::{describe, extended_json_kind, literal_type, unify, ObjectNode, ScalarKind, SchemaNode};

use super::errors::{QueryError, QueryResult};

/// Variables that are always in scope
pub const SYSTEM_VARIABLES: &[&str] = &["ROOT", "CURRENT", "NOW", "REMOVE", "CLUSTER_TIME"];

/// Default binding name for `$map` and `$filter`
const DEFAULT_BINDING: &str = "this";

/// True for `^[a-z][A-Za-z0-9_]*$`
pub fn is_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().map_or(false, |c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Argument types collected while checking an operator's shape
#[derive(Default)]
struct Collected {
    positional: Vec<Arc<SchemaNode>>,
    named: IndexMap<String, Arc<SchemaNode>>,
}

fn node(node: SchemaNode) -> Arc<SchemaNode> {
    Arc::new(node)
}

fn unknown() -> Arc<SchemaNode> {
    node(SchemaNode::unknown())
}

fn arg<'v>(map: &'v Map<String, Value>, key: &str) -> &'v Value {
    map.get(key).unwrap_or(&Value::Null)
}

/// Infers expression types against one input schema
#[derive(Debug, Clone)]
pub struct ExprInferer<'a> {
    root: &'a Arc<SchemaNode>,
    options: ResolveOptions,
    variables: Vec<(String, Arc<SchemaNode>)>,
}

impl<'a> ExprInferer<'a> {
    pub fn new(root: &'a Arc<SchemaNode>, config: &DslConfig) -> Self {
        Self {
            root,
            options: config.resolve_options().with_check_in_array(true),
            variables: Vec::new(),
        }
    }

    /// Bring a typed variable into scope
    pub fn with_variable(mut self, name: impl Into<String>, value: Arc<SchemaNode>) -> Self {
        self.variables.push((name.into(), value));
        self
    }

    /// Bring untyped variables into scope
    pub fn with_variables<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables
            .extend(names.into_iter().map(|name| (name.into(), unknown())));
        self
    }

    /// Names of the user variables in scope
    pub fn variable_names(&self) -> Vec<String> {
        self.variables.iter().map(|(name, _)| name.clone()).collect()
    }

    fn scoped(&self, bindings: Vec<(String, Arc<SchemaNode>)>) -> Self {
        let mut inner = self.clone();
        inner.variables.extend(bindings);
        inner
    }

    /// Infers the type `expr` evaluates to.
    pub fn infer(&self, expr: &Value) -> QueryResult<Arc<SchemaNode>> {
        match expr {
            Value::String(text) => {
                if let Some(variable) = text.strip_prefix("$$") {
                    self.variable(variable)
                } else if let Some(path) = text.strip_prefix('$') {
                    Ok(resolve(self.root, path, self.options)?.value_type())
                } else {
                    Ok(node(SchemaNode::string()))
                }
            }
            Value::Array(items) => {
                let mut element: Option<SchemaNode> = None;
                for item in items {
                    let item = self.infer(item)?;
                    element = Some(match element {
                        None => (*item).clone(),
                        Some(prev) => unify(&prev, &item),
                    });
                }
                Ok(node(SchemaNode::array(element.unwrap_or_else(SchemaNode::unknown))))
            }
            Value::Object(map) => self.object(map),
            other => Ok(node(literal_type(other))),
        }
    }

    fn variable(&self, reference: &str) -> QueryResult<Arc<SchemaNode>> {
        let (name, rest) = match reference.split_once('.') {
            Some((name, rest)) => (name, Some(rest)),
            None => (reference, None),
        };

        if let Some((_, bound)) = self.variables.iter().rev().find(|(n, _)| n == name) {
            return match rest {
                None => Ok(bound.clone()),
                Some(path) => Ok(resolve(bound, path, self.options)?.value_type()),
            };
        }

        match (name, rest) {
            ("ROOT" | "CURRENT", None) => Ok(self.root.clone()),
            ("ROOT" | "CURRENT", Some(path)) => Ok(resolve(self.root, path, self.options)?.value_type()),
            ("NOW", _) => Ok(node(SchemaNode::date())),
            ("CLUSTER_TIME", _) => Ok(node(SchemaNode::scalar(ScalarKind::Timestamp))),
            ("REMOVE", _) => Ok(unknown()),
            _ => Err(QueryError::invalid_argument(
                &format!("$${}", name),
                "variable is not defined in this scope",
            )),
        }
    }

    fn object(&self, map: &Map<String, Value>) -> QueryResult<Arc<SchemaNode>> {
        if let Some(kind) = extended_json_kind(map) {
            return Ok(node(SchemaNode::scalar(kind)));
        }
        let operators = map.keys().filter(|key| key.starts_with('$')).count();
        if operators == 0 {
            let mut object = ObjectNode::new();
            for (name, value) in map {
                if name.contains('.') {
                    return Err(QueryError::invalid_argument(
                        "expression",
                        format!("field name '{}' may not contain '.'", name),
                    ));
                }
                object.insert(name.clone(), self.infer(value)?, false);
            }
            return Ok(node(SchemaNode::object(object)));
        }
        if operators != map.len() {
            return Err(QueryError::invalid_argument(
                "expression",
                "an expression object cannot mix operators and field names",
            ));
        }
        let mut entries = map.iter();
        match (entries.next(), entries.next()) {
            (Some((name, args)), None) => self.operator(name, args),
            _ => Err(QueryError::invalid_argument(
                map.keys().next().map(String::as_str).unwrap_or("expression"),
                "an expression object takes exactly one operator",
            )),
        }
    }

    fn operator(&self, name: &str, args: &Value) -> QueryResult<Arc<SchemaNode>> {
        let entry = expr_operator(name).ok_or_else(|| QueryError::unknown_operator(name, "expression"))?;
        match entry.returns {
            ExprReturn::Literal => Ok(node(literal_type(args))),
            ExprReturn::MapIn => self.map(entry, args),
            ExprReturn::In if name == "$reduce" => self.reduce(entry, args),
            ExprReturn::In => self.let_(entry, args),
            ExprReturn::SameArray if name == "$filter" => self.filter(entry, args),
            _ => {
                let collected = self.arguments(entry, args)?;
                Ok(self.result(entry, args, &collected))
            }
        }
    }

    fn named<'v>(
        &self,
        operator: &str,
        args: &'v Value,
        required: &[&str],
        optional: &[&str],
    ) -> QueryResult<&'v Map<String, Value>> {
        let map = match args {
            Value::Object(map) if extended_json_kind(map).is_none() => map,
            other => {
                return Err(QueryError::invalid_argument(
                    operator,
                    format!("expected an object of named arguments, found {}", describe(other)),
                ))
            }
        };
        if let Some(key) = map
            .keys()
            .find(|key| !required.contains(&key.as_str()) && !optional.contains(&key.as_str()))
        {
            return Err(QueryError::invalid_argument(
                operator,
                format!("unexpected argument '{}'", key),
            ));
        }
        if let Some(key) = required.iter().find(|key| !map.contains_key(**key)) {
            return Err(QueryError::invalid_argument(
                operator,
                format!("missing required argument '{}'", key),
            ));
        }
        Ok(map)
    }

    fn infer_named(&self, map: &Map<String, Value>, collected: &mut Collected) -> QueryResult<()> {
        for (key, value) in map {
            collected.named.insert(key.clone(), self.infer(value)?);
        }
        Ok(())
    }

    fn arity(operator: &str, count: usize, min: usize, max: Option<usize>) -> QueryResult<()> {
        let too_many = max.map_or(false, |max| count > max);
        if count < min || too_many {
            let expected = match max {
                Some(max) if max == min => format!("{}", min),
                Some(max) => format!("{} to {}", min, max),
                None => format!("at least {}", min),
            };
            return Err(QueryError::invalid_argument(
                operator,
                format!("expected {} arguments, found {}", expected, count),
            ));
        }
        Ok(())
    }

    fn single(&self, operator: &str, args: &Value, collected: &mut Collected) -> QueryResult<()> {
        let value = match args {
            Value::Array(items) if items.len() == 1 => &items[0],
            Value::Array(items) => {
                return Err(QueryError::invalid_argument(
                    operator,
                    format!("expected 1 argument, found {}", items.len()),
                ))
            }
            other => other,
        };
        collected.positional.push(self.infer(value)?);
        Ok(())
    }

    fn list(&self, operator: &str, items: &[Value], min: usize, max: Option<usize>, collected: &mut Collected) -> QueryResult<()> {
        Self::arity(operator, items.len(), min, max)?;
        for item in items {
            collected.positional.push(self.infer(item)?);
        }
        Ok(())
    }

    fn arguments(&self, entry: &ExprOperator, args: &Value) -> QueryResult<Collected> {
        let name = entry.name;
        let mut collected = Collected::default();
        match entry.args {
            ExprArgs::Single => self.single(name, args, &mut collected)?,
            ExprArgs::List { min, max } => {
                let Value::Array(items) = args else {
                    return Err(QueryError::invalid_argument(
                        name,
                        format!("expected an array of arguments, found {}", describe(args)),
                    ));
                };
                self.list(name, items, min, max, &mut collected)?;
            }
            ExprArgs::SingleOrList { min, max } => match args {
                Value::Array(items) => self.list(name, items, min, max, &mut collected)?,
                other => collected.positional.push(self.infer(other)?),
            },
            ExprArgs::Named { required, optional } => {
                let map = self.named(name, args, required, optional)?;
                self.infer_named(map, &mut collected)?;
            }
            ExprArgs::DateOrNamed => match args {
                Value::Object(map)
                    if extended_json_kind(map).is_none() && !map.keys().any(|k| k.starts_with('$')) =>
                {
                    let map = self.named(name, args, &["date"], &["timezone"])?;
                    self.infer_named(map, &mut collected)?;
                }
                other => self.single(name, other, &mut collected)?,
            },
            ExprArgs::Cond => match args {
                Value::Array(items) if items.len() == 3 => {
                    self.list(name, items, 3, Some(3), &mut collected)?
                }
                Value::Array(items) => {
                    return Err(QueryError::invalid_argument(
                        name,
                        format!("expected [if, then, else], found {} elements", items.len()),
                    ))
                }
                other => {
                    let map = self.named(name, other, &["if", "then", "else"], &[])?;
                    self.infer_named(map, &mut collected)?;
                }
            },
            ExprArgs::Switch => {
                let map = self.named(name, args, &["branches"], &["default"])?;
                let branches = match arg(map, "branches") {
                    Value::Array(branches) if !branches.is_empty() => branches,
                    _ => {
                        return Err(QueryError::invalid_argument(
                            name,
                            "'branches' must be a non-empty array",
                        ))
                    }
                };
                for branch in branches {
                    let branch = self.named(name, branch, &["case", "then"], &[])?;
                    self.infer(arg(branch, "case"))?;
                    collected.positional.push(self.infer(arg(branch, "then"))?);
                }
                if let Some(default) = map.get("default") {
                    collected.named.insert("default".to_string(), self.infer(default)?);
                }
            }
            ExprArgs::DateFromParts => {
                let calendar = args.get("year").is_some();
                let iso = args.get("isoWeekYear").is_some();
                let map = match (calendar, iso) {
                    (true, false) => self.named(
                        name,
                        args,
                        &["year"],
                        &["month", "day", "hour", "minute", "second", "millisecond", "timezone"],
                    )?,
                    (false, true) => self.named(
                        name,
                        args,
                        &["isoWeekYear"],
                        &["isoWeek", "isoDayOfWeek", "hour", "minute", "second", "millisecond", "timezone"],
                    )?,
                    _ => {
                        return Err(QueryError::invalid_argument(
                            name,
                            "exactly one of 'year' or 'isoWeekYear' is required",
                        ))
                    }
                };
                self.infer_named(map, &mut collected)?;
            }
            ExprArgs::StringOrNamed { required, optional } => match args {
                Value::String(_) => collected.positional.push(self.infer(args)?),
                other => {
                    let map = self.named(name, other, required, optional)?;
                    self.infer_named(map, &mut collected)?;
                }
            },
            ExprArgs::EmptyObject => match args {
                Value::Object(map) if map.is_empty() => {}
                other => {
                    return Err(QueryError::invalid_argument(
                        name,
                        format!("expected {{}}, found {}", describe(other)),
                    ))
                }
            },
            ExprArgs::Literal => {}
        }
        Ok(collected)
    }

    fn result(&self, entry: &ExprOperator, args: &Value, collected: &Collected) -> Arc<SchemaNode> {
        let input = collected
            .positional
            .first()
            .or_else(|| collected.named.get("input"));

        match entry.returns {
            ExprReturn::Scalar(kind) => node(SchemaNode::scalar(kind)),
            ExprReturn::ArrayOf(kind) => node(SchemaNode::array(SchemaNode::scalar(kind))),
            ExprReturn::UnknownArray => node(SchemaNode::array(SchemaNode::unknown())),
            ExprReturn::SameArray => match input {
                Some(array) if array.as_array().is_some() => array.clone(),
                _ => node(SchemaNode::array(SchemaNode::unknown())),
            },
            ExprReturn::ArrayElement => input
                .and_then(|array| array.as_array().cloned())
                .unwrap_or_else(unknown),
            ExprReturn::Common => common(&candidates(entry, args, collected)),
            ExprReturn::MergeObjects => {
                let sources = match (args, collected.positional.as_slice()) {
                    // Single array argument: merge its elements.
                    (Value::String(_), [array]) => array.as_array().cloned().into_iter().collect(),
                    _ => collected.positional.clone(),
                };
                merge_objects(&sources)
            }
            ExprReturn::DateParts => {
                let mut parts = ObjectNode::new();
                for part in ["year", "month", "day", "hour", "minute", "second", "millisecond"] {
                    parts.insert(part, SchemaNode::number(), false);
                }
                node(SchemaNode::object(parts))
            }
            ExprReturn::RegexFind => node(regex_match()),
            ExprReturn::RegexFindAll => node(SchemaNode::array(regex_match())),
            ExprReturn::ObjectToArray => node(SchemaNode::array(SchemaNode::object(
                ObjectNode::new()
                    .with_field("k", SchemaNode::string())
                    .with_field("v", SchemaNode::unknown()),
            ))),
            ExprReturn::OpenObject => node(SchemaNode::object(ObjectNode::open(SchemaNode::unknown()))),
            ExprReturn::Convert => args
                .get("to")
                .and_then(Value::as_str)
                .and_then(scalar_for_alias)
                .map(|kind| node(SchemaNode::scalar(kind)))
                .unwrap_or_else(unknown),
            ExprReturn::MapIn | ExprReturn::In | ExprReturn::Literal | ExprReturn::Unknown => unknown(),
        }
    }

    fn binding(&self, operator: &str, name: Option<&Value>) -> QueryResult<String> {
        match name {
            None => Ok(DEFAULT_BINDING.to_string()),
            Some(Value::String(name)) if is_variable_name(name) => Ok(name.clone()),
            Some(other) => Err(QueryError::invalid_argument(
                operator,
                format!("invalid variable name {}", describe(other)),
            )),
        }
    }

    fn element_of(array: &Arc<SchemaNode>) -> Arc<SchemaNode> {
        array.as_array().cloned().unwrap_or_else(unknown)
    }

    fn map(&self, entry: &ExprOperator, args: &Value) -> QueryResult<Arc<SchemaNode>> {
        let map = self.named(entry.name, args, &["input", "in"], &["as"])?;
        let input = self.infer(arg(map, "input"))?;
        let name = self.binding(entry.name, map.get("as"))?;
        let body = self
            .scoped(vec![(name, Self::element_of(&input))])
            .infer(arg(map, "in"))?;
        Ok(node(SchemaNode::Array(body)))
    }

    fn filter(&self, entry: &ExprOperator, args: &Value) -> QueryResult<Arc<SchemaNode>> {
        let map = self.named(entry.name, args, &["input", "cond"], &["as", "limit"])?;
        let input = self.infer(arg(map, "input"))?;
        if let Some(limit) = map.get("limit") {
            self.infer(limit)?;
        }
        let name = self.binding(entry.name, map.get("as"))?;
        self.scoped(vec![(name, Self::element_of(&input))])
            .infer(arg(map, "cond"))?;
        Ok(match input.as_array() {
            Some(_) => input,
            None => node(SchemaNode::array(SchemaNode::unknown())),
        })
    }

    fn reduce(&self, entry: &ExprOperator, args: &Value) -> QueryResult<Arc<SchemaNode>> {
        let map = self.named(entry.name, args, &["input", "initialValue", "in"], &[])?;
        let input = self.infer(arg(map, "input"))?;
        let initial = self.infer(arg(map, "initialValue"))?;
        self.scoped(vec![
            ("this".to_string(), Self::element_of(&input)),
            ("value".to_string(), initial),
        ])
        .infer(arg(map, "in"))
    }

    fn let_(&self, entry: &ExprOperator, args: &Value) -> QueryResult<Arc<SchemaNode>> {
        let map = self.named(entry.name, args, &["vars", "in"], &[])?;
        let Value::Object(vars) = arg(map, "vars") else {
            return Err(QueryError::invalid_argument(entry.name, "'vars' must be an object"));
        };
        let mut bindings = Vec::with_capacity(vars.len());
        for (name, value) in vars {
            if !is_variable_name(name) {
                return Err(QueryError::invalid_argument(
                    entry.name,
                    format!("invalid variable name '{}'", name),
                ));
            }
            bindings.push((name.clone(), self.infer(value)?));
        }
        self.scoped(bindings).infer(arg(map, "in"))
    }
}

/// Candidate result types of a `Common` operator
fn candidates(entry: &ExprOperator, args: &Value, collected: &Collected) -> Vec<Arc<SchemaNode>> {
    match entry.args {
        ExprArgs::Cond => match (collected.positional.as_slice(), &collected.named) {
            ([_, then, otherwise], _) => vec![then.clone(), otherwise.clone()],
            (_, named) => ["then", "else"]
                .iter()
                .filter_map(|key| named.get(*key).cloned())
                .collect(),
        },
        ExprArgs::Switch => collected
            .positional
            .iter()
            .chain(collected.named.get("default"))
            .cloned()
            .collect(),
        // `$max: "$scores"` ranges over the elements of one array.
        ExprArgs::SingleOrList { .. } if !args.is_array() => collected
            .positional
            .iter()
            .map(|single| single.as_array().cloned().unwrap_or_else(|| single.clone()))
            .collect(),
        _ => collected.positional.clone(),
    }
}

/// Unifies candidates; `null` candidates are dropped when others exist.
fn common(candidates: &[Arc<SchemaNode>]) -> Arc<SchemaNode> {
    let non_null: Vec<&Arc<SchemaNode>> = candidates
        .iter()
        .filter(|c| c.scalar_kind() != Some(ScalarKind::Null))
        .collect();
    let pool: Vec<&Arc<SchemaNode>> = if non_null.is_empty() {
        candidates.iter().collect()
    } else {
        non_null
    };
    let mut iter = pool.into_iter();
    let Some(first) = iter.next() else {
        return unknown();
    };
    let mut result: SchemaNode = (**first).clone();
    for next in iter {
        result = unify(&result, next);
    }
    node(result)
}

fn merge_objects(sources: &[Arc<SchemaNode>]) -> Arc<SchemaNode> {
    let mut merged = ObjectNode::new();
    for source in sources {
        match source.as_ref() {
            SchemaNode::Object(object) => {
                for (name, child) in object.fields() {
                    merged.insert(name, child.clone(), object.is_optional(name));
                    merged.set_nullable(name, object.is_nullable(name));
                }
                if let Some(additional) = object.additional() {
                    merged = merged.with_additional(additional.clone());
                }
            }
            SchemaNode::Scalar(ScalarKind::Null) => {}
            _ => return node(SchemaNode::object(ObjectNode::open(SchemaNode::unknown()))),
        }
    }
    node(SchemaNode::object(merged))
}

fn regex_match() -> SchemaNode {
    SchemaNode::object(
        ObjectNode::new()
            .with_field("match", SchemaNode::string())
            .with_field("idx", SchemaNode::number())
            .with_field("captures", SchemaNode::array(SchemaNode::string())),
    )
}

/// Infers `expr` against `root` with the default configuration.
pub fn infer_type(root: &Arc<SchemaNode>, expr: &Value) -> QueryResult<Arc<SchemaNode>> {
    ExprInferer::new(root, &DslConfig::default()).infer(expr)
}
