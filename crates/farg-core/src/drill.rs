//! Attribute/key drilling over object graphs that mix mapping-style and
//! attribute-style access.
//!
//! Each concrete entity type opts in through [`Drillable`]; the walkers here
//! are generic over that capability. A step first tries the mapping-style
//! lookup and falls back to the attribute-style one.
//!
//! # Coalescing
//!
//! [`getor`] is the primitive every walker ends with:
//!
//! - a truthy result is returned as-is;
//! - a falsy result that is not null (`0`, `""`, `[]`) survives only when
//!   the caller supplied no default, otherwise the default replaces it;
//! - a null result or a miss yields the default.

use std::collections::BTreeMap;
use std::fmt;

use tracing::trace;

use crate::error::{FargError, Result};
use crate::value::Value;

/// Name-based read access, implemented per entity type.
pub trait Drillable {
    /// Mapping-style lookup (`obj[name]`).
    fn get_key(&self, name: &str) -> Option<Value>;

    /// Attribute-style lookup (`obj.name`).
    fn get_attr(&self, name: &str) -> Option<Value>;
}

impl Drillable for Value {
    fn get_key(&self, name: &str) -> Option<Value> {
        match self {
            Value::Map(entries) => entries.get(name).cloned(),
            Value::Record(record) => record.key(name),
            // A list answers with the first member that knows the name.
            Value::List(items) => items.iter().find_map(|item| lookup(item, name)),
            _ => None,
        }
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        match self {
            Value::Record(record) => record.attr(name),
            _ => None,
        }
    }
}

/// How a multi-step path is walked by [`drill`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Walk every step in order.
    #[default]
    Eager,
    /// Treat each step as an alternative and keep the first truthy hit.
    FirstMatch,
}

/// One step of a [`DrillPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Name(String),
    /// Alternate sub-paths tried in order; the first truthy one wins.
    FirstOf(Vec<DrillPath>),
}

/// An ordered chain of names and alternate-name groups.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DrillPath {
    steps: Vec<Step>,
}

impl DrillPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a dot-separated chain (`"config.mail.host"`). Empty segments are skipped.
    pub fn parse(dotted: &str) -> Self {
        Self {
            steps: dotted
                .split('.')
                .filter(|segment| !segment.is_empty())
                .map(|segment| Step::Name(segment.to_string()))
                .collect(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.steps.push(Step::Name(name.into()));
        self
    }

    pub fn first_of<I, P>(mut self, alternatives: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<DrillPath>,
    {
        self.steps
            .push(Step::FirstOf(alternatives.into_iter().map(Into::into).collect()));
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl From<&str> for DrillPath {
    fn from(dotted: &str) -> Self {
        DrillPath::parse(dotted)
    }
}

impl From<String> for DrillPath {
    fn from(dotted: String) -> Self {
        DrillPath::parse(&dotted)
    }
}

impl From<Vec<Step>> for DrillPath {
    fn from(steps: Vec<Step>) -> Self {
        DrillPath { steps }
    }
}

impl fmt::Display for DrillPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match step {
                Step::Name(name) => f.write_str(name)?,
                Step::FirstOf(alternatives) => {
                    f.write_str("(")?;
                    for (j, alt) in alternatives.iter().enumerate() {
                        if j > 0 {
                            f.write_str("|")?;
                        }
                        write!(f, "{alt}")?;
                    }
                    f.write_str(")")?;
                }
            }
        }
        Ok(())
    }
}

/// Look `key` up on `target` and coalesce the result with `default`.
pub fn getor<T: Drillable + ?Sized>(target: &T, key: &str, default: Option<Value>) -> Option<Value> {
    coalesce(lookup(target, key), default)
}

/// Eager walk of `path` from `root`.
///
/// A step that finds nothing ends the walk: the default is returned if one
/// was supplied, otherwise [`FargError::AttributeNotFound`]. A deferred final
/// value is invoked and its result returned.
pub fn resolve<T, P>(root: &T, path: P, default: Option<Value>) -> Result<Value>
where
    T: Drillable + ?Sized,
    P: Into<DrillPath>,
{
    let path: DrillPath = path.into();
    let found = walk(root, path.steps());
    trace!(path = %path, found = found.is_some(), "drill eager");
    finish(coalesce(found, default), || path.to_string())
}

/// Try each alternative in order and return the first truthy resolution.
pub fn first_match<T>(root: &T, alternatives: &[DrillPath], default: Option<Value>) -> Result<Value>
where
    T: Drillable + ?Sized,
{
    let found = alternatives
        .iter()
        .find_map(|alt| walk(root, alt.steps()).filter(Value::is_truthy));
    trace!(alternatives = alternatives.len(), found = found.is_some(), "drill first-match");
    finish(found.or(default), || {
        alternatives
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("|")
    })
}

/// Dispatch to [`resolve`] or [`first_match`].
///
/// Under [`Strategy::FirstMatch`] every top-level step of `path` is one
/// alternative.
pub fn drill<T, P>(root: &T, path: P, default: Option<Value>, strategy: Strategy) -> Result<Value>
where
    T: Drillable + ?Sized,
    P: Into<DrillPath>,
{
    match strategy {
        Strategy::Eager => resolve(root, path, default),
        Strategy::FirstMatch => {
            let path: DrillPath = path.into();
            let alternatives: Vec<DrillPath> = path
                .steps
                .into_iter()
                .map(|step| DrillPath::from(vec![step]))
                .collect();
            first_match(root, &alternatives, default)
        }
    }
}

/// Strict attribute-only walk of a dotted chain. Mapping-style access is
/// not attempted and deferred values are returned uninvoked.
pub fn attr_chain<T>(root: &T, dotted: &str, default: Option<Value>) -> Result<Value>
where
    T: Drillable + ?Sized,
{
    let mut names = dotted.split('.').filter(|s| !s.is_empty());
    let found = names.next().and_then(|first| {
        names.try_fold(root.get_attr(first)?, |current, name| current.get_attr(name))
    });
    match found.or(default) {
        Some(value) => Ok(value),
        None => Err(FargError::AttributeNotFound {
            path: dotted.to_string(),
        }),
    }
}

/// Build a nested [`Value::Map`] from `(dotted path, value)` entries.
///
/// Top-level members holding [`Value::Null`] are dropped; `None` is returned
/// when nothing is left. A path used both as a leaf and as a branch (or twice
/// as a leaf) is a configuration error.
pub fn assemble<I, S>(entries: I) -> Result<Option<Value>>
where
    I: IntoIterator<Item = (S, Value)>,
    S: AsRef<str>,
{
    let mut tree: BTreeMap<String, Node> = BTreeMap::new();
    for (path, value) in entries {
        let path = path.as_ref();
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Err(FargError::Configuration(format!(
                "cannot assemble an empty path ('{path}')"
            )));
        }
        insert(&mut tree, &segments, value, path)?;
    }
    tree.retain(|_, node| !matches!(node, Node::Leaf(Value::Null)));
    if tree.is_empty() {
        return Ok(None);
    }
    Ok(Some(Node::Branch(tree).into_value()))
}

enum Node {
    Leaf(Value),
    Branch(BTreeMap<String, Node>),
}

impl Node {
    fn into_value(self) -> Value {
        match self {
            Node::Leaf(value) => value,
            Node::Branch(children) => Value::Map(
                children
                    .into_iter()
                    .map(|(k, node)| (k, node.into_value()))
                    .collect(),
            ),
        }
    }
}

fn insert(
    tree: &mut BTreeMap<String, Node>,
    segments: &[&str],
    value: Value,
    full_path: &str,
) -> Result<()> {
    let conflict = || {
        FargError::Configuration(format!(
            "path '{full_path}' collides with another entry"
        ))
    };
    match segments {
        [] => Err(conflict()),
        [last] => {
            if tree.contains_key(*last) {
                return Err(conflict());
            }
            tree.insert(last.to_string(), Node::Leaf(value));
            Ok(())
        }
        [head, rest @ ..] => {
            let node = tree
                .entry(head.to_string())
                .or_insert_with(|| Node::Branch(BTreeMap::new()));
            match node {
                Node::Branch(children) => insert(children, rest, value, full_path),
                Node::Leaf(_) => Err(conflict()),
            }
        }
    }
}

fn lookup<T: Drillable + ?Sized>(target: &T, name: &str) -> Option<Value> {
    target
        .get_key(name)
        .or_else(|| target.get_attr(name))
        .filter(|v| !v.is_null())
}

fn coalesce(found: Option<Value>, default: Option<Value>) -> Option<Value> {
    match (found, default) {
        (Some(v), None) => Some(v),
        (Some(v), Some(d)) => Some(if v.is_truthy() { v } else { d }),
        (None, d) => d,
    }
}

fn finish(result: Option<Value>, describe: impl FnOnce() -> String) -> Result<Value> {
    match result {
        Some(value) => Ok(value.materialize()),
        None => Err(FargError::AttributeNotFound { path: describe() }),
    }
}

fn walk<T: Drillable + ?Sized>(root: &T, steps: &[Step]) -> Option<Value> {
    let (first, rest) = steps.split_first()?;
    let mut current = step_once(root, first)?;
    for step in rest {
        current = step_once(&current, step)?;
    }
    Some(current)
}

fn step_once<T: Drillable + ?Sized>(target: &T, step: &Step) -> Option<Value> {
    match step {
        Step::Name(name) => lookup(target, name),
        Step::FirstOf(alternatives) => alternatives
            .iter()
            .find_map(|alt| walk(target, alt.steps()).filter(Value::is_truthy)),
    }
}
