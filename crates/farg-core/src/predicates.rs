//! Ready-made validation rules.
//!
//! Every constructor returns a closure usable with
//! [`ValidatedSpec::rule`](crate::validation::ValidatedSpec::rule). A rule
//! receives the parameter's value (`None` when absent) and the full bag.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::bag::ParameterBag;
use crate::validation::Rule;
use crate::value::Value;

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)[0-9a-f]{8}-?[0-9a-f]{4}-?[1-5][0-9a-f]{3}-?[89ab][0-9a-f]{3}-?[0-9a-f]{12}$")
        .expect("valid UUID regex")
});

/// Accepts anything. Used for required parameters with no real constraint.
pub fn always() -> impl Fn(Option<&Value>, &ParameterBag) -> Result<(), String> + Send + Sync + 'static {
    |_, _| Ok(())
}

/// Wraps a fallible check of the present value; its error becomes the
/// description. An absent value fails.
pub fn check<F, E>(test: F) -> impl Fn(Option<&Value>, &ParameterBag) -> Result<(), String> + Send + Sync + 'static
where
    F: Fn(&Value) -> Result<(), E> + Send + Sync + 'static,
    E: std::fmt::Display,
{
    move |value, _| match value {
        Some(value) => test(value).map_err(|e| e.to_string()),
        None => Err("value is missing".to_string()),
    }
}

/// A string holding a UUID, hyphenated or not.
pub fn is_uuid() -> impl Fn(Option<&Value>, &ParameterBag) -> Result<(), String> + Send + Sync + 'static {
    |value, _| match value.and_then(Value::as_str) {
        Some(s) if UUID_RE.is_match(s) => Ok(()),
        _ => Err("is not a valid UUID".to_string()),
    }
}

/// Present and truthy.
pub fn non_empty() -> impl Fn(Option<&Value>, &ParameterBag) -> Result<(), String> + Send + Sync + 'static {
    |value, _| match value {
        Some(v) if v.is_truthy() => Ok(()),
        _ => Err("must not be empty".to_string()),
    }
}

pub fn one_of<I, S>(choices: I) -> impl Fn(Option<&Value>, &ParameterBag) -> Result<(), String> + Send + Sync + 'static
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let choices: Vec<String> = choices.into_iter().map(Into::into).collect();
    move |value, _| match value.and_then(Value::as_str) {
        Some(s) if choices.iter().any(|c| c == s) => Ok(()),
        _ => Err(format!("must be one of: {}", choices.join(", "))),
    }
}

/// Exactly one of `names` is present and truthy in the bag.
pub fn exactly_one_of<I, S>(names: I) -> impl Fn(Option<&Value>, &ParameterBag) -> Result<(), String> + Send + Sync + 'static
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let names: Vec<String> = names.into_iter().map(Into::into).collect();
    move |_, bag| {
        let set = names
            .iter()
            .filter(|name| bag.get(name).is_some_and(Value::is_truthy))
            .count();
        if set == 1 {
            Ok(())
        } else {
            Err(format!("exactly one of {} must be given", names.join(", ")))
        }
    }
}

/// An integer greater than zero.
pub fn is_positive_int() -> impl Fn(Option<&Value>, &ParameterBag) -> Result<(), String> + Send + Sync + 'static {
    |value, _| match value {
        Some(Value::Int(i)) if *i > 0 => Ok(()),
        _ => Err("must be a positive integer".to_string()),
    }
}

pub fn is_bool() -> impl Fn(Option<&Value>, &ParameterBag) -> Result<(), String> + Send + Sync + 'static {
    |value, _| match value {
        Some(Value::Bool(_)) => Ok(()),
        _ => Err("must be a boolean".to_string()),
    }
}

/// Absent or `Null` passes; anything else must satisfy `inner`.
pub fn optional<F>(inner: F) -> impl Fn(Option<&Value>, &ParameterBag) -> Result<(), String> + Send + Sync + 'static
where
    F: Fn(Option<&Value>, &ParameterBag) -> Result<(), String> + Send + Sync + 'static,
{
    move |value, bag| match value {
        None | Some(Value::Null) => Ok(()),
        Some(_) => inner(value, bag),
    }
}

/// Every rule must pass; the first failure is reported.
pub fn all_of(rules: Vec<Rule>) -> impl Fn(Option<&Value>, &ParameterBag) -> Result<(), String> + Send + Sync + 'static {
    move |value, bag| rules.iter().try_for_each(|rule| rule(value, bag))
}

/// Type-erase a rule, for [`all_of`].
pub fn boxed<F>(rule: F) -> Rule
where
    F: Fn(Option<&Value>, &ParameterBag) -> Result<(), String> + Send + Sync + 'static,
{
    Arc::new(rule)
}
