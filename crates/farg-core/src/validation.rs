//! Validation stacked on argument resolution.
//!
//! A [`ValidatedSpec`] pairs a [`ParameterSpec`] with one [`Rule`] per
//! parameter name. Every required parameter must carry a rule; the check runs
//! before anything is resolved. Rules run in canonical order against the
//! resolved [`ParameterBag`] and the first failing rule aborts with a
//! field-keyed [`ValidationFailure`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde::Serialize as DeriveSerialize;
use tracing::debug;

use crate::bag::ParameterBag;
use crate::error::{FargError, Result};
use crate::resolver::{Invocation, ParameterSpec};
use crate::value::Value;

/// A pure check of one parameter. Receives the parameter's value (`None`
/// when absent) and the whole bag for cross-field checks.
pub type Rule = Arc<dyn Fn(Option<&Value>, &ParameterBag) -> std::result::Result<(), String> + Send + Sync>;

/// Key under which non-field errors are filed by [`ValidationFailure::merge_into`].
pub const NON_FIELD_ERRORS: &str = "__all__";

// ── FieldError ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, DeriveSerialize)]
pub struct FieldError {
    pub field: Option<String>,
    pub value: Option<Value>,
    pub description: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, value: Option<Value>, description: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            value,
            description: description.into(),
        }
    }

    /// An error not tied to any field.
    pub fn general(description: impl Into<String>) -> Self {
        Self {
            field: None,
            value: None,
            description: description.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.field, &self.value) {
            (Some(field), Some(value)) => write!(
                f,
                "Argument {field} (`{value}`) failed validation: {}",
                self.description
            ),
            (Some(field), None) => {
                write!(f, "Argument {field} failed validation: {}", self.description)
            }
            (None, _) => f.write_str(&self.description),
        }
    }
}

// ── ValidationFailure ───────────────────────────────────────────────────────

/// Field-keyed errors, or a flat list of errors. Never both.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationFailure {
    Fields(BTreeMap<String, Vec<FieldError>>),
    Flat(Vec<FieldError>),
}

impl ValidationFailure {
    /// A failure carrying exactly one field error.
    pub fn single(field: impl Into<String>, value: Option<Value>, description: impl Into<String>) -> Self {
        let error = FieldError::new(field, value, description);
        let key = error.field.clone().unwrap_or_default();
        ValidationFailure::Fields(BTreeMap::from([(key, vec![error])]))
    }

    pub fn fields(fields: BTreeMap<String, Vec<FieldError>>) -> Self {
        ValidationFailure::Fields(fields)
    }

    pub fn flat<I, S>(descriptions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ValidationFailure::Flat(descriptions.into_iter().map(FieldError::general).collect())
    }

    /// Groups errors by their field; if any error has no field the result is
    /// flat.
    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        if errors.iter().any(|e| e.field.is_none()) {
            return ValidationFailure::Flat(errors);
        }
        let mut fields: BTreeMap<String, Vec<FieldError>> = BTreeMap::new();
        for error in errors {
            let key = error.field.clone().unwrap_or_default();
            fields.entry(key).or_default().push(error);
        }
        ValidationFailure::Fields(fields)
    }

    pub fn is_field_scoped(&self) -> bool {
        matches!(self, ValidationFailure::Fields(_))
    }

    pub fn errors(&self) -> Vec<&FieldError> {
        match self {
            ValidationFailure::Fields(fields) => fields.values().flatten().collect(),
            ValidationFailure::Flat(errors) => errors.iter().collect(),
        }
    }

    pub fn first(&self) -> Option<&FieldError> {
        self.errors().into_iter().next()
    }

    /// Field name to descriptions. `None` for a flat failure.
    pub fn message_dict(&self) -> Option<BTreeMap<String, Vec<String>>> {
        match self {
            ValidationFailure::Fields(fields) => Some(
                fields
                    .iter()
                    .map(|(name, errors)| {
                        (
                            name.clone(),
                            errors.iter().map(|e| e.description.clone()).collect(),
                        )
                    })
                    .collect(),
            ),
            ValidationFailure::Flat(_) => None,
        }
    }

    /// Every description, flattened.
    pub fn messages(&self) -> Vec<String> {
        self.errors()
            .into_iter()
            .map(|e| e.description.clone())
            .collect()
    }

    /// Merge into an existing field-to-descriptions map. Flat errors go under
    /// [`NON_FIELD_ERRORS`].
    pub fn merge_into(&self, target: &mut BTreeMap<String, Vec<String>>) {
        match self {
            ValidationFailure::Fields(fields) => {
                for (name, errors) in fields {
                    target
                        .entry(name.clone())
                        .or_default()
                        .extend(errors.iter().map(|e| e.description.clone()));
                }
            }
            ValidationFailure::Flat(errors) => {
                target
                    .entry(NON_FIELD_ERRORS.to_string())
                    .or_default()
                    .extend(errors.iter().map(|e| e.description.clone()));
            }
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in self.errors() {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}

impl Serialize for ValidationFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ValidationFailure::Fields(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, errors) in fields {
                    let descriptions: Vec<&str> =
                        errors.iter().map(|e| e.description.as_str()).collect();
                    map.serialize_entry(name, &descriptions)?;
                }
                map.end()
            }
            ValidationFailure::Flat(errors) => {
                let mut seq = serializer.serialize_seq(Some(errors.len()))?;
                for error in errors {
                    seq.serialize_element(&error.description)?;
                }
                seq.end()
            }
        }
    }
}

// ── ValidatedSpec ───────────────────────────────────────────────────────────

/// A parameter spec plus the rules its resolved bag must satisfy.
#[derive(Clone)]
pub struct ValidatedSpec {
    spec: ParameterSpec,
    rules: BTreeMap<String, Rule>,
}

impl fmt::Debug for ValidatedSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedSpec")
            .field("spec", &self.spec)
            .field("rules", &self.rules.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ValidatedSpec {
    pub fn new(spec: ParameterSpec) -> Self {
        Self {
            spec,
            rules: BTreeMap::new(),
        }
    }

    pub fn rule<F>(self, name: impl Into<String>, rule: F) -> Self
    where
        F: Fn(Option<&Value>, &ParameterBag) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.rule_arc(name, Arc::new(rule))
    }

    pub fn rule_arc(mut self, name: impl Into<String>, rule: Rule) -> Self {
        self.rules.insert(name.into(), rule);
        self
    }

    pub fn spec(&self) -> &ParameterSpec {
        &self.spec
    }

    /// Fails when a required parameter has no rule.
    pub fn check_configuration(&self) -> Result<()> {
        let unruled: Vec<&str> = self
            .spec
            .required()
            .iter()
            .map(String::as_str)
            .filter(|name| !self.rules.contains_key(*name))
            .collect();
        if unruled.is_empty() {
            Ok(())
        } else {
            Err(FargError::Configuration(format!(
                "required argument/validation mismatch: {} has no rule for {}",
                self.spec.kind(),
                unruled.join(", ")
            )))
        }
    }

    /// Resolve and validate `call`.
    ///
    /// # Errors
    ///
    /// - [`FargError::Configuration`] if a required parameter has no rule
    /// - [`FargError::MissingRequiredArgument`] from resolution
    /// - [`FargError::Validation`] for the first rule that fails
    #[track_caller]
    pub fn resolve(&self, call: Invocation) -> Result<ParameterBag> {
        self.check_configuration()?;
        let bag = self.spec.resolve(call)?;
        validate(&self.spec, &bag, &self.rules)?;
        Ok(bag)
    }
}

/// Run `rules` against `bag` in canonical order, then any rules for names the
/// spec does not declare. Stops at the first failure.
pub fn validate(
    spec: &ParameterSpec,
    bag: &ParameterBag,
    rules: &BTreeMap<String, Rule>,
) -> std::result::Result<(), ValidationFailure> {
    let extra = rules.keys().map(String::as_str).filter(|name| !spec.is_declared(name));
    for name in spec.names().chain(extra) {
        let Some(rule) = rules.get(name) else {
            continue;
        };
        let value = bag.get(name);
        if let Err(description) = rule(value, bag) {
            debug!(kind = spec.kind(), name, %description, "validation failed");
            return Err(ValidationFailure::single(name, value.cloned(), description));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicates;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn upload_spec() -> ValidatedSpec {
        let spec = ParameterSpec::builder("Upload")
            .required("source")
            .required("target")
            .optional("retries")
            .default("retries", 3)
            .build()
            .unwrap();
        ValidatedSpec::new(spec)
            .rule("source", predicates::non_empty())
            .rule("target", predicates::non_empty())
            .rule("retries", predicates::is_positive_int())
    }

    #[test]
    fn test_valid_call_returns_bag() {
        let bag = upload_spec()
            .resolve(Invocation::from_args(["/in", "/out"]))
            .unwrap();
        assert_eq!(bag["retries"], Value::Int(3));
    }

    #[test]
    fn test_missing_rule_is_configuration_error() {
        let spec = ParameterSpec::builder("Upload")
            .required("source")
            .required("target")
            .build()
            .unwrap();
        let validated = ValidatedSpec::new(spec).rule("source", predicates::always());
        let err = validated
            .resolve(Invocation::from_args(["a", "b"]))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("required argument/validation mismatch"), "got: {msg}");
        assert!(msg.contains("target"), "got: {msg}");
    }

    #[test]
    fn test_configuration_checked_before_rules_run() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let spec = ParameterSpec::builder("X")
            .required("a")
            .required("b")
            .build()
            .unwrap();
        let validated = ValidatedSpec::new(spec).rule("a", move |_: Option<&Value>, _: &ParameterBag| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(validated.resolve(Invocation::from_args([1, 2])).is_err());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_first_failure_aborts() {
        let err = upload_spec()
            .resolve(Invocation::from_args(["", ""]).kwarg("retries", -1))
            .unwrap_err();
        let failure = match err {
            FargError::Validation(failure) => failure,
            other => panic!("expected validation failure, got {other}"),
        };
        assert!(failure.is_field_scoped());
        let dict = failure.message_dict().unwrap();
        assert_eq!(dict.keys().collect::<Vec<_>>(), ["source"]);
        let first = failure.first().unwrap();
        assert_eq!(first.value, Some(Value::from("")));
        assert!(failure
            .to_string()
            .starts_with("Argument source (``) failed validation:"));
    }

    #[test]
    fn test_rule_sees_whole_bag() {
        let spec = ParameterSpec::builder("Range")
            .required("low")
            .required("high")
            .build()
            .unwrap();
        let validated = ValidatedSpec::new(spec)
            .rule("low", predicates::always())
            .rule("high", |value: Option<&Value>, bag: &ParameterBag| {
                let high = value.and_then(Value::as_i64).unwrap_or_default();
                let low = bag.get_i64("low").unwrap_or_default();
                if high >= low {
                    Ok(())
                } else {
                    Err(format!("must be at least {low}"))
                }
            });
        assert!(validated.resolve(Invocation::from_args([1, 5])).is_ok());
        let err = validated.resolve(Invocation::from_args([5, 1])).unwrap_err();
        assert!(err.to_string().contains("Argument high (`1`)"), "got: {err}");
    }

    #[test]
    fn test_rule_for_undeclared_name_runs_last() {
        let spec = ParameterSpec::builder("X").required("a").build().unwrap();
        let validated = ValidatedSpec::new(spec)
            .rule("a", predicates::always())
            .rule("extra", predicates::non_empty());
        let err = validated
            .resolve(Invocation::from_args([1]).kwarg("extra", ""))
            .unwrap_err();
        assert!(err.to_string().contains("Argument extra"), "got: {err}");
    }

    #[test]
    fn test_from_errors_groups_by_field() {
        let failure = ValidationFailure::from_errors(vec![
            FieldError::new("a", None, "one"),
            FieldError::new("b", None, "two"),
            FieldError::new("a", None, "three"),
        ]);
        let dict = failure.message_dict().unwrap();
        assert_eq!(dict["a"], ["one", "three"]);
        assert_eq!(failure.messages(), ["one", "three", "two"]);
    }

    #[test]
    fn test_flat_failure() {
        let failure = ValidationFailure::flat(["broken", "also broken"]);
        assert!(!failure.is_field_scoped());
        assert!(failure.message_dict().is_none());
        assert_eq!(failure.to_string(), "broken; also broken");
        assert_eq!(
            serde_json::to_string(&failure).unwrap(),
            r#"["broken","also broken"]"#
        );
    }

    #[test]
    fn test_merge_into_files_flat_errors_under_all() {
        let mut target = BTreeMap::new();
        ValidationFailure::single("a", None, "bad a").merge_into(&mut target);
        ValidationFailure::flat(["general"]).merge_into(&mut target);
        assert_eq!(target["a"], ["bad a"]);
        assert_eq!(target[NON_FIELD_ERRORS], ["general"]);
    }

    #[test]
    fn test_field_failure_serializes_as_map() {
        let failure = ValidationFailure::single("count", Some(Value::Int(0)), "must be positive");
        assert_eq!(
            serde_json::to_string(&failure).unwrap(),
            r#"{"count":["must be positive"]}"#
        );
    }
}
