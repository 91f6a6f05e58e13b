//! Declarative argument resolution.
//!
//! A [`ParameterSpec`] names the required and optional parameters of a
//! constructible type, in positional-binding order, together with each
//! parameter's default and optional coercer. [`resolve`] applies one
//! [`Invocation`] (positional values plus named values) to a spec and yields
//! a [`ParameterBag`].
//!
//! # Resolution order
//!
//! 1. The canonical order is `required ++ optional`.
//! 2. Every name starts absent; literal defaults are laid over it.
//! 3. Names given as named arguments drop out of positional binding.
//! 4. Positional values bind, in order, to the remaining names. Surplus
//!    positional values are ignored.
//! 5. A named argument whose parameter declares a coercer is converted. On
//!    success the named argument is consumed; on failure it is left as-is.
//! 6. Factory defaults materialize for names that received nothing.
//! 7. Unconsumed named arguments overwrite their slot verbatim. Names the
//!    spec does not declare pass through into the bag.
//! 8. Any required name still absent fails the whole resolution.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::bag::ParameterBag;
use crate::error::{FargError, Result};
use crate::value::{Factory, Value};

/// Converts a caller-supplied named value into the parameter's working form.
pub type Coercer = Arc<dyn Fn(&Value) -> std::result::Result<Value, String> + Send + Sync>;

/// The declared default of a parameter.
#[derive(Clone)]
pub enum DefaultValue {
    Literal(Value),
    /// Invoked with no arguments only when the parameter received nothing.
    Factory(Factory),
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            DefaultValue::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Per-parameter declaration: a default and a coercer, both optional.
#[derive(Clone, Default)]
pub struct Slot {
    default: Option<DefaultValue>,
    coerce: Option<Coercer>,
}

impl Slot {
    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    pub fn has_coercer(&self) -> bool {
        self.coerce.is_some()
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("default", &self.default)
            .field("coerce", &self.coerce.is_some())
            .finish()
    }
}

/// Declared parameters of one constructible type.
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    kind: String,
    required: Vec<String>,
    optional: Vec<String>,
    slots: BTreeMap<String, Slot>,
}

impl ParameterSpec {
    pub fn builder(kind: impl Into<String>) -> ParameterSpecBuilder {
        ParameterSpecBuilder {
            kind: kind.into(),
            required: Vec::new(),
            optional: Vec::new(),
            slots: BTreeMap::new(),
        }
    }

    /// Diagnostic name of the type this spec constructs.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    pub fn optional(&self) -> &[String] {
        &self.optional
    }

    /// Canonical parameter order: required names, then optional names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.required
            .iter()
            .chain(self.optional.iter())
            .map(String::as_str)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.names().any(|n| n == name)
    }

    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.get(name)
    }

    /// Resolve `call` against this spec. See [`resolve`].
    #[track_caller]
    pub fn resolve(&self, call: Invocation) -> Result<ParameterBag> {
        resolve(self, call)
    }
}

/// Builder for [`ParameterSpec`]; [`build`](Self::build) checks the declaration.
pub struct ParameterSpecBuilder {
    kind: String,
    required: Vec<String>,
    optional: Vec<String>,
    slots: BTreeMap<String, Slot>,
}

impl ParameterSpecBuilder {
    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    pub fn optional(mut self, name: impl Into<String>) -> Self {
        self.optional.push(name.into());
        self
    }

    /// Literal default for an optional parameter.
    pub fn default(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.slots.entry(name.into()).or_default().default =
            Some(DefaultValue::Literal(value.into()));
        self
    }

    /// Factory default for an optional parameter.
    pub fn factory<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.slots.entry(name.into()).or_default().default =
            Some(DefaultValue::Factory(Arc::new(factory)));
        self
    }

    /// Best-effort converter applied to a named argument for this parameter.
    pub fn coerce<F>(mut self, name: impl Into<String>, coerce: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.slots.entry(name.into()).or_default().coerce = Some(Arc::new(coerce));
        self
    }

    pub fn build(self) -> Result<ParameterSpec> {
        let mut seen = BTreeSet::new();
        for name in self.required.iter().chain(self.optional.iter()) {
            if !seen.insert(name.as_str()) {
                return Err(FargError::Configuration(format!(
                    "{}: parameter '{}' declared more than once",
                    self.kind, name
                )));
            }
        }
        for (name, slot) in &self.slots {
            if !seen.contains(name.as_str()) {
                return Err(FargError::Configuration(format!(
                    "{}: slot for undeclared parameter '{}'",
                    self.kind, name
                )));
            }
            if slot.default.is_some() && self.required.contains(name) {
                return Err(FargError::Configuration(format!(
                    "{}: required parameter '{}' cannot carry a default",
                    self.kind, name
                )));
            }
        }
        Ok(ParameterSpec {
            kind: self.kind,
            required: self.required,
            optional: self.optional,
            slots: self.slots,
        })
    }
}

/// One concrete call: positional values and named values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    positional: Vec<Value>,
    named: BTreeMap<String, Value>,
}

impl Invocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_args<I, V>(args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            positional: args.into_iter().map(Into::into).collect(),
            named: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn named(&self) -> &BTreeMap<String, Value> {
        &self.named
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

/// Apply `call` to `spec`.
///
/// # Errors
///
/// [`FargError::MissingRequiredArgument`] when a required parameter ends up
/// absent. The error names the source location that asked for resolution.
#[track_caller]
pub fn resolve(spec: &ParameterSpec, call: Invocation) -> Result<ParameterBag> {
    let caller = Location::caller();
    let Invocation {
        positional,
        mut named,
    } = call;
    let supplied: BTreeSet<String> = named.keys().cloned().collect();

    let mut slots: Vec<(String, Option<Value>)> = spec
        .names()
        .map(|name| {
            let value = match spec.slot(name).and_then(Slot::default_value) {
                Some(DefaultValue::Literal(v)) => Some(v.clone()),
                _ => None,
            };
            (name.to_string(), value)
        })
        .collect();

    let mut bound = vec![false; slots.len()];
    let mut args = positional.into_iter();
    for (i, (name, value)) in slots.iter_mut().enumerate() {
        if supplied.contains(name) {
            continue;
        }
        match args.next() {
            Some(arg) => {
                *value = Some(arg);
                bound[i] = true;
            }
            None => break,
        }
    }
    let surplus = args.count();
    if surplus > 0 {
        trace!(kind = spec.kind(), surplus, "ignoring surplus positional arguments");
    }

    for (name, value) in slots.iter_mut() {
        let name = name.as_str();
        let Some(coerce) = spec.slot(name).and_then(|slot| slot.coerce.as_ref()) else {
            continue;
        };
        let Some(raw) = named.get(name) else {
            continue;
        };
        match coerce(raw) {
            Ok(coerced) => {
                *value = Some(coerced);
                named.remove(name);
            }
            Err(reason) => {
                debug!(kind = spec.kind(), name, %reason, "coercion failed, keeping raw value");
            }
        }
    }

    for (i, (name, value)) in slots.iter_mut().enumerate() {
        let name = name.as_str();
        if bound[i] || supplied.contains(name) {
            continue;
        }
        if let Some(DefaultValue::Factory(factory)) = spec.slot(name).and_then(Slot::default_value)
        {
            *value = Some(factory());
        }
    }

    for (name, raw) in named {
        match slots.iter_mut().find(|(slot_name, _)| *slot_name == name) {
            Some((_, value)) => *value = Some(raw),
            None => {
                debug!(kind = spec.kind(), name = %name, "undeclared named argument passed through");
                slots.push((name, Some(raw)));
            }
        }
    }

    let missing: Vec<String> = spec
        .required()
        .iter()
        .filter(|name| {
            slots
                .iter()
                .any(|(slot_name, value)| slot_name == *name && value.is_none())
        })
        .cloned()
        .collect();
    if !missing.is_empty() {
        let expected = spec.required().len();
        return Err(FargError::MissingRequiredArgument {
            kind: spec.kind().to_string(),
            caller: caller.to_string(),
            got: expected - missing.len(),
            expected,
            missing,
        });
    }

    Ok(ParameterBag::from_entries(
        slots
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v))),
    ))
}
