//! # farg-core
//!
//! Declarative construction of objects from mixed positional and named
//! inputs.
//!
//! - **Resolution** ([`resolver`]): a [`ParameterSpec`] lists required and
//!   optional parameter names, literal or factory defaults and best-effort
//!   coercers. Resolving an [`Invocation`] yields a [`ParameterBag`] or a
//!   precise missing-argument error.
//! - **Validation** ([`validation`]): a [`ValidatedSpec`] adds one rule per
//!   parameter and reports the first failure as a field-keyed
//!   [`ValidationFailure`]. Stock rules live in [`predicates`].
//! - **Drilling** ([`drill`]): dotted-path lookup across maps, records and
//!   lists with default coalescing.
//!
//! ## Quick Start
//!
//! ```
//! use farg_core::{coerce, Invocation, ParameterSpec, Value};
//!
//! let spec = ParameterSpec::builder("Mailer")
//!     .required("host")
//!     .optional("port")
//!     .default("port", 25)
//!     .coerce("port", coerce::int)
//!     .build()
//!     .unwrap();
//!
//! let bag = spec
//!     .resolve(Invocation::from_args(["mx.local"]).kwarg("port", "587"))
//!     .unwrap();
//! assert_eq!(bag["port"], Value::Int(587));
//! ```

pub mod bag;
pub mod coerce;
pub mod drill;
pub mod error;
pub mod predicates;
pub mod resolver;
pub mod validation;
pub mod value;

pub use bag::ParameterBag;
pub use drill::{drill, getor, DrillPath, Drillable, Strategy};
pub use error::{FargError, Result};
pub use resolver::{resolve, Invocation, ParameterSpec, ParameterSpecBuilder};
pub use validation::{FieldError, Rule, ValidatedSpec, ValidationFailure};
pub use value::{Record, Value};
