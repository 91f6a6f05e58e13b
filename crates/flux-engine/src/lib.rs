//! # flux-engine
//!
//! Timezone-aware time points for callers that think in wall clocks.
//!
//! A [`TimePoint`] is an instant plus the [`Zone`] it is viewed in. It can be
//! built from text, epoch seconds, field lists or maps through
//! [`TimePoint::build`], shifted by calendar units with or without regard for
//! DST, and used as the anchor of a lazy [`Recurrence`].
//!
//! ## Modules
//!
//! - [`zone`]: zone parsing, DST lookup and offset-to-zone search
//! - [`parse`]: free-form date and time parsing with day/year-first hints
//! - [`timepoint`]: the [`TimePoint`] type, dynamic construction and accessors
//! - [`shift`]: forward and backward shifting by units and named weekdays
//! - [`recurrence`]: bounded recurrence streams from an anchor
//! - [`error`]: error types
//!
//! ## DST-aware vs wall-clock shifting
//!
//! ```
//! use chrono_tz::Tz;
//! use flux_engine::{Direction, TimePoint, Unit, Zone};
//!
//! let ny = Zone::Iana(Tz::America__New_York);
//! let start = TimePoint::from_fields(2019, 1, 1, 9, 0, 0, ny).unwrap();
//!
//! // Exactly 120 * 24 hours later, which reads 10:00 once EDT is in force.
//! let aware = start.shift(Direction::Forward, Unit::Day, 120, true).unwrap();
//! assert_eq!(aware.isoformat(), "2019-05-01T10:00:00-04:00");
//!
//! // Same wall clock, 120 days on.
//! let naive = start.shift(Direction::Forward, Unit::Day, 120, false).unwrap();
//! assert_eq!(naive.hour(), 9);
//! ```

pub mod error;
pub mod parse;
pub mod recurrence;
pub mod shift;
pub mod timepoint;
pub mod zone;

pub use error::{FluxError, Result};
pub use parse::{parse_datetime, ParseOptions, ParsedDateTime};
pub use recurrence::{Bound, Frequency, Occurrences, Origin, Recurrence};
pub use shift::{Direction, ShiftOptions, Unit};
pub use timepoint::{Description, TimePoint};
pub use zone::{
    format_utc_offset, likely_zone, likely_zone_at, parse_fixed_offset, zones_for_offset,
    zones_for_offset_at, Zone, FAVORED_ZONES,
};
