//! Timezone-aware instants.
//!
//! A [`TimePoint`] is an instant on the UTC timeline plus the [`Zone`] it is
//! expressed in. Every operation returns a new value.
//!
//! Construction comes in two flavours:
//!
//! - typed constructors ([`TimePoint::new`], [`TimePoint::parse_with`],
//!   [`TimePoint::from_fields`], ...);
//! - [`TimePoint::build`], which takes a loosely-typed [`Invocation`] and
//!   resolves it through a validated parameter spec, accepting the same
//!   shapes callers pass around as dynamic values.

use std::any::Any;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc, Weekday,
};
use farg_core::{coerce, predicates, Invocation, ParameterBag, ParameterSpec, Record, ValidatedSpec, Value};
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::error::{FluxError, Result};
use crate::parse::{parse_datetime, ParseOptions};
use crate::zone::{format_utc_offset, likely_zone, Zone};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimePoint {
    instant: DateTime<Utc>,
    zone: Zone,
}

// ── Typed construction ──────────────────────────────────────────────────────

impl TimePoint {
    pub fn new(instant: DateTime<Utc>, zone: Zone) -> Self {
        Self { instant, zone }
    }

    pub fn now_in(zone: Zone) -> Self {
        Self::new(Utc::now(), zone)
    }

    /// An exact instant given as seconds since the Unix epoch.
    ///
    /// # Errors
    ///
    /// Returns [`FluxError::Arithmetic`] for non-finite or out-of-range values.
    pub fn from_epoch(secs: f64, zone: Zone) -> Result<Self> {
        let whole = secs.floor();
        let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
        if !whole.is_finite() || whole.abs() > i64::MAX as f64 {
            return Err(FluxError::Arithmetic(format!("epoch {secs} is out of range")));
        }
        DateTime::from_timestamp(whole as i64, nanos)
            .map(|instant| Self::new(instant, zone))
            .ok_or_else(|| FluxError::Arithmetic(format!("epoch {secs} is out of range")))
    }

    /// The instant at which `zone`'s wall clock reads `naive`.
    pub fn from_local(naive: NaiveDateTime, zone: Zone) -> Result<Self> {
        zone.localize(&naive).map(|instant| Self::new(instant, zone))
    }

    pub fn from_fields(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
        zone: Zone,
    ) -> Result<Self> {
        let naive = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, minute, second))
            .ok_or_else(|| {
                FluxError::TimeParse(format!(
                    "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02} is not a real date/time"
                ))
            })?;
        Self::from_local(naive, zone)
    }

    /// Parse `s` with no zone override and default hints.
    pub fn parse(s: &str) -> Result<Self> {
        Self::parse_with(s, None, ParseOptions::default())
    }

    /// Parse `s`. An explicit `zone` reinterprets the parsed wall clock in
    /// that zone; otherwise the zone embedded in the text is used, else UTC.
    pub fn parse_with(s: &str, zone: Option<Zone>, options: ParseOptions) -> Result<Self> {
        let parsed = parse_datetime(s, options)?;
        let zone = zone.or(parsed.zone).unwrap_or(Zone::UTC);
        Self::from_local(parsed.naive, zone)
    }
}

// ── Dynamic construction ────────────────────────────────────────────────────

static CONSTRUCTION: LazyLock<farg_core::Result<ValidatedSpec>> = LazyLock::new(|| {
    let spec = ParameterSpec::builder("TimePoint")
        .optional("datetime")
        .optional("timezone")
        .optional("date_thing")
        .optional("astz")
        .optional("dayfirst")
        .optional("yearfirst")
        .default("dayfirst", false)
        .default("yearfirst", false)
        .coerce("dayfirst", coerce::boolean)
        .coerce("yearfirst", coerce::boolean)
        .build()?;
    Ok(ValidatedSpec::new(spec)
        .rule("timezone", zone_option)
        .rule("astz", zone_option)
        .rule("dayfirst", predicates::is_bool())
        .rule("yearfirst", predicates::is_bool()))
});

fn zone_option(value: Option<&Value>, _: &ParameterBag) -> std::result::Result<(), String> {
    match value {
        None | Some(Value::Null | Value::Str(_) | Value::Int(_) | Value::Float(_)) => Ok(()),
        Some(other) => Err(format!(
            "expected a zone name or an offset in hours, got {}",
            other.type_name()
        )),
    }
}

impl TimePoint {
    /// Build from a dynamic call, reading the clock for `"now"`.
    ///
    /// See [`build_at`](Self::build_at).
    #[track_caller]
    pub fn build(call: Invocation) -> Result<Self> {
        Self::build_at(call, Utc::now())
    }

    /// Build from a dynamic call with an explicit "now".
    ///
    /// Positional order: `datetime, timezone, date_thing, astz, dayfirst,
    /// yearfirst`. `datetime` wins over its alias `date_thing`, and
    /// `timezone` over `astz`. A numeric zone is an offset in hours resolved
    /// with [`likely_zone`], falling back to UTC.
    ///
    /// Source values:
    ///
    /// - absent, `null` or a string starting with `now`: `now`
    /// - a `TimePoint` record: kept, or reinterpreted on the wall clock
    ///   when a zone is given
    /// - a number: epoch seconds, read as a UTC wall clock in the requested
    ///   zone
    /// - a string: parsed with the `dayfirst`/`yearfirst` hints
    /// - another record with an ISO rendering: that text, parsed
    /// - a list `[y, m, d, h?, mi?, s?, us?]` or a map with those field
    ///   names: local fields in the requested zone
    ///
    /// # Errors
    ///
    /// - [`FluxError::Resolve`] when the options fail validation
    /// - [`FluxError::InvalidTimezone`] for an unknown zone name
    /// - [`FluxError::TimeParse`] for any source it cannot read
    #[track_caller]
    pub fn build_at(call: Invocation, now: DateTime<Utc>) -> Result<Self> {
        let spec = CONSTRUCTION.as_ref().map_err(Clone::clone)?;
        let bag = spec.resolve(call)?;

        let options = ParseOptions {
            dayfirst: bag.get_bool("dayfirst").unwrap_or(false),
            yearfirst: bag.get_bool("yearfirst").unwrap_or(false),
        };
        let requested = ["timezone", "astz"]
            .into_iter()
            .find_map(|name| bag.get(name).filter(|v| v.is_truthy()))
            .map(zone_from_value)
            .transpose()?;
        let zone = requested.unwrap_or(Zone::UTC);
        let source = ["datetime", "date_thing"]
            .into_iter()
            .find_map(|name| bag.get_present(name));

        match source {
            None => Ok(Self::new(now, zone)),
            Some(Value::Str(s)) if s.trim().to_ascii_lowercase().starts_with("now") => {
                Ok(Self::new(now, zone))
            }
            Some(Value::Str(s)) => Self::parse_with(s, requested, options),
            Some(Value::Int(secs)) => Self::from_epoch(*secs as f64, Zone::UTC)?.reinterpret(zone),
            Some(Value::Float(secs)) => Self::from_epoch(*secs, Zone::UTC)?.reinterpret(zone),
            Some(Value::Record(record)) => match record.as_any().downcast_ref::<TimePoint>() {
                Some(point) => match requested {
                    Some(zone) => point.reinterpret(zone),
                    None => Ok(*point),
                },
                None => {
                    let iso = record.isoformat().ok_or_else(|| {
                        FluxError::TimeParse(format!("{} has no ISO form", record.type_name()))
                    })?;
                    Self::parse_with(&iso, requested, options)
                }
            },
            Some(Value::List(items)) => Self::from_local(fields_from_list(items)?, zone),
            Some(Value::Map(entries)) => Self::from_local(fields_from_map(entries)?, zone),
            Some(other) => Err(FluxError::TimeParse(format!(
                "cannot build a TimePoint from {}",
                other.type_name()
            ))),
        }
    }
}

fn zone_from_value(value: &Value) -> Result<Zone> {
    match value {
        Value::Str(name) => Zone::parse(name),
        Value::Int(_) | Value::Float(_) => {
            let hours = value.as_f64().unwrap_or_default();
            let zone = likely_zone(hours).map(Zone::Iana).unwrap_or(Zone::UTC);
            debug!(hours, %zone, "resolved numeric timezone");
            Ok(zone)
        }
        other => Err(FluxError::InvalidTimezone(format!("{other}"))),
    }
}

const FIELD_NAMES: [&str; 7] = ["year", "month", "day", "hour", "minute", "second", "microsecond"];

fn fields_from_list(items: &[Value]) -> Result<NaiveDateTime> {
    if !(3..=7).contains(&items.len()) {
        return Err(FluxError::TimeParse(format!(
            "expected 3 to 7 date fields, got {}",
            items.len()
        )));
    }
    let mut fields = [0i64; 7];
    for (slot, (name, item)) in fields.iter_mut().zip(FIELD_NAMES.iter().zip(items)) {
        *slot = field_value(name, item)?;
    }
    naive_from_fields(fields)
}

fn fields_from_map(entries: &BTreeMap<String, Value>) -> Result<NaiveDateTime> {
    let mut fields = [0i64; 7];
    for (i, (slot, name)) in fields.iter_mut().zip(FIELD_NAMES).enumerate() {
        match entries.get(name) {
            Some(item) => *slot = field_value(name, item)?,
            None if i < 3 => return Err(FluxError::TimeParse(format!("missing '{name}' field"))),
            None => {}
        }
    }
    naive_from_fields(fields)
}

fn field_value(name: &str, item: &Value) -> Result<i64> {
    item.as_i64()
        .ok_or_else(|| FluxError::TimeParse(format!("field '{name}' must be an integer, got {item}")))
}

fn naive_from_fields([y, mo, d, h, mi, s, us]: [i64; 7]) -> Result<NaiveDateTime> {
    let invalid = || FluxError::TimeParse(format!("fields {y}-{mo}-{d} {h}:{mi}:{s}.{us} are not a real date/time"));
    let year = i32::try_from(y).map_err(|_| invalid())?;
    let [month, day, hour, minute, second, micro] = [mo, d, h, mi, s, us]
        .map(|v| u32::try_from(v).unwrap_or(u32::MAX));
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_micro_opt(hour, minute, second, micro))
        .ok_or_else(invalid)
}

// ── Accessors ───────────────────────────────────────────────────────────────

impl TimePoint {
    pub fn instant(&self) -> DateTime<Utc> {
        self.instant
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    /// The UTC offset in effect at this instant in this zone.
    pub fn offset_fix(&self) -> FixedOffset {
        self.zone.offset_at(&self.instant)
    }

    pub fn local(&self) -> DateTime<FixedOffset> {
        self.instant.with_timezone(&self.offset_fix())
    }

    /// Wall-clock time with the zone dropped.
    pub fn local_naive(&self) -> NaiveDateTime {
        self.local().naive_local()
    }

    pub fn date(&self) -> NaiveDate {
        self.local_naive().date()
    }

    pub fn time(&self) -> NaiveTime {
        self.local_naive().time()
    }

    pub fn year(&self) -> i32 {
        self.local().year()
    }

    pub fn month(&self) -> u32 {
        self.local().month()
    }

    pub fn day(&self) -> u32 {
        self.local().day()
    }

    pub fn hour(&self) -> u32 {
        self.local().hour()
    }

    pub fn minute(&self) -> u32 {
        self.local().minute()
    }

    pub fn second(&self) -> u32 {
        self.local().second()
    }

    pub fn microsecond(&self) -> u32 {
        self.local().nanosecond() / 1_000
    }

    pub fn weekday(&self) -> Weekday {
        self.local().weekday()
    }

    /// E.g. `-05:00`.
    pub fn utc_offset(&self) -> String {
        format_utc_offset(self.offset_fix())
    }

    pub fn is_dst(&self) -> bool {
        self.zone.is_dst_at(&self.instant)
    }

    /// RFC 3339 with the local offset.
    pub fn isoformat(&self) -> String {
        self.local().to_rfc3339()
    }

    /// Seconds since the Unix epoch.
    pub fn epoch(&self) -> f64 {
        self.instant.timestamp() as f64 + f64::from(self.instant.timestamp_subsec_nanos()) / 1e9
    }

    /// The same instant expressed in `zone`.
    pub fn in_zone(&self, zone: Zone) -> Self {
        Self::new(self.instant, zone)
    }

    /// The same wall-clock reading, placed in `zone`.
    pub fn reinterpret(&self, zone: Zone) -> Result<Self> {
        Self::from_local(self.local_naive(), zone)
    }

    /// The same instant expressed in the most likely zone for a UTC offset
    /// of `hours`.
    ///
    /// # Errors
    ///
    /// Returns [`FluxError::InvalidTimezone`] when no common zone has that
    /// offset.
    pub fn offset(&self, hours: f64) -> Result<Self> {
        likely_zone(hours)
            .map(|tz| self.in_zone(Zone::Iana(tz)))
            .ok_or_else(|| FluxError::InvalidTimezone(format!("no zone with UTC offset {hours}h")))
    }

    pub fn describe(&self) -> Description {
        let local = self.local();
        Description {
            utc: self.instant.to_rfc3339(),
            local: local.to_rfc3339(),
            timezone: self.zone.name(),
            utc_offset: self.utc_offset(),
            dst_active: self.is_dst(),
            epoch: self.epoch(),
            interpretation: format!(
                "{} {}",
                local.format("%A, %B %-d, %Y at %-I:%M %p"),
                self.zone
            ),
        }
    }
}

/// A [`TimePoint`] spelled out for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct Description {
    /// The instant in UTC (RFC 3339).
    pub utc: String,
    /// The instant in its zone (RFC 3339 with offset).
    pub local: String,
    pub timezone: String,
    /// The UTC offset at this instant (e.g., "-05:00").
    pub utc_offset: String,
    pub dst_active: bool,
    pub epoch: f64,
    /// e.g. "Tuesday, January 5, 2021 at 9:00 AM America/New_York"
    pub interpretation: String,
}

// ── Trait impls ─────────────────────────────────────────────────────────────

impl PartialOrd for TimePoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimePoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.instant
            .cmp(&other.instant)
            .then_with(|| self.zone.name().cmp(&other.zone.name()))
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.isoformat())
    }
}

impl Serialize for TimePoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.isoformat())
    }
}

impl Record for TimePoint {
    fn type_name(&self) -> &'static str {
        "TimePoint"
    }

    fn attr(&self, name: &str) -> Option<Value> {
        let value = match name {
            "year" => Value::from(self.year()),
            "month" => Value::from(self.month()),
            "day" => Value::from(self.day()),
            "hour" => Value::from(self.hour()),
            "minute" => Value::from(self.minute()),
            "second" => Value::from(self.second()),
            "microsecond" => Value::from(self.microsecond()),
            "weekday" => Value::from(self.weekday().to_string()),
            "zone" | "timezone" => Value::from(self.zone.name()),
            "epoch" => Value::Float(self.epoch()),
            "iso" => Value::from(self.isoformat()),
            _ => return None,
        };
        Some(value)
    }

    fn isoformat(&self) -> Option<String> {
        Some(TimePoint::isoformat(self))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl From<TimePoint> for Value {
    fn from(point: TimePoint) -> Self {
        Value::record(point)
    }
}
