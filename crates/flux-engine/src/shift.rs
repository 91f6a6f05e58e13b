//! Calendar-unit shifting of [`TimePoint`]s.
//!
//! Arithmetic runs on the wall clock at the point's current UTC offset.
//! What happens next depends on `respect_dst`:
//!
//! - `true`: the shifted wall clock is read back at the *original* offset.
//!   The result is an exact duration away from the start and may show a
//!   different wall-clock hour after a DST change.
//! - `false`: the shifted wall clock is placed in the zone again, so the
//!   hour is kept and the elapsed time absorbs the DST change.
//!
//! From 2019-01-01 09:00 in New York, 120 days forward is 2019-05-01 10:00
//! when respecting DST and 09:00 when not.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, Months, NaiveDateTime, TimeDelta, Weekday};
use farg_core::{coerce, predicates, Invocation, ParameterBag, ParameterSpec, ValidatedSpec, Value};
use serde::Serialize;

use crate::error::{FluxError, Result};
use crate::parse::weekday_from_name;
use crate::timepoint::TimePoint;
use crate::zone::from_wall;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    /// `next`/`forward`/`+` or `last`/`previous`/`backward`/`-`.
    pub fn parse(s: &str) -> Result<Direction> {
        match s.trim().to_ascii_lowercase().as_str() {
            "next" | "forward" | "forwards" | "+" => Ok(Direction::Forward),
            "last" | "prev" | "previous" | "backward" | "backwards" | "-" => Ok(Direction::Backward),
            other => Err(FluxError::TimeParse(format!("unknown shift direction '{other}'"))),
        }
    }
}

/// A calendar unit to shift by, or a named weekday to step to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Weekday(Weekday),
}

impl Unit {
    /// Singular or plural unit names and abbreviations, or a weekday name.
    pub fn parse(s: &str) -> Result<Unit> {
        let s = s.trim().to_ascii_lowercase();
        let unit = match s.as_str() {
            "year" | "years" | "yr" | "yrs" => Unit::Year,
            "month" | "months" | "mo" => Unit::Month,
            "week" | "weeks" | "wk" | "wks" => Unit::Week,
            "day" | "days" => Unit::Day,
            "hour" | "hours" | "hr" | "hrs" => Unit::Hour,
            "minute" | "minutes" | "min" | "mins" => Unit::Minute,
            "second" | "seconds" | "sec" | "secs" => Unit::Second,
            other => match weekday_from_name(other) {
                Some(weekday) => Unit::Weekday(weekday),
                None => return Err(FluxError::TimeParse(format!("unknown shift unit '{other}'"))),
            },
        };
        Ok(unit)
    }
}

impl FromStr for Unit {
    type Err = FluxError;

    fn from_str(s: &str) -> Result<Self> {
        Unit::parse(s)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Unit::Year => "year",
            Unit::Month => "month",
            Unit::Week => "week",
            Unit::Day => "day",
            Unit::Hour => "hour",
            Unit::Minute => "minute",
            Unit::Second => "second",
            Unit::Weekday(Weekday::Mon) => "monday",
            Unit::Weekday(Weekday::Tue) => "tuesday",
            Unit::Weekday(Weekday::Wed) => "wednesday",
            Unit::Weekday(Weekday::Thu) => "thursday",
            Unit::Weekday(Weekday::Fri) => "friday",
            Unit::Weekday(Weekday::Sat) => "saturday",
            Unit::Weekday(Weekday::Sun) => "sunday",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftOptions {
    pub count: u32,
    pub respect_dst: bool,
}

impl Default for ShiftOptions {
    fn default() -> Self {
        Self {
            count: 1,
            respect_dst: true,
        }
    }
}

// ── Shifting ────────────────────────────────────────────────────────────────

impl TimePoint {
    /// Shift `count` units in `direction`.
    ///
    /// For [`Unit::Weekday`] the point steps one day at a time until it
    /// lands on that weekday, `count` times; the current day never counts.
    ///
    /// # Errors
    ///
    /// Returns [`FluxError::Arithmetic`] if the result leaves chrono's range.
    pub fn shift(&self, direction: Direction, unit: Unit, count: u32, respect_dst: bool) -> Result<TimePoint> {
        let offset = self.offset_fix();
        let shifted = step_wall(self.local_naive(), direction, unit, count)?;
        if respect_dst {
            let instant = from_wall(&shifted, offset)?;
            Ok(TimePoint::new(instant, self.zone()))
        } else {
            TimePoint::from_local(shifted, self.zone())
        }
    }

    pub fn shift_by(&self, direction: Direction, unit: Unit, options: ShiftOptions) -> Result<TimePoint> {
        self.shift(direction, unit, options.count, options.respect_dst)
    }

    /// `n` units forward, respecting DST.
    pub fn forward(&self, unit: Unit, n: u32) -> Result<TimePoint> {
        self.shift(Direction::Forward, unit, n, true)
    }

    /// `n` units backward, respecting DST.
    pub fn backward(&self, unit: Unit, n: u32) -> Result<TimePoint> {
        self.shift(Direction::Backward, unit, n, true)
    }

    /// Shift with options taken from a dynamic call.
    ///
    /// Positional order: `num_shifts, respect_dst`. Named aliases: `count`
    /// for `num_shifts` and `rdst` for `respect_dst` (the alias wins when
    /// both are given). Numeric and boolean strings are coerced.
    #[track_caller]
    pub fn shift_with(&self, direction: Direction, unit: Unit, call: Invocation) -> Result<TimePoint> {
        let options = shift_options(call)?;
        self.shift_by(direction, unit, options)
    }
}

static SHIFT_ARGS: LazyLock<farg_core::Result<ValidatedSpec>> = LazyLock::new(|| {
    let spec = ParameterSpec::builder("Shift")
        .optional("num_shifts")
        .optional("respect_dst")
        .optional("count")
        .optional("rdst")
        .coerce("num_shifts", coerce::int)
        .coerce("count", coerce::int)
        .coerce("respect_dst", coerce::boolean)
        .coerce("rdst", coerce::boolean)
        .build()?;
    Ok(ValidatedSpec::new(spec)
        .rule("num_shifts", predicates::optional(non_negative_int))
        .rule("count", predicates::optional(non_negative_int))
        .rule("respect_dst", predicates::optional(predicates::is_bool()))
        .rule("rdst", predicates::optional(predicates::is_bool())))
});

fn non_negative_int(value: Option<&Value>, _: &ParameterBag) -> std::result::Result<(), String> {
    match value.and_then(Value::as_i64) {
        Some(n) if (0..=i64::from(u32::MAX)).contains(&n) => Ok(()),
        _ => Err("must be a non-negative integer".to_string()),
    }
}

#[track_caller]
fn shift_options(call: Invocation) -> Result<ShiftOptions> {
    let spec = SHIFT_ARGS.as_ref().map_err(Clone::clone)?;
    let bag = spec.resolve(call)?;
    let defaults = ShiftOptions::default();
    let count = ["count", "num_shifts"]
        .into_iter()
        .find_map(|name| bag.get_present(name).and_then(Value::as_i64))
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(defaults.count);
    let respect_dst = ["rdst", "respect_dst"]
        .into_iter()
        .find_map(|name| bag.get_present(name).and_then(Value::as_bool))
        .unwrap_or(defaults.respect_dst);
    Ok(ShiftOptions { count, respect_dst })
}

/// Apply the shift to a wall-clock reading.
pub(crate) fn step_wall(
    wall: NaiveDateTime,
    direction: Direction,
    unit: Unit,
    count: u32,
) -> Result<NaiveDateTime> {
    let overflow = || FluxError::Arithmetic(format!("shifting {wall} by {count} {unit} overflows"));
    let n = i64::from(count);
    let seconds = |per_unit: i64| match direction {
        Direction::Forward => wall.checked_add_signed(TimeDelta::seconds(n * per_unit)),
        Direction::Backward => wall.checked_sub_signed(TimeDelta::seconds(n * per_unit)),
    };
    let months = |per_unit: u32| {
        let months = Months::new(count.checked_mul(per_unit)?);
        match direction {
            Direction::Forward => wall.checked_add_months(months),
            Direction::Backward => wall.checked_sub_months(months),
        }
    };
    let shifted = match unit {
        Unit::Year => months(12),
        Unit::Month => months(1),
        Unit::Week => seconds(7 * 86_400),
        Unit::Day => seconds(86_400),
        Unit::Hour => seconds(3_600),
        Unit::Minute => seconds(60),
        Unit::Second => seconds(1),
        Unit::Weekday(target) => {
            let step = match direction {
                Direction::Forward => TimeDelta::days(1),
                Direction::Backward => TimeDelta::days(-1),
            };
            let mut current = Some(wall);
            for _ in 0..count {
                current = current.and_then(|mut day| loop {
                    day = day.checked_add_signed(step)?;
                    if day.weekday() == target {
                        break Some(day);
                    }
                });
            }
            current
        }
    };
    shifted.ok_or_else(overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::Zone;
    use chrono::{NaiveDate, TimeZone, Utc};
    use chrono_tz::Tz;
    use proptest::prelude::*;

    fn ny() -> Zone {
        Zone::Iana(Tz::America__New_York)
    }

    fn nine_am_new_year() -> TimePoint {
        TimePoint::from_fields(2019, 1, 1, 9, 0, 0, ny()).unwrap()
    }

    #[test]
    fn test_dst_respecting_shift_keeps_elapsed_time() {
        let start = nine_am_new_year();
        let end = start.shift(Direction::Forward, Unit::Day, 120, true).unwrap();
        assert_eq!(end.isoformat(), "2019-05-01T10:00:00-04:00");
        assert_eq!((end.instant() - start.instant()).num_seconds(), 120 * 86_400);
    }

    #[test]
    fn test_dst_naive_shift_keeps_wall_clock() {
        let end = nine_am_new_year()
            .shift(Direction::Forward, Unit::Day, 120, false)
            .unwrap();
        assert_eq!(end.isoformat(), "2019-05-01T09:00:00-04:00");
    }

    #[test]
    fn test_two_weeks_across_spring_forward() {
        let start = TimePoint::from_fields(2018, 3, 3, 13, 0, 0, ny()).unwrap();
        let end = start.forward(Unit::Week, 2).unwrap();
        assert_eq!(end.isoformat(), "2018-03-17T14:00:00-04:00");
    }

    #[test]
    fn test_month_end_clamps() {
        let jan_31 = TimePoint::from_fields(2021, 1, 31, 12, 0, 0, Zone::UTC).unwrap();
        let feb = jan_31.forward(Unit::Month, 1).unwrap();
        assert_eq!(feb.date(), NaiveDate::from_ymd_opt(2021, 2, 28).unwrap());
        let leap = TimePoint::from_fields(2020, 2, 29, 0, 0, 0, Zone::UTC).unwrap();
        assert_eq!(leap.backward(Unit::Year, 1).unwrap().day(), 28);
    }

    #[test]
    fn test_named_weekday() {
        // 2021-01-05 is a Tuesday
        let tuesday = TimePoint::from_fields(2021, 1, 5, 9, 0, 0, Zone::UTC).unwrap();
        let next_friday = tuesday.forward(Unit::Weekday(Weekday::Fri), 1).unwrap();
        assert_eq!(next_friday.day(), 8);
        let second_tuesday = tuesday.forward(Unit::Weekday(Weekday::Tue), 2).unwrap();
        assert_eq!(second_tuesday.day(), 19);
        let last_monday = tuesday.backward(Unit::Weekday(Weekday::Mon), 1).unwrap();
        assert_eq!(last_monday.day(), 4);
        assert_eq!(next_friday.hour(), 9);
    }

    #[test]
    fn test_zero_count_is_identity() {
        let start = nine_am_new_year();
        assert_eq!(start.forward(Unit::Month, 0).unwrap(), start);
        assert_eq!(start.forward(Unit::Weekday(Weekday::Mon), 0).unwrap(), start);
    }

    #[test]
    fn test_overflow() {
        let start = TimePoint::from_fields(262_000, 1, 1, 0, 0, 0, Zone::UTC).unwrap();
        let err = start.forward(Unit::Year, 10_000).unwrap_err();
        assert!(matches!(err, FluxError::Arithmetic(_)), "got: {err}");
    }

    #[test]
    fn test_unit_parse() {
        assert_eq!(Unit::parse("Days").unwrap(), Unit::Day);
        assert_eq!(Unit::parse("wk").unwrap(), Unit::Week);
        assert_eq!(Unit::parse("friday").unwrap(), Unit::Weekday(Weekday::Fri));
        assert_eq!(Unit::Weekday(Weekday::Fri).to_string(), "friday");
        let err = Unit::parse("fortnight").unwrap_err().to_string();
        assert!(err.contains("unknown shift unit"), "got: {err}");
        assert_eq!(Direction::parse("last").unwrap(), Direction::Backward);
    }

    #[test]
    fn test_shift_with_dynamic_options() {
        let start = nine_am_new_year();
        let call = Invocation::new().kwarg("num_shifts", "120").kwarg("respect_dst", "false");
        let end = start.shift_with(Direction::Forward, Unit::Day, call).unwrap();
        assert_eq!(end.hour(), 9);

        let positional = Invocation::from_args([Value::Int(120), Value::Bool(true)]);
        let end = start.shift_with(Direction::Forward, Unit::Day, positional).unwrap();
        assert_eq!(end.hour(), 10);

        // aliases win
        let call = Invocation::new()
            .kwarg("num_shifts", 1)
            .kwarg("count", 120)
            .kwarg("respect_dst", true)
            .kwarg("rdst", false);
        let end = start.shift_with(Direction::Forward, Unit::Day, call).unwrap();
        assert_eq!(end.isoformat(), "2019-05-01T09:00:00-04:00");

        let end = start
            .shift_with(Direction::Forward, Unit::Day, Invocation::new())
            .unwrap();
        assert_eq!(end.day(), 2);
    }

    #[test]
    fn test_shift_with_rejects_negative_count() {
        let err = nine_am_new_year()
            .shift_with(Direction::Forward, Unit::Day, Invocation::new().kwarg("num_shifts", -2))
            .unwrap_err();
        assert!(err.to_string().contains("non-negative"), "got: {err}");
    }

    proptest! {
        #[test]
        fn prop_naive_shift_inverse(
            secs in 946_684_800i64..2_208_988_800,
            unit in prop_oneof![Just(Unit::Week), Just(Unit::Day)],
            n in 0u32..500,
        ) {
            let start = TimePoint::new(Utc.timestamp_opt(secs, 0).unwrap(), ny());
            // 01:00-02:59 is where New York's gaps and repeats live
            prop_assume!(!(1..=2).contains(&start.hour()));
            let there = start.shift(Direction::Forward, unit, n, false).unwrap();
            prop_assert_eq!(there.time(), start.time());
            let back = there.shift(Direction::Backward, unit, n, false).unwrap();
            prop_assert_eq!(back, start);
        }

        #[test]
        fn prop_dst_respecting_day_shift_is_exact(
            secs in 946_684_800i64..2_208_988_800,
            n in 0u32..400,
        ) {
            let start = TimePoint::new(Utc.timestamp_opt(secs, 0).unwrap(), ny());
            let end = start.forward(Unit::Day, n).unwrap();
            prop_assert_eq!((end.instant() - start.instant()).num_seconds(), i64::from(n) * 86_400);
        }
    }
}
