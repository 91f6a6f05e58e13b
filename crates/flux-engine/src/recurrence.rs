//! Recurrence streams.
//!
//! A [`Recurrence`] is a lazy, finite sequence of [`TimePoint`]s at a fixed
//! [`Frequency`] from an anchor. Occurrences come from an RRULE expanded
//! over the anchor's wall clock, each then placed in the target zone, so a
//! daily 09:00 stays at 09:00 across DST changes. Monthly and yearly rules
//! skip months where the anchor's day does not exist (an anchor on the 31st
//! recurs only in 31-day months).
//!
//! Bounds: `Count(n)` yields at most `n` occurrences, anchor included;
//! `Until(t)` yields every occurrence whose wall clock in the target zone is
//! not after `t`'s.
//!
//! [`Recurrence::iter`] starts over on every call.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Timelike};
use farg_core::{coerce, predicates, Invocation, ParameterBag, ParameterSpec, ValidatedSpec, Value};
use rrule::{Frequency as RuleFrequency, RRule, RRuleSet, Tz as RuleTz};
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{FluxError, Result};
use crate::shift::{Direction, Unit};
use crate::timepoint::TimePoint;
use crate::zone::Zone;

/// Recurrence frequency. The discriminants are the stable numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Yearly = 0,
    Monthly = 1,
    Weekly = 2,
    Daily = 3,
    Hourly = 4,
    Minutely = 5,
    Secondly = 6,
}

impl Frequency {
    pub const ALL: [Frequency; 7] = [
        Frequency::Yearly,
        Frequency::Monthly,
        Frequency::Weekly,
        Frequency::Daily,
        Frequency::Hourly,
        Frequency::Minutely,
        Frequency::Secondly,
    ];

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Frequency> {
        usize::try_from(code).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    /// `year`, `yearly`, `years` and so on, or a numeric code.
    pub fn parse(s: &str) -> Result<Frequency> {
        let s = s.trim().to_ascii_lowercase();
        if let Ok(code) = s.parse::<i64>() {
            return Self::from_code(code)
                .ok_or_else(|| FluxError::TimeParse(format!("unknown frequency code {code}")));
        }
        let freq = match s.as_str() {
            "year" | "years" | "yearly" => Frequency::Yearly,
            "month" | "months" | "monthly" => Frequency::Monthly,
            "week" | "weeks" | "weekly" => Frequency::Weekly,
            "day" | "days" | "daily" => Frequency::Daily,
            "hour" | "hours" | "hourly" => Frequency::Hourly,
            "minute" | "minutes" | "minutely" => Frequency::Minutely,
            "second" | "seconds" | "secondly" => Frequency::Secondly,
            other => return Err(FluxError::TimeParse(format!("unknown frequency '{other}'"))),
        };
        Ok(freq)
    }

    /// From a name or a numeric code held in a dynamic value.
    pub fn from_value(value: &Value) -> Result<Frequency> {
        match value {
            Value::Str(s) => Self::parse(s),
            other => other
                .as_i64()
                .and_then(Self::from_code)
                .ok_or_else(|| FluxError::TimeParse(format!("'{other}' is not a frequency"))),
        }
    }

    fn rule_frequency(self) -> RuleFrequency {
        match self {
            Frequency::Yearly => RuleFrequency::Yearly,
            Frequency::Monthly => RuleFrequency::Monthly,
            Frequency::Weekly => RuleFrequency::Weekly,
            Frequency::Daily => RuleFrequency::Daily,
            Frequency::Hourly => RuleFrequency::Hourly,
            Frequency::Minutely => RuleFrequency::Minutely,
            Frequency::Secondly => RuleFrequency::Secondly,
        }
    }

    /// The shift unit one step of this frequency moves by.
    pub fn unit(self) -> Unit {
        match self {
            Frequency::Yearly => Unit::Year,
            Frequency::Monthly => Unit::Month,
            Frequency::Weekly => Unit::Week,
            Frequency::Daily => Unit::Day,
            Frequency::Hourly => Unit::Hour,
            Frequency::Minutely => Unit::Minute,
            Frequency::Secondly => Unit::Second,
        }
    }
}

impl FromStr for Frequency {
    type Err = FluxError;

    fn from_str(s: &str) -> Result<Self> {
        Frequency::parse(s)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Frequency::Yearly => "yearly",
            Frequency::Monthly => "monthly",
            Frequency::Weekly => "weekly",
            Frequency::Daily => "daily",
            Frequency::Hourly => "hourly",
            Frequency::Minutely => "minutely",
            Frequency::Secondly => "secondly",
        };
        f.write_str(name)
    }
}

/// Where a forward recurrence ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Inclusive terminal instant.
    Until(TimePoint),
    /// Number of occurrences, anchor included.
    Count(u32),
}

/// Where a recurrence ending at a given point begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Start(TimePoint),
    /// The anchor is this many frequency steps before the end.
    Count(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Limit {
    Until(NaiveDateTime),
    Count(u32),
}

#[derive(Debug, Clone)]
pub struct Recurrence {
    anchor: TimePoint,
    frequency: Frequency,
    limit: Limit,
    /// Expansion over the anchor's wall clock read as UTC; `None` when the
    /// stream is empty.
    rules: Option<RRuleSet>,
    /// Sub-second part of the anchor, which the rules do not carry.
    nanos: u32,
}

impl Recurrence {
    fn new(anchor: TimePoint, frequency: Frequency, limit: Limit) -> Self {
        let wall = anchor.local_naive();
        let nanos = wall.nanosecond();
        let rules = match limit {
            Limit::Count(0) => None,
            _ => expansion(wall, frequency, limit),
        };
        Recurrence {
            anchor,
            frequency,
            limit,
            rules,
            nanos,
        }
    }

    pub fn anchor(&self) -> TimePoint {
        self.anchor
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn zone(&self) -> Zone {
        self.anchor.zone()
    }

    /// A fresh iterator from the anchor.
    pub fn iter(&self) -> Occurrences<'_> {
        Occurrences {
            recurrence: self,
            walls: self.rules.as_ref().map(|rules| Box::new(rules.into_iter()) as Walls<'_>),
        }
    }
}

/// RRULE set for `frequency` starting at the whole-second `wall`. Counts
/// are left to the rules; `Until` is checked by [`Occurrences`] against the
/// full wall clock.
fn expansion(wall: NaiveDateTime, frequency: Frequency, limit: Limit) -> Option<RRuleSet> {
    let whole = wall.with_nanosecond(0)?;
    let dt_start = whole.and_utc().with_timezone(&RuleTz::UTC);
    let mut rule = RRule::new(frequency.rule_frequency());
    if let Limit::Count(n) = limit {
        rule = rule.count(n);
    }
    match rule.build(dt_start) {
        Ok(rules) => Some(rules),
        Err(err) => {
            debug!(%err, %wall, "recurrence cannot start here");
            None
        }
    }
}

impl<'a> IntoIterator for &'a Recurrence {
    type Item = TimePoint;
    type IntoIter = Occurrences<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

type Walls<'a> = Box<dyn Iterator<Item = DateTime<RuleTz>> + 'a>;

/// Iterator over a [`Recurrence`].
pub struct Occurrences<'a> {
    recurrence: &'a Recurrence,
    walls: Option<Walls<'a>>,
}

impl fmt::Debug for Occurrences<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Occurrences")
            .field("recurrence", self.recurrence)
            .field("done", &self.walls.is_none())
            .finish()
    }
}

impl Iterator for Occurrences<'_> {
    type Item = TimePoint;

    fn next(&mut self) -> Option<TimePoint> {
        let recurrence = self.recurrence;
        let next = self.walls.as_mut()?.next();
        let wall = next.and_then(|at| {
            at.naive_utc()
                .checked_add_signed(TimeDelta::nanoseconds(i64::from(recurrence.nanos)))
        });
        let Some(wall) = wall else {
            self.walls = None;
            return None;
        };
        if let Limit::Until(until) = recurrence.limit {
            if wall > until {
                self.walls = None;
                return None;
            }
        }
        match TimePoint::from_local(wall, recurrence.zone()) {
            Ok(point) => {
                trace!(%wall, "occurrence");
                Some(point)
            }
            Err(err) => {
                debug!(%err, "recurrence left the representable range");
                self.walls = None;
                None
            }
        }
    }
}

// ── Construction ────────────────────────────────────────────────────────────

impl TimePoint {
    /// Recur forward from this point.
    ///
    /// With a `zone`, the anchor is first converted into it (same instant)
    /// and every occurrence is placed in that zone.
    ///
    /// # Examples
    ///
    /// ```
    /// use flux_engine::{Bound, Frequency, TimePoint};
    ///
    /// let anchor = TimePoint::parse("2021-01-01T00:00:00Z").unwrap();
    /// let days: Vec<String> = anchor
    ///     .start(Frequency::Daily, Bound::Count(3), None)
    ///     .iter()
    ///     .map(|p| p.isoformat())
    ///     .collect();
    /// assert_eq!(
    ///     days,
    ///     ["2021-01-01T00:00:00+00:00", "2021-01-02T00:00:00+00:00", "2021-01-03T00:00:00+00:00"]
    /// );
    /// ```
    pub fn start(&self, frequency: Frequency, bound: Bound, zone: Option<Zone>) -> Recurrence {
        let anchor = zone.map_or(*self, |zone| self.in_zone(zone));
        let limit = match bound {
            Bound::Until(end) => Limit::Until(end.in_zone(anchor.zone()).local_naive()),
            Bound::Count(n) => Limit::Count(n),
        };
        Recurrence::new(anchor, frequency, limit)
    }

    /// Recur up to and including this point.
    ///
    /// With [`Origin::Count`] the anchor is this point shifted back `n`
    /// frequency steps (respecting DST) and the stream holds `n` occurrences,
    /// ending one step short of this point. With [`Origin::Start`] it runs
    /// from that start through this point.
    ///
    /// # Errors
    ///
    /// Returns [`FluxError::Arithmetic`] if the derived anchor is out of range.
    pub fn stop(&self, frequency: Frequency, origin: Origin, zone: Option<Zone>) -> Result<Recurrence> {
        match origin {
            Origin::Start(start) => Ok(start.start(frequency, Bound::Until(*self), zone)),
            Origin::Count(n) => {
                let anchor = self.shift(Direction::Backward, frequency.unit(), n, true)?;
                Ok(anchor.start(frequency, Bound::Count(n), zone))
            }
        }
    }

    /// Forward recurrence from a dynamic call.
    ///
    /// Options: `freq` (required; a name or code `0..=6`), and exactly one of
    /// `stop` (anything [`TimePoint::build`] accepts) or `count` (a positive
    /// integer). `timezone` picks the target zone.
    #[track_caller]
    pub fn recur(&self, call: Invocation) -> Result<Recurrence> {
        let bag = FORWARD_ARGS.as_ref().map_err(Clone::clone)?.resolve(call)?;
        let frequency = Frequency::from_value(&bag["freq"])?;
        let zone = target_zone(&bag)?;
        let bound = match bag.get_i64("count") {
            Some(n) => Bound::Count(count_value(n)?),
            None => Bound::Until(point_from(&bag, "stop")?),
        };
        Ok(self.start(frequency, bound, zone))
    }

    /// Backward-anchored recurrence ending at this point, from a dynamic
    /// call. Exactly one of `start` or `count` must be given.
    #[track_caller]
    pub fn recur_back(&self, call: Invocation) -> Result<Recurrence> {
        let bag = BACKWARD_ARGS.as_ref().map_err(Clone::clone)?.resolve(call)?;
        let frequency = Frequency::from_value(&bag["freq"])?;
        let zone = target_zone(&bag)?;
        let origin = match bag.get_i64("count") {
            Some(n) => Origin::Count(count_value(n)?),
            None => Origin::Start(point_from(&bag, "start")?),
        };
        self.stop(frequency, origin, zone)
    }
}

static FORWARD_ARGS: LazyLock<farg_core::Result<ValidatedSpec>> =
    LazyLock::new(|| recurrence_spec("stop", "start"));

static BACKWARD_ARGS: LazyLock<farg_core::Result<ValidatedSpec>> =
    LazyLock::new(|| recurrence_spec("start", "stop"));

/// `endpoint` and `count` are alternatives; `excluded` is declared only so
/// that passing it gets a clear error.
fn recurrence_spec(endpoint: &'static str, excluded: &'static str) -> farg_core::Result<ValidatedSpec> {
    let spec = ParameterSpec::builder("Recurrence")
        .required("freq")
        .optional(endpoint)
        .optional("count")
        .optional("timezone")
        .optional(excluded)
        .coerce("freq", frequency_code)
        .coerce("count", coerce::int)
        .build()?;
    let rejected = format!("not accepted here; use {endpoint} or count");
    Ok(ValidatedSpec::new(spec)
        .rule("freq", predicates::check(|v: &Value| Frequency::from_value(v).map(|_| ())))
        .rule(endpoint, predicates::exactly_one_of([endpoint, "count"]))
        .rule("count", predicates::optional(predicates::is_positive_int()))
        .rule("timezone", predicates::optional(predicates::check(|v: &Value| match v {
            Value::Str(s) => Zone::parse(s).map(|_| ()),
            other => Err(FluxError::InvalidTimezone(format!("{other}"))),
        })))
        .rule(excluded, move |value: Option<&Value>, _: &ParameterBag| match value {
            None => Ok(()),
            Some(_) => Err(rejected.clone()),
        }))
}

fn frequency_code(value: &Value) -> std::result::Result<Value, String> {
    Frequency::from_value(value)
        .map(|freq| Value::Int(freq.code()))
        .map_err(|err| err.to_string())
}

fn target_zone(bag: &ParameterBag) -> Result<Option<Zone>> {
    bag.get_str("timezone").map(Zone::parse).transpose()
}

fn count_value(n: i64) -> Result<u32> {
    u32::try_from(n).map_err(|_| FluxError::Arithmetic(format!("count {n} is too large")))
}

/// Build the endpoint `name` with the same rules as [`TimePoint::build`].
fn point_from(bag: &ParameterBag, name: &str) -> Result<TimePoint> {
    let value = bag
        .get_present(name)
        .ok_or_else(|| FluxError::TimeParse(format!("no {name} given")))?;
    TimePoint::build(Invocation::new().kwarg("datetime", value.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Tz;
    use farg_core::FargError;

    fn isos(recurrence: &Recurrence) -> Vec<String> {
        recurrence.iter().map(|p| p.isoformat()).collect()
    }

    fn new_year_2021() -> TimePoint {
        TimePoint::parse("2021-01-01T00:00:00Z").unwrap()
    }

    #[test]
    fn test_daily_count_is_restartable() {
        let recurrence = new_year_2021().start(Frequency::Daily, Bound::Count(3), None);
        let expected = [
            "2021-01-01T00:00:00+00:00",
            "2021-01-02T00:00:00+00:00",
            "2021-01-03T00:00:00+00:00",
        ];
        assert_eq!(isos(&recurrence), expected);
        assert_eq!(isos(&recurrence), expected);
        assert_eq!((&recurrence).into_iter().count(), 3);
    }

    #[test]
    fn test_until_is_inclusive() {
        let end = TimePoint::parse("2021-01-04T00:00:00Z").unwrap();
        let recurrence = new_year_2021().start(Frequency::Daily, Bound::Until(end), None);
        assert_eq!(recurrence.iter().count(), 4);
        assert_eq!(recurrence.iter().last(), Some(end));
    }

    #[test]
    fn test_until_before_anchor_is_empty() {
        let end = TimePoint::parse("2020-12-31T00:00:00Z").unwrap();
        let recurrence = new_year_2021().start(Frequency::Daily, Bound::Until(end), None);
        assert_eq!(recurrence.iter().next(), None);
        let none = new_year_2021().start(Frequency::Daily, Bound::Count(0), None);
        assert_eq!(none.iter().count(), 0);
    }

    #[test]
    fn test_monthly_skips_missing_days() {
        let anchor = TimePoint::parse("2021-01-31T12:00:00Z").unwrap();
        let months: Vec<u32> = anchor
            .start(Frequency::Monthly, Bound::Count(4), None)
            .iter()
            .map(|p| p.month())
            .collect();
        assert_eq!(months, [1, 3, 5, 7]);
    }

    #[test]
    fn test_weekly_keeps_wall_clock_across_dst() {
        // 2021-03-14 is the US spring-forward day
        let anchor = TimePoint::from_fields(2021, 3, 7, 9, 0, 0, Zone::Iana(Tz::America__New_York)).unwrap();
        let recurrence = anchor.start(Frequency::Weekly, Bound::Count(2), None);
        assert_eq!(
            isos(&recurrence),
            ["2021-03-07T09:00:00-05:00", "2021-03-14T09:00:00-04:00"]
        );
    }

    #[test]
    fn test_target_zone_converts_anchor() {
        let recurrence = new_year_2021().start(
            Frequency::Hourly,
            Bound::Count(2),
            Some(Zone::Iana(Tz::Asia__Tokyo)),
        );
        assert_eq!(recurrence.zone(), Zone::Iana(Tz::Asia__Tokyo));
        assert_eq!(
            isos(&recurrence),
            ["2021-01-01T09:00:00+09:00", "2021-01-01T10:00:00+09:00"]
        );
    }

    #[test]
    fn test_stop_with_count_yields_count_occurrences() {
        let end = TimePoint::parse("2021-01-05T00:00:00Z").unwrap();
        let recurrence = end.stop(Frequency::Daily, Origin::Count(3), None).unwrap();
        assert_eq!(recurrence.anchor().day(), 2);
        assert_eq!(recurrence.iter().count(), 3);
        let days: Vec<u32> = recurrence.iter().map(|p| p.day()).collect();
        assert_eq!(days, [2, 3, 4]);
    }

    #[test]
    fn test_yearly_leap_day_recurs_in_leap_years() {
        let anchor = TimePoint::parse("2020-02-29T08:00:00Z").unwrap();
        let years: Vec<i32> = anchor
            .start(Frequency::Yearly, Bound::Count(3), None)
            .iter()
            .map(|p| p.year())
            .collect();
        assert_eq!(years, [2020, 2024, 2028]);
    }

    #[test]
    fn test_subsecond_anchor_and_fixed_zone() {
        let anchor = TimePoint::parse("2021-01-01T10:00:00.250+05:30").unwrap();
        let recurrence = anchor.start(Frequency::Minutely, Bound::Count(2), None);
        assert_eq!(
            isos(&recurrence),
            ["2021-01-01T10:00:00.250+05:30", "2021-01-01T10:01:00.250+05:30"]
        );
    }

    #[test]
    fn test_stop_with_start() {
        let end = TimePoint::parse("2021-01-03T00:00:00Z").unwrap();
        let recurrence = end
            .stop(Frequency::Daily, Origin::Start(new_year_2021()), None)
            .unwrap();
        assert_eq!(recurrence.iter().count(), 3);
    }

    #[test]
    fn test_frequency_codes() {
        assert_eq!(Frequency::from_code(0), Some(Frequency::Yearly));
        assert_eq!(Frequency::from_code(6), Some(Frequency::Secondly));
        assert_eq!(Frequency::from_code(7), None);
        assert_eq!(Frequency::Daily.code(), 3);
        assert_eq!(Frequency::parse("Weekly").unwrap(), Frequency::Weekly);
        assert_eq!(Frequency::parse("4").unwrap(), Frequency::Hourly);
        assert_eq!(Frequency::from_value(&Value::Int(1)).unwrap(), Frequency::Monthly);
        assert!(Frequency::parse("fortnightly").is_err());
    }

    // ── Dynamic construction ────────────────────────────────────────────

    #[test]
    fn test_recur_with_count() {
        let call = Invocation::new().kwarg("freq", "day").kwarg("count", "3");
        let recurrence = new_year_2021().recur(call).unwrap();
        assert_eq!(recurrence.iter().count(), 3);
    }

    #[test]
    fn test_recur_with_stop_and_code() {
        let call = Invocation::new()
            .kwarg("freq", 3)
            .kwarg("stop", "2021-01-02T00:00:00Z");
        let recurrence = new_year_2021().recur(call).unwrap();
        assert_eq!(recurrence.frequency(), Frequency::Daily);
        assert_eq!(recurrence.iter().count(), 2);
    }

    #[test]
    fn test_recur_requires_exactly_one_bound() {
        let neither = new_year_2021()
            .recur(Invocation::new().kwarg("freq", "day"))
            .unwrap_err();
        assert!(neither.to_string().contains("exactly one of stop, count"), "got: {neither}");

        let both = new_year_2021()
            .recur(
                Invocation::new()
                    .kwarg("freq", "day")
                    .kwarg("count", 2)
                    .kwarg("stop", "2021-01-02"),
            )
            .unwrap_err();
        assert!(matches!(both, FluxError::Resolve(FargError::Validation(_))));
    }

    #[test]
    fn test_recur_rejects_bad_frequency_and_start() {
        let err = new_year_2021()
            .recur(Invocation::new().kwarg("freq", "fortnightly").kwarg("count", 2))
            .unwrap_err();
        assert!(err.to_string().contains("Argument freq (`fortnightly`)"), "got: {err}");

        let err = new_year_2021()
            .recur(
                Invocation::new()
                    .kwarg("freq", "day")
                    .kwarg("count", 2)
                    .kwarg("start", "2020-12-01"),
            )
            .unwrap_err();
        assert!(err.to_string().contains("Argument start"), "got: {err}");
    }

    #[test]
    fn test_recur_missing_freq() {
        let err = new_year_2021()
            .recur(Invocation::new().kwarg("count", 2))
            .unwrap_err();
        assert!(
            matches!(err, FluxError::Resolve(FargError::MissingRequiredArgument { .. })),
            "got: {err}"
        );
    }

    #[test]
    fn test_recur_back() {
        let end = TimePoint::parse("2021-01-05T00:00:00Z").unwrap();
        let by_count = end
            .recur_back(Invocation::new().kwarg("freq", "daily").kwarg("count", 2))
            .unwrap();
        assert_eq!(by_count.iter().count(), 2);

        let by_start = end
            .recur_back(
                Invocation::new()
                    .kwarg("freq", "daily")
                    .kwarg("start", "2021-01-01T00:00:00Z"),
            )
            .unwrap();
        assert_eq!(by_start.iter().count(), 5);
    }

    #[test]
    fn test_recur_in_zone() {
        let call = Invocation::new()
            .kwarg("freq", "hour")
            .kwarg("count", 1)
            .kwarg("timezone", "Asia/Tokyo");
        let recurrence = new_year_2021().recur(call).unwrap();
        assert_eq!(recurrence.iter().next().unwrap().hour(), 9);
    }
}
