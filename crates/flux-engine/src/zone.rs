//! Zones and UTC-offset inference.
//!
//! A [`Zone`] is either an IANA zone from the tz database or a fixed UTC
//! offset (what an embedded `+05:30` in a datetime string yields). Local
//! wall-clock times are mapped to instants with [`Zone::localize`]:
//!
//! - a time inside a spring-forward gap moves forward by the gap length;
//! - an ambiguous time during fall-back takes the later (standard-time)
//!   reading.
//!
//! [`zones_for_offset`] goes the other way: from an offset in hours to the
//! zone names whose standard (non-DST) offset matches it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, LocalResult, NaiveDateTime, Offset, TimeDelta, TimeZone, Utc};
use chrono_tz::{OffsetComponents, Tz, TZ_VARIANTS};
use serde::{Serialize, Serializer};
use tracing::trace;

use crate::error::{FluxError, Result};

/// Zones preferred when several share an offset. The first of these found
/// in a result is repeated at its end.
pub const FAVORED_ZONES: [Tz; 12] = [
    Tz::Pacific__Midway,
    Tz::Europe__Paris,
    Tz::Europe__Athens,
    Tz::Europe__Moscow,
    Tz::Asia__Dubai,
    Tz::Asia__Karachi,
    Tz::Antarctica__Vostok,
    Tz::Asia__Bangkok,
    Tz::Asia__Hong_Kong,
    Tz::Asia__Tokyo,
    Tz::Australia__Sydney,
    Tz::Pacific__Auckland,
];

const COMMON_REGIONS: [&str; 10] = [
    "Africa/",
    "America/",
    "Antarctica/",
    "Arctic/",
    "Asia/",
    "Atlantic/",
    "Australia/",
    "Europe/",
    "Indian/",
    "Pacific/",
];

// ── Zone ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zone {
    Iana(Tz),
    Fixed(FixedOffset),
}

impl Zone {
    pub const UTC: Zone = Zone::Iana(Tz::UTC);

    /// Parse a zone name or a numeric UTC offset.
    ///
    /// Accepts IANA names (case-insensitive), `utc`/`gmt`/`z`, and offsets
    /// written `±HH:MM`, `±HHMM` or `±HH`.
    ///
    /// # Errors
    ///
    /// Returns [`FluxError::InvalidTimezone`] for anything else.
    pub fn parse(s: &str) -> Result<Zone> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "utc" | "z" => return Ok(Zone::UTC),
            "gmt" => return Ok(Zone::Iana(Tz::GMT)),
            _ => {}
        }
        if let Ok(tz) = s.parse::<Tz>() {
            return Ok(Zone::Iana(tz));
        }
        if let Some(tz) = TZ_VARIANTS
            .iter()
            .find(|tz| tz.name().eq_ignore_ascii_case(s))
        {
            return Ok(Zone::Iana(*tz));
        }
        parse_fixed_offset(s)
            .map(Zone::Fixed)
            .ok_or_else(|| FluxError::InvalidTimezone(format!("'{s}'")))
    }

    /// IANA name, or `±HH:MM` for a fixed offset.
    pub fn name(&self) -> String {
        match self {
            Zone::Iana(tz) => tz.name().to_string(),
            Zone::Fixed(offset) => format_utc_offset(*offset),
        }
    }

    /// The UTC offset in effect at `instant`.
    pub fn offset_at(&self, instant: &DateTime<Utc>) -> FixedOffset {
        match self {
            Zone::Iana(tz) => tz.offset_from_utc_datetime(&instant.naive_utc()).fix(),
            Zone::Fixed(offset) => *offset,
        }
    }

    /// Whether daylight saving time is in effect at `instant`.
    pub fn is_dst_at(&self, instant: &DateTime<Utc>) -> bool {
        match self {
            Zone::Iana(tz) => {
                tz.offset_from_utc_datetime(&instant.naive_utc()).dst_offset() != TimeDelta::zero()
            }
            Zone::Fixed(_) => false,
        }
    }

    /// Map a local wall-clock time in this zone to an instant.
    ///
    /// # Errors
    ///
    /// Returns [`FluxError::Arithmetic`] if the result leaves chrono's range.
    pub fn localize(&self, naive: &NaiveDateTime) -> Result<DateTime<Utc>> {
        let tz = match self {
            Zone::Fixed(offset) => return from_wall(naive, *offset),
            Zone::Iana(tz) => tz,
        };
        match tz.from_local_datetime(naive) {
            LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(a, b) => Ok(a.with_timezone(&Utc).max(b.with_timezone(&Utc))),
            LocalResult::None => {
                // Inside a gap: read the wall clock at the offset before the transition.
                let before = naive
                    .checked_sub_signed(TimeDelta::days(1))
                    .ok_or_else(|| out_of_range(naive))?;
                let offset = tz.offset_from_utc_datetime(&before).fix();
                trace!(zone = tz.name(), %naive, %offset, "local time falls in a gap");
                from_wall(naive, offset)
            }
        }
    }
}

impl Default for Zone {
    fn default() -> Self {
        Zone::UTC
    }
}

impl From<Tz> for Zone {
    fn from(tz: Tz) -> Self {
        Zone::Iana(tz)
    }
}

impl From<FixedOffset> for Zone {
    fn from(offset: FixedOffset) -> Self {
        Zone::Fixed(offset)
    }
}

impl FromStr for Zone {
    type Err = FluxError;

    fn from_str(s: &str) -> Result<Self> {
        Zone::parse(s)
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl Serialize for Zone {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

// ── zones_for_offset ────────────────────────────────────────────────────────

/// Zone names whose standard offset is `hours` right now. See
/// [`zones_for_offset_at`].
pub fn zones_for_offset(hours: f64, common_only: bool) -> Vec<Tz> {
    zones_for_offset_at(hours, common_only, Utc::now())
}

/// Zones whose standard (non-DST) offset at `at` equals `hours`.
///
/// Results are in tz-database order, most preferred last: when any of
/// [`FAVORED_ZONES`] matched, the first such match is appended again.
/// `common_only` keeps the regional zones (`Europe/…`, `America/…`, …) plus
/// `UTC` and `GMT`, dropping `Etc/…` and legacy aliases.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use chrono_tz::Tz;
/// use flux_engine::zone::zones_for_offset_at;
///
/// let at = Utc.with_ymd_and_hms(2021, 1, 15, 12, 0, 0).unwrap();
/// let zones = zones_for_offset_at(9.0, true, at);
/// assert_eq!(zones.last(), Some(&Tz::Asia__Tokyo));
/// ```
pub fn zones_for_offset_at(hours: f64, common_only: bool, at: DateTime<Utc>) -> Vec<Tz> {
    if !hours.is_finite() {
        return Vec::new();
    }
    let wanted = (hours * 3600.0).round() as i64;
    let mut results: Vec<Tz> = TZ_VARIANTS
        .iter()
        .copied()
        .filter(|tz| !common_only || is_common(tz))
        .filter(|tz| {
            let base = tz.offset_from_utc_datetime(&at.naive_utc()).base_utc_offset();
            base.num_seconds() == wanted
        })
        .collect();
    if let Some(favored) = results.iter().copied().find(|tz| FAVORED_ZONES.contains(tz)) {
        results.push(favored);
    }
    trace!(hours, common_only, matches = results.len(), "zones for offset");
    results
}

/// The most preferred common zone for `hours`, if any.
pub fn likely_zone(hours: f64) -> Option<Tz> {
    zones_for_offset(hours, true).last().copied()
}

pub fn likely_zone_at(hours: f64, at: DateTime<Utc>) -> Option<Tz> {
    zones_for_offset_at(hours, true, at).last().copied()
}

fn is_common(tz: &Tz) -> bool {
    let name = tz.name();
    name == "UTC" || name == "GMT" || COMMON_REGIONS.iter().any(|region| name.starts_with(region))
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Parse `±HH:MM`, `±HHMM` or `±HH`.
pub fn parse_fixed_offset(s: &str) -> Option<FixedOffset> {
    let (sign, digits) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    if !digits.bytes().all(|b| b.is_ascii_digit() || b == b':') {
        return None;
    }
    let (hours, minutes) = match digits.split_once(':') {
        Some((_, m)) if m.len() != 2 => return None,
        Some((h, m)) => (h, m),
        None if digits.len() == 4 => digits.split_at(2),
        None => (digits, "0"),
    };
    if hours.len() != 2 || !hours.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Format a UTC offset as `±HH:MM` (e.g. `-05:00`, `+09:00`).
pub fn format_utc_offset(offset: FixedOffset) -> String {
    let minutes = offset.local_minus_utc() / 60;
    let sign = if minutes < 0 { '-' } else { '+' };
    let (h, m) = (minutes.abs() / 60, minutes.abs() % 60);
    format!("{sign}{h:02}:{m:02}")
}

/// Read `naive` as a wall clock at `offset`.
pub(crate) fn from_wall(naive: &NaiveDateTime, offset: FixedOffset) -> Result<DateTime<Utc>> {
    naive
        .checked_sub_signed(TimeDelta::seconds(i64::from(offset.local_minus_utc())))
        .map(|utc| utc.and_utc())
        .ok_or_else(|| out_of_range(naive))
}

fn out_of_range(naive: &NaiveDateTime) -> FluxError {
    FluxError::Arithmetic(format!("'{naive}' cannot be placed on the UTC timeline"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn jan_15() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 15, 12, 0, 0).unwrap()
    }

    fn naive(y: i32, m: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    // ── parse ───────────────────────────────────────────────────────────

    #[test]
    fn test_parse_iana() {
        assert_eq!(Zone::parse("America/New_York").unwrap(), Zone::Iana(Tz::America__New_York));
        assert_eq!(Zone::parse("asia/tokyo").unwrap(), Zone::Iana(Tz::Asia__Tokyo));
    }

    #[test]
    fn test_parse_utc_aliases() {
        assert_eq!(Zone::parse("UTC").unwrap(), Zone::UTC);
        assert_eq!(Zone::parse("z").unwrap(), Zone::UTC);
        assert_eq!(Zone::parse("gmt").unwrap(), Zone::Iana(Tz::GMT));
    }

    #[test]
    fn test_parse_fixed_offsets() {
        let ist = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        assert_eq!(Zone::parse("+05:30").unwrap(), Zone::Fixed(ist));
        assert_eq!(Zone::parse("+0530").unwrap(), Zone::Fixed(ist));
        let pst = FixedOffset::west_opt(8 * 3600).unwrap();
        assert_eq!(Zone::parse("-08").unwrap(), Zone::Fixed(pst));
        assert_eq!(Zone::Fixed(pst).name(), "-08:00");
    }

    #[test]
    fn test_fixed_offset_needs_two_minute_digits() {
        assert_eq!(parse_fixed_offset("+05:3"), None);
        assert_eq!(parse_fixed_offset("+05:300"), None);
        assert!(parse_fixed_offset("+05:03").is_some());
        let newfoundland = FixedOffset::west_opt(3 * 3600 + 1800).unwrap();
        assert_eq!(format_utc_offset(newfoundland), "-03:30");
    }

    #[test]
    fn test_parse_invalid() {
        let err = Zone::parse("Invalid/Zone").unwrap_err().to_string();
        assert!(err.contains("Invalid timezone"), "got: {err}");
        assert!(Zone::parse("+25:00").is_err());
    }

    // ── localize ────────────────────────────────────────────────────────

    #[test]
    fn test_localize_plain() {
        let zone = Zone::Iana(Tz::America__New_York);
        let utc = zone.localize(&naive(2021, 1, 5, 9, 0)).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2021, 1, 5, 14, 0, 0).unwrap());
    }

    #[test]
    fn test_localize_gap_moves_forward() {
        // 2021-03-14 02:30 does not exist in New York
        let zone = Zone::Iana(Tz::America__New_York);
        let utc = zone.localize(&naive(2021, 3, 14, 2, 30)).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2021, 3, 14, 7, 30, 0).unwrap());
        let local = utc.with_timezone(&Tz::America__New_York);
        assert_eq!(local.naive_local(), naive(2021, 3, 14, 3, 30));
    }

    #[test]
    fn test_localize_ambiguous_takes_standard_time() {
        // 2021-11-07 01:30 happens twice in New York; EST is the later one
        let zone = Zone::Iana(Tz::America__New_York);
        let utc = zone.localize(&naive(2021, 11, 7, 1, 30)).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2021, 11, 7, 6, 30, 0).unwrap());
    }

    #[test]
    fn test_localize_fixed() {
        let zone = Zone::parse("+02:00").unwrap();
        let utc = zone.localize(&naive(2021, 6, 1, 12, 0)).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2021, 6, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_is_dst() {
        let ny = Zone::Iana(Tz::America__New_York);
        let july = Utc.with_ymd_and_hms(2026, 7, 15, 12, 0, 0).unwrap();
        assert!(ny.is_dst_at(&july));
        assert!(!ny.is_dst_at(&jan_15()));
        // southern hemisphere: summer in January
        assert!(Zone::Iana(Tz::Australia__Sydney).is_dst_at(&jan_15()));
        assert!(!Zone::Iana(Tz::Asia__Tokyo).is_dst_at(&july));
    }

    // ── zones_for_offset ────────────────────────────────────────────────

    #[test]
    fn test_zero_offset_includes_utc() {
        let zones = zones_for_offset_at(0.0, true, jan_15());
        assert!(zones.contains(&Tz::UTC));
        assert!(zones.contains(&Tz::Europe__London));
        assert!(!zones.iter().any(|tz| tz.name().starts_with("Etc/")));
    }

    #[test]
    fn test_fractional_offsets() {
        assert!(zones_for_offset_at(5.75, true, jan_15()).contains(&Tz::Asia__Kathmandu));
        assert!(zones_for_offset_at(5.5, true, jan_15()).contains(&Tz::Asia__Kolkata));
    }

    #[test]
    fn test_standard_offset_ignores_dst() {
        // New York is UTC-5 standard time even in July
        let july = Utc.with_ymd_and_hms(2021, 7, 1, 12, 0, 0).unwrap();
        assert!(zones_for_offset_at(-5.0, true, july).contains(&Tz::America__New_York));
        assert!(!zones_for_offset_at(-4.0, true, july).contains(&Tz::America__New_York));
    }

    #[test]
    fn test_favored_zone_repeated_last() {
        let zones = zones_for_offset_at(1.0, true, jan_15());
        assert_eq!(zones.last(), Some(&Tz::Europe__Paris));
        assert_eq!(zones.iter().filter(|tz| **tz == Tz::Europe__Paris).count(), 2);
        assert_eq!(likely_zone_at(2.0, jan_15()), Some(Tz::Europe__Athens));
    }

    #[test]
    fn test_all_zones_superset_of_common() {
        let common = zones_for_offset_at(1.0, true, jan_15());
        let all = zones_for_offset_at(1.0, false, jan_15());
        assert!(all.len() > common.len());
        assert!(all.contains(&Tz::Etc__GMTMinus1));
    }

    #[test]
    fn test_no_match() {
        assert!(zones_for_offset_at(0.3, true, jan_15()).is_empty());
        assert!(zones_for_offset_at(f64::NAN, true, jan_15()).is_empty());
        assert_eq!(likely_zone_at(0.3, jan_15()), None);
    }

    #[test]
    fn test_format_utc_offset() {
        assert_eq!(format_utc_offset(FixedOffset::west_opt(5 * 3600).unwrap()), "-05:00");
        assert_eq!(format_utc_offset(FixedOffset::east_opt(9 * 3600).unwrap()), "+09:00");
        assert_eq!(format_utc_offset(FixedOffset::east_opt(0).unwrap()), "+00:00");
    }
}
