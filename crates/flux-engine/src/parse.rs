//! Calendar text parsing.
//!
//! Turns the date/time strings people and systems actually write into a
//! local wall-clock time plus whatever zone the text itself carried:
//!
//! - RFC 3339 / ISO 8601, with `T` or a space before the time, optional
//!   fractional seconds and an optional `Z` / `±HH:MM` / `±HHMM` suffix
//! - compact `YYYYMMDD[THHMMSS]`
//! - numeric dates split by `/`, `-` or `.`, ordered per [`ParseOptions`]
//! - textual months: `5 March 2021`, `March 5, 2021`, `Fri Mar 5th 2021`
//!
//! A time may follow any date form, with an optional `am`/`pm`.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use regex::Regex;

use crate::error::{FluxError, Result};
use crate::zone::{parse_fixed_offset, Zone};

static COMPACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})(\d{2})(\d{2})(?:[Tt]?(\d{2})(\d{2})(\d{2})?)?\s*([Zz]|[+-]\d{2}:?\d{2})?$")
        .expect("valid compact datetime regex")
});

static SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<date>.+?)(?:(?:[Tt]|\s+)(?P<time>\d{1,2}:\d{2}(?::\d{2}(?:[.,]\d{1,9})?)?)\s*(?P<meridiem>[AaPp]\.?[Mm]\.?)?\s*(?P<zone>[Zz]|UTC|GMT|[+-]\d{2}(?::?\d{2})?)?)?$",
    )
    .expect("valid datetime regex")
});

static NUMERIC_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,4})[-/.](\d{1,2})[-/.](\d{1,4})$").expect("valid numeric date regex")
});

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

static WEEKDAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(mon(?:day)?)|(tue(?:s(?:day)?)?)|(wed(?:nesday)?)|(thu(?:rs(?:day)?)?)|(fri(?:day)?)|(sat(?:urday)?)|(sun(?:day)?))$",
    )
    .expect("valid weekday regex")
});

static MONTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(jan(?:uary)?)|(feb(?:ruary)?)|(mar(?:ch)?)|(apr(?:il)?)|(may)|(june?)|(july?)|(aug(?:ust)?)|(sept?(?:ember)?)|(oct(?:ober)?)|(nov(?:ember)?)|(dec(?:ember)?))$",
    )
    .expect("valid month regex")
});

/// Hints for numeric dates whose field order is not self-evident.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Read `01/02/2021` as 1 February.
    pub dayfirst: bool,
    /// Read `21/02/01` as 2021-02-01.
    pub yearfirst: bool,
}

/// A parsed wall-clock time and the zone embedded in the text, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDateTime {
    pub naive: NaiveDateTime,
    pub zone: Option<Zone>,
}

/// Parse `text` into a local date/time.
///
/// A trailing `Z`, `UTC` or `GMT` yields [`Zone::UTC`]; a numeric offset
/// yields a fixed-offset zone; no suffix yields `zone: None`.
///
/// Numeric dates: a 4-digit leading field means year-month-day. Otherwise
/// `yearfirst` selects Y-M-D, then `dayfirst` selects D-M-Y, else M-D-Y. If
/// the chosen reading is not a real date the day and month are swapped.
///
/// # Errors
///
/// Returns [`FluxError::TimeParse`] when no form matches or the fields do
/// not make a real date or time.
///
/// # Examples
///
/// ```
/// use flux_engine::parse::{parse_datetime, ParseOptions};
///
/// let day_first = ParseOptions { dayfirst: true, ..Default::default() };
/// let parsed = parse_datetime("05/01/2021 09:30", day_first).unwrap();
/// assert_eq!(parsed.naive.to_string(), "2021-01-05 09:30:00");
/// assert!(parsed.zone.is_none());
/// ```
pub fn parse_datetime(text: &str, options: ParseOptions) -> Result<ParsedDateTime> {
    let s = text.trim();
    if s.is_empty() {
        return Err(FluxError::TimeParse("empty datetime string".to_string()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        let zone = if s.ends_with(['Z', 'z']) {
            Zone::UTC
        } else {
            Zone::Fixed(*dt.offset())
        };
        return Ok(ParsedDateTime {
            naive: dt.naive_local(),
            zone: Some(zone),
        });
    }

    if let Some(caps) = COMPACT_RE.captures(s) {
        let field = |i: usize| caps.get(i).map(|m| m.as_str());
        let date = ymd(field(1), field(2), field(3)).ok_or_else(|| unrecognized(text))?;
        let time = match field(4) {
            Some(hour) => hms(hour, field(5).unwrap_or("0"), field(6).unwrap_or("0"))
                .ok_or_else(|| unrecognized(text))?,
            None => midnight(),
        };
        let zone = field(7).map(zone_suffix).transpose()?;
        return Ok(ParsedDateTime {
            naive: date.and_time(time),
            zone,
        });
    }

    let caps = SPLIT_RE.captures(s).ok_or_else(|| unrecognized(text))?;
    let date_text = caps.name("date").map_or("", |m| m.as_str().trim());
    let date = parse_date(date_text, options).ok_or_else(|| unrecognized(text))?;
    let time = match caps.name("time") {
        Some(time) => parse_time(time.as_str(), caps.name("meridiem").map(|m| m.as_str()))
            .ok_or_else(|| unrecognized(text))?,
        None => midnight(),
    };
    let zone = caps.name("zone").map(|m| zone_suffix(m.as_str())).transpose()?;
    Ok(ParsedDateTime {
        naive: date.and_time(time),
        zone,
    })
}

// ── Date forms ──────────────────────────────────────────────────────────────

fn parse_date(s: &str, options: ParseOptions) -> Option<NaiveDate> {
    match NUMERIC_DATE_RE.captures(s) {
        Some(caps) => numeric_date(&caps[1], &caps[2], &caps[3], options),
        None => textual_date(s),
    }
}

fn numeric_date(a: &str, b: &str, c: &str, options: ParseOptions) -> Option<NaiveDate> {
    let (first, middle, last): (i32, u32, i32) = (a.parse().ok()?, b.parse().ok()?, c.parse().ok()?);
    let (year, month, day) = if a.len() == 4 || (options.yearfirst && c.len() != 4) {
        (expand_year(first, a.len()), middle, u32::try_from(last).ok()?)
    } else if options.dayfirst {
        (expand_year(last, c.len()), middle, u32::try_from(first).ok()?)
    } else {
        (expand_year(last, c.len()), u32::try_from(first).ok()?, middle)
    };
    NaiveDate::from_ymd_opt(year, month, day).or_else(|| NaiveDate::from_ymd_opt(year, day, month))
}

fn textual_date(s: &str) -> Option<NaiveDate> {
    let tokens: Vec<String> = s
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(|t| t.trim_end_matches('.').to_ascii_lowercase())
        .collect();
    let tokens = match tokens.as_slice() {
        [weekday, rest @ ..] if rest.len() == 3 && weekday_from_name(weekday).is_some() => rest,
        all => all,
    };
    if tokens.len() != 3 {
        return None;
    }
    let month_at = tokens.iter().position(|t| month_from_name(t).is_some())?;
    let month = month_from_name(&tokens[month_at])?;
    let numbers: Vec<&str> = tokens
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != month_at)
        .map(|(_, t)| t.trim_end_matches(|c: char| c.is_ascii_alphabetic()))
        .collect();
    let (day, year) = if numbers[0].len() == 4 {
        (numbers[1], numbers[0])
    } else {
        (numbers[0], numbers[1])
    };
    let year_value: i32 = year.parse().ok()?;
    NaiveDate::from_ymd_opt(expand_year(year_value, year.len()), month, day.parse().ok()?)
}

/// Two-digit years: 00-68 are 20xx, 69-99 are 19xx.
fn expand_year(year: i32, digits: usize) -> i32 {
    match (digits, year) {
        (1 | 2, 0..=68) => 2000 + year,
        (1 | 2, _) => 1900 + year,
        _ => year,
    }
}

fn ymd(y: Option<&str>, m: Option<&str>, d: Option<&str>) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y?.parse().ok()?, m?.parse().ok()?, d?.parse().ok()?)
}

// ── Time forms ──────────────────────────────────────────────────────────────

fn parse_time(text: &str, meridiem: Option<&str>) -> Option<NaiveTime> {
    let mut parts = text.split(':');
    let hour: u32 = parts.next()?.parse().ok()?;
    let minute = parts.next()?;
    let (second, nanos) = match parts.next() {
        Some(sec) => {
            let (whole, frac) = sec.split_once(['.', ',']).unwrap_or((sec, ""));
            (whole, fraction_nanos(frac)?)
        }
        None => ("0", 0),
    };
    let hour = match meridiem.map(|m| m.to_ascii_lowercase().starts_with('p')) {
        Some(_) if hour == 0 || hour > 12 => return None,
        Some(true) if hour < 12 => hour + 12,
        Some(false) if hour == 12 => 0,
        _ => hour,
    };
    NaiveTime::from_hms_nano_opt(hour, minute.parse().ok()?, second.parse().ok()?, nanos)
}

fn hms(h: &str, m: &str, s: &str) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(h.parse().ok()?, m.parse().ok()?, s.parse().ok()?)
}

/// Up to nine fractional digits, as nanoseconds.
fn fraction_nanos(frac: &str) -> Option<u32> {
    if frac.is_empty() {
        return Some(0);
    }
    if frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    format!("{frac:0<9}").parse().ok()
}

fn midnight() -> NaiveTime {
    NaiveTime::MIN
}

fn zone_suffix(s: &str) -> Result<Zone> {
    match s {
        "Z" | "z" | "UTC" => Ok(Zone::UTC),
        "GMT" => Zone::parse(s),
        _ => parse_fixed_offset(s)
            .map(Zone::Fixed)
            .ok_or_else(|| FluxError::TimeParse(format!("bad UTC offset '{s}'"))),
    }
}

fn unrecognized(text: &str) -> FluxError {
    FluxError::TimeParse(format!("'{text}' is not a recognized date/time"))
}

// ── Name tables ─────────────────────────────────────────────────────────────

/// Capture group `i + 1` matches the `i`-th entry of the table it indexes.
fn table_index(re: &Regex, s: &str) -> Option<usize> {
    let caps = re.captures(s)?;
    caps.iter().skip(1).position(|group| group.is_some())
}

/// A weekday name, full or abbreviated.
pub(crate) fn weekday_from_name(s: &str) -> Option<Weekday> {
    table_index(&WEEKDAY_RE, s).and_then(|i| WEEKDAYS.get(i).copied())
}

/// A month name, full or abbreviated, as 1-12.
fn month_from_name(s: &str) -> Option<u32> {
    table_index(&MONTH_RE, s).and_then(|i| u32::try_from(i + 1).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn at(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    fn plain(text: &str) -> ParsedDateTime {
        parse_datetime(text, ParseOptions::default()).unwrap()
    }

    // ── ISO forms ───────────────────────────────────────────────────────

    #[test]
    fn test_rfc3339_with_offset() {
        let parsed = plain("2021-01-05T09:00:00+05:30");
        assert_eq!(parsed.naive, at(2021, 1, 5, 9, 0, 0));
        let ist = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        assert_eq!(parsed.zone, Some(Zone::Fixed(ist)));
    }

    #[test]
    fn test_rfc3339_zulu_is_utc() {
        let parsed = plain("2021-01-05T09:00:00Z");
        assert_eq!(parsed.zone, Some(Zone::UTC));
    }

    #[test]
    fn test_space_separator_without_zone() {
        let parsed = plain("2021-01-05 09:30");
        assert_eq!(parsed.naive, at(2021, 1, 5, 9, 30, 0));
        assert_eq!(parsed.zone, None);
    }

    #[test]
    fn test_fractional_seconds() {
        let parsed = plain("2021-01-05T09:00:00.25");
        assert_eq!(parsed.naive.and_utc().timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_compact() {
        let parsed = plain("20210105T093000Z");
        assert_eq!(parsed.naive, at(2021, 1, 5, 9, 30, 0));
        assert_eq!(parsed.zone, Some(Zone::UTC));
        assert_eq!(plain("20210105").naive, at(2021, 1, 5, 0, 0, 0));
    }

    #[test]
    fn test_date_only_is_midnight() {
        assert_eq!(plain("2021-01-05").naive, at(2021, 1, 5, 0, 0, 0));
        assert_eq!(plain("2021-01-05").zone, None);
    }

    // ── Numeric date order ──────────────────────────────────────────────

    #[test]
    fn test_month_first_by_default() {
        assert_eq!(plain("05/01/2021").naive.date(), NaiveDate::from_ymd_opt(2021, 5, 1).unwrap());
    }

    #[test]
    fn test_dayfirst_hint() {
        let options = ParseOptions {
            dayfirst: true,
            ..Default::default()
        };
        let parsed = parse_datetime("05/01/2021", options).unwrap();
        assert_eq!(parsed.naive.date(), NaiveDate::from_ymd_opt(2021, 1, 5).unwrap());
    }

    #[test]
    fn test_yearfirst_hint() {
        let options = ParseOptions {
            yearfirst: true,
            ..Default::default()
        };
        let parsed = parse_datetime("21.02.01", options).unwrap();
        assert_eq!(parsed.naive.date(), NaiveDate::from_ymd_opt(2021, 2, 1).unwrap());
    }

    #[test]
    fn test_invalid_reading_swaps_day_and_month() {
        assert_eq!(plain("13/01/2021").naive.date(), NaiveDate::from_ymd_opt(2021, 1, 13).unwrap());
    }

    #[test]
    fn test_impossible_date() {
        let err = parse_datetime("2021/13/45", ParseOptions::default())
            .unwrap_err()
            .to_string();
        assert!(err.contains("Invalid datetime"), "got: {err}");
    }

    // ── Textual dates ───────────────────────────────────────────────────

    #[test]
    fn test_textual_months() {
        let expected = NaiveDate::from_ymd_opt(2021, 3, 5).unwrap();
        assert_eq!(plain("5 March 2021").naive.date(), expected);
        assert_eq!(plain("March 5, 2021").naive.date(), expected);
        assert_eq!(plain("Mar 5th 2021").naive.date(), expected);
        assert_eq!(plain("Friday, March 5, 2021").naive.date(), expected);
    }

    #[test]
    fn test_name_tables() {
        assert_eq!(month_from_name("sept"), Some(9));
        assert_eq!(month_from_name("December"), Some(12));
        assert_eq!(month_from_name("may"), Some(5));
        assert_eq!(month_from_name("ma"), None);
        assert_eq!(weekday_from_name("thurs"), Some(Weekday::Thu));
        assert_eq!(weekday_from_name("sunday"), Some(Weekday::Sun));
        assert_eq!(weekday_from_name("mond"), None);
    }

    #[test]
    fn test_textual_with_meridiem() {
        assert_eq!(plain("March 5, 2021 10:30 pm").naive, at(2021, 3, 5, 22, 30, 0));
        assert_eq!(plain("March 5, 2021 12:15am").naive, at(2021, 3, 5, 0, 15, 0));
        assert!(parse_datetime("March 5, 2021 13:00 pm", ParseOptions::default()).is_err());
    }

    #[test]
    fn test_garbage() {
        for text in ["", "   ", "not-a-datetime", "tomorrow-ish", "2021-01-05 25:00"] {
            assert!(
                parse_datetime(text, ParseOptions::default()).is_err(),
                "accepted: {text:?}"
            );
        }
    }
}
