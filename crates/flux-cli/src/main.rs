//! `flux`: parse, shift and recur datetimes from the command line.
//!
//! Every subcommand prints one JSON document on stdout. Diagnostics go to
//! stderr; `-v` raises the log level and `FLUX_LOG` takes a full
//! `tracing` filter directive.

use std::collections::HashSet;
use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use farg_core::Invocation;
use flux_engine::{parse_datetime, zones_for_offset_at, Direction, ParseOptions, TimePoint, Unit};
use serde_json::{json, Value as Json};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "flux", version)]
#[command(about = "Timezone-aware datetime parsing, shifting and recurrence")]
struct Cli {
    /// More log output on stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a datetime and describe it
    Parse {
        #[command(flatten)]
        point: PointArgs,
    },
    /// Shift a datetime by calendar units or to a named weekday
    Shift {
        #[command(flatten)]
        point: PointArgs,

        /// next/forward or last/backward
        direction: String,

        /// year, month, week, day, hour, minute, second or a weekday name
        unit: String,

        /// Number of units to move
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,

        /// Keep the wall clock instead of the elapsed time across DST changes
        #[arg(long)]
        naive: bool,
    },
    /// List the occurrences of a recurrence
    Recur {
        #[command(flatten)]
        point: PointArgs,

        /// yearly, monthly, weekly, daily, hourly, minutely, secondly or 0-6
        #[arg(short, long)]
        freq: String,

        /// Number of occurrences, anchor included
        #[arg(short = 'n', long, conflicts_with = "until", required_unless_present = "until")]
        count: Option<u32>,

        /// Inclusive end datetime
        #[arg(short, long)]
        until: Option<String>,
    },
    /// Zones whose standard offset matches a number of hours
    Zones {
        /// Offset from UTC in hours, e.g. -5 or 5.75
        #[arg(allow_negative_numbers = true)]
        hours: f64,

        /// Every matching zone, not only regional zones plus UTC and GMT
        #[arg(long)]
        all: bool,

        /// Evaluate offsets at this datetime instead of now
        #[arg(long)]
        at: Option<String>,
    },
}

#[derive(Args, Debug)]
struct PointArgs {
    /// A datetime, epoch seconds, or "now"; digits that read as a date
    /// (20210105) are a date
    datetime: String,

    /// Zone name, fixed offset, or hours from UTC
    #[arg(short = 'z', long = "tz", allow_hyphen_values = true)]
    timezone: Option<String>,

    /// Read ambiguous numeric dates day first
    #[arg(long)]
    dayfirst: bool,

    /// Read ambiguous numeric dates year first
    #[arg(long)]
    yearfirst: bool,
}

impl PointArgs {
    fn build(&self) -> Result<TimePoint> {
        let mut call = Invocation::new()
            .kwarg("datetime", datetime_value(&self.datetime))
            .kwarg("dayfirst", self.dayfirst)
            .kwarg("yearfirst", self.yearfirst);
        if let Some(zone) = &self.timezone {
            call = call.kwarg("timezone", timezone_value(zone));
        }
        TimePoint::build(call).with_context(|| format!("cannot read datetime '{}'", self.datetime))
    }
}

/// Bare numbers are epoch seconds unless they read as a compact date.
fn datetime_value(text: &str) -> farg_core::Value {
    if parse_datetime(text, ParseOptions::default()).is_ok() {
        return text.into();
    }
    match text.parse::<f64>() {
        Ok(secs) if secs.is_finite() => secs.into(),
        _ => text.into(),
    }
}

/// Numbers are hours from UTC, resolved to the most likely zone.
fn timezone_value(text: &str) -> farg_core::Value {
    match text.trim().parse::<f64>() {
        Ok(hours) if hours.is_finite() => hours.into(),
        _ => text.into(),
    }
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_env("FLUX_LOG").unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Command) -> Result<Json> {
    match command {
        Command::Parse { point } => {
            let point = point.build()?;
            Ok(serde_json::to_value(point.describe())?)
        }
        Command::Shift {
            point,
            direction,
            unit,
            count,
            naive,
        } => {
            let start = point.build()?;
            let direction = Direction::parse(&direction)?;
            let unit = Unit::parse(&unit)?;
            let call = Invocation::new()
                .kwarg("num_shifts", i64::from(count))
                .kwarg("respect_dst", !naive);
            let shifted = start.shift_with(direction, unit, call)?;
            debug!(from = %start, to = %shifted, "shifted");
            Ok(json!({
                "from": start.isoformat(),
                "to": shifted.isoformat(),
                "result": shifted.describe(),
            }))
        }
        Command::Recur {
            point,
            freq,
            count,
            until,
        } => {
            let anchor = point.build()?;
            let mut call = Invocation::new().kwarg("freq", freq);
            if let Some(n) = count {
                call = call.kwarg("count", i64::from(n));
            }
            if let Some(until) = until {
                call = call.kwarg("stop", until);
            }
            let recurrence = anchor.recur(call)?;
            let items: Vec<String> = recurrence.iter().map(|p| p.isoformat()).collect();
            Ok(json!({
                "frequency": recurrence.frequency(),
                "timezone": recurrence.zone(),
                "occurrences": items,
            }))
        }
        Command::Zones { hours, all, at } => {
            if !hours.is_finite() {
                bail!("offset must be a finite number of hours");
            }
            let at = match at {
                Some(text) => TimePoint::parse(&text)?.instant(),
                None => chrono::Utc::now(),
            };
            let zones = zones_for_offset_at(hours, !all, at);
            let likely = zones.last().map(|tz| tz.name());
            let mut seen = HashSet::new();
            let names: Vec<&str> = zones
                .iter()
                .map(|tz| tz.name())
                .filter(|name| seen.insert(*name))
                .collect();
            Ok(json!({
                "offset": hours,
                "zones": names,
                "likely": likely,
            }))
        }
    }
}

fn emit<W: Write>(mut out: W, output: &Json) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut out, output)?;
    writeln!(out)?;
    out.flush()
}

/// `flux zones 9 | head` closes the pipe early; that is not a failure.
fn reader_went_away(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::BrokenPipe
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(output) => match emit(io::stdout().lock(), &output) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) if reader_went_away(&err) => ExitCode::SUCCESS,
            Err(err) => {
                error!(%err, "failed to write output");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
