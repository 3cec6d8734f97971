use std::{ops::RangeInclusive, str::FromStr, time::Duration};

use anyhow::{Context, Result, anyhow, bail, ensure};
use mxrev::protocol::wheel::{Button, Persistence, Speed, WheelCommand};

/// The prefix making a wheel setting temporary.
const TEMPORARY_PREFIX: &str = "temp-";

/// The most bytes `raw` accepts after the report ID.
const MAX_RAW_BYTES: usize = 255;

/// The longest `dump` timeout in seconds.
const MAX_DUMP_SECONDS: i64 = 24 * 60 * 60;

/// Represents a single operation given on the command line.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Operation {
    /// Changes the wheel behaviour.
    Wheel {
        command: WheelCommand,
        persistence: Persistence,
    },

    /// Starts re-pairing the mouse with its receiver.
    Reconnect,

    /// Prints the current wheel mode.
    Mode,

    /// Prints the battery status.
    Battery,

    /// Sends arbitrary bytes on a report.
    Raw { report_id: u8, bytes: Vec<u8> },

    /// Prints raw values of an input report.
    Query { report_id: u8, count: usize },

    /// Prints every event the device queues until it falls silent.
    Dump { timeout: Option<Duration> },

    /// Pauses before the next operation.
    Sleep(Duration),
}

impl FromStr for Operation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (persistence, op) = match s.strip_prefix(TEMPORARY_PREFIX) {
            Some(rest) => (Persistence::Temporary, rest),
            None => (Persistence::Permanent, s),
        };
        let (name, args) = match op.split_once('=') {
            Some((name, args)) => (name, Some(args)),
            None => (op, None),
        };

        let wheel = |command| Operation::Wheel {
            command,
            persistence,
        };

        Ok(match name {
            "free" => {
                no_args(name, args)?;
                wheel(WheelCommand::FreeSpin)
            },
            "click" => {
                no_args(name, args)?;
                wheel(WheelCommand::ClickToClick)
            },
            "manual" => {
                let (free, click) = two_args(args, 0, 0..=15)?;
                wheel(WheelCommand::Manual {
                    free: Button::try_from(free as u8)?,
                    click: Button::try_from(click as u8)?,
                })
            },
            "auto" => {
                let (up, down) = two_args(args, 0, 0..=i64::from(Speed::MAX))?;
                wheel(WheelCommand::Automatic {
                    up: Speed::try_from(up as u8)?,
                    down: Speed::try_from(down as u8)?,
                })
            },
            "soft-free" => {
                let (up, down) = two_args(args, 0, 0..=255)?;
                wheel(WheelCommand::SoftFree {
                    up: up as u8,
                    down: down as u8,
                })
            },
            "soft-click" => {
                let (up, down) = two_args(args, 0, 0..=255)?;
                wheel(WheelCommand::SoftClick {
                    up: up as u8,
                    down: down as u8,
                })
            },
            "reconnect" => {
                no_args(name, args)?;
                Operation::Reconnect
            },
            "mode" => {
                no_args(name, args)?;
                Operation::Mode
            },
            "battery" => {
                no_args(name, args)?;
                Operation::Battery
            },
            "raw" => {
                let values = parse_list(args.unwrap_or_default(), 1 + MAX_RAW_BYTES, 0, 0..=255)?;
                let Some((report_id, bytes)) = values.split_first() else {
                    bail!("`raw` needs at least a report ID");
                };

                Operation::Raw {
                    report_id: *report_id as u8,
                    bytes: bytes.iter().map(|byte| *byte as u8).collect(),
                }
            },
            "query" => match args {
                None | Some("") => Operation::Query {
                    report_id: mxrev::channel::VENDOR_REPORT_ID,
                    count: mxrev::protocol::MESSAGE_LENGTH,
                },
                Some(_) => {
                    let (report_id, count) = two_args(args, 0, 0..=255)?;
                    Operation::Query {
                        report_id: report_id as u8,
                        count: count as usize,
                    }
                },
            },
            "dump" => {
                let seconds = one_arg(args, 3, -1..=MAX_DUMP_SECONDS)?;
                Operation::Dump {
                    timeout: u64::try_from(seconds).ok().map(Duration::from_secs),
                }
            },
            "sleep" => {
                let seconds = one_arg(args, 1, 0..=255)?;
                Operation::Sleep(Duration::from_secs(seconds as u64))
            },
            _ => bail!("unknown operation `{s}`"),
        })
    }
}

fn no_args(name: &str, args: Option<&str>) -> Result<()> {
    ensure!(args.is_none(), "`{name}` does not take arguments");
    Ok(())
}

/// Parses `[a]`, falling back to `default`.
fn one_arg(args: Option<&str>, default: i64, range: RangeInclusive<i64>) -> Result<i64> {
    let values = parse_list(args.unwrap_or_default(), 1, default, range)?;
    Ok(values.first().copied().unwrap_or(default))
}

/// Parses `[a[,b]]`. A missing `a` falls back to `default`, a missing `b` to
/// `a`.
fn two_args(args: Option<&str>, default: i64, range: RangeInclusive<i64>) -> Result<(i64, i64)> {
    let values = parse_list(args.unwrap_or_default(), 2, default, range)?;

    let first = values.first().copied().unwrap_or(default);
    let second = values.get(1).copied().unwrap_or(first);

    Ok((first, second))
}

/// Parses up to `max` comma-separated numbers. Empty items fall back to
/// `default`.
fn parse_list(
    args: &str,
    max: usize,
    default: i64,
    range: RangeInclusive<i64>,
) -> Result<Vec<i64>> {
    if args.is_empty() {
        return Ok(Vec::new());
    }

    let items: Vec<&str> = args.split(',').collect();
    ensure!(
        items.len() <= max,
        "malformed argument `{args}`: at most {max} values are allowed"
    );

    items
        .into_iter()
        .map(|item| {
            if item.is_empty() {
                return Ok(default);
            }

            let value = parse_number(item)
                .with_context(|| format!("malformed argument `{args}`"))?;
            ensure!(
                range.contains(&value),
                "argument `{item}` out of range ({}-{})",
                range.start(),
                range.end()
            );

            Ok(value)
        })
        .collect()
}

/// Parses a decimal, `0x`-prefixed hexadecimal or `0`-prefixed octal
/// number.
fn parse_number(s: &str) -> Result<i64> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let (radix, digits) = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        (16, hex)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };

    ensure!(
        !digits.is_empty() && !digits.starts_with(['+', '-']),
        "`{s}` is not a number"
    );
    let value = i64::from_str_radix(digits, radix).map_err(|_| anyhow!("`{s}` is not a number"))?;

    Ok(if negative { -value } else { value })
}
