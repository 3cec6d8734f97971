use std::{cell::RefCell, io::Write};

use anyhow::Result;
use itertools::Itertools;
use mxrev::{
    channel::UsageEvent,
    protocol::{
        query::{BatteryInfo, BatteryStatus, QueryResult, QueryTarget, WheelMode},
        wheel::{Persistence, WheelCommand},
    },
};
use owo_colors::OwoColorize;
use serde::Serialize;

/// Represents the result of a single operation.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
#[serde(tag = "operation", rename_all = "kebab-case")]
pub enum Outcome {
    Wheel {
        command: WheelCommand,
        persistence: Persistence,
    },
    Reconnect {
        steps: &'static [&'static str],
    },
    Mode {
        mode: WheelMode,
    },
    Battery(BatteryInfo),
    UnexpectedReply {
        target: QueryTarget,
        reply: QueryResult,
    },
    Raw {
        report_id: u8,
        bytes: Vec<u8>,
    },
    Query {
        report_id: u8,
        values: Vec<i32>,
    },
    Event(UsageEvent),
}

/// Writes outcomes either as human-readable text or as JSON lines.
///
/// Results go to `O`, warnings and notes to `E`. Both default to the
/// terminal.
pub struct Printer<O = anstream::Stdout, E = anstream::Stderr> {
    json: bool,
    out: RefCell<O>,
    err: RefCell<E>,
}

impl Printer {
    pub fn new(json: bool) -> Self {
        Self::with_writers(json, anstream::stdout(), anstream::stderr())
    }
}

impl<O: Write, E: Write> Printer<O, E> {
    pub fn with_writers(json: bool, out: O, err: E) -> Self {
        Self {
            json,
            out: RefCell::new(out),
            err: RefCell::new(err),
        }
    }

    pub fn emit(&self, outcome: &Outcome) -> Result<()> {
        let mut out = self.out.borrow_mut();

        if self.json {
            writeln!(out, "{}", serde_json::to_string(outcome)?)?;
            out.flush()?;
            return Ok(());
        }

        if let Outcome::UnexpectedReply { target, reply } = outcome {
            writeln!(
                self.err.borrow_mut(),
                "{}: {}",
                "warning".yellow().bold(),
                describe_unexpected(*target, reply)
            )?;
            return Ok(());
        }

        if let Some(text) = describe(outcome) {
            writeln!(out, "{text}")?;
            out.flush()?;
        }

        Ok(())
    }

    /// Writes an informational note. Suppressed in JSON mode.
    pub fn note(&self, text: &str) -> Result<()> {
        if !self.json {
            writeln!(self.err.borrow_mut(), "{}: {text}", "note".bright_blue().bold())?;
        }

        Ok(())
    }

    #[cfg(test)]
    pub fn into_writers(self) -> (O, E) {
        (self.out.into_inner(), self.err.into_inner())
    }
}

/// Renders the human-readable text of an outcome, if it has one.
fn describe(outcome: &Outcome) -> Option<String> {
    match outcome {
        Outcome::Wheel { .. } | Outcome::Raw { .. } => None,
        Outcome::Reconnect { steps } => Some(
            std::iter::once("Reconnection initiated".to_string())
                .chain(steps.iter().map(|step| format!(" - {step}")))
                .join("\n"),
        ),
        Outcome::Mode { mode } => Some(
            match mode {
                WheelMode::ClickToClick => "click-by-click",
                WheelMode::FreeSpin => "free spinning",
            }
            .to_string(),
        ),
        Outcome::Battery(battery) => Some(format!(
            "battery level {}%, {}",
            battery.percentage,
            describe_battery_status(battery.status)
        )),
        Outcome::UnexpectedReply { target, reply } => Some(describe_unexpected(*target, reply)),
        Outcome::Query { report_id, values } => Some(format!(
            "report {report_id:02x}:{}",
            values.iter().map(|value| format!(" {value:02x}")).join("")
        )),
        Outcome::Event(event) => Some(format!(
            "read: type={}, id={}, field={:08x}, usage={:08x}, code={:08x}, value={}",
            event.report_type,
            event.report_id,
            event.field_index,
            event.usage_index,
            event.usage_code,
            event.value
        )),
    }
}

fn describe_battery_status(status: BatteryStatus) -> String {
    match status {
        BatteryStatus::Discharging => "running on battery".to_string(),
        BatteryStatus::Charging => "charging".to_string(),
        BatteryStatus::Full => "fully charged".to_string(),
        BatteryStatus::Unknown(code) => format!("status {code:02x}"),
    }
}

fn describe_unexpected(target: QueryTarget, reply: &QueryResult) -> String {
    let target = match target {
        QueryTarget::WheelMode => "wheel mode",
        QueryTarget::Battery => "battery",
    };

    format!(
        "unexpected reply to the {target} query (register {:02x}, payload {})",
        reply.opcode,
        reply.payload.iter().map(|byte| format!("{byte:02x}")).join(" ")
    )
}
