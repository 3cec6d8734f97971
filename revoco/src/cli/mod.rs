mod dispatch;
mod operation;
mod output;
mod troubleshoot;

use std::{io::Write, path::PathBuf, process, time::Duration};

use anyhow::{Context, Result};
use clap::{ArgAction, CommandFactory, Parser, error::ErrorKind};
use mxrev::{
    channel::DEFAULT_ACK_TIMEOUT,
    device::{DEFAULT_RECONNECT_TIMEOUT, Device},
    hiddev::HiddevDevice,
    locator::{self, LocateError, Located},
};
use operation::Operation;
use output::Printer;
use owo_colors::OwoColorize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const OPERATIONS_HELP: &str = "\
Operations:
  free                      free spinning mode
  click                     click-to-click mode
  manual[=button[,button]]  manual mode change via button
  auto[=speed[,speed]]      automatic mode change (up, down)
  soft-free=up,down         free spinning once the wheel moves
  soft-click=up,down        click-to-click once the wheel moves
  battery                   query battery status
  mode                      query scroll wheel mode
  reconnect                 initiate reconnection
  raw=id,byte,...           send raw values on a report
  query[=id[,count]]        print raw values of a report
  dump[=seconds]            print device events (-1 waits forever)
  sleep[=seconds]           pause before the next operation

Prefixing a mode with 'temp-' (i.e. temp-free) switches the mode
temporarily, otherwise it becomes the default mode after power up.

Button numbers:
  0 previously set button   7 wheel left tilt
  3 middle (wheel button)   8 wheel right tilt
  4 rear thumb button       9 thumb wheel forward
  5 front thumb button     11 thumb wheel backward
  6 find button            13 thumb wheel pressed";

/// Change the wheel behaviour of Logitech's MX Revolution mouse.
#[derive(Parser)]
#[command(version, about, long_about = None, after_help = OPERATIONS_HELP)]
struct Cli {
    #[command(flatten)]
    color: colorchoice_clap::Color,

    /// Output JSON lines instead of text
    #[arg(short, long)]
    json: bool,

    /// Log more details to stderr (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Use this hiddev node instead of scanning for one
    #[arg(short, long, env = "REVOCO_DEVICE", value_name = "PATH")]
    device: Option<PathBuf>,

    /// How long the device is given to acknowledge a report
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_ACK_TIMEOUT.as_millis() as u64)]
    ack_timeout: u64,

    /// How long to wait for the mouse after initiating a reconnection
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_RECONNECT_TIMEOUT.as_secs())]
    reconnect_timeout: u64,

    /// The operations to perform, in order
    #[arg(value_name = "OPERATION")]
    operations: Vec<Operation>,
}

pub fn execute() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            err.print()?;
            process::exit(exit_status(&err));
        },
    };

    cli.color.write_global();
    init_logging(cli.verbose);

    if cli.operations.is_empty() {
        Cli::command().print_help()?;
        return Ok(());
    }

    let printer = Printer::new(cli.json);

    let located = find_device(&cli)?;
    info!(path = %located.path.display(), model = ?located.model, "using device");

    let (device, model) = Device::from_located(located, Duration::from_millis(cli.ack_timeout));
    debug!(
        variant = ?device.variant(),
        ack_timeout = ?device.channel().ack_timeout(),
        "bound device"
    );
    if model.is_experimental() {
        printer.note(&format!("support for the {} is experimental", model.name()))?;
    }

    dispatch::run(
        &device,
        &cli.operations,
        Some(Duration::from_secs(cli.reconnect_timeout)),
        &printer,
    )
}

/// The exit status for a command line that could not be parsed.
///
/// Malformed operations are fatal like any other failure. Help and version
/// requests are not failures.
fn exit_status(err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

fn find_device(cli: &Cli) -> Result<Located<HiddevDevice>> {
    let result = match &cli.device {
        Some(path) => locator::locate_at(path),
        None => locator::locate(),
    };

    result.or_else(|err: LocateError| {
        if let Some(hint) = troubleshoot::hint(&err) {
            writeln!(anstream::stderr(), "{}: {hint}", "hint".green().bold())?;
        }

        Err(err).context("no usable device")
    })
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_env("REVOCO_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("revoco={level},mxrev={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_failure(args: &[&str]) -> clap::Error {
        match Cli::try_parse_from(args.iter().copied()) {
            Ok(_) => panic!("{args:?} was accepted"),
            Err(err) => err,
        }
    }

    #[test]
    fn malformed_operations_exit_with_failure() {
        let err = parse_failure(&["revoco", "manual=16"]);
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
        assert_eq!(exit_status(&err), 1);

        assert_eq!(exit_status(&parse_failure(&["revoco", "spin"])), 1);
        assert_eq!(exit_status(&parse_failure(&["revoco", "free=1"])), 1);
        assert_eq!(exit_status(&parse_failure(&["revoco", "--bogus"])), 1);
    }

    #[test]
    fn help_and_version_are_no_failure() {
        assert_eq!(exit_status(&parse_failure(&["revoco", "--help"])), 0);
        assert_eq!(exit_status(&parse_failure(&["revoco", "--version"])), 0);
    }

    #[test]
    fn operations_are_kept_in_order() {
        let cli = Cli::try_parse_from(["revoco", "--json", "temp-free", "battery"]).unwrap();

        assert!(cli.json);
        assert_eq!(cli.operations, vec![
            Operation::Wheel {
                command: mxrev::protocol::wheel::WheelCommand::FreeSpin,
                persistence: mxrev::protocol::wheel::Persistence::Temporary,
            },
            Operation::Battery,
        ]);
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
