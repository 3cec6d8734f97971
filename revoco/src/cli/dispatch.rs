use std::{io::Write, thread, time::Duration};

use anyhow::{Context, Result};
use mxrev::{
    channel::RawReportChannel,
    device::{Device, DeviceError, RECONNECT_STEPS},
};
use tracing::debug;

use super::{
    operation::Operation,
    output::{Outcome, Printer},
};

/// Runs the operations one after another, stopping at the first failure.
pub fn run<T: RawReportChannel, O: Write, E: Write>(
    device: &Device<T>,
    operations: &[Operation],
    reconnect_timeout: Option<Duration>,
    printer: &Printer<O, E>,
) -> Result<()> {
    for operation in operations {
        debug!(?operation, "performing operation");
        perform(device, operation, reconnect_timeout, printer)?;
    }

    Ok(())
}

fn perform<T: RawReportChannel, O: Write, E: Write>(
    device: &Device<T>,
    operation: &Operation,
    reconnect_timeout: Option<Duration>,
    printer: &Printer<O, E>,
) -> Result<()> {
    match operation {
        Operation::Wheel {
            command,
            persistence,
        } => {
            device
                .set_wheel(command, *persistence)
                .with_context(|| format!("could not apply {command:?}"))?;
            printer.emit(&Outcome::Wheel {
                command: *command,
                persistence: *persistence,
            })
        },
        Operation::Reconnect => {
            device
                .initiate_reconnect()
                .context("could not initiate reconnection")?;
            printer.emit(&Outcome::Reconnect {
                steps: &RECONNECT_STEPS,
            })?;

            device
                .await_reconnect(reconnect_timeout)
                .context("could not wait for the mouse to reconnect")?;
            Ok(())
        },
        Operation::Mode => {
            let outcome = reading(device.wheel_mode(), |mode| Outcome::Mode { mode })
                .context("could not query the wheel mode")?;
            printer.emit(&outcome)
        },
        Operation::Battery => {
            let outcome = reading(device.battery(), Outcome::Battery)
                .context("could not query the battery status")?;
            printer.emit(&outcome)
        },
        Operation::Raw { report_id, bytes } => {
            device
                .send_raw(*report_id, bytes)
                .with_context(|| format!("could not send raw report {report_id:02x}"))?;
            printer.emit(&Outcome::Raw {
                report_id: *report_id,
                bytes: bytes.clone(),
            })
        },
        Operation::Query { report_id, count } => {
            let values = device
                .query_raw(*report_id, *count)
                .with_context(|| format!("could not query report {report_id:02x}"))?;
            printer.emit(&Outcome::Query {
                report_id: *report_id,
                values,
            })
        },
        Operation::Dump { timeout } => {
            while let Some(event) = device
                .next_event(*timeout)
                .context("could not read device events")?
            {
                printer.emit(&Outcome::Event(event))?;
            }
            Ok(())
        },
        Operation::Sleep(duration) => {
            thread::sleep(*duration);
            Ok(())
        },
    }
}

/// Maps the result of a register read to an outcome.
///
/// A reply that does not echo the request is no failure of the run, it is
/// reported as a warning instead.
fn reading<V, E>(
    result: Result<V, DeviceError<E>>,
    outcome: impl FnOnce(V) -> Outcome,
) -> Result<Outcome, DeviceError<E>>
where
    E: std::error::Error + 'static,
{
    match result {
        Ok(value) => Ok(outcome(value)),
        Err(DeviceError::UnexpectedReply { target, reply }) => {
            Ok(Outcome::UnexpectedReply { target, reply })
        },
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, io};

    use mxrev::{
        channel::{ChannelError, ReportChannel, UsageEvent},
        protocol::{
            Variant,
            query::{QueryResult, QueryTarget, WheelMode},
            wheel::{Persistence, WheelCommand},
        },
    };

    use super::*;

    /// Answers every input report with the same values and never queues
    /// events.
    struct FakeMouse {
        input: Vec<i32>,
        sent: RefCell<Vec<Vec<i32>>>,
    }

    impl FakeMouse {
        fn answering(input: Vec<i32>) -> Self {
            Self {
                input,
                sent: RefCell::default(),
            }
        }
    }

    impl RawReportChannel for FakeMouse {
        type Error = io::Error;

        fn set_usages(&self, _report_id: u8, values: &[i32]) -> io::Result<()> {
            self.sent.borrow_mut().push(values.to_vec());
            Ok(())
        }

        fn commit_report(&self, _report_id: u8) -> io::Result<()> {
            Ok(())
        }

        fn request_report(&self, _report_id: u8) -> io::Result<()> {
            Ok(())
        }

        fn get_usages(&self, _report_id: u8, buf: &mut [i32]) -> io::Result<()> {
            buf.copy_from_slice(&self.input[..buf.len()]);
            Ok(())
        }

        fn wait_readable(&self, _timeout: Option<Duration>) -> io::Result<bool> {
            Ok(false)
        }

        fn read_event(&self) -> io::Result<Option<UsageEvent>> {
            Ok(None)
        }
    }

    /// Runs `operations` against a mouse answering with `input` and returns
    /// what was printed to stdout and stderr.
    fn run_against(input: Vec<i32>, operations: &[Operation]) -> (Result<()>, String, String) {
        let device = Device::new(
            ReportChannel::new(FakeMouse::answering(input)).with_ack_timeout(Duration::ZERO),
            Variant::Standard,
        );
        let printer = Printer::with_writers(false, Vec::new(), Vec::new());

        let result = run(&device, operations, None, &printer);

        let (out, err) = printer.into_writers();
        (
            result,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn battery_is_queried_and_printed() {
        let battery = vec![0x01, 0x81, 0x0d, 73, 0x50, 0x00];
        let (result, out, err) = run_against(battery, &[Operation::Battery]);

        assert!(result.is_ok());
        assert_eq!(out, "battery level 73%, charging\n");
        assert!(err.is_empty());
    }

    #[test]
    fn mismatched_reply_warns_and_continues() {
        // The device answers the mode query with battery contents.
        let battery = vec![0x01, 0x81, 0x0d, 73, 0x50, 0x00];
        let (result, out, err) = run_against(battery, &[
            Operation::Mode,
            Operation::Wheel {
                command: WheelCommand::FreeSpin,
                persistence: Persistence::Temporary,
            },
        ]);

        assert!(result.is_ok());
        assert!(out.is_empty());
        assert!(err.contains("warning"));
        assert!(err.contains("unexpected reply to the wheel mode query"));
    }

    #[test]
    fn operations_are_sent_in_order() {
        let device = Device::new(
            ReportChannel::new(FakeMouse::answering(vec![0; 6])).with_ack_timeout(Duration::ZERO),
            Variant::Standard,
        );
        let printer = Printer::with_writers(false, Vec::new(), Vec::new());

        run(
            &device,
            &[
                Operation::Wheel {
                    command: WheelCommand::ClickToClick,
                    persistence: Persistence::Permanent,
                },
                Operation::Raw {
                    report_id: 0x10,
                    bytes: vec![0xff, 0x80, 0xb2, 0x01],
                },
            ],
            None,
            &printer,
        )
        .unwrap();

        assert_eq!(
            *device.channel().raw().sent.borrow(),
            vec![
                vec![0x01, 0x80, 0x56, 0x82, 0x00, 0x00],
                vec![0xff, 0x80, 0xb2, 0x01],
            ]
        );
    }

    #[test]
    fn unexpected_reply_is_no_failure() {
        let reply = QueryResult {
            echoed_ok: false,
            opcode: 0x0d,
            payload: [73, 0x50, 0x00],
        };
        let result: Result<WheelMode, DeviceError<io::Error>> = Err(DeviceError::UnexpectedReply {
            target: QueryTarget::WheelMode,
            reply,
        });

        assert_eq!(
            reading(result, |mode| Outcome::Mode { mode }).unwrap(),
            Outcome::UnexpectedReply {
                target: QueryTarget::WheelMode,
                reply,
            }
        );
    }

    #[test]
    fn channel_failures_stay_fatal() {
        let result: Result<WheelMode, DeviceError<io::Error>> =
            Err(DeviceError::Channel(ChannelError::Event(io::Error::other("gone"))));

        assert!(matches!(
            reading(result, |mode| Outcome::Mode { mode }),
            Err(DeviceError::Channel(_))
        ));
    }

    #[test]
    fn valid_reading_becomes_outcome() {
        let result: Result<WheelMode, DeviceError<io::Error>> = Ok(WheelMode::FreeSpin);

        assert_eq!(
            reading(result, |mode| Outcome::Mode { mode }).unwrap(),
            Outcome::Mode {
                mode: WheelMode::FreeSpin
            }
        );
    }
}
