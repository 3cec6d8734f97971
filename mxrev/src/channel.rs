//! Implements report transactions across raw HID report channels.
//!
//! Every transaction follows the same pattern: the report is committed (or
//! requested), the device is given some time to react, and all events it
//! queued in the meantime are consumed. This keeps an acknowledgement of one
//! transaction from being mistaken for the reaction to the next one.

use std::{error::Error, time::Duration};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;
use tracing::{debug, trace};

/// The report ID used by every vendor command of the wheel protocol.
pub const VENDOR_REPORT_ID: u8 = 0x10;

/// The maximum amount of values the kernel transfers in a single usage
/// request.
pub const MAX_USAGE_VALUES: usize = 1024;

/// The default time the device is given to acknowledge a report.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(3000);

/// Represents the kind of a HID report as numbered by the kernel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u32)]
pub enum ReportType {
    /// Sent from the device to the host.
    Input = 1,

    /// Sent from the host to the device.
    Output = 2,

    /// Readable and writable configuration data.
    Feature = 3,
}

/// Represents a single usage event queued by the device.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct UsageEvent {
    /// The raw report type. See [`ReportType`] for the known values.
    pub report_type: u32,

    /// The ID of the report the event belongs to.
    pub report_id: u32,

    /// The index of the field inside the report.
    pub field_index: u32,

    /// The index of the usage inside the field.
    pub usage_index: u32,

    /// The usage code (usage page in the high, usage ID in the low 16 bits).
    pub usage_code: u32,

    /// The value of the usage.
    pub value: i32,
}

/// Represents an open HID device node that reports can be exchanged with.
///
/// The methods map one-to-one to the primitives the kernel offers. Sequencing
/// them into complete transactions is left to [`ReportChannel`].
pub trait RawReportChannel {
    /// An implementation-specific error type.
    type Error: Error + Send + Sync + 'static;

    /// Writes `values` into the usage fields of the output report
    /// `report_id`, starting at the first usage of the first field.
    ///
    /// All values have to be written in one operation.
    fn set_usages(&self, report_id: u8, values: &[i32]) -> Result<(), Self::Error>;

    /// Transmits the output report `report_id` with the values previously
    /// set via [`Self::set_usages`].
    fn commit_report(&self, report_id: u8) -> Result<(), Self::Error>;

    /// Asks the device to refresh the input report `report_id`.
    fn request_report(&self, report_id: u8) -> Result<(), Self::Error>;

    /// Reads `buf.len()` usage values of the input report `report_id`.
    fn get_usages(&self, report_id: u8, buf: &mut [i32]) -> Result<(), Self::Error>;

    /// Waits until at least one event is ready to be read.
    ///
    /// [`None`] waits indefinitely. Returns whether an event became ready.
    /// Ready events must not be consumed.
    fn wait_readable(&self, timeout: Option<Duration>) -> Result<bool, Self::Error>;

    /// Reads a single queued event without blocking.
    ///
    /// Returns `Ok(None)` if no event is queued.
    fn read_event(&self) -> Result<Option<UsageEvent>, Self::Error>;
}

/// Wraps a [`RawReportChannel`] and provides complete report transactions.
#[derive(Debug)]
pub struct ReportChannel<T: RawReportChannel> {
    /// The underlying raw channel.
    raw: T,

    /// How long to wait for the device to react to a report.
    ack_timeout: Duration,
}

impl<T: RawReportChannel> ReportChannel<T> {
    /// Constructs a report channel waiting [`DEFAULT_ACK_TIMEOUT`] for
    /// acknowledgements.
    pub fn new(raw: T) -> Self {
        Self {
            raw,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }

    /// Overrides the time the device is given to react to a report.
    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    /// The time the device is given to react to a report.
    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    /// Provides access to the underlying raw channel.
    pub fn raw(&self) -> &T {
        &self.raw
    }

    /// Sends an output report and consumes the events the device queues in
    /// response.
    ///
    /// The usage values are written in a single operation before the report
    /// is committed. Afterwards, this waits up to [`Self::ack_timeout`] for the
    /// first event and drains the queue before returning.
    pub fn send(&self, report_id: u8, values: &[i32]) -> Result<(), ChannelError<T::Error>> {
        check_len(values.len())?;
        debug!(report_id, ?values, "sending report");

        let wrap = |source| ChannelError::Send {
            report_id,
            len: values.len(),
            source,
        };

        self.raw.set_usages(report_id, values).map_err(wrap)?;
        self.raw.commit_report(report_id).map_err(wrap)?;

        let drained = self.drain(self.ack_timeout)?;
        trace!(report_id, drained, "report acknowledged");

        Ok(())
    }

    /// Requests an input report and reads `count` of its usage values.
    ///
    /// Between requesting and reading, this waits for the device and drains
    /// the event queue just like [`Self::send`] does.
    pub fn query(&self, report_id: u8, count: usize) -> Result<Vec<i32>, ChannelError<T::Error>> {
        check_len(count)?;

        let wrap = |source| ChannelError::Query {
            report_id,
            len: count,
            source,
        };

        self.raw.request_report(report_id).map_err(wrap)?;

        let drained = self.drain(self.ack_timeout)?;
        trace!(report_id, drained, "report refreshed");

        let mut values = vec![0; count];
        self.raw.get_usages(report_id, &mut values).map_err(wrap)?;
        debug!(report_id, ?values, "queried report");

        Ok(values)
    }

    /// Waits until the device queues an event, without consuming it.
    ///
    /// [`None`] waits indefinitely. Returns whether an event arrived before
    /// the timeout elapsed.
    pub fn await_event(&self, timeout: Option<Duration>) -> Result<bool, ChannelError<T::Error>> {
        self.raw.wait_readable(timeout).map_err(ChannelError::Event)
    }

    /// Waits for the next event and consumes it.
    ///
    /// Returns `Ok(None)` if no event arrived before the timeout elapsed.
    pub fn next_event(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Option<UsageEvent>, ChannelError<T::Error>> {
        if !self.await_event(timeout)? {
            return Ok(None);
        }

        self.raw.read_event().map_err(ChannelError::Event)
    }

    /// Waits up to `timeout` for the first event and then consumes events
    /// for as long as they are immediately available.
    ///
    /// Returns the amount of consumed events.
    fn drain(&self, timeout: Duration) -> Result<usize, ChannelError<T::Error>> {
        if !self.await_event(Some(timeout))? {
            return Ok(0);
        }

        let mut drained = 0;
        while self
            .raw
            .read_event()
            .map_err(ChannelError::Event)?
            .is_some()
        {
            drained += 1;
        }

        Ok(drained)
    }
}

fn check_len<E: Error>(len: usize) -> Result<(), ChannelError<E>> {
    if len > MAX_USAGE_VALUES {
        return Err(ChannelError::TooManyValues { len });
    }

    Ok(())
}

/// Represents an error that occurred while exchanging reports.
#[derive(Debug, Error)]
pub enum ChannelError<T: Error> {
    /// Indicates that the device rejected an output report.
    #[error("could not send report {report_id:#04x} with {len} values")]
    Send {
        report_id: u8,
        len: usize,
        #[source]
        source: T,
    },

    /// Indicates that an input report could not be requested or read.
    #[error("could not query {len} values of report {report_id:#04x}")]
    Query {
        report_id: u8,
        len: usize,
        #[source]
        source: T,
    },

    /// Indicates that waiting for or reading device events failed.
    #[error("could not read device events")]
    Event(#[source] T),

    /// Indicates that more values were passed than a report transfer can
    /// hold.
    #[error("{len} values exceed the limit of {MAX_USAGE_VALUES} values per report")]
    TooManyValues { len: usize },
}
