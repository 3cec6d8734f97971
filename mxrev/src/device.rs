//! Implements the operations of a located wheel device.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::{
    channel::{ChannelError, RawReportChannel, ReportChannel, UsageEvent, VENDOR_REPORT_ID},
    locator::{Located, Model},
    protocol::{
        MESSAGE_LENGTH,
        Message,
        Variant,
        query::{BatteryInfo, QueryResult, QueryTarget, WheelMode},
        wheel::{Persistence, WheelCommand},
    },
};

/// The steps the user has to perform after [`Device::initiate_reconnect`].
pub const RECONNECT_STEPS: [&str; 5] = [
    "Turn off the mouse",
    "Press and hold the left mouse button",
    "Turn on the mouse",
    "Press the right button 5 times",
    "Release the left mouse button",
];

/// The default time [`Device::await_reconnect`] is given by callers.
pub const DEFAULT_RECONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Represents a single wheel device bound to a [`ReportChannel`].
///
/// The protocol variant is fixed when the device is constructed and prefixes
/// every message sent to it.
#[derive(Debug)]
pub struct Device<T: RawReportChannel> {
    /// The underlying report channel.
    chan: ReportChannel<T>,

    /// The protocol variant of the device.
    variant: Variant,
}

impl<T: RawReportChannel> Device<T> {
    pub fn new(chan: ReportChannel<T>, variant: Variant) -> Self {
        Self { chan, variant }
    }

    /// Binds a located device node to its model's variant, waiting
    /// `ack_timeout` for acknowledgements.
    pub fn from_located(located: Located<T>, ack_timeout: Duration) -> (Self, Model) {
        let chan = ReportChannel::new(located.device).with_ack_timeout(ack_timeout);
        (Self::new(chan, located.model.variant()), located.model)
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn channel(&self) -> &ReportChannel<T> {
        &self.chan
    }

    /// Changes the scroll wheel behaviour.
    ///
    /// The persistence is ignored for commands the device never persists, see
    /// [`WheelCommand::is_persistable`].
    pub fn set_wheel(
        &self,
        command: &WheelCommand,
        persistence: Persistence,
    ) -> Result<(), DeviceError<T::Error>> {
        debug!(?command, ?persistence, "setting wheel mode");
        self.send_message(&command.to_message(self.variant, persistence))
    }

    /// Reads a register and decodes the answer without validating it.
    pub fn query(&self, target: QueryTarget) -> Result<QueryResult, DeviceError<T::Error>> {
        let request = target.to_message(self.variant);
        self.send_message(&request)?;

        let values = self.chan.query(VENDOR_REPORT_ID, MESSAGE_LENGTH)?;
        let result = QueryResult::decode(&values, &request);
        debug!(?target, ?result, "decoded query result");

        Ok(result)
    }

    /// Reads the current scroll wheel mode.
    ///
    /// Returns [`DeviceError::UnexpectedReply`] if the device did not echo the
    /// request.
    pub fn wheel_mode(&self) -> Result<WheelMode, DeviceError<T::Error>> {
        let reply = self.query(QueryTarget::WheelMode)?;
        reply.wheel_mode().ok_or(DeviceError::UnexpectedReply {
            target: QueryTarget::WheelMode,
            reply,
        })
    }

    /// Reads the battery status.
    ///
    /// Returns [`DeviceError::UnexpectedReply`] if the device did not echo the
    /// request.
    pub fn battery(&self) -> Result<BatteryInfo, DeviceError<T::Error>> {
        let reply = self.query(QueryTarget::Battery)?;
        reply.battery().ok_or(DeviceError::UnexpectedReply {
            target: QueryTarget::Battery,
            reply,
        })
    }

    /// Asks the receiver to drop the connection and wait for the device to
    /// pair again. The user then has to follow [`RECONNECT_STEPS`].
    pub fn initiate_reconnect(&self) -> Result<(), DeviceError<T::Error>> {
        self.send_message(&Message::initiate_reconnect())
    }

    /// Waits once for the receiver to report activity after
    /// [`Self::initiate_reconnect`].
    ///
    /// The result only tells whether any event arrived. It does not indicate
    /// whether pairing succeeded.
    pub fn await_reconnect(&self, timeout: Option<Duration>) -> Result<bool, DeviceError<T::Error>> {
        let ready = self.chan.await_event(timeout)?;
        debug!(ready, "reconnect wait finished");
        Ok(ready)
    }

    /// Sends arbitrary bytes on an output report.
    pub fn send_raw(&self, report_id: u8, bytes: &[u8]) -> Result<(), DeviceError<T::Error>> {
        let values: Vec<i32> = bytes.iter().copied().map(i32::from).collect();
        self.chan.send(report_id, &values)?;
        Ok(())
    }

    /// Reads `count` raw usage values of an input report.
    pub fn query_raw(&self, report_id: u8, count: usize) -> Result<Vec<i32>, DeviceError<T::Error>> {
        Ok(self.chan.query(report_id, count)?)
    }

    /// Waits for and consumes the next event queued by the device.
    pub fn next_event(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Option<UsageEvent>, DeviceError<T::Error>> {
        Ok(self.chan.next_event(timeout)?)
    }

    fn send_message(&self, message: &Message) -> Result<(), DeviceError<T::Error>> {
        self.chan.send(VENDOR_REPORT_ID, &message.to_values())?;
        Ok(())
    }
}

/// Represents a device-specific error.
#[derive(Debug, Error)]
pub enum DeviceError<E: std::error::Error + 'static> {
    /// Indicates that the underlying [`ReportChannel`] returned an error.
    #[error("the report channel returned an error")]
    Channel(#[from] ChannelError<E>),

    /// Indicates that the device answered a register read with something
    /// other than an echo of the request.
    #[error("unexpected reply to the {target:?} query: {reply:?}")]
    UnexpectedReply {
        target: QueryTarget,
        reply: QueryResult,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        protocol::{
            query::BatteryStatus,
            wheel::{Button, Speed},
        },
        testing::{Call, MockChannel},
    };

    fn device(raw: MockChannel, variant: Variant) -> Device<MockChannel> {
        Device::new(
            ReportChannel::new(raw).with_ack_timeout(Duration::from_millis(5)),
            variant,
        )
    }

    #[test]
    fn free_spin_sends_permanent_opcode() {
        let dev = device(MockChannel::new(), Variant::Standard);
        dev.set_wheel(&WheelCommand::FreeSpin, Persistence::Permanent)
            .unwrap();

        assert_eq!(
            dev.channel().raw().sent(),
            vec![(0x10, vec![0x01, 0x80, 0x56, 0x81, 0x00, 0x00])]
        );
    }

    #[test]
    fn manual_and_automatic_are_encoded_for_combo() {
        let dev = device(MockChannel::new(), Variant::Combo);
        dev.set_wheel(
            &WheelCommand::Manual {
                free: Button::try_from(6).unwrap(),
                click: Button::try_from(5).unwrap(),
            },
            Persistence::Temporary,
        )
        .unwrap();
        dev.set_wheel(
            &WheelCommand::Automatic {
                up: Speed::try_from(50).unwrap(),
                down: Speed::try_from(0).unwrap(),
            },
            Persistence::Permanent,
        )
        .unwrap();

        assert_eq!(
            dev.channel().raw().sent(),
            vec![
                (0x10, vec![0x02, 0x80, 0x56, 0x07, 0x65, 0x00]),
                (0x10, vec![0x02, 0x80, 0x56, 0x85, 50, 0]),
            ]
        );
    }

    #[test]
    fn battery_query_is_decoded() {
        let raw = MockChannel::new();
        raw.set_input(0x10, vec![0x01, 0x81, 0x0d, 73, 0x50, 0x00]);
        let dev = device(raw, Variant::Standard);

        assert_eq!(
            dev.battery().unwrap(),
            BatteryInfo {
                percentage: 73,
                status: BatteryStatus::Charging,
            }
        );
        assert_eq!(
            dev.channel().raw().sent(),
            vec![(0x10, vec![0x01, 0x81, 0x0d, 0x00, 0x00, 0x00])]
        );
    }

    #[test]
    fn mismatched_reply_is_reported() {
        let raw = MockChannel::new();
        raw.set_input(0x10, vec![0x01, 0x81, 0x0d, 73, 0x50, 0x00]);
        let dev = device(raw, Variant::Standard);

        let err = dev.wheel_mode().unwrap_err();
        let DeviceError::UnexpectedReply { target, reply } = err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(target, QueryTarget::WheelMode);
        assert!(!reply.echoed_ok);
        assert_eq!(reply.opcode, 0x0d);
    }

    #[test]
    fn query_drains_after_both_transactions() {
        let raw = MockChannel::new().with_acks(2);
        raw.set_input(0x10, vec![0x01, 0x81, 0x08, 0x00, 0x01, 0x00]);
        let dev = device(raw, Variant::Standard);

        assert_eq!(dev.wheel_mode().unwrap(), WheelMode::ClickToClick);

        let calls = dev.channel().raw().calls();
        let commit = calls.iter().position(|c| *c == Call::Commit(0x10)).unwrap();
        let request = calls.iter().position(|c| *c == Call::Request(0x10)).unwrap();
        let get = calls
            .iter()
            .position(|c| *c == Call::GetUsages(0x10, 6))
            .unwrap();

        assert!(commit < request && request < get);
        // The acknowledgement of the register read is drained before it is
        // requested.
        assert!(calls[commit..request].contains(&Call::Read));
        assert_eq!(dev.channel().raw().pending(), 0);
    }

    #[test]
    fn reconnect_addresses_receiver_and_waits_once() {
        let dev = device(MockChannel::new().with_acks(0), Variant::Combo);
        dev.initiate_reconnect().unwrap();
        assert!(!dev.await_reconnect(Some(Duration::from_secs(60))).unwrap());

        let calls = dev.channel().raw().calls();
        assert_eq!(
            calls[0],
            Call::SetUsages(0x10, vec![0xff, 0x80, 0xb2, 0x01, 0x00, 0x00])
        );
        assert_eq!(calls.last(), Some(&Call::Wait(Some(Duration::from_secs(60)))));
    }

    #[test]
    fn raw_passthrough_keeps_bytes() {
        let dev = device(MockChannel::new(), Variant::Standard);
        dev.send_raw(0x11, &[0xff, 0x00, 0x7f]).unwrap();

        assert_eq!(dev.channel().raw().sent(), vec![(0x11, vec![255, 0, 127])]);
    }

    #[test]
    fn channel_failures_propagate() {
        let dev = device(MockChannel::new().failing_on("get"), Variant::Standard);

        assert!(matches!(
            dev.battery(),
            Err(DeviceError::Channel(ChannelError::Query { report_id: 0x10, .. }))
        ));
    }
}
