//! Implements decoding of register reads.
//!
//! A register read is answered with a report repeating the request header
//! followed by three bytes of register contents. The contents are only
//! meaningful if the header was echoed correctly, which is why the
//! interpreting accessors of [`QueryResult`] return [`None`] otherwise.

use num_enum::FromPrimitive;

use super::{Message, MessageType, Register, Variant};

/// Represents a register that can be queried.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum QueryTarget {
    /// The current scroll wheel mode.
    WheelMode,

    /// The battery status.
    Battery,
}

impl QueryTarget {
    pub fn register(self) -> Register {
        match self {
            Self::WheelMode => Register::WheelStatus,
            Self::Battery => Register::Battery,
        }
    }

    /// Builds the message requesting the register on a device of the given
    /// variant.
    pub fn to_message(self, variant: Variant) -> Message {
        Message::get_register(variant.prefix(), self.register())
    }
}

/// Represents a decoded answer to a register read.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct QueryResult {
    /// Whether the answer repeats the prefix, message type and register of
    /// the request.
    pub echoed_ok: bool,

    /// The register the answer claims to contain.
    pub opcode: u8,

    /// The register contents.
    pub payload: [u8; 3],
}

impl QueryResult {
    /// Decodes the usage values read after sending `request`.
    ///
    /// Values that do not fit into a byte never pass the echo validation.
    /// In the payload, they are truncated to their lowest byte.
    pub fn decode(values: &[i32], request: &Message) -> Self {
        let byte = |i: usize| values.get(i).and_then(|value| u8::try_from(*value).ok());
        let lossy = |i: usize| values.get(i).map_or(0, |value| *value as u8);

        let echoed_ok = byte(0) == Some(request.header.prefix)
            && byte(1) == Some(MessageType::GetRegister.into())
            && byte(2) == Some(request.header.register);

        Self {
            echoed_ok,
            opcode: lossy(2),
            payload: [lossy(3), lossy(4), lossy(5)],
        }
    }

    /// Checks whether the answer is a valid echo of a read of `register`.
    pub fn answers(&self, register: Register) -> bool {
        self.echoed_ok && self.opcode == u8::from(register)
    }

    /// Interprets the answer as the contents of [`Register::WheelStatus`].
    pub fn wheel_mode(&self) -> Option<WheelMode> {
        if !self.answers(Register::WheelStatus) {
            return None;
        }

        Some(if self.payload[1] & 0x01 != 0 {
            WheelMode::ClickToClick
        } else {
            WheelMode::FreeSpin
        })
    }

    /// Interprets the answer as the contents of [`Register::Battery`].
    pub fn battery(&self) -> Option<BatteryInfo> {
        if !self.answers(Register::Battery) {
            return None;
        }

        Some(BatteryInfo {
            percentage: self.payload[0],
            status: BatteryStatus::from(self.payload[1]),
        })
    }
}

/// Represents the mode of the scroll wheel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum WheelMode {
    FreeSpin,
    ClickToClick,
}

/// Represents information about the battery.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BatteryInfo {
    /// The charge of the battery in percent.
    pub percentage: u8,

    /// The charging status of the battery.
    pub status: BatteryStatus,
}

/// Represents the charging status of the battery.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum BatteryStatus {
    Discharging = 0x30,
    Charging = 0x50,
    Full = 0x90,
    #[num_enum(catch_all)]
    Unknown(u8),
}

impl From<BatteryStatus> for u8 {
    fn from(value: BatteryStatus) -> Self {
        match value {
            BatteryStatus::Discharging => 0x30,
            BatteryStatus::Charging => 0x50,
            BatteryStatus::Full => 0x90,
            BatteryStatus::Unknown(code) => code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(target: QueryTarget) -> Message {
        target.to_message(Variant::Standard)
    }

    #[test]
    fn battery_reply_is_decoded() {
        let result = QueryResult::decode(
            &[0x01, 0x81, 0x0d, 73, 0x50, 0x00],
            &request(QueryTarget::Battery),
        );

        assert!(result.echoed_ok);
        assert_eq!(
            result.battery(),
            Some(BatteryInfo {
                percentage: 73,
                status: BatteryStatus::Charging,
            })
        );
    }

    #[test]
    fn unknown_battery_status_keeps_code() {
        let result = QueryResult::decode(
            &[0x01, 0x81, 0x0d, 12, 0x42, 0x00],
            &request(QueryTarget::Battery),
        );

        assert_eq!(result.battery().unwrap().status, BatteryStatus::Unknown(0x42));
        assert_eq!(u8::from(BatteryStatus::Unknown(0x42)), 0x42);
    }

    #[test]
    fn wheel_mode_reads_lowest_bit() {
        let mode = |byte| {
            QueryResult::decode(
                &[0x01, 0x81, 0x08, 0x00, byte, 0x00],
                &request(QueryTarget::WheelMode),
            )
            .wheel_mode()
        };

        assert_eq!(mode(0x01), Some(WheelMode::ClickToClick));
        assert_eq!(mode(0x03), Some(WheelMode::ClickToClick));
        assert_eq!(mode(0x00), Some(WheelMode::FreeSpin));
        assert_eq!(mode(0x02), Some(WheelMode::FreeSpin));
    }

    #[test]
    fn mismatched_register_is_not_interpreted() {
        let result = QueryResult::decode(
            &[0x01, 0x81, 0x08, 73, 0x50, 0x00],
            &request(QueryTarget::Battery),
        );

        assert!(!result.echoed_ok);
        assert_eq!(result.opcode, 0x08);
        assert_eq!(result.battery(), None);
        assert_eq!(result.wheel_mode(), None);
    }

    #[test]
    fn combo_replies_carry_combo_prefix() {
        let req = QueryTarget::Battery.to_message(Variant::Combo);

        assert!(QueryResult::decode(&[0x02, 0x81, 0x0d, 50, 0x30, 0], &req).echoed_ok);
        assert!(!QueryResult::decode(&[0x01, 0x81, 0x0d, 50, 0x30, 0], &req).echoed_ok);
    }

    #[test]
    fn short_or_out_of_range_replies_fail_validation() {
        let req = request(QueryTarget::WheelMode);

        assert!(!QueryResult::decode(&[0x01, 0x81], &req).echoed_ok);
        assert!(!QueryResult::decode(&[0x101, 0x81, 0x08, 0, 0, 0], &req).echoed_ok);
        assert!(!QueryResult::decode(&[-1, -1, -1, -1, -1, -1], &req).echoed_ok);
    }
}
