//! Implements the register-based vendor protocol of the MX Revolution.
//!
//! Every command is a report of [`MESSAGE_LENGTH`] values on
//! [`VENDOR_REPORT_ID`](crate::channel::VENDOR_REPORT_ID), laid out like a
//! short HID++1.0 register access:
//!
//! | index | content                                                      |
//! |-------|--------------------------------------------------------------|
//! | 0     | the device prefix ([`Variant::prefix`]) or [`RECEIVER_PREFIX`] |
//! | 1     | the [`MessageType`]                                          |
//! | 2     | the [`Register`]                                             |
//! | 3..=5 | register parameters                                          |
//!
//! Register reads are answered with the same header followed by the register
//! contents, see [`query`].

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

pub mod query;
pub mod wheel;

/// The amount of values in every message.
pub const MESSAGE_LENGTH: usize = 6;

/// The prefix addressing the wireless receiver instead of the device.
pub const RECEIVER_PREFIX: u8 = 0xff;

/// Represents the protocol variant of a device, which determines the prefix
/// of every message sent to it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Variant {
    /// A standalone MX Revolution mouse.
    Standard,

    /// A mouse paired as part of a keyboard/mouse combo.
    Combo,
}

impl Variant {
    /// The first byte of every message addressing a device of this variant.
    pub fn prefix(self) -> u8 {
        match self {
            Self::Standard => 0x01,
            Self::Combo => 0x02,
        }
    }
}

/// Represents the type of a message.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum MessageType {
    /// Writes the parameters into a register.
    SetRegister = 0x80,

    /// Reads the contents of a register. The device answers with a message
    /// of the same type.
    GetRegister = 0x81,
}

/// Represents the known registers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[non_exhaustive]
#[repr(u8)]
pub enum Register {
    /// Reports the current scroll wheel mode.
    WheelStatus = 0x08,

    /// Reports the battery charge and charging status.
    Battery = 0x0d,

    /// Controls the scroll wheel mode and its switching triggers. See
    /// [`wheel::WheelCommand`].
    WheelControl = 0x56,

    /// Controls the wireless connection. Written on the receiver to start
    /// re-pairing.
    Connection = 0xb2,
}

/// Represents the header every [`Message`] starts with.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MessageHeader {
    /// The prefix selecting the addressed device.
    pub prefix: u8,

    /// The raw [`MessageType`].
    pub sub_id: u8,

    /// The raw [`Register`].
    pub register: u8,
}

/// Represents a single vendor message.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Message {
    pub header: MessageHeader,
    pub params: [u8; MESSAGE_LENGTH - 3],
}

impl Message {
    /// Constructs a message writing `params` into a register.
    pub fn set_register(prefix: u8, register: Register, params: [u8; 3]) -> Self {
        Self {
            header: MessageHeader {
                prefix,
                sub_id: MessageType::SetRegister.into(),
                register: register.into(),
            },
            params,
        }
    }

    /// Constructs a message requesting the contents of a register.
    pub fn get_register(prefix: u8, register: Register) -> Self {
        Self {
            header: MessageHeader {
                prefix,
                sub_id: MessageType::GetRegister.into(),
                register: register.into(),
            },
            params: [0x00, 0x00, 0x00],
        }
    }

    /// Constructs the message asking the receiver to drop the current
    /// connection and wait for the device to pair again.
    pub fn initiate_reconnect() -> Self {
        Self::set_register(RECEIVER_PREFIX, Register::Connection, [0x01, 0x00, 0x00])
    }

    /// Converts the message into the usage values of a report.
    pub fn to_values(&self) -> [i32; MESSAGE_LENGTH] {
        let [p0, p1, p2] = self.params;
        [
            self.header.prefix,
            self.header.sub_id,
            self.header.register,
            p0,
            p1,
            p2,
        ]
        .map(i32::from)
    }

    /// Tries to read a message from the usage values of a report.
    ///
    /// Returns [`None`] if there are fewer than [`MESSAGE_LENGTH`] values or
    /// one of them does not fit into a byte.
    pub fn from_values(values: &[i32]) -> Option<Self> {
        let bytes: [u8; MESSAGE_LENGTH] = values
            .get(..MESSAGE_LENGTH)?
            .iter()
            .map(|value| u8::try_from(*value).ok())
            .collect::<Option<Vec<u8>>>()?
            .try_into()
            .ok()?;

        Some(Self {
            header: MessageHeader {
                prefix: bytes[0],
                sub_id: bytes[1],
                register: bytes[2],
            },
            params: [bytes[3], bytes[4], bytes[5]],
        })
    }
}

/// Represents an error that occurred while building a message.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Indicates that a parameter lies outside of the range the device
    /// accepts.
    #[error("{what} {value} is out of range ({min}-{max})")]
    OutOfRange {
        what: &'static str,
        value: u8,
        min: u8,
        max: u8,
    },
}
