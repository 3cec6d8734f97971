//! Implements the commands of the [`Register::WheelControl`] register.
//!
//! The first parameter of the register selects the operation. Its highest
//! bit decides whether the device keeps the setting after a power cycle, see
//! [`Persistence`].

use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::{Message, ProtocolError, Register, Variant};
use crate::nibble::{self, U4};

/// Decides whether a wheel setting survives a power cycle of the device.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Persistence {
    /// The setting is only applied until the device is turned off.
    Temporary,

    /// The setting becomes the default after power up.
    #[default]
    Permanent,
}

impl Persistence {
    /// The bit set in the opcode byte.
    pub fn bit(self) -> u8 {
        match self {
            Self::Temporary => 0x00,
            Self::Permanent => 0x80,
        }
    }
}

/// Represents the operations of the wheel control register.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum WheelOpcode {
    FreeSpin = 0x01,
    ClickToClick = 0x02,
    SoftFree = 0x03,
    SoftClick = 0x04,
    Automatic = 0x05,
    ManualPair = 0x07,
    ManualToggle = 0x08,
}

/// Represents a button that can be assigned to switch the wheel mode.
///
/// `0` keeps the previously assigned button. Known buttons are `3` (wheel
/// button), `4` (rear thumb button), `5` (front thumb button), `6` (find
/// button), `7`/`8` (wheel tilt left/right), `9`/`11` (thumb wheel
/// forward/backward) and `13` (thumb wheel press). The left (`1`) and right
/// (`2`) buttons are ignored by the device.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Button(U4);

impl Button {
    /// Keeps the button assigned previously.
    pub const PREVIOUS: Self = Self(U4::from_lo(0));

    pub fn number(self) -> u8 {
        self.0.to_lo()
    }
}

impl TryFrom<u8> for Button {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        U4::try_from(value)
            .map(Self)
            .map_err(|_| ProtocolError::OutOfRange {
                what: "button",
                value,
                min: 0,
                max: U4::MAX,
            })
    }
}

/// Represents a wheel rotation speed (roughly clicks per second) that
/// triggers an automatic mode change.
///
/// `0` keeps the previously set speed.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Speed(u8);

impl Speed {
    /// The highest speed the device accepts.
    pub const MAX: u8 = 50;

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Speed {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value > Self::MAX {
            return Err(ProtocolError::OutOfRange {
                what: "speed",
                value,
                min: 0,
                max: Self::MAX,
            });
        }

        Ok(Self(value))
    }
}

/// Represents a command changing the behaviour of the scroll wheel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum WheelCommand {
    /// Switches to free spinning immediately.
    FreeSpin,

    /// Switches to click-to-click immediately.
    ClickToClick,

    /// Switches to free spinning once the wheel is moved.
    ///
    /// The thresholds are passed through unchecked and the setting is never
    /// persisted.
    SoftFree { up: u8, down: u8 },

    /// Switches to click-to-click once the wheel is moved.
    ///
    /// The thresholds are passed through unchecked and the setting is never
    /// persisted.
    SoftClick { up: u8, down: u8 },

    /// Uses click-to-click and switches to free spinning when the wheel is
    /// rotated faster than the given speeds.
    Automatic { up: Speed, down: Speed },

    /// Switches modes with buttons.
    ///
    /// If both buttons are the same, that button toggles between the modes.
    /// Otherwise, `free` switches to free spinning and `click` to
    /// click-to-click.
    Manual { free: Button, click: Button },
}

impl WheelCommand {
    /// The opcode selecting the operation, without the persistence bit.
    pub fn opcode(&self) -> WheelOpcode {
        match *self {
            Self::FreeSpin => WheelOpcode::FreeSpin,
            Self::ClickToClick => WheelOpcode::ClickToClick,
            Self::SoftFree { .. } => WheelOpcode::SoftFree,
            Self::SoftClick { .. } => WheelOpcode::SoftClick,
            Self::Automatic { .. } => WheelOpcode::Automatic,
            Self::Manual { free, click } if free == click => WheelOpcode::ManualToggle,
            Self::Manual { .. } => WheelOpcode::ManualPair,
        }
    }

    /// Whether the device honours the persistence bit for this command.
    pub fn is_persistable(&self) -> bool {
        !matches!(self, Self::SoftFree { .. } | Self::SoftClick { .. })
    }

    /// Encodes the register parameters of the command.
    pub fn params(&self, persistence: Persistence) -> [u8; 3] {
        let opcode = u8::from(self.opcode())
            | if self.is_persistable() {
                persistence.bit()
            } else {
                0x00
            };

        match *self {
            Self::FreeSpin | Self::ClickToClick => [opcode, 0x00, 0x00],
            Self::SoftFree { up, down } | Self::SoftClick { up, down } => [opcode, up, down],
            Self::Automatic { up, down } => [opcode, up.value(), down.value()],
            Self::Manual { free, click } if free == click => [opcode, free.number(), 0x00],
            Self::Manual { free, click } => [opcode, nibble::combine(free.0, click.0), 0x00],
        }
    }

    /// Builds the message applying the command on a device of the given
    /// variant.
    pub fn to_message(&self, variant: Variant, persistence: Persistence) -> Message {
        Message::set_register(
            variant.prefix(),
            Register::WheelControl,
            self.params(persistence),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn button(n: u8) -> Button {
        Button::try_from(n).unwrap()
    }

    #[test]
    fn free_spin_is_permanent_by_default() {
        let msg = WheelCommand::FreeSpin.to_message(Variant::Standard, Persistence::default());
        assert_eq!(msg.to_values(), [0x01, 0x80, 0x56, 0x81, 0x00, 0x00]);
    }

    #[test]
    fn temporary_click_clears_high_bit() {
        let msg = WheelCommand::ClickToClick.to_message(Variant::Standard, Persistence::Temporary);
        assert_eq!(msg.to_values(), [0x01, 0x80, 0x56, 0x02, 0x00, 0x00]);
    }

    #[test]
    fn combo_uses_its_own_prefix() {
        let msg = WheelCommand::FreeSpin.to_message(Variant::Combo, Persistence::Permanent);
        assert_eq!(msg.to_values()[0], 0x02);
    }

    #[test]
    fn manual_with_two_buttons_packs_nibbles() {
        let cmd = WheelCommand::Manual {
            free: button(5),
            click: button(4),
        };
        assert_eq!(cmd.params(Persistence::Permanent), [0x87, 0x54, 0x00]);
    }

    #[test]
    fn manual_with_one_button_toggles() {
        let cmd = WheelCommand::Manual {
            free: button(3),
            click: button(3),
        };
        assert_eq!(cmd.params(Persistence::Temporary), [0x08, 0x03, 0x00]);
    }

    #[test]
    fn automatic_carries_both_speeds() {
        let cmd = WheelCommand::Automatic {
            up: Speed::try_from(10).unwrap(),
            down: Speed::try_from(20).unwrap(),
        };
        assert_eq!(cmd.params(Persistence::Permanent), [0x85, 10, 20]);
    }

    #[test]
    fn soft_thresholds_ignore_persistence() {
        let cmd = WheelCommand::SoftFree { up: 200, down: 7 };
        assert_eq!(cmd.params(Persistence::Permanent), [0x03, 200, 7]);
        assert_eq!(cmd.params(Persistence::Temporary), [0x03, 200, 7]);

        let cmd = WheelCommand::SoftClick { up: 1, down: 255 };
        assert_eq!(cmd.params(Persistence::Permanent), [0x04, 1, 255]);
    }

    #[test]
    fn ranges_are_enforced() {
        assert!(Button::try_from(16).is_err());
        assert_eq!(
            Speed::try_from(51),
            Err(ProtocolError::OutOfRange {
                what: "speed",
                value: 51,
                min: 0,
                max: 50,
            })
        );
        assert_eq!(Speed::try_from(50).map(Speed::value), Ok(50));
    }
}
