//! A very simple u4/nibble implementation.
//!
//! Button numbers are transmitted as nibbles, so they share this type.

use thiserror::Error;

/// Represents an unsigned 4-bit value (nibble) encoded as a byte.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct U4(u8);

impl U4 {
    /// The largest value a nibble can hold.
    pub const MAX: u8 = 0x0f;

    /// Constructs a nibble from the 4 low/rightmost bits of a byte.
    pub const fn from_lo(raw: u8) -> Self {
        Self(raw & 0x0f)
    }

    /// Constructs a nibble from the 4 high/leftmost bits of a byte.
    pub const fn from_hi(raw: u8) -> Self {
        Self(raw >> 4)
    }

    /// Constructs a byte with the nibble set as the 4 low/rightmost bits.
    pub const fn to_lo(self) -> u8 {
        self.0
    }

    /// Constructs a byte with the nibble set as the 4 high/leftmost bits.
    pub const fn to_hi(self) -> u8 {
        self.0 << 4
    }
}

impl TryFrom<u8> for U4 {
    type Error = NibbleOverflow;

    /// Unlike [`U4::from_lo`], this rejects values that do not fit instead of
    /// masking them.
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value > Self::MAX {
            return Err(NibbleOverflow(value));
        }

        Ok(Self(value))
    }
}

impl From<U4> for u8 {
    fn from(value: U4) -> Self {
        value.0
    }
}

/// Combines two nibbles to a byte, with `a` being set to the 4 leftmost and
/// `b` being set to the 4 rightmost bits.
pub fn combine(a: U4, b: U4) -> u8 {
    a.to_hi() | b.to_lo()
}

/// Indicates that a value does not fit into 4 bits.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
#[error("{0} does not fit into a nibble (0-15)")]
pub struct NibbleOverflow(pub u8);
