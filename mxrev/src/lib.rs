//! Control of the Logitech MX Revolution scroll wheel over Linux `hiddev`.
//!
//! The MX Revolution features a motorized scroll wheel that can either spin
//! freely or advance click by click. Which mode is active, and what switches
//! between the modes (buttons, wheel speed), is configured through a few
//! vendor registers that are accessed with short HID++1.0-style register
//! reads and writes on report `0x10`. The same registers are exposed by the
//! MX 5500 keyboard/mouse combo, which uses a different message prefix.
//!
//! This crate talks to the devices through the kernel's `hiddev` interface,
//! so no HID descriptor parsing happens in userspace. The kernel only accepts
//! reports on the usages it knows of, which is why every transaction is
//! expressed as usage values instead of raw bytes.
//!
//! # Layers
//!
//! - [`channel::RawReportChannel`] is the set of primitives a device node
//!   offers. [`hiddev::HiddevDevice`] implements it with ioctls.
//! - [`channel::ReportChannel`] turns the primitives into complete report
//!   transactions, including waiting for and draining the acknowledgements
//!   the device queues.
//! - [`protocol`] encodes wheel commands and register reads into messages
//!   and decodes the answers.
//! - [`locator`] finds the device node of a supported device.
//! - [`device::Device`] ties everything together.
//!
//! # Quickstart
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use mxrev::{
//!     device::Device,
//!     locator,
//!     protocol::wheel::{Persistence, WheelCommand},
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Scans `/dev/usb/hiddev*` and `/dev/hiddev*` for a supported device.
//! let located = locator::locate()?;
//! let (device, model) = Device::from_located(located, Duration::from_secs(3));
//!
//! // Let the wheel spin freely, also after the next power cycle.
//! device.set_wheel(&WheelCommand::FreeSpin, Persistence::Permanent)?;
//!
//! let battery = device.battery()?;
//! println!("{}: {}%", model.name(), battery.percentage);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod device;
pub mod hiddev;
pub mod locator;
pub mod nibble;
pub mod protocol;

#[cfg(test)]
mod testing;
