//! Implements locating a supported device among the local `hiddev` nodes.
//!
//! Depending on the udev configuration, the nodes live either in `/dev/usb`
//! or directly in `/dev`. Both locations are scanned in that order and the
//! first node belonging to a known device wins. Every other node opened along
//! the way is closed again before the next one is tried.

use std::{
    io,
    path::{Path, PathBuf},
};

use itertools::Itertools;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::{
    hiddev::{DeviceInfo, HiddevDevice, HiddevError},
    protocol::Variant,
};

/// The USB vendor ID of Logitech.
pub const LOGITECH_VENDOR_ID: u16 = 0x046d;

/// The node path prefixes scanned by [`locate`], in order.
pub const PATH_TEMPLATES: &[&str] = &["/dev/usb/hiddev", "/dev/hiddev"];

/// The amount of nodes scanned per path template.
pub const NODES_PER_TEMPLATE: u8 = 16;

/// Represents the supported devices, identified by their USB product ID.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u16)]
pub enum Model {
    /// MX Revolution with receiver firmware RR41.01_B0025.
    MxRevolution = 0xc51a,

    /// MX Revolution with receiver firmware RQR02.00_B0020.
    MxRevolutionR2 = 0xc525,

    /// A third MX Revolution receiver revision.
    MxRevolutionR3 = 0xc526,

    /// The MX 5500 keyboard/mouse combo. Support is experimental.
    Mx5500 = 0xc71c,
}

impl Model {
    /// Classifies a device by its USB vendor and product IDs.
    pub fn classify(vendor_id: u16, product_id: u16) -> Option<Self> {
        if vendor_id != LOGITECH_VENDOR_ID {
            return None;
        }

        Self::try_from(product_id).ok()
    }

    /// The protocol variant the model speaks.
    pub fn variant(self) -> Variant {
        match self {
            Self::MxRevolution | Self::MxRevolutionR2 | Self::MxRevolutionR3 => Variant::Standard,
            Self::Mx5500 => Variant::Combo,
        }
    }

    /// Whether support for the model is experimental.
    pub fn is_experimental(self) -> bool {
        self == Self::Mx5500
    }

    /// A human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::MxRevolution | Self::MxRevolutionR2 | Self::MxRevolutionR3 => {
                "Logitech MX Revolution"
            },
            Self::Mx5500 => "Logitech MX 5500",
        }
    }

    /// All supported models.
    pub fn all() -> [Self; 4] {
        [
            Self::MxRevolution,
            Self::MxRevolutionR2,
            Self::MxRevolutionR3,
            Self::Mx5500,
        ]
    }
}

/// Represents a node that was opened during a scan but does not belong to a
/// supported device.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CandidateDevice {
    pub path: PathBuf,
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Represents anything that can tell which device it belongs to.
pub trait IdentifiableDevice {
    /// Retrieves the identity of the device.
    fn identify(&self) -> Result<DeviceInfo, HiddevError>;
}

impl IdentifiableDevice for HiddevDevice {
    fn identify(&self) -> Result<DeviceInfo, HiddevError> {
        self.device_info()
    }
}

/// Represents a successfully located device.
#[derive(Debug)]
pub struct Located<T> {
    /// The open device node.
    pub device: T,

    /// The path of the node.
    pub path: PathBuf,

    /// The model the device was classified as.
    pub model: Model,
}

/// Lists every node path [`locate`] tries, in order.
pub fn node_paths() -> impl Iterator<Item = PathBuf> {
    PATH_TEMPLATES
        .iter()
        .cartesian_product(0..NODES_PER_TEMPLATE)
        .map(|(template, index)| PathBuf::from(format!("{template}{index}")))
}

/// Scans the `hiddev` nodes for a supported device and prepares it for
/// report transactions via [`HiddevDevice::init`].
pub fn locate() -> Result<Located<HiddevDevice>, LocateError> {
    let located = scan(node_paths(), |path| HiddevDevice::open(path))?;
    located.device.init();
    Ok(located)
}

/// Opens a specific `hiddev` node, checks that it belongs to a supported
/// device and prepares it like [`locate`] does.
pub fn locate_at(path: impl AsRef<Path>) -> Result<Located<HiddevDevice>, LocateError> {
    let path = path.as_ref();

    let device = HiddevDevice::open(path).map_err(|source| {
        if source.kind() == io::ErrorKind::PermissionDenied {
            LocateError::PermissionDenied {
                path: path.to_path_buf(),
            }
        } else {
            LocateError::Open {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let info = device.identify().map_err(|source| LocateError::Identify {
        path: path.to_path_buf(),
        source,
    })?;

    let Some(model) = Model::classify(info.vendor_id, info.product_id) else {
        return Err(LocateError::UnsupportedDevice(CandidateDevice {
            path: path.to_path_buf(),
            vendor_id: info.vendor_id,
            product_id: info.product_id,
        }));
    };
    announce(model, path);

    device.init();
    Ok(Located {
        device,
        path: path.to_path_buf(),
        model,
    })
}

/// Opens the given paths one after another until a supported device is
/// found.
///
/// Nodes that fail to open are skipped. Opened nodes of other devices are
/// dropped, and thereby closed, before the next path is tried.
pub fn scan<T, P, F>(paths: P, mut open: F) -> Result<Located<T>, LocateError>
where
    T: IdentifiableDevice,
    P: IntoIterator<Item = PathBuf>,
    F: FnMut(&Path) -> io::Result<T>,
{
    let mut rejected = Vec::new();
    let mut opened_any = false;
    let mut denied = None;

    for path in paths {
        let device = match open(&path) {
            Ok(device) => device,
            Err(err) => {
                trace!(path = %path.display(), error = %err, "could not open node");
                if err.kind() == io::ErrorKind::PermissionDenied && denied.is_none() {
                    denied = Some(path);
                }
                continue;
            },
        };
        opened_any = true;

        let info = match device.identify() {
            Ok(info) => info,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "could not identify node");
                continue;
            },
        };

        if let Some(model) = Model::classify(info.vendor_id, info.product_id) {
            announce(model, &path);
            return Ok(Located {
                device,
                path,
                model,
            });
        }

        debug!(
            path = %path.display(),
            vendor_id = format_args!("{:04x}", info.vendor_id),
            product_id = format_args!("{:04x}", info.product_id),
            "skipping unsupported device"
        );
        rejected.push(CandidateDevice {
            path,
            vendor_id: info.vendor_id,
            product_id: info.product_id,
        });
    }

    if opened_any {
        return Err(LocateError::NoMatchingDevice {
            candidates: rejected,
            denied,
        });
    }

    match denied {
        Some(path) => Err(LocateError::PermissionDenied { path }),
        None => Err(LocateError::DriverMissing),
    }
}

fn announce(model: Model, path: &Path) {
    if model.is_experimental() {
        info!(model = model.name(), "support for this device is experimental");
    }
    debug!(path = %path.display(), ?model, "found supported device");
}

/// Represents an error that occurred while locating a device.
#[derive(Debug, Error)]
pub enum LocateError {
    /// Indicates that `hiddev` nodes exist, but none belongs to a supported
    /// device.
    ///
    /// `denied` holds the first node that could not be opened for lack of
    /// permission. The device may well be behind it.
    #[error("no supported device was found")]
    NoMatchingDevice {
        candidates: Vec<CandidateDevice>,
        denied: Option<PathBuf>,
    },

    /// Indicates that no node could be opened and at least one of them was
    /// not accessible.
    #[error("no permission to access {}", path.display())]
    PermissionDenied { path: PathBuf },

    /// Indicates that no node exists at all.
    #[error("no hiddev device nodes were found")]
    DriverMissing,

    /// Indicates that an explicitly given node could not be opened.
    #[error("could not open {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Indicates that the identity of an explicitly given node could not be
    /// determined.
    #[error("could not identify the device at {}", path.display())]
    Identify {
        path: PathBuf,
        #[source]
        source: HiddevError,
    },

    /// Indicates that an explicitly given node belongs to an unsupported
    /// device.
    #[error(
        "{} is no supported device ({:04x}:{:04x})",
        .0.path.display(),
        .0.vendor_id,
        .0.product_id
    )]
    UnsupportedDevice(CandidateDevice),
}
