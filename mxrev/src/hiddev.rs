//! Implements [`RawReportChannel`] on top of the Linux `hiddev` interface.
//!
//! `hiddev` exposes the parsed reports of a HID device as usage values that
//! are read and written through a handful of ioctls. The structures and
//! request codes below mirror `<linux/hiddev.h>`.

use std::{
    cell::Cell,
    fs::{File, OpenOptions},
    io::{self, Read},
    mem,
    os::fd::AsRawFd,
    path::{Path, PathBuf},
    time::Duration,
};

use thiserror::Error;
use tracing::{debug, warn};

use crate::channel::{MAX_USAGE_VALUES, RawReportChannel, ReportType, UsageEvent};

const HIDDEV_IOCTL_TYPE: u8 = b'H';

const IOC_NRBITS: u32 = 8;
const IOC_TYPEBITS: u32 = 8;
const IOC_SIZEBITS: u32 = 14;
const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = IOC_NRSHIFT + IOC_NRBITS;
const IOC_SIZESHIFT: u32 = IOC_TYPESHIFT + IOC_TYPEBITS;
const IOC_DIRSHIFT: u32 = IOC_SIZESHIFT + IOC_SIZEBITS;
const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

/// Makes every read return a complete `hiddev_usage_ref` instead of the
/// legacy `hiddev_event`.
pub const HIDDEV_FLAG_UREF: libc::c_int = 0x1;

/// Makes the device queue an event per report instead of one per changed
/// usage.
pub const HIDDEV_FLAG_REPORT: libc::c_int = 0x2;

/// The size of a legacy `hiddev_event`, as read while [`HIDDEV_FLAG_UREF`]
/// is unset.
const LEGACY_EVENT_SIZE: usize = 8;

#[repr(C)]
#[derive(Clone, Copy, Default, Debug)]
struct HiddevDevinfo {
    bustype: u32,
    busnum: u32,
    devnum: u32,
    ifnum: u32,
    vendor: i16,
    product: i16,
    version: i16,
    num_applications: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Default, Debug)]
struct HiddevReportInfo {
    report_type: u32,
    report_id: u32,
    num_fields: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Default, Debug)]
struct HiddevUsageRef {
    report_type: u32,
    report_id: u32,
    field_index: u32,
    usage_index: u32,
    usage_code: u32,
    value: i32,
}

#[repr(C)]
struct HiddevUsageRefMulti {
    uref: HiddevUsageRef,
    num_values: u32,
    values: [i32; MAX_USAGE_VALUES],
}

impl HiddevUsageRefMulti {
    fn new(report_type: ReportType, report_id: u8, num_values: usize) -> Self {
        Self {
            uref: HiddevUsageRef {
                report_type: report_type.into(),
                report_id: report_id.into(),
                ..HiddevUsageRef::default()
            },
            num_values: num_values as u32,
            values: [0; MAX_USAGE_VALUES],
        }
    }
}

const fn ioctl_code(direction: u32, nr: u8, size: usize) -> libc::c_ulong {
    ((direction << IOC_DIRSHIFT)
        | ((HIDDEV_IOCTL_TYPE as u32) << IOC_TYPESHIFT)
        | ((nr as u32) << IOC_NRSHIFT)
        | ((size as u32) << IOC_SIZESHIFT)) as libc::c_ulong
}

const fn ior<T>(nr: u8) -> libc::c_ulong {
    ioctl_code(IOC_READ, nr, mem::size_of::<T>())
}

const fn iow<T>(nr: u8) -> libc::c_ulong {
    ioctl_code(IOC_WRITE, nr, mem::size_of::<T>())
}

const fn iowr<T>(nr: u8) -> libc::c_ulong {
    ioctl_code(IOC_READ | IOC_WRITE, nr, mem::size_of::<T>())
}

const HIDIOCGDEVINFO: libc::c_ulong = ior::<HiddevDevinfo>(0x03);
const HIDIOCGREPORT: libc::c_ulong = iow::<HiddevReportInfo>(0x07);
const HIDIOCSREPORT: libc::c_ulong = iow::<HiddevReportInfo>(0x08);
const HIDIOCGFLAG: libc::c_ulong = ior::<libc::c_int>(0x0e);
const HIDIOCSFLAG: libc::c_ulong = iow::<libc::c_int>(0x0f);
const HIDIOCGUSAGES: libc::c_ulong = iowr::<HiddevUsageRefMulti>(0x13);
const HIDIOCSUSAGES: libc::c_ulong = iow::<HiddevUsageRefMulti>(0x14);

/// Identifies the device behind a `hiddev` node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeviceInfo {
    pub bustype: u32,
    pub busnum: u32,
    pub devnum: u32,
    pub ifnum: u32,
    pub vendor_id: u16,
    pub product_id: u16,
    pub version: u16,
    pub num_applications: u32,
}

impl From<HiddevDevinfo> for DeviceInfo {
    fn from(raw: HiddevDevinfo) -> Self {
        // The kernel stores the IDs as signed shorts.
        Self {
            bustype: raw.bustype,
            busnum: raw.busnum,
            devnum: raw.devnum,
            ifnum: raw.ifnum,
            vendor_id: u16::from_ne_bytes(raw.vendor.to_ne_bytes()),
            product_id: u16::from_ne_bytes(raw.product.to_ne_bytes()),
            version: u16::from_ne_bytes(raw.version.to_ne_bytes()),
            num_applications: raw.num_applications,
        }
    }
}

/// Represents an open `hiddev` node.
///
/// The node is closed when the value is dropped.
#[derive(Debug)]
pub struct HiddevDevice {
    file: File,
    path: PathBuf,

    /// The size of a single event read, which depends on
    /// [`HIDDEV_FLAG_UREF`].
    event_size: Cell<usize>,
}

impl HiddevDevice {
    /// Opens a `hiddev` node for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        // Freshly opened nodes start out without any flags.
        Ok(Self {
            file,
            path: path.to_path_buf(),
            event_size: Cell::new(LEGACY_EVENT_SIZE),
        })
    }

    /// Retrieves the identity of the device.
    pub fn device_info(&self) -> Result<DeviceInfo, HiddevError> {
        let mut raw = HiddevDevinfo::default();
        self.ioctl("HIDIOCGDEVINFO", HIDIOCGDEVINFO, &mut raw)?;
        Ok(raw.into())
    }

    /// Retrieves the currently set `HIDDEV_FLAG_*` flags.
    pub fn flags(&self) -> Result<libc::c_int, HiddevError> {
        let mut flags: libc::c_int = 0;
        self.ioctl("HIDIOCGFLAG", HIDIOCGFLAG, &mut flags)?;
        Ok(flags)
    }

    /// Replaces the `HIDDEV_FLAG_*` flags.
    ///
    /// Subsequent reads expect events of the layout the new flags select.
    pub fn set_flags(&self, flags: libc::c_int) -> Result<(), HiddevError> {
        let mut raw = flags;
        self.ioctl("HIDIOCSFLAG", HIDIOCSFLAG, &mut raw)?;
        self.event_size.set(event_size(flags));
        Ok(())
    }

    /// Makes reads return immediately if no event is queued.
    pub fn set_nonblocking(&self) -> Result<(), HiddevError> {
        let fd = self.file.as_raw_fd();

        // SAFETY: `fd` is owned by `self.file` and stays open for the call.
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if flags < 0 {
            return Err(HiddevError::NonBlocking(io::Error::last_os_error()));
        }

        // SAFETY: see above.
        if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
            return Err(HiddevError::NonBlocking(io::Error::last_os_error()));
        }

        Ok(())
    }

    /// Prepares a freshly opened node for report transactions.
    ///
    /// Switches to non-blocking reads and asks for complete usage references
    /// queued once per report, which is what
    /// [`ReportChannel`](crate::channel::ReportChannel) relies on when draining
    /// events. Failures are logged and otherwise ignored. If the flags cannot
    /// be set, events are read in whatever layout the node reports.
    pub fn init(&self) {
        if let Err(err) = self.set_nonblocking() {
            warn!(path = %self.path.display(), error = %err, "could not enable non-blocking reads");
        }

        if let Err(err) = self.set_flags(HIDDEV_FLAG_UREF | HIDDEV_FLAG_REPORT) {
            warn!(path = %self.path.display(), error = %err, "could not set hiddev flags");

            match self.flags() {
                Ok(flags) => self.event_size.set(event_size(flags)),
                Err(err) => debug!(error = %err, "could not read hiddev flags"),
            }
        }

        debug!(
            path = %self.path.display(),
            event_size = self.event_size.get(),
            "initialized hiddev node"
        );
    }

    fn ioctl<T>(
        &self,
        request: &'static str,
        code: libc::c_ulong,
        arg: &mut T,
    ) -> Result<(), HiddevError> {
        // SAFETY: `code` encodes the size of `T`, whose layout mirrors the
        // structure the kernel expects for this request.
        let res = unsafe { libc::ioctl(self.file.as_raw_fd(), code as _, arg as *mut T) };
        if res < 0 {
            return Err(HiddevError::Ioctl {
                request,
                source: io::Error::last_os_error(),
            });
        }

        Ok(())
    }
}

impl RawReportChannel for HiddevDevice {
    type Error = HiddevError;

    fn set_usages(&self, report_id: u8, values: &[i32]) -> Result<(), Self::Error> {
        check_len(values.len())?;
        let mut uref = HiddevUsageRefMulti::new(ReportType::Output, report_id, values.len());
        uref.values[..values.len()].copy_from_slice(values);
        self.ioctl("HIDIOCSUSAGES", HIDIOCSUSAGES, &mut uref)
    }

    fn commit_report(&self, report_id: u8) -> Result<(), Self::Error> {
        let mut info = HiddevReportInfo {
            report_type: ReportType::Output.into(),
            report_id: report_id.into(),
            num_fields: 1,
        };
        self.ioctl("HIDIOCSREPORT", HIDIOCSREPORT, &mut info)
    }

    fn request_report(&self, report_id: u8) -> Result<(), Self::Error> {
        let mut info = HiddevReportInfo {
            report_type: ReportType::Input.into(),
            report_id: report_id.into(),
            num_fields: 1,
        };
        self.ioctl("HIDIOCGREPORT", HIDIOCGREPORT, &mut info)
    }

    fn get_usages(&self, report_id: u8, buf: &mut [i32]) -> Result<(), Self::Error> {
        check_len(buf.len())?;
        let mut uref = HiddevUsageRefMulti::new(ReportType::Input, report_id, buf.len());
        self.ioctl("HIDIOCGUSAGES", HIDIOCGUSAGES, &mut uref)?;
        buf.copy_from_slice(&uref.values[..buf.len()]);
        Ok(())
    }

    fn wait_readable(&self, timeout: Option<Duration>) -> Result<bool, Self::Error> {
        let timeout_ms = timeout.map_or(-1, |timeout| {
            timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int
        });
        let mut fds = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };

        loop {
            // SAFETY: `fds` is a single valid pollfd for the duration of the
            // call.
            let res = unsafe { libc::poll(&mut fds, 1, timeout_ms) };
            if res >= 0 {
                return Ok(res > 0);
            }

            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(HiddevError::Poll(err));
            }
        }
    }

    fn read_event(&self) -> Result<Option<UsageEvent>, Self::Error> {
        let mut buf = [0u8; mem::size_of::<HiddevUsageRef>()];
        let buf = &mut buf[..self.event_size.get()];

        loop {
            match (&self.file).read(buf) {
                Ok(len) => return Ok(parse_event(&buf[..len])),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(HiddevError::Read(err)),
            }
        }
    }
}

fn check_len(len: usize) -> Result<(), HiddevError> {
    if len > MAX_USAGE_VALUES {
        return Err(HiddevError::TooManyValues(len));
    }

    Ok(())
}

/// The size of the events read while `flags` are set.
const fn event_size(flags: libc::c_int) -> usize {
    if flags & HIDDEV_FLAG_UREF != 0 {
        mem::size_of::<HiddevUsageRef>()
    } else {
        LEGACY_EVENT_SIZE
    }
}

/// Parses an event as returned by a read on a `hiddev` node.
///
/// Complete usage references are returned if [`HIDDEV_FLAG_UREF`] is set,
/// the 8 byte legacy `hiddev_event` (usage code and value) otherwise.
fn parse_event(buf: &[u8]) -> Option<UsageEvent> {
    let word = |i: usize| {
        let at = i * 4;
        u32::from_ne_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
    };

    if buf.len() == mem::size_of::<HiddevUsageRef>() {
        return Some(UsageEvent {
            report_type: word(0),
            report_id: word(1),
            field_index: word(2),
            usage_index: word(3),
            usage_code: word(4),
            value: word(5) as i32,
        });
    }

    if buf.len() == LEGACY_EVENT_SIZE {
        return Some(UsageEvent {
            report_type: 0,
            report_id: 0,
            field_index: 0,
            usage_index: 0,
            usage_code: word(0),
            value: word(1) as i32,
        });
    }

    None
}

/// Represents an error returned by the kernel for a `hiddev` node.
#[derive(Debug, Error)]
pub enum HiddevError {
    /// Indicates that an ioctl was rejected.
    #[error("{request} failed")]
    Ioctl {
        request: &'static str,
        #[source]
        source: io::Error,
    },

    /// Indicates that waiting for events failed.
    #[error("could not wait for events")]
    Poll(#[source] io::Error),

    /// Indicates that reading an event failed.
    #[error("could not read an event")]
    Read(#[source] io::Error),

    /// Indicates that the node could not be switched to non-blocking mode.
    #[error("could not enable non-blocking mode")]
    NonBlocking(#[source] io::Error),

    /// Indicates that a usage transfer was larger than the kernel allows.
    #[error("{0} values exceed the limit of {MAX_USAGE_VALUES} values per transfer")]
    TooManyValues(usize),
}

impl HiddevError {
    /// The underlying OS error, if there is one.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            Self::Ioctl { source, .. } => Some(source),
            Self::Poll(err) | Self::Read(err) | Self::NonBlocking(err) => Some(err),
            Self::TooManyValues(_) => None,
        }
    }
}
