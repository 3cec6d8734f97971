use std::{io, path::Path};

use itertools::Itertools;
use mxrev::locator::{LOGITECH_VENDOR_ID, LocateError, Model, NODES_PER_TEMPLATE, PATH_TEMPLATES};

/// Explains how to get past a failed device lookup, if there is anything to
/// explain.
pub fn hint(err: &LocateError) -> Option<String> {
    match err {
        LocateError::NoMatchingDevice { candidates, denied } => {
            let mut text = format!("looked for {}", supported_ids());
            if !candidates.is_empty() {
                text.push_str(&format!(
                    "\nfound only {}",
                    candidates
                        .iter()
                        .map(|candidate| format!(
                            "{:04x}:{:04x} at {}",
                            candidate.vendor_id,
                            candidate.product_id,
                            candidate.path.display()
                        ))
                        .join(", ")
                ));
            }
            if let Some(path) = denied {
                text.push('\n');
                text.push_str(&permission_hint(path));
            }
            Some(text)
        },
        LocateError::PermissionDenied { path } => Some(permission_hint(path)),
        LocateError::DriverMissing => Some(format!(
            "the hiddev kernel driver seems to be missing\n\
             check with 'dmesg | grep hiddev' whether it is present in the kernel\n\
             if it is, make sure that the device nodes ({}) exist\n\
             they can be created with\n\n\
             \tmkdir /dev/usb\n\
             \tmknod /dev/usb/hiddev0 c 180 96\n\
             \tmknod /dev/usb/hiddev1 c 180 97\n\
             \t...\n\n\
             or better by a udev rule in /etc/udev/rules.d/",
            node_ranges()
        )),
        LocateError::UnsupportedDevice(_) => Some(format!("supported devices are {}", supported_ids())),
        LocateError::Identify { path, source } => source
            .io_error()
            .filter(|err| err.kind() == io::ErrorKind::PermissionDenied)
            .map(|_| permission_hint(path)),
        LocateError::Open { .. } => None,
    }
}

fn permission_hint(path: &Path) -> String {
    format!(
        "the hiddev nodes ({}) are not accessible to this user\n\
         try 'sudo revoco ...' or grant access with a udev rule:\n\n\
         \tKERNEL==\"hiddev[0-9]*\", SUBSYSTEM==\"usbmisc\", MODE=\"0660\", GROUP=\"plugdev\"",
        path.display()
    )
}

fn supported_ids() -> String {
    Model::all()
        .into_iter()
        .map(|model| format!("{LOGITECH_VENDOR_ID:04x}:{:04x} ({})", u16::from(model), model.name()))
        .join(", ")
}

fn node_ranges() -> String {
    PATH_TEMPLATES
        .iter()
        .map(|template| format!("{template}0-{}", NODES_PER_TEMPLATE - 1))
        .join(" or ")
}
