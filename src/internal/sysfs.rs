//! sysfs attribute parsing and device node opening.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use crate::error::ResourceError;

/// Parse an unsigned integer the way sysfs prints them: `0x`-prefixed hex,
/// `0`-prefixed octal or plain decimal, surrounding whitespace ignored.
pub(crate) fn parse_u64(text: &str) -> Option<u64> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else if text.len() > 1 && text.starts_with('0') {
        u64::from_str_radix(&text[1..], 8).ok()
    } else {
        text.parse().ok()
    }
}

/// Read a text attribute; a missing file maps to `NotFound`.
pub(crate) fn read_attr(path: &Path) -> Result<String, ResourceError> {
    std::fs::read_to_string(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => ResourceError::NotFound {
            what: path.display().to_string(),
        },
        _ => ResourceError::OpenFailed {
            path: path.to_path_buf(),
            source,
        },
    })
}

/// Read a numeric attribute.
pub(crate) fn read_u64(path: &Path) -> Result<u64, ResourceError> {
    let text = read_attr(path)?;
    parse_u64(&text).ok_or_else(|| ResourceError::InvalidValue {
        path: path.to_path_buf(),
        value: text.trim().to_owned(),
    })
}

/// Open a device node read/write, optionally with `O_SYNC`.
pub(crate) fn open_device(path: &Path, sync: bool) -> Result<File, ResourceError> {
    let mut options = OpenOptions::new();
    options.read(true).write(true);
    if sync {
        options.custom_flags(libc::O_SYNC);
    }
    options.open(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => ResourceError::NotFound {
            what: path.display().to_string(),
        },
        _ => ResourceError::OpenFailed {
            path: path.to_path_buf(),
            source,
        },
    })
}
