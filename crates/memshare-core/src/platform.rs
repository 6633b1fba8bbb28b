//! Platform differences in naming, limits and OS error codes
//!
//! The actual create/open/map/unmap calls go through `shared_memory`, which
//! carries one backend per OS (`shm_open` + `mmap` on Unix, file mappings on
//! Windows). Everything that still differs between platforms once that crate
//! is in place lives here, so the rest of the crate stays platform-agnostic.
//!
//! Teardown order is where the backends disagree. On Unix the owner unlinks
//! the name on release, but mappings already held by viewers stay readable
//! until they unmap. On Windows the object lives as long as any handle is
//! open, so an owner's release only frees the memory once every viewer has
//! closed its handle too. Neither case crashes; releasing views before the
//! owner releases gives the same outcome everywhere.

use crate::{Error, Result};
use shared_memory::ShmemError;

/// Prefix that scopes region names to the current user session.
#[cfg(windows)]
pub const SCOPE_PREFIX: &str = "Local\\";

/// Prefix required by POSIX shared memory object names.
#[cfg(not(windows))]
pub const SCOPE_PREFIX: &str = "/";

/// Longest OS name accepted, including the leading separator.
#[cfg(target_os = "macos")]
pub const MAX_NAME_LEN: Option<usize> = Some(32);

#[cfg(not(target_os = "macos"))]
pub const MAX_NAME_LEN: Option<usize> = None;

// ENOENT on Unix, ERROR_FILE_NOT_FOUND on Windows; both are 2.
const NOT_FOUND_CODE: u32 = 2;

/// Reject names the OS would refuse with an opaque error.
pub fn check_name(name: &str, max: Option<usize>) -> Result<()> {
    match max {
        Some(max) if name.len() > max => Err(Error::NameTooLong {
            name: name.to_string(),
            max,
        }),
        _ => Ok(()),
    }
}

/// Classify an error returned while creating a region.
pub(crate) fn create_error(name: &str, err: ShmemError) -> Error {
    match err {
        ShmemError::MappingIdExists | ShmemError::LinkExists => {
            Error::AlreadyExists(name.to_string())
        }
        other => Error::Platform(format!("failed to create {}: {}", name, other)),
    }
}

/// Classify an error returned while attaching to a region.
pub(crate) fn open_error(name: &str, err: ShmemError) -> Error {
    match err {
        ShmemError::MapOpenFailed(code) if code == NOT_FOUND_CODE => {
            Error::NotFound(name.to_string())
        }
        ShmemError::LinkDoesNotExist => Error::NotFound(name.to_string()),
        other => Error::Platform(format!("failed to open {}: {}", name, other)),
    }
}
