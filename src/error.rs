// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Error type shared by every layer of the bridge.
//!
//! libcamera reports failures as negative `errno` values. Those are forwarded
//! unmodified as [`Error::Errno`] together with the name of the operation that
//! produced them. Everything else the bridge itself can detect (wrong control
//! variant, stale handle, bad argument) has a dedicated variant.

use std::{fmt, io};

use crate::controls::ControlKind;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A native call returned a negative errno.
    #[error("{op} failed: {}", display_errno(.errno))]
    Errno { op: &'static str, errno: i32 },

    /// A control value was read as a different type than it holds.
    #[error("control value type mismatch: expected {expected}, found {found}")]
    WrongVariant {
        expected: ControlKind,
        found: ControlKind,
    },

    /// A handle no longer refers to a live object.
    #[error("stale {0} handle")]
    StaleHandle(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The native library could not produce the requested object.
    #[error("{0} allocation failed")]
    AllocationFailed(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// The positive errno carried by a native failure, if any.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Error::Errno { errno, .. } => Some(*errno),
            Error::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }
}

/// Display helper rendering an errno as its symbolic name and message.
struct Errno(i32);

fn display_errno(errno: &i32) -> Errno {
    Errno(*errno)
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            libc::EPERM => "EPERM",
            libc::ENOENT => "ENOENT",
            libc::EIO => "EIO",
            libc::ENODEV => "ENODEV",
            libc::ENOMEM => "ENOMEM",
            libc::EACCES => "EACCES",
            libc::EBUSY => "EBUSY",
            libc::EEXIST => "EEXIST",
            libc::EINVAL => "EINVAL",
            libc::ENOSPC => "ENOSPC",
            libc::ENODATA => "ENODATA",
            libc::EXDEV => "EXDEV",
            libc::ENOTSUP => "ENOTSUP",
            _ => "",
        };
        let msg = io::Error::from_raw_os_error(self.0);
        if name.is_empty() {
            write!(f, "errno {} ({})", self.0, msg)
        } else {
            write!(f, "{} ({})", name, msg)
        }
    }
}

/// Conversions for libcamera's "negative errno on failure" convention.
pub mod errno {
    use super::{Error, Result};

    /// Maps `0` to `Ok(())` and any other value to [`Error::Errno`].
    pub fn ok_if_zero(op: &'static str, ret: i32) -> Result<()> {
        if ret == 0 {
            Ok(())
        } else {
            Err(Error::Errno {
                op,
                errno: ret.saturating_abs(),
            })
        }
    }

    /// Maps non-negative values through and negative values to [`Error::Errno`].
    pub fn to_result(op: &'static str, ret: i32) -> Result<u32> {
        if ret >= 0 {
            Ok(ret as u32)
        } else {
            Err(Error::Errno {
                op,
                errno: ret.saturating_abs(),
            })
        }
    }

    /// Builds the error a native call would have returned for `errno`.
    pub fn err<T>(op: &'static str, errno: i32) -> Result<T> {
        Err(Error::Errno { op, errno })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_codes_become_errno() {
        assert!(errno::ok_if_zero("acquire", 0).is_ok());
        let err = errno::ok_if_zero("acquire", -libc::EBUSY).unwrap_err();
        assert_eq!(err.errno(), Some(libc::EBUSY));
        assert!(err.to_string().starts_with("acquire failed: EBUSY"));

        assert_eq!(errno::to_result("allocate", 4).unwrap(), 4);
        assert_eq!(
            errno::to_result("allocate", -libc::ENOMEM)
                .unwrap_err()
                .errno(),
            Some(libc::ENOMEM)
        );
    }

    #[test]
    fn unknown_errno_is_rendered_numerically() {
        let err = Error::Errno {
            op: "start",
            errno: 4095,
        };
        assert!(err.to_string().contains("errno 4095"));
    }
}
