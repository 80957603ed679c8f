/*!
 * Errno
 * POSIX error codes and the per-thread errno channel
 */

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use thiserror::Error;

/// Shim operation result
///
/// # Must Use
/// Filesystem operations can fail and must be handled
#[must_use = "filesystem operations can fail and must be handled"]
pub type SysResult<T> = Result<T, Errno>;

/// Error codes surfaced by the shim.
///
/// Numeric values are identical to POSIX errno, so a code can cross the
/// syscall boundary unchanged. "Success" has no variant; success is the
/// `Ok` arm of [`SysResult`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum Errno {
    #[error("operation not permitted")]
    Perm = 1,
    #[error("no such file or directory")]
    NoEnt = 2,
    #[error("input/output error")]
    Io = 5,
    #[error("bad file descriptor")]
    BadFd = 9,
    #[error("permission denied")]
    Acces = 13,
    #[error("file exists")]
    Exist = 17,
    #[error("cross-device link")]
    XDev = 18,
    #[error("not a directory")]
    NotDir = 20,
    #[error("is a directory")]
    IsDir = 21,
    #[error("invalid argument")]
    Inval = 22,
    #[error("too many open files")]
    MFile = 24,
    #[error("inappropriate ioctl for device")]
    NoTty = 25,
    #[error("file too large")]
    FBig = 27,
    #[error("no space left on device")]
    NoSpc = 28,
    #[error("illegal seek")]
    SPipe = 29,
    #[error("read-only file system")]
    RoFs = 30,
    #[error("file name too long")]
    NameTooLong = 36,
    #[error("function not implemented")]
    NoSys = 38,
    #[error("directory not empty")]
    NotEmpty = 39,
    #[error("operation not supported")]
    NotSup = 95,
}

impl Errno {
    /// Raw POSIX errno value
    #[inline]
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self as i32
    }

    /// Map a raw OS error code back to a known variant
    #[must_use]
    pub const fn from_raw(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Perm),
            2 => Some(Self::NoEnt),
            5 => Some(Self::Io),
            9 => Some(Self::BadFd),
            13 => Some(Self::Acces),
            17 => Some(Self::Exist),
            18 => Some(Self::XDev),
            20 => Some(Self::NotDir),
            21 => Some(Self::IsDir),
            22 => Some(Self::Inval),
            24 => Some(Self::MFile),
            25 => Some(Self::NoTty),
            27 => Some(Self::FBig),
            28 => Some(Self::NoSpc),
            29 => Some(Self::SPipe),
            30 => Some(Self::RoFs),
            36 => Some(Self::NameTooLong),
            38 => Some(Self::NoSys),
            39 => Some(Self::NotEmpty),
            95 => Some(Self::NotSup),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Errno {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;

        if let Some(code) = e.raw_os_error() {
            if let Some(errno) = Self::from_raw(code) {
                return errno;
            }
        }
        match e.kind() {
            ErrorKind::NotFound => Self::NoEnt,
            ErrorKind::PermissionDenied => Self::Acces,
            ErrorKind::AlreadyExists => Self::Exist,
            ErrorKind::InvalidInput => Self::Inval,
            _ => Self::Io,
        }
    }
}

thread_local! {
    static ERRNO: Cell<i32> = const { Cell::new(0) };
}

/// Last error code recorded on the calling thread (POSIX errno convention)
pub fn errno() -> i32 {
    ERRNO.with(|e| e.get())
}

/// Record an error code on the calling thread.
///
/// Written only by the thread making the syscall; the event loop never
/// touches this channel.
pub fn set_errno(err: Errno) {
    ERRNO.with(|e| e.set(err.as_raw()));
}

/// Reset the calling thread's error code
pub fn clear_errno() {
    ERRNO.with(|e| e.set(0));
}
