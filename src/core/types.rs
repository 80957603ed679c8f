/*!
 * Shim Types
 * Descriptor, flag, and metadata types shared across the shim
 */

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// File descriptor in the shared backend/fallback integer space
pub type Fd = i32;

/// First descriptor value issued by the async backend.
///
/// The fallback allocates upward from 3, the backend upward from this
/// floor, so the two subsystems never collide in the shared descriptor
/// space. Routing consults the FD Registry, not the numeric range; the
/// ranges only keep the spaces disjoint.
pub const BACKEND_FD_FLOOR: Fd = 1 << 20;

/// Open flags (musl numbering, as delivered at the syscall boundary)
pub mod oflags {
    pub const O_RDONLY: i32 = 0o0;
    pub const O_WRONLY: i32 = 0o1;
    pub const O_RDWR: i32 = 0o2;
    pub const O_ACCMODE: i32 = 0o3;
    pub const O_CREAT: i32 = 0o100;
    pub const O_EXCL: i32 = 0o200;
    pub const O_TRUNC: i32 = 0o1000;
    pub const O_APPEND: i32 = 0o2000;
    pub const O_DIRECTORY: i32 = 0o200000;
}

/// Whence values for seek
pub mod whence {
    pub const SEEK_SET: i32 = 0;
    pub const SEEK_CUR: i32 = 1;
    pub const SEEK_END: i32 = 2;
}

/// fcntl commands the shim interprets; anything else is forwarded opaque
pub mod fcntl_cmd {
    pub const F_DUPFD: i32 = 0;
    pub const F_GETFD: i32 = 1;
    pub const F_SETFD: i32 = 2;
    pub const F_GETFL: i32 = 3;
    pub const F_SETFL: i32 = 4;
}

/// File type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    Unknown,
}

impl Default for FileKind {
    fn default() -> Self {
        Self::Unknown
    }
}

/// stat-style metadata for a file or directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStat {
    pub kind: FileKind,
    pub size: u64,
    /// Permission bits only; the type lives in `kind`
    pub mode: u32,
    pub modified: SystemTime,
    pub accessed: SystemTime,
    pub created: SystemTime,
}

impl FileStat {
    #[inline]
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    #[inline]
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }
}

impl Default for FileStat {
    fn default() -> Self {
        Self {
            kind: FileKind::Unknown,
            size: 0,
            mode: 0,
            modified: SystemTime::UNIX_EPOCH,
            accessed: SystemTime::UNIX_EPOCH,
            created: SystemTime::UNIX_EPOCH,
        }
    }
}

/// Descriptor-level metadata (fdstat_get)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FdStat {
    pub kind: FileKind,
    /// Open flags the descriptor was created with
    pub flags: i32,
}

/// Filesystem-level statistics (statfs)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsStats {
    pub block_size: u32,
    pub blocks: u64,
    pub blocks_free: u64,
    pub files: u64,
}

/// One directory entry as returned by getdents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileKind,
}

impl DirEntry {
    pub fn new<S: Into<String>>(name: S, kind: FileKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fd_floor_leaves_room_for_fallback() {
        assert!(BACKEND_FD_FLOOR > 3);
    }

    #[test]
    fn test_accmode_masks_access_bits() {
        assert_eq!(oflags::O_RDWR & oflags::O_ACCMODE, oflags::O_RDWR);
        assert_eq!(
            (oflags::O_WRONLY | oflags::O_CREAT | oflags::O_APPEND) & oflags::O_ACCMODE,
            oflags::O_WRONLY
        );
    }

    #[test]
    fn test_stat_kind_helpers() {
        let stat = FileStat {
            kind: FileKind::Directory,
            ..FileStat::default()
        };
        assert!(stat.is_dir());
        assert!(!stat.is_file());
    }
}
