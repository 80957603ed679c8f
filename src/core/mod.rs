/*!
 * Core Module
 * Shared types, errors, and configuration
 */

pub mod config;
pub mod errno;
pub mod types;

pub use config::ShimConfig;
pub use errno::{clear_errno, errno, set_errno, Errno, SysResult};
pub use types::{
    DirEntry, Fd, FdStat, FileKind, FileStat, FsStats, BACKEND_FD_FLOOR,
};
