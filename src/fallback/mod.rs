/*!
 * Fallback Filesystem
 * Synchronous filesystem used for non-backend paths
 */

mod local;

pub use local::LocalFallback;

use crate::core::types::{DirEntry, Fd, FdStat, FileStat, FsStats};
use crate::core::SysResult;

/// Synchronous POSIX filesystem covering the same operation surface as
/// the async backend. Shared by every user thread; descriptors it issues
/// stay below `BACKEND_FD_FLOOR`. An FD it has never issued yields
/// `Errno::BadFd`, including descriptors that once belonged to the
/// backend.
pub trait FallbackFs: Send + Sync {
    fn open(&self, path: &str, flags: i32, mode: u32) -> SysResult<Fd>;
    fn close(&self, fd: Fd) -> SysResult<()>;
    fn read(&self, fd: Fd, buf: &mut [u8]) -> SysResult<usize>;
    fn write(&self, fd: Fd, buf: &[u8]) -> SysResult<usize>;
    fn pread(&self, fd: Fd, buf: &mut [u8], offset: u64) -> SysResult<usize>;
    fn pwrite(&self, fd: Fd, buf: &[u8], offset: u64) -> SysResult<usize>;
    fn seek(&self, fd: Fd, offset: i64, whence: i32) -> SysResult<u64>;
    fn fdstat_get(&self, fd: Fd) -> SysResult<FdStat>;
    fn sync(&self, fd: Fd) -> SysResult<()>;
    fn fdatasync(&self, fd: Fd) -> SysResult<()>;
    fn fstat(&self, fd: Fd) -> SysResult<FileStat>;
    fn fchmod(&self, fd: Fd, mode: u32) -> SysResult<()>;
    fn fchown(&self, fd: Fd, uid: u32, gid: u32) -> SysResult<()>;
    fn ftruncate(&self, fd: Fd, len: u64) -> SysResult<()>;
    fn fallocate(&self, fd: Fd, mode: i32, offset: u64, len: u64) -> SysResult<()>;
    fn fcntl(&self, fd: Fd, cmd: i32, arg: i64) -> SysResult<i64>;
    fn ioctl(&self, fd: Fd, request: u64, arg: u64) -> SysResult<i64>;
    fn getdents(&self, fd: Fd, max_entries: usize) -> SysResult<Vec<DirEntry>>;
    fn fchdir(&self, fd: Fd) -> SysResult<()>;
    fn unlink(&self, path: &str) -> SysResult<()>;
    fn mkdir(&self, path: &str, mode: u32) -> SysResult<()>;
    fn rmdir(&self, path: &str) -> SysResult<()>;
    fn chmod(&self, path: &str, mode: u32) -> SysResult<()>;
    fn chown(&self, path: &str, uid: u32, gid: u32) -> SysResult<()>;
    fn lchown(&self, path: &str, uid: u32, gid: u32) -> SysResult<()>;
    fn access(&self, path: &str, amode: i32) -> SysResult<()>;
    fn readlink(&self, path: &str) -> SysResult<Vec<u8>>;
    fn stat(&self, path: &str) -> SysResult<FileStat>;
    fn lstat(&self, path: &str) -> SysResult<FileStat>;
    fn statfs(&self, path: &str) -> SysResult<FsStats>;
    fn fstatfs(&self, fd: Fd) -> SysResult<FsStats>;
    fn truncate(&self, path: &str, len: u64) -> SysResult<()>;
    fn chdir(&self, path: &str) -> SysResult<()>;
    fn mknod(&self, path: &str, mode: u32, dev: u64) -> SysResult<()>;
    fn rename(&self, old: &str, new: &str) -> SysResult<()>;
}
