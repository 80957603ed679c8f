/*!
 * Async Backend Contract
 * Primitives the event loop invokes on behalf of bridged syscalls
 */

mod memory;

pub use memory::MemBackend;

use futures::future::LocalBoxFuture;

use crate::core::types::{DirEntry, Fd, FdStat, FileStat, FsStats};
use crate::core::SysResult;

/// Asynchronous storage backend.
///
/// Implementations live on the event-loop thread and are never touched
/// from user threads, so they do not need to be `Send`; methods return
/// loop-local futures and may borrow `self` across suspension points.
/// Paths arrive as owned strings captured on the submitting thread and
/// include the backend prefix; `.` and `..` components are passed through
/// for the backend to resolve.
///
/// Every future resolves exactly once. There is no cancellation: once a
/// primitive is started, the bridge waits for it to complete.
pub trait AsyncBackend {
    /// One-time initialization, driven lazily by the bridge ahead of the
    /// first real job.
    fn init(&self) -> LocalBoxFuture<'_, SysResult<()>>;

    // FD I/O

    fn read(&self, fd: Fd, len: usize) -> LocalBoxFuture<'_, SysResult<Vec<u8>>>;
    fn write(&self, fd: Fd, data: Vec<u8>) -> LocalBoxFuture<'_, SysResult<usize>>;
    fn pread(&self, fd: Fd, len: usize, offset: u64) -> LocalBoxFuture<'_, SysResult<Vec<u8>>>;
    fn pwrite(&self, fd: Fd, data: Vec<u8>, offset: u64) -> LocalBoxFuture<'_, SysResult<usize>>;
    fn seek(&self, fd: Fd, offset: i64, whence: i32) -> LocalBoxFuture<'_, SysResult<u64>>;
    fn close(&self, fd: Fd) -> LocalBoxFuture<'_, SysResult<()>>;
    fn fdstat_get(&self, fd: Fd) -> LocalBoxFuture<'_, SysResult<FdStat>>;
    fn sync(&self, fd: Fd) -> LocalBoxFuture<'_, SysResult<()>>;
    fn fdatasync(&self, fd: Fd) -> LocalBoxFuture<'_, SysResult<()>>;

    // FD metadata

    fn fstat(&self, fd: Fd) -> LocalBoxFuture<'_, SysResult<FileStat>>;
    fn fchmod(&self, fd: Fd, mode: u32) -> LocalBoxFuture<'_, SysResult<()>>;
    fn fchown(&self, fd: Fd, uid: u32, gid: u32) -> LocalBoxFuture<'_, SysResult<()>>;
    fn ftruncate(&self, fd: Fd, len: u64) -> LocalBoxFuture<'_, SysResult<()>>;
    fn fallocate(
        &self,
        fd: Fd,
        mode: i32,
        offset: u64,
        len: u64,
    ) -> LocalBoxFuture<'_, SysResult<()>>;
    fn fcntl(&self, fd: Fd, cmd: i32, arg: i64) -> LocalBoxFuture<'_, SysResult<i64>>;
    fn ioctl(&self, fd: Fd, request: u64, arg: u64) -> LocalBoxFuture<'_, SysResult<i64>>;

    // Directory

    fn getdents(&self, fd: Fd, max_entries: usize)
        -> LocalBoxFuture<'_, SysResult<Vec<DirEntry>>>;
    fn fchdir(&self, fd: Fd) -> LocalBoxFuture<'_, SysResult<()>>;

    // Path

    fn open(&self, path: String, flags: i32, mode: u32) -> LocalBoxFuture<'_, SysResult<Fd>>;
    fn unlink(&self, path: String) -> LocalBoxFuture<'_, SysResult<()>>;
    fn mkdir(&self, path: String, mode: u32) -> LocalBoxFuture<'_, SysResult<()>>;
    fn rmdir(&self, path: String) -> LocalBoxFuture<'_, SysResult<()>>;
    fn chmod(&self, path: String, mode: u32) -> LocalBoxFuture<'_, SysResult<()>>;
    fn chown(&self, path: String, uid: u32, gid: u32) -> LocalBoxFuture<'_, SysResult<()>>;
    fn lchown(&self, path: String, uid: u32, gid: u32) -> LocalBoxFuture<'_, SysResult<()>>;
    fn access(&self, path: String, amode: i32) -> LocalBoxFuture<'_, SysResult<()>>;
    fn readlink(&self, path: String) -> LocalBoxFuture<'_, SysResult<Vec<u8>>>;
    fn stat(&self, path: String) -> LocalBoxFuture<'_, SysResult<FileStat>>;
    fn lstat(&self, path: String) -> LocalBoxFuture<'_, SysResult<FileStat>>;
    fn statfs(&self, path: String) -> LocalBoxFuture<'_, SysResult<FsStats>>;
    fn fstatfs(&self, fd: Fd) -> LocalBoxFuture<'_, SysResult<FsStats>>;
    fn truncate(&self, path: String, len: u64) -> LocalBoxFuture<'_, SysResult<()>>;
    fn chdir(&self, path: String) -> LocalBoxFuture<'_, SysResult<()>>;
    fn mknod(&self, path: String, mode: u32, dev: u64) -> LocalBoxFuture<'_, SysResult<()>>;
    fn rename(&self, old: String, new: String) -> LocalBoxFuture<'_, SysResult<()>>;
}
