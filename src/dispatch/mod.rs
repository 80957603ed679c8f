/*!
 * Syscall Dispatcher
 * Table-driven front end routing calls to the backend or the fallback
 */

mod opcode;
mod path;

pub use opcode::{Opcode, RouteKind};
pub use path::is_backend_path;

use log::{trace, warn};
use std::sync::Arc;

use crate::bridge::{Bridge, CallResult, Launcher, Reply};
use crate::core::errno::set_errno;
use crate::core::types::{DirEntry, Fd, FdStat, FileStat, FsStats};
use crate::core::{Errno, ShimConfig, SysResult};
use crate::fallback::FallbackFs;
use crate::registry::FdRegistry;

/// Routing decision for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Backend,
    Fallback,
}

/// POSIX syscall front end.
///
/// Classifies each call by path prefix or descriptor provenance and
/// executes it on the async backend (through the bridge) or on the
/// synchronous fallback. Every method follows the POSIX return
/// convention: `-1` with the thread-local errno on failure, a
/// zero-or-positive value on success.
pub struct Dispatcher {
    bridge: Bridge,
    fallback: Arc<dyn FallbackFs>,
    registry: FdRegistry,
    prefix: String,
}

impl Dispatcher {
    pub fn new(bridge: Bridge, fallback: Arc<dyn FallbackFs>, config: ShimConfig) -> Self {
        Self {
            bridge,
            fallback,
            registry: FdRegistry::new(),
            prefix: config.backend_prefix,
        }
    }

    /// Registry of backend-owned descriptors
    pub fn registry(&self) -> &FdRegistry {
        &self.registry
    }

    /// The configured backend prefix
    pub fn backend_prefix(&self) -> &str {
        &self.prefix
    }

    fn route_path(&self, path: &str) -> Route {
        if is_backend_path(&self.prefix, path) {
            Route::Backend
        } else {
            Route::Fallback
        }
    }

    fn route_fd(&self, fd: Fd) -> Route {
        if self.registry.contains(fd) {
            Route::Backend
        } else {
            Route::Fallback
        }
    }

    fn bridged(&self, launcher: Launcher) -> CallResult {
        self.bridge.run(launcher)
    }

    /// Map a unit-style result to 0 / -1
    fn unit(&self, result: SysResult<()>) -> i32 {
        match result {
            Ok(()) => 0,
            Err(err) => fail_i32(err),
        }
    }

    /// Map a bridged unit-style result to 0 / -1
    fn bridged_unit(&self, launcher: Launcher) -> i32 {
        match self.bridged(launcher) {
            Ok(_) => 0,
            Err(err) => fail_i32(err),
        }
    }

    // ------------------------------------------------------------------
    // Path-routed operations
    // ------------------------------------------------------------------

    /// open(2). A backend descriptor is registered before this returns,
    /// so a following FD-routed call sees consistent membership.
    pub fn open(&self, path: &str, flags: i32, mode: u32) -> Fd {
        match self.route_path(path) {
            Route::Backend => {
                trace!("open {} -> backend", path);
                let owned = path.to_string();
                let result = self.bridged(Box::new(move |backend| {
                    Box::pin(async move { backend.open(owned, flags, mode).await.map(Reply::Fd) })
                }));
                match result {
                    Ok(Reply::Fd(fd)) => {
                        self.registry.insert(fd);
                        fd
                    }
                    Ok(_) => fail_i32(Errno::Io),
                    Err(err) => fail_i32(err),
                }
            }
            Route::Fallback => {
                trace!("open {} -> fallback", path);
                match self.fallback.open(path, flags, mode) {
                    Ok(fd) => fd,
                    Err(err) => fail_i32(err),
                }
            }
        }
    }

    pub fn unlink(&self, path: &str) -> i32 {
        match self.route_path(path) {
            Route::Backend => {
                let owned = path.to_string();
                self.bridged_unit(Box::new(move |backend| {
                    Box::pin(async move { backend.unlink(owned).await.map(|()| Reply::Unit) })
                }))
            }
            Route::Fallback => self.unit(self.fallback.unlink(path)),
        }
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> i32 {
        match self.route_path(path) {
            Route::Backend => {
                let owned = path.to_string();
                self.bridged_unit(Box::new(move |backend| {
                    Box::pin(async move { backend.mkdir(owned, mode).await.map(|()| Reply::Unit) })
                }))
            }
            Route::Fallback => self.unit(self.fallback.mkdir(path, mode)),
        }
    }

    pub fn rmdir(&self, path: &str) -> i32 {
        match self.route_path(path) {
            Route::Backend => {
                let owned = path.to_string();
                self.bridged_unit(Box::new(move |backend| {
                    Box::pin(async move { backend.rmdir(owned).await.map(|()| Reply::Unit) })
                }))
            }
            Route::Fallback => self.unit(self.fallback.rmdir(path)),
        }
    }

    pub fn chmod(&self, path: &str, mode: u32) -> i32 {
        match self.route_path(path) {
            Route::Backend => {
                let owned = path.to_string();
                self.bridged_unit(Box::new(move |backend| {
                    Box::pin(async move { backend.chmod(owned, mode).await.map(|()| Reply::Unit) })
                }))
            }
            Route::Fallback => self.unit(self.fallback.chmod(path, mode)),
        }
    }

    pub fn chown(&self, path: &str, uid: u32, gid: u32) -> i32 {
        match self.route_path(path) {
            Route::Backend => {
                let owned = path.to_string();
                self.bridged_unit(Box::new(move |backend| {
                    Box::pin(
                        async move { backend.chown(owned, uid, gid).await.map(|()| Reply::Unit) },
                    )
                }))
            }
            Route::Fallback => self.unit(self.fallback.chown(path, uid, gid)),
        }
    }

    pub fn lchown(&self, path: &str, uid: u32, gid: u32) -> i32 {
        match self.route_path(path) {
            Route::Backend => {
                let owned = path.to_string();
                self.bridged_unit(Box::new(move |backend| {
                    Box::pin(
                        async move { backend.lchown(owned, uid, gid).await.map(|()| Reply::Unit) },
                    )
                }))
            }
            Route::Fallback => self.unit(self.fallback.lchown(path, uid, gid)),
        }
    }

    pub fn access(&self, path: &str, amode: i32) -> i32 {
        match self.route_path(path) {
            Route::Backend => {
                let owned = path.to_string();
                self.bridged_unit(Box::new(move |backend| {
                    Box::pin(
                        async move { backend.access(owned, amode).await.map(|()| Reply::Unit) },
                    )
                }))
            }
            Route::Fallback => self.unit(self.fallback.access(path, amode)),
        }
    }

    /// readlink(2); the target is copied into `buf`, truncated to fit
    pub fn readlink(&self, path: &str, buf: &mut [u8]) -> isize {
        match self.route_path(path) {
            Route::Backend => {
                let owned = path.to_string();
                let result = self.bridged(Box::new(move |backend| {
                    Box::pin(async move { backend.readlink(owned).await.map(Reply::Bytes) })
                }));
                copy_out(result, buf)
            }
            Route::Fallback => copy_out(self.fallback.readlink(path).map(Reply::Bytes), buf),
        }
    }

    pub fn stat(&self, path: &str, out: &mut FileStat) -> i32 {
        match self.route_path(path) {
            Route::Backend => {
                let owned = path.to_string();
                let result = self.bridged(Box::new(move |backend| {
                    Box::pin(async move { backend.stat(owned).await.map(Reply::Stat) })
                }));
                stat_out(result, out)
            }
            Route::Fallback => match self.fallback.stat(path) {
                Ok(stat) => {
                    *out = stat;
                    0
                }
                Err(err) => fail_i32(err),
            },
        }
    }

    pub fn lstat(&self, path: &str, out: &mut FileStat) -> i32 {
        match self.route_path(path) {
            Route::Backend => {
                let owned = path.to_string();
                let result = self.bridged(Box::new(move |backend| {
                    Box::pin(async move { backend.lstat(owned).await.map(Reply::Stat) })
                }));
                stat_out(result, out)
            }
            Route::Fallback => match self.fallback.lstat(path) {
                Ok(stat) => {
                    *out = stat;
                    0
                }
                Err(err) => fail_i32(err),
            },
        }
    }

    pub fn statfs(&self, path: &str, out: &mut FsStats) -> i32 {
        match self.route_path(path) {
            Route::Backend => {
                let owned = path.to_string();
                let result = self.bridged(Box::new(move |backend| {
                    Box::pin(async move { backend.statfs(owned).await.map(Reply::StatFs) })
                }));
                statfs_out(result, out)
            }
            Route::Fallback => match self.fallback.statfs(path) {
                Ok(stats) => {
                    *out = stats;
                    0
                }
                Err(err) => fail_i32(err),
            },
        }
    }

    pub fn truncate(&self, path: &str, len: i64) -> i32 {
        if len < 0 {
            return fail_i32(Errno::Inval);
        }
        let len = len as u64;
        match self.route_path(path) {
            Route::Backend => {
                let owned = path.to_string();
                self.bridged_unit(Box::new(move |backend| {
                    Box::pin(
                        async move { backend.truncate(owned, len).await.map(|()| Reply::Unit) },
                    )
                }))
            }
            Route::Fallback => self.unit(self.fallback.truncate(path, len)),
        }
    }

    pub fn chdir(&self, path: &str) -> i32 {
        match self.route_path(path) {
            Route::Backend => {
                let owned = path.to_string();
                self.bridged_unit(Box::new(move |backend| {
                    Box::pin(async move { backend.chdir(owned).await.map(|()| Reply::Unit) })
                }))
            }
            Route::Fallback => self.unit(self.fallback.chdir(path)),
        }
    }

    pub fn mknod(&self, path: &str, mode: u32, dev: u64) -> i32 {
        match self.route_path(path) {
            Route::Backend => {
                let owned = path.to_string();
                self.bridged_unit(Box::new(move |backend| {
                    Box::pin(
                        async move { backend.mknod(owned, mode, dev).await.map(|()| Reply::Unit) },
                    )
                }))
            }
            Route::Fallback => self.unit(self.fallback.mknod(path, mode, dev)),
        }
    }

    /// rename(2). Both operands are classified independently; a rename
    /// that straddles the backend/fallback boundary is refused.
    pub fn rename(&self, old: &str, new: &str) -> i32 {
        match (self.route_path(old), self.route_path(new)) {
            (Route::Backend, Route::Backend) => {
                let old_owned = old.to_string();
                let new_owned = new.to_string();
                self.bridged_unit(Box::new(move |backend| {
                    Box::pin(async move {
                        backend
                            .rename(old_owned, new_owned)
                            .await
                            .map(|()| Reply::Unit)
                    })
                }))
            }
            (Route::Fallback, Route::Fallback) => self.unit(self.fallback.rename(old, new)),
            _ => {
                warn!("rename {} -> {} straddles filesystems", old, new);
                fail_i32(Errno::XDev)
            }
        }
    }

    // ------------------------------------------------------------------
    // FD-routed operations
    // ------------------------------------------------------------------

    pub fn read(&self, fd: Fd, buf: &mut [u8]) -> isize {
        match self.route_fd(fd) {
            Route::Backend => {
                let len = buf.len();
                let result = self.bridged(Box::new(move |backend| {
                    Box::pin(async move { backend.read(fd, len).await.map(Reply::Bytes) })
                }));
                copy_out(result, buf)
            }
            Route::Fallback => match self.fallback.read(fd, buf) {
                Ok(n) => n as isize,
                Err(err) => fail_isize(err),
            },
        }
    }

    pub fn write(&self, fd: Fd, buf: &[u8]) -> isize {
        match self.route_fd(fd) {
            Route::Backend => {
                let data = buf.to_vec();
                let result = self.bridged(Box::new(move |backend| {
                    Box::pin(async move { backend.write(fd, data).await.map(Reply::Size) })
                }));
                size_out(result)
            }
            Route::Fallback => match self.fallback.write(fd, buf) {
                Ok(n) => n as isize,
                Err(err) => fail_isize(err),
            },
        }
    }

    pub fn pread(&self, fd: Fd, buf: &mut [u8], offset: u64) -> isize {
        match self.route_fd(fd) {
            Route::Backend => {
                let len = buf.len();
                let result = self.bridged(Box::new(move |backend| {
                    Box::pin(async move { backend.pread(fd, len, offset).await.map(Reply::Bytes) })
                }));
                copy_out(result, buf)
            }
            Route::Fallback => match self.fallback.pread(fd, buf, offset) {
                Ok(n) => n as isize,
                Err(err) => fail_isize(err),
            },
        }
    }

    pub fn pwrite(&self, fd: Fd, buf: &[u8], offset: u64) -> isize {
        match self.route_fd(fd) {
            Route::Backend => {
                let data = buf.to_vec();
                let result = self.bridged(Box::new(move |backend| {
                    Box::pin(
                        async move { backend.pwrite(fd, data, offset).await.map(Reply::Size) },
                    )
                }));
                size_out(result)
            }
            Route::Fallback => match self.fallback.pwrite(fd, buf, offset) {
                Ok(n) => n as isize,
                Err(err) => fail_isize(err),
            },
        }
    }

    pub fn lseek(&self, fd: Fd, offset: i64, whence: i32) -> i64 {
        match self.route_fd(fd) {
            Route::Backend => {
                let result = self.bridged(Box::new(move |backend| {
                    Box::pin(async move { backend.seek(fd, offset, whence).await.map(Reply::Offset) })
                }));
                match result {
                    Ok(Reply::Offset(pos)) => pos as i64,
                    Ok(_) => fail_i64(Errno::Io),
                    Err(err) => fail_i64(err),
                }
            }
            Route::Fallback => match self.fallback.seek(fd, offset, whence) {
                Ok(pos) => pos as i64,
                Err(err) => fail_i64(err),
            },
        }
    }

    /// close(2). The registry entry is dropped only on backend success;
    /// a failed close leaves the descriptor registered for retry.
    pub fn close(&self, fd: Fd) -> i32 {
        match self.route_fd(fd) {
            Route::Backend => {
                let result = self.bridged(Box::new(move |backend| {
                    Box::pin(async move { backend.close(fd).await.map(|()| Reply::Unit) })
                }));
                match result {
                    Ok(_) => {
                        self.registry.remove(fd);
                        0
                    }
                    Err(err) => fail_i32(err),
                }
            }
            Route::Fallback => self.unit(self.fallback.close(fd)),
        }
    }

    pub fn fdstat_get(&self, fd: Fd, out: &mut FdStat) -> i32 {
        match self.route_fd(fd) {
            Route::Backend => {
                let result = self.bridged(Box::new(move |backend| {
                    Box::pin(async move { backend.fdstat_get(fd).await.map(Reply::FdStat) })
                }));
                match result {
                    Ok(Reply::FdStat(stat)) => {
                        *out = stat;
                        0
                    }
                    Ok(_) => fail_i32(Errno::Io),
                    Err(err) => fail_i32(err),
                }
            }
            Route::Fallback => match self.fallback.fdstat_get(fd) {
                Ok(stat) => {
                    *out = stat;
                    0
                }
                Err(err) => fail_i32(err),
            },
        }
    }

    pub fn fsync(&self, fd: Fd) -> i32 {
        match self.route_fd(fd) {
            Route::Backend => self.bridged_unit(Box::new(move |backend| {
                Box::pin(async move { backend.sync(fd).await.map(|()| Reply::Unit) })
            })),
            Route::Fallback => self.unit(self.fallback.sync(fd)),
        }
    }

    pub fn fdatasync(&self, fd: Fd) -> i32 {
        match self.route_fd(fd) {
            Route::Backend => self.bridged_unit(Box::new(move |backend| {
                Box::pin(async move { backend.fdatasync(fd).await.map(|()| Reply::Unit) })
            })),
            Route::Fallback => self.unit(self.fallback.fdatasync(fd)),
        }
    }

    pub fn fstat(&self, fd: Fd, out: &mut FileStat) -> i32 {
        match self.route_fd(fd) {
            Route::Backend => {
                let result = self.bridged(Box::new(move |backend| {
                    Box::pin(async move { backend.fstat(fd).await.map(Reply::Stat) })
                }));
                stat_out(result, out)
            }
            Route::Fallback => match self.fallback.fstat(fd) {
                Ok(stat) => {
                    *out = stat;
                    0
                }
                Err(err) => fail_i32(err),
            },
        }
    }

    pub fn fchmod(&self, fd: Fd, mode: u32) -> i32 {
        match self.route_fd(fd) {
            Route::Backend => self.bridged_unit(Box::new(move |backend| {
                Box::pin(async move { backend.fchmod(fd, mode).await.map(|()| Reply::Unit) })
            })),
            Route::Fallback => self.unit(self.fallback.fchmod(fd, mode)),
        }
    }

    pub fn fchown(&self, fd: Fd, uid: u32, gid: u32) -> i32 {
        match self.route_fd(fd) {
            Route::Backend => self.bridged_unit(Box::new(move |backend| {
                Box::pin(async move { backend.fchown(fd, uid, gid).await.map(|()| Reply::Unit) })
            })),
            Route::Fallback => self.unit(self.fallback.fchown(fd, uid, gid)),
        }
    }

    pub fn ftruncate(&self, fd: Fd, len: i64) -> i32 {
        if len < 0 {
            return fail_i32(Errno::Inval);
        }
        let len = len as u64;
        match self.route_fd(fd) {
            Route::Backend => self.bridged_unit(Box::new(move |backend| {
                Box::pin(async move { backend.ftruncate(fd, len).await.map(|()| Reply::Unit) })
            })),
            Route::Fallback => self.unit(self.fallback.ftruncate(fd, len)),
        }
    }

    pub fn fallocate(&self, fd: Fd, mode: i32, offset: i64, len: i64) -> i32 {
        if offset < 0 || len <= 0 {
            return fail_i32(Errno::Inval);
        }
        let (offset, len) = (offset as u64, len as u64);
        match self.route_fd(fd) {
            Route::Backend => self.bridged_unit(Box::new(move |backend| {
                Box::pin(async move {
                    backend
                        .fallocate(fd, mode, offset, len)
                        .await
                        .map(|()| Reply::Unit)
                })
            })),
            Route::Fallback => self.unit(self.fallback.fallocate(fd, mode, offset, len)),
        }
    }

    /// fcntl(2); the trailing variadic argument arrives as one opaque
    /// integer and is forwarded verbatim
    pub fn fcntl(&self, fd: Fd, cmd: i32, arg: i64) -> i32 {
        match self.route_fd(fd) {
            Route::Backend => {
                let result = self.bridged(Box::new(move |backend| {
                    Box::pin(async move { backend.fcntl(fd, cmd, arg).await.map(Reply::Int) })
                }));
                int_out(result)
            }
            Route::Fallback => match self.fallback.fcntl(fd, cmd, arg) {
                Ok(value) => value as i32,
                Err(err) => fail_i32(err),
            },
        }
    }

    /// ioctl(2); the trailing variadic argument arrives as one opaque
    /// integer and is forwarded verbatim
    pub fn ioctl(&self, fd: Fd, request: u64, arg: u64) -> i32 {
        match self.route_fd(fd) {
            Route::Backend => {
                let result = self.bridged(Box::new(move |backend| {
                    Box::pin(async move { backend.ioctl(fd, request, arg).await.map(Reply::Int) })
                }));
                int_out(result)
            }
            Route::Fallback => match self.fallback.ioctl(fd, request, arg) {
                Ok(value) => value as i32,
                Err(err) => fail_i32(err),
            },
        }
    }

    /// Read up to `max_entries` directory entries from an open directory.
    /// Returns the number appended to `out`; 0 signals end-of-stream.
    pub fn getdents(&self, fd: Fd, out: &mut Vec<DirEntry>, max_entries: usize) -> isize {
        match self.route_fd(fd) {
            Route::Backend => {
                let result = self.bridged(Box::new(move |backend| {
                    Box::pin(
                        async move { backend.getdents(fd, max_entries).await.map(Reply::Entries) },
                    )
                }));
                match result {
                    Ok(Reply::Entries(mut entries)) => {
                        let n = entries.len();
                        out.append(&mut entries);
                        n as isize
                    }
                    Ok(_) => fail_isize(Errno::Io),
                    Err(err) => fail_isize(err),
                }
            }
            Route::Fallback => match self.fallback.getdents(fd, max_entries) {
                Ok(mut entries) => {
                    let n = entries.len();
                    out.append(&mut entries);
                    n as isize
                }
                Err(err) => fail_isize(err),
            },
        }
    }

    pub fn fchdir(&self, fd: Fd) -> i32 {
        match self.route_fd(fd) {
            Route::Backend => self.bridged_unit(Box::new(move |backend| {
                Box::pin(async move { backend.fchdir(fd).await.map(|()| Reply::Unit) })
            })),
            Route::Fallback => self.unit(self.fallback.fchdir(fd)),
        }
    }

    pub fn fstatfs(&self, fd: Fd, out: &mut FsStats) -> i32 {
        match self.route_fd(fd) {
            Route::Backend => {
                let result = self.bridged(Box::new(move |backend| {
                    Box::pin(async move { backend.fstatfs(fd).await.map(Reply::StatFs) })
                }));
                statfs_out(result, out)
            }
            Route::Fallback => match self.fallback.fstatfs(fd) {
                Ok(stats) => {
                    *out = stats;
                    0
                }
                Err(err) => fail_i32(err),
            },
        }
    }
}

fn fail_i32(err: Errno) -> i32 {
    set_errno(err);
    -1
}

fn fail_i64(err: Errno) -> i64 {
    set_errno(err);
    -1
}

fn fail_isize(err: Errno) -> isize {
    set_errno(err);
    -1
}

/// Copy a byte reply into the caller's buffer, POSIX-style
fn copy_out(result: CallResult, buf: &mut [u8]) -> isize {
    match result {
        Ok(Reply::Bytes(data)) => {
            let n = data.len().min(buf.len());
            buf[..n].copy_from_slice(&data[..n]);
            n as isize
        }
        Ok(_) => fail_isize(Errno::Io),
        Err(err) => fail_isize(err),
    }
}

fn size_out(result: CallResult) -> isize {
    match result {
        Ok(Reply::Size(n)) => n as isize,
        Ok(_) => fail_isize(Errno::Io),
        Err(err) => fail_isize(err),
    }
}

fn int_out(result: CallResult) -> i32 {
    match result {
        Ok(Reply::Int(value)) => value as i32,
        Ok(_) => fail_i32(Errno::Io),
        Err(err) => fail_i32(err),
    }
}

fn stat_out(result: CallResult, out: &mut FileStat) -> i32 {
    match result {
        Ok(Reply::Stat(stat)) => {
            *out = stat;
            0
        }
        Ok(_) => fail_i32(Errno::Io),
        Err(err) => fail_i32(err),
    }
}

fn statfs_out(result: CallResult, out: &mut FsStats) -> i32 {
    match result {
        Ok(Reply::StatFs(stats)) => {
            *out = stats;
            0
        }
        Ok(_) => fail_i32(Errno::Io),
        Err(err) => fail_i32(err),
    }
}
