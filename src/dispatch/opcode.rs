/*!
 * Syscall Table
 * Every operation the shim intercepts, expressed as data
 */

/// How an operation's routing decision is keyed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// Routed by the leading path component
    Path,
    /// Routed by FD Registry membership
    Fd,
    /// Both operands classified independently (rename)
    TwoPath,
}

/// The operations the shim intercepts.
///
/// The table exists so routing can be audited as data: every opcode has a
/// name and a route kind, and tests walk [`Opcode::ALL`] to check the
/// classification stays total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Path-routed
    Open,
    Unlink,
    Mkdir,
    Rmdir,
    Chmod,
    Chown,
    Lchown,
    Access,
    Readlink,
    Stat,
    Lstat,
    StatFs,
    Truncate,
    Chdir,
    Mknod,
    // Two-path
    Rename,
    // FD-routed
    Read,
    Write,
    Pread,
    Pwrite,
    Seek,
    Close,
    FdStatGet,
    Fsync,
    Fdatasync,
    Fstat,
    Fchmod,
    Fchown,
    Ftruncate,
    Fallocate,
    Fcntl,
    Ioctl,
    Getdents,
    Fchdir,
    FstatFs,
}

impl Opcode {
    pub const ALL: &'static [Opcode] = &[
        Opcode::Open,
        Opcode::Unlink,
        Opcode::Mkdir,
        Opcode::Rmdir,
        Opcode::Chmod,
        Opcode::Chown,
        Opcode::Lchown,
        Opcode::Access,
        Opcode::Readlink,
        Opcode::Stat,
        Opcode::Lstat,
        Opcode::StatFs,
        Opcode::Truncate,
        Opcode::Chdir,
        Opcode::Mknod,
        Opcode::Rename,
        Opcode::Read,
        Opcode::Write,
        Opcode::Pread,
        Opcode::Pwrite,
        Opcode::Seek,
        Opcode::Close,
        Opcode::FdStatGet,
        Opcode::Fsync,
        Opcode::Fdatasync,
        Opcode::Fstat,
        Opcode::Fchmod,
        Opcode::Fchown,
        Opcode::Ftruncate,
        Opcode::Fallocate,
        Opcode::Fcntl,
        Opcode::Ioctl,
        Opcode::Getdents,
        Opcode::Fchdir,
        Opcode::FstatFs,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Opcode::Open => "open",
            Opcode::Unlink => "unlink",
            Opcode::Mkdir => "mkdir",
            Opcode::Rmdir => "rmdir",
            Opcode::Chmod => "chmod",
            Opcode::Chown => "chown",
            Opcode::Lchown => "lchown",
            Opcode::Access => "access",
            Opcode::Readlink => "readlink",
            Opcode::Stat => "stat",
            Opcode::Lstat => "lstat",
            Opcode::StatFs => "statfs",
            Opcode::Truncate => "truncate",
            Opcode::Chdir => "chdir",
            Opcode::Mknod => "mknod",
            Opcode::Rename => "rename",
            Opcode::Read => "read",
            Opcode::Write => "write",
            Opcode::Pread => "pread",
            Opcode::Pwrite => "pwrite",
            Opcode::Seek => "lseek",
            Opcode::Close => "close",
            Opcode::FdStatGet => "fdstat_get",
            Opcode::Fsync => "fsync",
            Opcode::Fdatasync => "fdatasync",
            Opcode::Fstat => "fstat",
            Opcode::Fchmod => "fchmod",
            Opcode::Fchown => "fchown",
            Opcode::Ftruncate => "ftruncate",
            Opcode::Fallocate => "fallocate",
            Opcode::Fcntl => "fcntl",
            Opcode::Ioctl => "ioctl",
            Opcode::Getdents => "getdents",
            Opcode::Fchdir => "fchdir",
            Opcode::FstatFs => "fstatfs",
        }
    }

    pub const fn route_kind(self) -> RouteKind {
        match self {
            Opcode::Rename => RouteKind::TwoPath,
            Opcode::Open
            | Opcode::Unlink
            | Opcode::Mkdir
            | Opcode::Rmdir
            | Opcode::Chmod
            | Opcode::Chown
            | Opcode::Lchown
            | Opcode::Access
            | Opcode::Readlink
            | Opcode::Stat
            | Opcode::Lstat
            | Opcode::StatFs
            | Opcode::Truncate
            | Opcode::Chdir
            | Opcode::Mknod => RouteKind::Path,
            _ => RouteKind::Fd,
        }
    }
}
