/*!
 * In-Memory Async Backend
 * Loop-local storage backend for tests and demos
 */

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use log::trace;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use super::AsyncBackend;
use crate::core::types::{
    fcntl_cmd, oflags, whence, DirEntry, Fd, FdStat, FileKind, FileStat, FsStats,
    BACKEND_FD_FLOOR,
};
use crate::core::{Errno, SysResult};

const S_IFMT: u32 = 0o170000;
const S_IFREG: u32 = 0o100000;

/// In-memory filesystem node
#[derive(Debug, Clone)]
enum Node {
    File {
        data: Vec<u8>,
        mode: u32,
        modified: SystemTime,
        created: SystemTime,
    },
    Directory {
        mode: u32,
        created: SystemTime,
    },
}

/// Snapshot cursor for an open directory
struct DirCursor {
    entries: Vec<DirEntry>,
    next: usize,
}

/// State of one open descriptor
struct OpenState {
    path: String,
    flags: i32,
    pos: u64,
    dir: Option<DirCursor>,
}

/// In-memory implementation of the async backend contract.
///
/// Lives on the event-loop thread; interior mutability is single-threaded
/// by the backend contract, so plain `RefCell`/`Cell` suffice. Paths are
/// stored normalized (no leading separator, `.`/`..` resolved), keyed flat
/// in one map; directory listings are derived by prefix scan.
pub struct MemBackend {
    root: String,
    nodes: RefCell<HashMap<String, Node>>,
    open_files: RefCell<HashMap<Fd, OpenState>>,
    next_fd: Cell<Fd>,
    cwd: RefCell<String>,
    init_calls: Arc<AtomicU32>,
}

impl MemBackend {
    /// Create a backend whose root directory (normally the backend
    /// prefix) is created by `init`.
    pub fn new<S: Into<String>>(root: S) -> Self {
        let root = normalize(&root.into());
        Self {
            cwd: RefCell::new(root.clone()),
            root,
            nodes: RefCell::new(HashMap::new()),
            open_files: RefCell::new(HashMap::new()),
            next_fd: Cell::new(BACKEND_FD_FLOOR),
            init_calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Share the init-invocation counter with the constructing thread, so
    /// tests can observe init-once behavior from outside the loop.
    pub fn with_init_counter(mut self, counter: Arc<AtomicU32>) -> Self {
        self.init_calls = counter;
        self
    }

    /// Working directory as last set by chdir/fchdir
    pub fn current_dir(&self) -> String {
        self.cwd.borrow().clone()
    }

    fn alloc_fd(&self) -> Fd {
        let fd = self.next_fd.get();
        self.next_fd.set(fd + 1);
        fd
    }

    /// Parent directory must exist and be a directory. The empty string
    /// is the implicit root above the backend prefix.
    fn assert_parent_dir(&self, path: &str) -> SysResult<()> {
        let parent = parent_of(path);
        if parent.is_empty() {
            return Ok(());
        }
        match self.nodes.borrow().get(parent) {
            Some(Node::Directory { .. }) => Ok(()),
            Some(_) => Err(Errno::NotDir),
            None => Err(Errno::NoEnt),
        }
    }

    fn stat_of(&self, path: &str) -> SysResult<FileStat> {
        match self.nodes.borrow().get(path) {
            Some(node) => Ok(node_stat(node)),
            None => Err(Errno::NoEnt),
        }
    }

    /// Directory listing snapshot: `.`, `..`, then direct children
    fn children_of(&self, dir: &str) -> Vec<DirEntry> {
        let nodes = self.nodes.borrow();
        let prefix = format!("{}/", dir);
        let mut entries = vec![
            DirEntry::new(".", FileKind::Directory),
            DirEntry::new("..", FileKind::Directory),
        ];
        for (path, node) in nodes.iter() {
            if let Some(rest) = path.strip_prefix(&prefix) {
                if !rest.is_empty() && !rest.contains('/') {
                    let kind = match node {
                        Node::File { .. } => FileKind::File,
                        Node::Directory { .. } => FileKind::Directory,
                    };
                    entries.push(DirEntry::new(rest, kind));
                }
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    fn do_init(&self) -> SysResult<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if !self.root.is_empty() {
            let mut nodes = self.nodes.borrow_mut();
            nodes.entry(self.root.clone()).or_insert(Node::Directory {
                mode: 0o755,
                created: SystemTime::now(),
            });
        }
        trace!("mem backend initialized at {:?}", self.root);
        Ok(())
    }

    fn do_open(&self, path: &str, flags: i32, mode: u32) -> SysResult<Fd> {
        let norm = normalize(path);
        let accmode = flags & oflags::O_ACCMODE;
        let wants_dir = flags & oflags::O_DIRECTORY != 0;

        let existing = {
            let mut nodes = self.nodes.borrow_mut();
            match nodes.get_mut(&norm) {
                Some(Node::Directory { .. }) => {
                    if accmode != oflags::O_RDONLY {
                        return Err(Errno::IsDir);
                    }
                    Some(true)
                }
                Some(Node::File { data, modified, .. }) => {
                    if wants_dir {
                        return Err(Errno::NotDir);
                    }
                    if flags & (oflags::O_CREAT | oflags::O_EXCL)
                        == oflags::O_CREAT | oflags::O_EXCL
                    {
                        return Err(Errno::Exist);
                    }
                    if flags & oflags::O_TRUNC != 0 && accmode != oflags::O_RDONLY {
                        data.clear();
                        *modified = SystemTime::now();
                    }
                    Some(false)
                }
                None => None,
            }
        };

        match existing {
            Some(true) => {
                let entries = self.children_of(&norm);
                let fd = self.alloc_fd();
                self.open_files.borrow_mut().insert(
                    fd,
                    OpenState {
                        path: norm,
                        flags,
                        pos: 0,
                        dir: Some(DirCursor { entries, next: 0 }),
                    },
                );
                Ok(fd)
            }
            Some(false) => {
                let fd = self.alloc_fd();
                self.open_files.borrow_mut().insert(
                    fd,
                    OpenState {
                        path: norm,
                        flags,
                        pos: 0,
                        dir: None,
                    },
                );
                Ok(fd)
            }
            None => {
                if flags & oflags::O_CREAT == 0 || wants_dir {
                    return Err(Errno::NoEnt);
                }
                self.assert_parent_dir(&norm)?;
                let now = SystemTime::now();
                self.nodes.borrow_mut().insert(
                    norm.clone(),
                    Node::File {
                        data: Vec::new(),
                        mode: mode & 0o7777,
                        modified: now,
                        created: now,
                    },
                );
                let fd = self.alloc_fd();
                self.open_files.borrow_mut().insert(
                    fd,
                    OpenState {
                        path: norm,
                        flags,
                        pos: 0,
                        dir: None,
                    },
                );
                Ok(fd)
            }
        }
    }

    fn do_close(&self, fd: Fd) -> SysResult<()> {
        self.open_files
            .borrow_mut()
            .remove(&fd)
            .map(|_| ())
            .ok_or(Errno::BadFd)
    }

    fn do_read(&self, fd: Fd, len: usize) -> SysResult<Vec<u8>> {
        let mut open_files = self.open_files.borrow_mut();
        let state = open_files.get_mut(&fd).ok_or(Errno::BadFd)?;
        if state.dir.is_some() {
            return Err(Errno::IsDir);
        }
        if state.flags & oflags::O_ACCMODE == oflags::O_WRONLY {
            return Err(Errno::BadFd);
        }
        let nodes = self.nodes.borrow();
        let Some(Node::File { data, .. }) = nodes.get(&state.path) else {
            return Err(Errno::NoEnt);
        };
        let pos = state.pos as usize;
        if pos >= data.len() {
            return Ok(Vec::new());
        }
        let end = data.len().min(pos.saturating_add(len));
        let chunk = data[pos..end].to_vec();
        state.pos = end as u64;
        Ok(chunk)
    }

    fn do_write(&self, fd: Fd, data: Vec<u8>) -> SysResult<usize> {
        let mut open_files = self.open_files.borrow_mut();
        let state = open_files.get_mut(&fd).ok_or(Errno::BadFd)?;
        if state.dir.is_some() {
            return Err(Errno::IsDir);
        }
        if state.flags & oflags::O_ACCMODE == oflags::O_RDONLY {
            return Err(Errno::BadFd);
        }
        let mut nodes = self.nodes.borrow_mut();
        let Some(Node::File {
            data: contents,
            modified,
            ..
        }) = nodes.get_mut(&state.path)
        else {
            return Err(Errno::NoEnt);
        };
        let pos = if state.flags & oflags::O_APPEND != 0 {
            contents.len()
        } else {
            state.pos as usize
        };
        let end = pos + data.len();
        if contents.len() < end {
            contents.resize(end, 0);
        }
        contents[pos..end].copy_from_slice(&data);
        *modified = SystemTime::now();
        state.pos = end as u64;
        Ok(data.len())
    }

    fn do_pread(&self, fd: Fd, len: usize, offset: u64) -> SysResult<Vec<u8>> {
        let open_files = self.open_files.borrow();
        let state = open_files.get(&fd).ok_or(Errno::BadFd)?;
        if state.dir.is_some() {
            return Err(Errno::IsDir);
        }
        if state.flags & oflags::O_ACCMODE == oflags::O_WRONLY {
            return Err(Errno::BadFd);
        }
        let nodes = self.nodes.borrow();
        let Some(Node::File { data, .. }) = nodes.get(&state.path) else {
            return Err(Errno::NoEnt);
        };
        let pos = offset as usize;
        if pos >= data.len() {
            return Ok(Vec::new());
        }
        let end = data.len().min(pos.saturating_add(len));
        Ok(data[pos..end].to_vec())
    }

    fn do_pwrite(&self, fd: Fd, data: Vec<u8>, offset: u64) -> SysResult<usize> {
        let open_files = self.open_files.borrow();
        let state = open_files.get(&fd).ok_or(Errno::BadFd)?;
        if state.dir.is_some() {
            return Err(Errno::IsDir);
        }
        if state.flags & oflags::O_ACCMODE == oflags::O_RDONLY {
            return Err(Errno::BadFd);
        }
        let path = state.path.clone();
        drop(open_files);
        let mut nodes = self.nodes.borrow_mut();
        let Some(Node::File {
            data: contents,
            modified,
            ..
        }) = nodes.get_mut(&path)
        else {
            return Err(Errno::NoEnt);
        };
        let pos = offset as usize;
        let end = pos + data.len();
        if contents.len() < end {
            contents.resize(end, 0);
        }
        contents[pos..end].copy_from_slice(&data);
        *modified = SystemTime::now();
        Ok(data.len())
    }

    fn do_seek(&self, fd: Fd, offset: i64, whence_val: i32) -> SysResult<u64> {
        let mut open_files = self.open_files.borrow_mut();
        let state = open_files.get_mut(&fd).ok_or(Errno::BadFd)?;
        if let Some(cursor) = state.dir.as_mut() {
            // rewinddir is the only seek a directory stream supports
            if whence_val == whence::SEEK_SET && offset == 0 {
                cursor.next = 0;
                return Ok(0);
            }
            return Err(Errno::Inval);
        }
        let size = {
            let nodes = self.nodes.borrow();
            match nodes.get(&state.path) {
                Some(Node::File { data, .. }) => data.len() as i64,
                _ => return Err(Errno::NoEnt),
            }
        };
        let base = match whence_val {
            whence::SEEK_SET => 0,
            whence::SEEK_CUR => state.pos as i64,
            whence::SEEK_END => size,
            _ => return Err(Errno::Inval),
        };
        let target = base.checked_add(offset).ok_or(Errno::Inval)?;
        if target < 0 {
            return Err(Errno::Inval);
        }
        state.pos = target as u64;
        Ok(state.pos)
    }

    fn do_getdents(&self, fd: Fd, max_entries: usize) -> SysResult<Vec<DirEntry>> {
        let mut open_files = self.open_files.borrow_mut();
        let state = open_files.get_mut(&fd).ok_or(Errno::BadFd)?;
        let cursor = state.dir.as_mut().ok_or(Errno::NotDir)?;
        let remaining = cursor.entries.len() - cursor.next;
        let take = remaining.min(max_entries);
        let batch = cursor.entries[cursor.next..cursor.next + take].to_vec();
        cursor.next += take;
        Ok(batch)
    }

    fn do_fdstat_get(&self, fd: Fd) -> SysResult<FdStat> {
        let open_files = self.open_files.borrow();
        let state = open_files.get(&fd).ok_or(Errno::BadFd)?;
        let kind = if state.dir.is_some() {
            FileKind::Directory
        } else {
            FileKind::File
        };
        Ok(FdStat {
            kind,
            flags: state.flags,
        })
    }

    fn do_fstat(&self, fd: Fd) -> SysResult<FileStat> {
        let path = {
            let open_files = self.open_files.borrow();
            open_files.get(&fd).ok_or(Errno::BadFd)?.path.clone()
        };
        self.stat_of(&path)
    }

    fn do_fd_path(&self, fd: Fd) -> SysResult<String> {
        let open_files = self.open_files.borrow();
        Ok(open_files.get(&fd).ok_or(Errno::BadFd)?.path.clone())
    }

    fn do_unlink(&self, path: &str) -> SysResult<()> {
        let norm = normalize(path);
        let mut nodes = self.nodes.borrow_mut();
        match nodes.get(&norm) {
            Some(Node::Directory { .. }) => Err(Errno::IsDir),
            Some(Node::File { .. }) => {
                nodes.remove(&norm);
                Ok(())
            }
            None => Err(Errno::NoEnt),
        }
    }

    fn do_mkdir(&self, path: &str, mode: u32) -> SysResult<()> {
        let norm = normalize(path);
        if self.nodes.borrow().contains_key(&norm) {
            return Err(Errno::Exist);
        }
        self.assert_parent_dir(&norm)?;
        self.nodes.borrow_mut().insert(
            norm,
            Node::Directory {
                mode: mode & 0o7777,
                created: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn do_rmdir(&self, path: &str) -> SysResult<()> {
        let norm = normalize(path);
        let mut nodes = self.nodes.borrow_mut();
        match nodes.get(&norm) {
            Some(Node::Directory { .. }) => {
                let prefix = format!("{}/", norm);
                if nodes.keys().any(|k| k.starts_with(&prefix)) {
                    return Err(Errno::NotEmpty);
                }
                nodes.remove(&norm);
                Ok(())
            }
            Some(Node::File { .. }) => Err(Errno::NotDir),
            None => Err(Errno::NoEnt),
        }
    }

    fn do_chmod(&self, path: &str, new_mode: u32) -> SysResult<()> {
        let norm = normalize(path);
        let mut nodes = self.nodes.borrow_mut();
        match nodes.get_mut(&norm) {
            Some(Node::File { mode, .. }) | Some(Node::Directory { mode, .. }) => {
                *mode = new_mode & 0o7777;
                Ok(())
            }
            None => Err(Errno::NoEnt),
        }
    }

    /// Ownership is not modeled; the call succeeds if the node exists
    fn do_chown(&self, path: &str) -> SysResult<()> {
        let norm = normalize(path);
        if self.nodes.borrow().contains_key(&norm) {
            Ok(())
        } else {
            Err(Errno::NoEnt)
        }
    }

    fn do_access(&self, path: &str) -> SysResult<()> {
        let norm = normalize(path);
        if self.nodes.borrow().contains_key(&norm) {
            Ok(())
        } else {
            Err(Errno::NoEnt)
        }
    }

    fn do_truncate(&self, path: &str, len: u64) -> SysResult<()> {
        let norm = normalize(path);
        let mut nodes = self.nodes.borrow_mut();
        match nodes.get_mut(&norm) {
            Some(Node::File { data, modified, .. }) => {
                data.resize(len as usize, 0);
                *modified = SystemTime::now();
                Ok(())
            }
            Some(Node::Directory { .. }) => Err(Errno::IsDir),
            None => Err(Errno::NoEnt),
        }
    }

    fn do_statfs(&self) -> SysResult<FsStats> {
        let nodes = self.nodes.borrow();
        let used: u64 = nodes
            .values()
            .map(|n| match n {
                Node::File { data, .. } => data.len() as u64,
                Node::Directory { .. } => 0,
            })
            .sum();
        let block_size = 4096u32;
        let blocks = 1u64 << 20;
        Ok(FsStats {
            block_size,
            blocks,
            blocks_free: blocks.saturating_sub(used / u64::from(block_size)),
            files: nodes.len() as u64,
        })
    }

    fn do_chdir(&self, path: &str) -> SysResult<()> {
        let norm = normalize(path);
        match self.nodes.borrow().get(&norm) {
            Some(Node::Directory { .. }) => {
                *self.cwd.borrow_mut() = norm;
                Ok(())
            }
            Some(_) => Err(Errno::NotDir),
            None => Err(Errno::NoEnt),
        }
    }

    fn do_mknod(&self, path: &str, mode: u32) -> SysResult<()> {
        match mode & S_IFMT {
            0 | S_IFREG => {}
            _ => return Err(Errno::Perm),
        }
        let norm = normalize(path);
        if self.nodes.borrow().contains_key(&norm) {
            return Err(Errno::Exist);
        }
        self.assert_parent_dir(&norm)?;
        let now = SystemTime::now();
        self.nodes.borrow_mut().insert(
            norm,
            Node::File {
                data: Vec::new(),
                mode: mode & 0o7777,
                modified: now,
                created: now,
            },
        );
        Ok(())
    }

    fn do_fcntl(&self, fd: Fd, cmd: i32, arg: i64) -> SysResult<i64> {
        let mut open_files = self.open_files.borrow_mut();
        let state = open_files.get_mut(&fd).ok_or(Errno::BadFd)?;
        match cmd {
            fcntl_cmd::F_GETFL => Ok(i64::from(state.flags)),
            fcntl_cmd::F_SETFL => {
                // only the append bit is honored on an open descriptor
                state.flags =
                    (state.flags & !oflags::O_APPEND) | (arg as i32 & oflags::O_APPEND);
                Ok(0)
            }
            fcntl_cmd::F_GETFD | fcntl_cmd::F_SETFD => Ok(0),
            fcntl_cmd::F_DUPFD => Err(Errno::NotSup),
            _ => Err(Errno::Inval),
        }
    }

    fn do_fallocate(&self, fd: Fd, mode: i32, offset: u64, len: u64) -> SysResult<()> {
        if mode != 0 {
            return Err(Errno::NotSup);
        }
        let path = self.do_fd_path(fd)?;
        let mut nodes = self.nodes.borrow_mut();
        let Some(Node::File { data, .. }) = nodes.get_mut(&path) else {
            return Err(Errno::BadFd);
        };
        let end = (offset + len) as usize;
        if data.len() < end {
            data.resize(end, 0);
        }
        Ok(())
    }

    fn do_rename(&self, old: &str, new: &str) -> SysResult<()> {
        let old_norm = normalize(old);
        let new_norm = normalize(new);
        if old_norm == new_norm {
            return Ok(());
        }
        self.assert_parent_dir(&new_norm)?;
        let mut nodes = self.nodes.borrow_mut();
        if !nodes.contains_key(&old_norm) {
            return Err(Errno::NoEnt);
        }
        let old_is_dir = matches!(nodes.get(&old_norm), Some(Node::Directory { .. }));
        match nodes.get(&new_norm) {
            Some(Node::Directory { .. }) if !old_is_dir => return Err(Errno::IsDir),
            Some(Node::Directory { .. }) => {
                let prefix = format!("{}/", new_norm);
                if nodes.keys().any(|k| k.starts_with(&prefix)) {
                    return Err(Errno::NotEmpty);
                }
            }
            Some(Node::File { .. }) if old_is_dir => return Err(Errno::NotDir),
            _ => {}
        }
        if let Some(node) = nodes.remove(&old_norm) {
            nodes.insert(new_norm.clone(), node);
        }
        if old_is_dir {
            let prefix = format!("{}/", old_norm);
            let moved: Vec<String> = nodes
                .keys()
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect();
            for key in moved {
                if let Some(child) = nodes.remove(&key) {
                    let rel = &key[prefix.len()..];
                    nodes.insert(format!("{}/{}", new_norm, rel), child);
                }
            }
        }
        Ok(())
    }
}

fn node_stat(node: &Node) -> FileStat {
    match node {
        Node::File {
            data,
            mode,
            modified,
            created,
        } => FileStat {
            kind: FileKind::File,
            size: data.len() as u64,
            mode: *mode,
            modified: *modified,
            accessed: *modified,
            created: *created,
        },
        Node::Directory { mode, created } => FileStat {
            kind: FileKind::Directory,
            size: 0,
            mode: *mode,
            modified: *created,
            accessed: *created,
            created: *created,
        },
    }
}

/// Strip the leading separator and resolve `.`/`..` components
fn normalize(path: &str) -> String {
    let mut components: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            name => components.push(name),
        }
    }
    components.join("/")
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

impl AsyncBackend for MemBackend {
    fn init(&self) -> LocalBoxFuture<'_, SysResult<()>> {
        async move { self.do_init() }.boxed_local()
    }

    fn read(&self, fd: Fd, len: usize) -> LocalBoxFuture<'_, SysResult<Vec<u8>>> {
        async move { self.do_read(fd, len) }.boxed_local()
    }

    fn write(&self, fd: Fd, data: Vec<u8>) -> LocalBoxFuture<'_, SysResult<usize>> {
        async move { self.do_write(fd, data) }.boxed_local()
    }

    fn pread(&self, fd: Fd, len: usize, offset: u64) -> LocalBoxFuture<'_, SysResult<Vec<u8>>> {
        async move { self.do_pread(fd, len, offset) }.boxed_local()
    }

    fn pwrite(&self, fd: Fd, data: Vec<u8>, offset: u64) -> LocalBoxFuture<'_, SysResult<usize>> {
        async move { self.do_pwrite(fd, data, offset) }.boxed_local()
    }

    fn seek(&self, fd: Fd, offset: i64, whence_val: i32) -> LocalBoxFuture<'_, SysResult<u64>> {
        async move { self.do_seek(fd, offset, whence_val) }.boxed_local()
    }

    fn close(&self, fd: Fd) -> LocalBoxFuture<'_, SysResult<()>> {
        async move { self.do_close(fd) }.boxed_local()
    }

    fn fdstat_get(&self, fd: Fd) -> LocalBoxFuture<'_, SysResult<FdStat>> {
        async move { self.do_fdstat_get(fd) }.boxed_local()
    }

    fn sync(&self, fd: Fd) -> LocalBoxFuture<'_, SysResult<()>> {
        async move { self.do_fd_path(fd).map(|_| ()) }.boxed_local()
    }

    fn fdatasync(&self, fd: Fd) -> LocalBoxFuture<'_, SysResult<()>> {
        async move { self.do_fd_path(fd).map(|_| ()) }.boxed_local()
    }

    fn fstat(&self, fd: Fd) -> LocalBoxFuture<'_, SysResult<FileStat>> {
        async move { self.do_fstat(fd) }.boxed_local()
    }

    fn fchmod(&self, fd: Fd, mode: u32) -> LocalBoxFuture<'_, SysResult<()>> {
        async move {
            let path = self.do_fd_path(fd)?;
            self.do_chmod(&path, mode)
        }
        .boxed_local()
    }

    fn fchown(&self, fd: Fd, _uid: u32, _gid: u32) -> LocalBoxFuture<'_, SysResult<()>> {
        async move { self.do_fd_path(fd).map(|_| ()) }.boxed_local()
    }

    fn ftruncate(&self, fd: Fd, len: u64) -> LocalBoxFuture<'_, SysResult<()>> {
        async move {
            let path = self.do_fd_path(fd)?;
            self.do_truncate(&path, len)
        }
        .boxed_local()
    }

    fn fallocate(
        &self,
        fd: Fd,
        mode: i32,
        offset: u64,
        len: u64,
    ) -> LocalBoxFuture<'_, SysResult<()>> {
        async move { self.do_fallocate(fd, mode, offset, len) }.boxed_local()
    }

    fn fcntl(&self, fd: Fd, cmd: i32, arg: i64) -> LocalBoxFuture<'_, SysResult<i64>> {
        async move { self.do_fcntl(fd, cmd, arg) }.boxed_local()
    }

    fn ioctl(&self, fd: Fd, _request: u64, _arg: u64) -> LocalBoxFuture<'_, SysResult<i64>> {
        async move {
            self.do_fd_path(fd)?;
            Err(Errno::NoTty)
        }
        .boxed_local()
    }

    fn getdents(
        &self,
        fd: Fd,
        max_entries: usize,
    ) -> LocalBoxFuture<'_, SysResult<Vec<DirEntry>>> {
        async move { self.do_getdents(fd, max_entries) }.boxed_local()
    }

    fn fchdir(&self, fd: Fd) -> LocalBoxFuture<'_, SysResult<()>> {
        async move {
            let path = self.do_fd_path(fd)?;
            self.do_chdir(&path)
        }
        .boxed_local()
    }

    fn open(&self, path: String, flags: i32, mode: u32) -> LocalBoxFuture<'_, SysResult<Fd>> {
        async move { self.do_open(&path, flags, mode) }.boxed_local()
    }

    fn unlink(&self, path: String) -> LocalBoxFuture<'_, SysResult<()>> {
        async move { self.do_unlink(&path) }.boxed_local()
    }

    fn mkdir(&self, path: String, mode: u32) -> LocalBoxFuture<'_, SysResult<()>> {
        async move { self.do_mkdir(&path, mode) }.boxed_local()
    }

    fn rmdir(&self, path: String) -> LocalBoxFuture<'_, SysResult<()>> {
        async move { self.do_rmdir(&path) }.boxed_local()
    }

    fn chmod(&self, path: String, mode: u32) -> LocalBoxFuture<'_, SysResult<()>> {
        async move { self.do_chmod(&path, mode) }.boxed_local()
    }

    fn chown(&self, path: String, _uid: u32, _gid: u32) -> LocalBoxFuture<'_, SysResult<()>> {
        async move { self.do_chown(&path) }.boxed_local()
    }

    fn lchown(&self, path: String, _uid: u32, _gid: u32) -> LocalBoxFuture<'_, SysResult<()>> {
        async move { self.do_chown(&path) }.boxed_local()
    }

    fn access(&self, path: String, _amode: i32) -> LocalBoxFuture<'_, SysResult<()>> {
        async move { self.do_access(&path) }.boxed_local()
    }

    fn readlink(&self, _path: String) -> LocalBoxFuture<'_, SysResult<Vec<u8>>> {
        // symlinks are not modeled
        async move { Err(Errno::Inval) }.boxed_local()
    }

    fn stat(&self, path: String) -> LocalBoxFuture<'_, SysResult<FileStat>> {
        async move { self.stat_of(&normalize(&path)) }.boxed_local()
    }

    fn lstat(&self, path: String) -> LocalBoxFuture<'_, SysResult<FileStat>> {
        async move { self.stat_of(&normalize(&path)) }.boxed_local()
    }

    fn statfs(&self, _path: String) -> LocalBoxFuture<'_, SysResult<FsStats>> {
        async move { self.do_statfs() }.boxed_local()
    }

    fn fstatfs(&self, fd: Fd) -> LocalBoxFuture<'_, SysResult<FsStats>> {
        async move {
            self.do_fd_path(fd)?;
            self.do_statfs()
        }
        .boxed_local()
    }

    fn truncate(&self, path: String, len: u64) -> LocalBoxFuture<'_, SysResult<()>> {
        async move { self.do_truncate(&path, len) }.boxed_local()
    }

    fn chdir(&self, path: String) -> LocalBoxFuture<'_, SysResult<()>> {
        async move { self.do_chdir(&path) }.boxed_local()
    }

    fn mknod(&self, path: String, mode: u32, _dev: u64) -> LocalBoxFuture<'_, SysResult<()>> {
        async move { self.do_mknod(&path, mode) }.boxed_local()
    }

    fn rename(&self, old: String, new: String) -> LocalBoxFuture<'_, SysResult<()>> {
        async move { self.do_rename(&old, &new) }.boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn backend() -> MemBackend {
        let fs = MemBackend::new("persistent");
        block_on(fs.init()).unwrap();
        fs
    }

    #[test]
    fn test_init_creates_root() {
        let fs = backend();
        let stat = block_on(fs.stat("persistent".to_string())).unwrap();
        assert!(stat.is_dir());
    }

    #[test]
    fn test_open_write_read_round_trip() {
        let fs = backend();
        let fd = block_on(fs.open(
            "persistent/file.txt".to_string(),
            oflags::O_CREAT | oflags::O_WRONLY,
            0o644,
        ))
        .unwrap();
        assert!(fd >= BACKEND_FD_FLOOR);
        assert_eq!(block_on(fs.write(fd, b"hello".to_vec())).unwrap(), 5);
        block_on(fs.close(fd)).unwrap();

        let fd = block_on(fs.open("persistent/file.txt".to_string(), oflags::O_RDONLY, 0))
            .unwrap();
        assert_eq!(block_on(fs.read(fd, 16)).unwrap(), b"hello");
        assert!(block_on(fs.read(fd, 16)).unwrap().is_empty());
        block_on(fs.close(fd)).unwrap();
    }

    #[test]
    fn test_open_missing_without_creat() {
        let fs = backend();
        let err = block_on(fs.open("persistent/nope".to_string(), oflags::O_RDONLY, 0))
            .unwrap_err();
        assert_eq!(err, Errno::NoEnt);
    }

    #[test]
    fn test_open_missing_parent() {
        let fs = backend();
        let err = block_on(fs.open(
            "persistent/no/deep.txt".to_string(),
            oflags::O_CREAT | oflags::O_WRONLY,
            0o644,
        ))
        .unwrap_err();
        assert_eq!(err, Errno::NoEnt);
    }

    #[test]
    fn test_excl_on_existing() {
        let fs = backend();
        let fd = block_on(fs.open(
            "persistent/x".to_string(),
            oflags::O_CREAT | oflags::O_WRONLY,
            0o644,
        ))
        .unwrap();
        block_on(fs.close(fd)).unwrap();

        let err = block_on(fs.open(
            "persistent/x".to_string(),
            oflags::O_CREAT | oflags::O_EXCL | oflags::O_WRONLY,
            0o644,
        ))
        .unwrap_err();
        assert_eq!(err, Errno::Exist);
    }

    #[test]
    fn test_append_positions_at_end() {
        let fs = backend();
        let fd = block_on(fs.open(
            "persistent/log".to_string(),
            oflags::O_CREAT | oflags::O_WRONLY,
            0o644,
        ))
        .unwrap();
        block_on(fs.write(fd, b"one\n".to_vec())).unwrap();
        block_on(fs.close(fd)).unwrap();

        let fd = block_on(fs.open(
            "persistent/log".to_string(),
            oflags::O_WRONLY | oflags::O_APPEND,
            0,
        ))
        .unwrap();
        block_on(fs.write(fd, b"two\n".to_vec())).unwrap();
        block_on(fs.close(fd)).unwrap();

        let stat = block_on(fs.stat("persistent/log".to_string())).unwrap();
        assert_eq!(stat.size, 8);
    }

    #[test]
    fn test_mkdir_rmdir_cycle() {
        let fs = backend();
        block_on(fs.mkdir("persistent/d".to_string(), 0o755)).unwrap();
        assert!(block_on(fs.stat("persistent/d".to_string())).unwrap().is_dir());

        block_on(fs.rmdir("persistent/d".to_string())).unwrap();
        let err = block_on(fs.stat("persistent/d".to_string())).unwrap_err();
        assert_eq!(err, Errno::NoEnt);
    }

    #[test]
    fn test_rmdir_non_empty() {
        let fs = backend();
        block_on(fs.mkdir("persistent/d".to_string(), 0o755)).unwrap();
        let fd = block_on(fs.open(
            "persistent/d/f".to_string(),
            oflags::O_CREAT | oflags::O_WRONLY,
            0o644,
        ))
        .unwrap();
        block_on(fs.close(fd)).unwrap();

        let err = block_on(fs.rmdir("persistent/d".to_string())).unwrap_err();
        assert_eq!(err, Errno::NotEmpty);
    }

    #[test]
    fn test_getdents_includes_dot_entries() {
        let fs = backend();
        block_on(fs.mkdir("persistent/d".to_string(), 0o755)).unwrap();
        let fd = block_on(fs.open(
            "persistent/d/f.txt".to_string(),
            oflags::O_CREAT | oflags::O_WRONLY,
            0o644,
        ))
        .unwrap();
        block_on(fs.close(fd)).unwrap();

        let dir = block_on(fs.open(
            "persistent/d".to_string(),
            oflags::O_RDONLY | oflags::O_DIRECTORY,
            0,
        ))
        .unwrap();
        let entries = block_on(fs.getdents(dir, 16)).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![".", "..", "f.txt"]);
        assert!(block_on(fs.getdents(dir, 16)).unwrap().is_empty());
    }

    #[test]
    fn test_rename_moves_directory_children() {
        let fs = backend();
        block_on(fs.mkdir("persistent/a".to_string(), 0o755)).unwrap();
        let fd = block_on(fs.open(
            "persistent/a/f".to_string(),
            oflags::O_CREAT | oflags::O_WRONLY,
            0o644,
        ))
        .unwrap();
        block_on(fs.write(fd, b"data".to_vec())).unwrap();
        block_on(fs.close(fd)).unwrap();

        block_on(fs.rename("persistent/a".to_string(), "persistent/b".to_string())).unwrap();

        assert_eq!(
            block_on(fs.stat("persistent/a".to_string())).unwrap_err(),
            Errno::NoEnt
        );
        assert_eq!(
            block_on(fs.stat("persistent/b/f".to_string())).unwrap().size,
            4
        );
    }

    #[test]
    fn test_seek_and_pread() {
        let fs = backend();
        let fd = block_on(fs.open(
            "persistent/s".to_string(),
            oflags::O_CREAT | oflags::O_RDWR,
            0o644,
        ))
        .unwrap();
        block_on(fs.write(fd, b"0123456789".to_vec())).unwrap();

        assert_eq!(
            block_on(fs.seek(fd, 2, whence::SEEK_SET)).unwrap(),
            2
        );
        assert_eq!(block_on(fs.read(fd, 3)).unwrap(), b"234");
        assert_eq!(
            block_on(fs.seek(fd, -2, whence::SEEK_END)).unwrap(),
            8
        );
        assert_eq!(block_on(fs.pread(fd, 4, 4)).unwrap(), b"4567");
        block_on(fs.close(fd)).unwrap();
    }

    #[test]
    fn test_chdir_tracks_working_directory() {
        let fs = backend();
        block_on(fs.mkdir("persistent/wd".to_string(), 0o755)).unwrap();
        block_on(fs.chdir("persistent/wd".to_string())).unwrap();
        assert_eq!(fs.current_dir(), "persistent/wd");

        let fd = block_on(fs.open(
            "persistent".to_string(),
            oflags::O_RDONLY | oflags::O_DIRECTORY,
            0,
        ))
        .unwrap();
        block_on(fs.fchdir(fd)).unwrap();
        assert_eq!(fs.current_dir(), "persistent");

        assert_eq!(
            block_on(fs.chdir("persistent/missing".to_string())).unwrap_err(),
            Errno::NoEnt
        );
    }

    #[test]
    fn test_init_counter_increments_once_per_call() {
        let counter = Arc::new(AtomicU32::new(0));
        let fs = MemBackend::new("persistent").with_init_counter(Arc::clone(&counter));
        block_on(fs.init()).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
