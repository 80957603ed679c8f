/*!
 * Bridge Jobs
 * The unit of work exchanged between a submitter and the event loop
 */

use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::backend::AsyncBackend;
use crate::core::types::{DirEntry, Fd, FdStat, FileStat, FsStats};
use crate::core::Errno;

/// Result slot contents: a typed reply or a backend errno
pub type CallResult = Result<Reply, Errno>;

/// Typed payloads a completed job can deliver.
///
/// Read-class operations carry their bytes by value; the dispatcher
/// copies into the caller's buffer after the handshake completes, so the
/// event loop never touches user memory.
#[derive(Debug, Clone)]
pub enum Reply {
    Unit,
    Int(i64),
    Size(usize),
    Fd(Fd),
    Offset(u64),
    Bytes(Vec<u8>),
    Stat(FileStat),
    FdStat(FdStat),
    StatFs(FsStats),
    Entries(Vec<DirEntry>),
}

/// Starts one async backend operation; the returned future resolves when
/// that operation completes. Built on the submitting thread, consumed
/// exactly once on the event-loop thread.
pub type Launcher =
    Box<dyn FnOnce(Rc<dyn AsyncBackend>) -> LocalBoxFuture<'static, CallResult> + Send>;

/// A submitted unit of work. Observed by exactly two threads in one
/// handshake; no job outlives a single call.
pub(crate) struct Job {
    launcher: Launcher,
}

impl Job {
    pub(crate) fn new(launcher: Launcher) -> Self {
        Self { launcher }
    }

    /// Start the operation on the event loop and wait for its completion
    pub(crate) async fn run(self, backend: Rc<dyn AsyncBackend>) -> CallResult {
        (self.launcher)(backend).await
    }
}
