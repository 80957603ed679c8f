/*!
 * Sync-to-Async Bridge
 * Rendezvous between blocking submitters and the event-loop thread
 *
 * A submitter publishes one job under the handshake lock, wakes the
 * loop, and sleeps until the loop stores the result. The loop picks the
 * job up, starts the async operation, and completes the handshake when
 * the backend resolves it. At most one job is in flight at any time.
 */

mod event_loop;
mod job;

pub use job::{CallResult, Launcher, Reply};

pub(crate) use job::Job;

use log::{error, info};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::backend::AsyncBackend;
use crate::core::Errno;

/// Handshake variables shared by submitters and the loop
pub(crate) struct State {
    pub(crate) ready_to_work: bool,
    pub(crate) finished_work: bool,
    pub(crate) job: Option<Job>,
    pub(crate) result: Option<CallResult>,
    pub(crate) quit: bool,
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<State>,
    pub(crate) cond: Condvar,
}

/// The sync-to-async rendezvous.
///
/// `run` may be called from any number of threads; a submitter mutex
/// serializes them system-wide. There is no timeout and no cancellation:
/// once a job is submitted, `run` returns only when the backend completes
/// it. Dropping the bridge signals the loop to quit and joins the thread.
pub struct Bridge {
    shared: Arc<Shared>,
    /// Serializes submitters; the guarded flag records one-time init
    submit_lock: Mutex<bool>,
    thread: Option<JoinHandle<()>>,
}

impl Bridge {
    /// Spawn the event-loop thread and construct the backend on it.
    ///
    /// The factory runs on the loop thread, so the backend itself does
    /// not need to be `Send`. Thread spawn failure is fatal.
    pub fn start<B, F>(factory: F) -> Self
    where
        B: AsyncBackend + 'static,
        F: FnOnce() -> B + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                ready_to_work: false,
                finished_work: false,
                job: None,
                result: None,
                quit: false,
            }),
            cond: Condvar::new(),
        });

        let thread = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("bridgefs-loop".to_string())
                .spawn(move || event_loop::run(shared, factory))
                .expect("failed to spawn bridge event-loop thread")
        };

        Self {
            shared,
            submit_lock: Mutex::new(false),
            thread: Some(thread),
        }
    }

    /// Submit one job and block until the backend completes it.
    ///
    /// The first submission ever also pushes a one-time backend init job
    /// through the same handshake before the real one.
    pub fn run(&self, launcher: Launcher) -> CallResult {
        let mut initialized = self.submit_lock.lock();
        if !*initialized {
            info!("initializing async backend");
            let init = self.handshake(Job::new(Box::new(|backend| {
                Box::pin(async move { backend.init().await.map(|()| Reply::Unit) })
            })));
            if let Err(err) = init {
                error!("backend init failed: {}", err);
            }
            *initialized = true;
        }
        self.handshake(Job::new(launcher))
    }

    /// Publish a job, wake the loop, and wait for the result slot
    fn handshake(&self, job: Job) -> CallResult {
        let mut state = self.shared.state.lock();
        state.job = Some(job);
        state.finished_work = false;
        state.ready_to_work = true;
        self.shared.cond.notify_all();

        while !state.finished_work {
            self.shared.cond.wait(&mut state);
        }
        state.result.take().unwrap_or(Err(Errno::Io))
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.quit = true;
            state.ready_to_work = true;
        }
        self.shared.cond.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
