/*!
 * bridgefs
 * POSIX filesystem shim bridging blocking file I/O from worker threads
 * onto a single-threaded async event loop
 *
 * Three parts cooperate: the [`bridge::Bridge`] rendezvous blocks a
 * submitting thread while the event-loop thread drives the async
 * backend; the [`dispatch::Dispatcher`] classifies each syscall by path
 * prefix or descriptor provenance and routes it to the backend or the
 * synchronous fallback; the [`registry::FdRegistry`] records which
 * descriptors the backend owns.
 */

pub mod backend;
pub mod bridge;
pub mod core;
pub mod dispatch;
pub mod fallback;
pub mod registry;

pub use self::backend::{AsyncBackend, MemBackend};
pub use self::bridge::{Bridge, CallResult, Launcher, Reply};
pub use self::core::errno::{clear_errno, errno, set_errno};
pub use self::core::{Errno, ShimConfig, SysResult};
pub use self::dispatch::{is_backend_path, Dispatcher, Opcode, RouteKind};
pub use self::fallback::{FallbackFs, LocalFallback};
pub use self::registry::FdRegistry;
