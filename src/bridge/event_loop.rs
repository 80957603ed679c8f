/*!
 * Event-Loop Thread
 * Executor side of the bridge handshake
 */

use log::{debug, info};
use std::rc::Rc;
use std::sync::Arc;
use tokio::task::LocalSet;

use super::Shared;
use crate::backend::AsyncBackend;

/// Thread main: a current-thread runtime drives the handshake loop and
/// whatever loop-local tasks the backend spawns.
pub(crate) fn run<B, F>(shared: Arc<Shared>, factory: F)
where
    B: AsyncBackend + 'static,
    F: FnOnce() -> B,
{
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build bridge event-loop runtime");

    rt.block_on(async {
        let local = LocalSet::new();
        local
            .run_until(async move {
                let backend: Rc<dyn AsyncBackend> = Rc::new(factory());
                serve(&shared, backend).await;
            })
            .await;
    });
}

async fn serve(shared: &Shared, backend: Rc<dyn AsyncBackend>) {
    info!("bridge event loop started");
    loop {
        // Pick up the next job. Parking the thread here cannot starve the
        // loop: at most one job is in flight, so no async work is pending
        // while we wait for the condition variable.
        let job = {
            let mut state = shared.state.lock();
            while !state.ready_to_work {
                shared.cond.wait(&mut state);
            }
            state.ready_to_work = false;
            if state.quit {
                break;
            }
            match state.job.take() {
                Some(job) => job,
                None => continue,
            }
        };

        // The launcher runs with the handshake lock released, so the loop
        // stays free to make progress across its suspension points.
        let result = job.run(Rc::clone(&backend)).await;

        {
            let mut state = shared.state.lock();
            state.result = Some(result);
            state.finished_work = true;
        }
        shared.cond.notify_all();
        debug!("bridge job completed");
    }
    info!("bridge event loop stopped");
}
