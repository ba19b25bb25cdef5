//! Micro-scheduler for fire-and-forget lifecycle jobs.
//!
//! Jobs run on execution contexts: long-lived tokio tasks that each receive
//! jobs over their own channel. A context that finishes its job parks itself
//! in the idle list so the next job reuses it instead of spawning a new task.
//! A job that suspends simply keeps its context busy; siblings get another one.
//! Contexts only hold a weak link to the pool, so dropping the pool retires
//! idle contexts at once and busy ones after their current job.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{error, trace};

pub(crate) type Job = BoxFuture<'static, ()>;

struct Envelope {
    job: Job,
    // Keeps the context's channel open while the job runs.
    home: UnboundedSender<Envelope>,
}

#[derive(Default)]
struct PoolShared {
    idle: Mutex<Vec<UnboundedSender<Envelope>>>,
    max_idle: usize,
    contexts: AtomicUsize,
}

impl PoolShared {
    fn park(&self, home: UnboundedSender<Envelope>) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(home);
        }
        // Otherwise the sender drops here and the context exits after its
        // queue drains.
    }
}

/// Pool of reusable execution contexts.
pub(crate) struct TaskPool {
    shared: Arc<PoolShared>,
    handle: OnceLock<Handle>,
}

impl TaskPool {
    pub(crate) fn new(max_idle: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared { max_idle, ..PoolShared::default() }),
            handle: OnceLock::new(),
        }
    }

    /// Pins the pool to `handle`; later calls are ignored.
    pub(crate) fn bind(&self, handle: Handle) {
        let _ = self.handle.set(handle);
    }

    fn runtime(&self) -> Option<Handle> {
        self.handle.get().cloned().or_else(|| Handle::try_current().ok())
    }

    /// Issues `job` on an idle context, or a new one when none is idle.
    pub(crate) fn spawn(&self, job: Job) {
        let mut job = job;
        loop {
            let sender = self.shared.idle.lock().pop();
            let Some(sender) = sender else { break };
            match sender.send(Envelope { job, home: sender.clone() }) {
                Ok(()) => return,
                // The context died (its task panicked or the runtime shut down).
                Err(returned) => job = returned.0.job,
            }
        }
        self.spawn_context(job);
    }

    fn spawn_context(&self, job: Job) {
        let Some(runtime) = self.runtime() else {
            error!("lifecycle job dropped: no tokio runtime available");
            return;
        };
        let (sender, mut receiver) = unbounded_channel::<Envelope>();
        let shared = Arc::downgrade(&self.shared);
        let id = self.shared.contexts.fetch_add(1, Ordering::Relaxed);
        if sender.send(Envelope { job, home: sender.clone() }).is_err() {
            return;
        }
        drop(sender);
        trace!(context = id, "execution context created");
        runtime.spawn(async move {
            while let Some(Envelope { job, home }) = receiver.recv().await {
                job.await;
                let Some(pool) = Weak::upgrade(&shared) else { break };
                pool.park(home);
            }
            trace!(context = id, "execution context retired");
        });
    }

    /// Number of contexts created so far.
    pub(crate) fn contexts_created(&self) -> usize {
        self.shared.contexts.load(Ordering::Relaxed)
    }

    /// Number of contexts currently parked for reuse.
    #[cfg(test)]
    pub(crate) fn idle_contexts(&self) -> usize {
        self.shared.idle.lock().len()
    }
}
