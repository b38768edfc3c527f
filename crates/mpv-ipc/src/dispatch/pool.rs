//! Fixed-size worker pool for event callbacks.
//!
//! Every subscriber owns a [`Mailbox`]. Jobs queue in the mailbox, and a
//! mailbox with pending jobs is scheduled at most once on the shared queue
//! that all workers drain. A callback therefore never runs concurrently with
//! itself and sees events in the order they were read, while a slow callback
//! only ever occupies the one worker draining its own mailbox. Workers exit
//! once the pool is dropped and the shared queue drains.

use std::collections::VecDeque;
use std::mem;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::error;

use crate::error::ClientError;

const POOL_TARGET: &str = "mpv_ipc::dispatch::pool";

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct MailboxState {
    jobs: VecDeque<Job>,
    scheduled: bool,
}

/// Serial job queue of one subscriber.
#[derive(Default)]
pub(crate) struct Mailbox {
    state: Mutex<MailboxState>,
}

impl Mailbox {
    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues `job`; returns whether the mailbox needs scheduling.
    fn push(&self, job: Job) -> bool {
        let mut state = self.lock();
        state.jobs.push_back(job);
        !mem::replace(&mut state.scheduled, true)
    }

    fn next(&self) -> Option<Job> {
        let mut state = self.lock();
        let job = state.jobs.pop_front();
        if job.is_none() {
            state.scheduled = false;
        }
        job
    }

    fn drain(&self) {
        while let Some(job) = self.next() {
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                error!(target: POOL_TARGET, "event callback panicked");
            }
        }
    }
}

/// Worker threads fed by one shared queue of scheduled mailboxes.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    scheduled: Sender<Arc<Mailbox>>,
    workers: usize,
}

impl WorkerPool {
    /// Spawns `workers` threads.
    pub(crate) fn new(workers: NonZeroUsize) -> Result<Self, ClientError> {
        let (scheduled, ready) = unbounded::<Arc<Mailbox>>();
        for index in 0..workers.get() {
            let ready = ready.clone();
            thread::Builder::new()
                .name(format!("mpv-ipc-dispatch-{index}"))
                .spawn(move || run_worker(&ready))?;
        }
        Ok(Self {
            scheduled,
            workers: workers.get(),
        })
    }

    /// Number of worker threads.
    pub(crate) const fn size(&self) -> usize {
        self.workers
    }

    /// Queues `job` behind the jobs already waiting in `mailbox`.
    pub(crate) fn submit<F>(&self, mailbox: &Arc<Mailbox>, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if mailbox.push(Box::new(job)) && self.scheduled.send(Arc::clone(mailbox)).is_err() {
            error!(target: POOL_TARGET, "dispatch workers are gone; dropping callback");
        }
    }
}

fn run_worker(ready: &Receiver<Arc<Mailbox>>) {
    for mailbox in ready {
        mailbox.drain();
    }
}
