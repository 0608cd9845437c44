//! Fixed-size worker pool executing queued jobs on OS threads.

use core::time::Duration;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use crate::config::DEFAULT_SHUTDOWN_GRACE;
use crate::guards::RunOnDrop;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Worker threads currently alive across every pool in the process.
static LIVE_WORKERS: AtomicUsize = AtomicUsize::new(0);

/// Returns how many pool worker threads are alive in this process.
#[must_use]
pub fn live_workers() -> usize {
    LIVE_WORKERS.load(Ordering::Acquire)
}

/// `WorkerPool` runs jobs on a fixed number of threads.
///
/// Tearing it down discards queued jobs rather than running them, see
/// [`WorkerPool::shutdown_now`]. Dropping the pool tears it down too.
pub struct WorkerPool {
    workers: Vec<Worker>,
    queue: Arc<JobQueue>,
    running: Arc<RunningWorkers>,
}

impl core::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl WorkerPool {
    /// Spawns `size` named worker threads.
    ///
    /// # Errors
    ///
    /// Returns the spawn error if a thread could not be created; workers
    /// spawned before the failure are torn down again.
    pub fn new(size: usize) -> io::Result<Self> {
        let span = tracing::trace_span!("WorkerPool::new", size);
        let _enter = span.enter();

        let mut pool = Self {
            workers: Vec::with_capacity(size),
            queue: Arc::new(JobQueue::new()),
            running: Arc::new(RunningWorkers::new()),
        };

        for id in 0..size {
            let worker = Worker::spawn(id, Arc::clone(&pool.queue), Arc::clone(&pool.running))?;
            pool.workers.push(worker);
        }

        tracing::debug!("Worker pool started with {} threads", size);
        Ok(pool)
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queues a job. Jobs queued after shutdown are dropped unrun.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(job) = self.queue.push(Box::new(job)) {
            tracing::debug!("Job submitted after shutdown, dropping it");
            drop(job);
        }
    }

    /// Stops the pool: queued jobs are dropped unrun, idle workers exit,
    /// and workers still inside a job get up to `grace` to finish it.
    ///
    /// Workers that finish in time are joined; the rest are detached and
    /// exit on their own once their job returns. Returns how many queued
    /// jobs were discarded.
    pub fn shutdown_now(&mut self, grace: Duration) -> usize {
        let span = tracing::trace_span!("WorkerPool::shutdown_now");
        let _enter = span.enter();

        let discarded_count = self.discard_queued();
        let idle = self.running.wait_idle(grace);
        if !idle {
            tracing::warn!(
                "{} worker(s) still busy after {:?}, detaching them",
                self.running.count(),
                grace
            );
        }

        for worker in self.workers.drain(..) {
            worker.release(idle);
        }

        tracing::debug!("Worker pool stopped, {} queued job(s) discarded", discarded_count);
        discarded_count
    }

    /// Stops the pool like [`WorkerPool::shutdown_now`] but joins every
    /// worker, however long its current job takes.
    pub fn shutdown(&mut self) -> usize {
        let span = tracing::trace_span!("WorkerPool::shutdown");
        let _enter = span.enter();

        let discarded_count = self.discard_queued();
        for worker in self.workers.drain(..) {
            worker.release(true);
        }

        tracing::debug!("Worker pool joined, {} queued job(s) discarded", discarded_count);
        discarded_count
    }

    fn discard_queued(&self) -> usize {
        let discarded = self.queue.shutdown();
        let discarded_count = discarded.len();
        drop(discarded);
        discarded_count
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown_now(DEFAULT_SHUTDOWN_GRACE);
        }
    }
}

struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    fn spawn(id: usize, queue: Arc<JobQueue>, running: Arc<RunningWorkers>) -> io::Result<Self> {
        running.started();
        let exits = Arc::clone(&running);

        let spawned = thread::Builder::new()
            .name(format!("foundation_concurrent-worker-{id}"))
            .spawn(move || {
                let _exit = RunOnDrop::new(move || exits.exited());
                while let Some(job) = queue.pop() {
                    job();
                }
            });

        match spawned {
            Ok(thread) => Ok(Self {
                id,
                thread: Some(thread),
            }),
            Err(err) => {
                running.exited();
                Err(err)
            }
        }
    }

    /// Joins the thread when it has left its job loop, detaches it otherwise.
    fn release(mut self, idle: bool) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        if !idle && !thread.is_finished() {
            tracing::debug!("Detaching busy worker {}", self.id);
            return;
        }

        if thread.join().is_err() {
            tracing::warn!("Worker {} exited by panicking", self.id);
        }
    }
}

/// Counts the live workers of one pool and mirrors them into
/// [`LIVE_WORKERS`].
struct RunningWorkers {
    event: Condvar,
    lock: Mutex<usize>,
}

impl RunningWorkers {
    fn new() -> Self {
        Self {
            event: Condvar::new(),
            lock: Mutex::new(0),
        }
    }

    fn started(&self) {
        *self.state() += 1;
        LIVE_WORKERS.fetch_add(1, Ordering::AcqRel);
    }

    fn exited(&self) {
        let mut running = self.state();
        *running = running.saturating_sub(1);
        drop(running);

        LIVE_WORKERS.fetch_sub(1, Ordering::AcqRel);
        self.event.notify_all();
    }

    fn count(&self) -> usize {
        *self.state()
    }

    /// Waits until no worker of this pool is alive, at most `grace`.
    fn wait_idle(&self, grace: Duration) -> bool {
        let running = self.state();
        let (running, _) = self
            .event
            .wait_timeout_while(running, grace, |running| *running > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *running == 0
    }

    fn state(&self) -> MutexGuard<'_, usize> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct QueueState {
    jobs: VecDeque<Job>,
    shutdown: bool,
}

/// FIFO of pending jobs shared by the workers of one pool.
struct JobQueue {
    event: Condvar,
    lock: Mutex<QueueState>,
}

impl JobQueue {
    fn new() -> Self {
        Self {
            event: Condvar::new(),
            lock: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                shutdown: false,
            }),
        }
    }

    /// Queues `job`, handing it back if the queue is shut down.
    fn push(&self, job: Job) -> Option<Job> {
        let mut state = self.state();
        if state.shutdown {
            return Some(job);
        }
        state.jobs.push_back(job);
        drop(state);

        self.event.notify_one();
        None
    }

    /// Blocks for the next job; `None` once the queue is shut down.
    fn pop(&self) -> Option<Job> {
        let mut state = self.state();
        loop {
            if state.shutdown {
                return None;
            }

            if let Some(job) = state.jobs.pop_front() {
                return Some(job);
            }

            state = self
                .event
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn len(&self) -> usize {
        self.state().jobs.len()
    }

    /// Marks the queue shut down and hands back every job still queued.
    fn shutdown(&self) -> Vec<Job> {
        let mut state = self.state();
        state.shutdown = true;
        let discarded = state.jobs.drain(..).collect();
        drop(state);

        self.event.notify_all();
        discarded
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
