use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::counter::AtomicCounter;
use super::priority::Priority;
use crate::profiling::{profile_scope, set_thread_name};

/// How long a helping waiter parks before re-checking the queues.
const HELP_POLL_INTERVAL: Duration = Duration::from_millis(1);

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Task {
    job: Job,
    counter: Option<AtomicCounter>,
}

impl Task {
    fn run(self) {
        let Task { job, counter } = self;
        let result = catch_unwind(AssertUnwindSafe(job));
        if let Some(counter) = counter {
            counter.decrement();
        }
        if result.is_err() {
            log::error!("Scheduled task panicked");
        }
    }
}

#[derive(Default)]
struct TaskQueues {
    critical: VecDeque<Task>,
    high: VecDeque<Task>,
    low: VecDeque<Task>,
}

impl TaskQueues {
    fn queue_mut(&mut self, priority: Priority) -> &mut VecDeque<Task> {
        match priority {
            Priority::Critical => &mut self.critical,
            Priority::High => &mut self.high,
            Priority::Low => &mut self.low,
        }
    }

    fn push(&mut self, priority: Priority, task: Task) {
        self.queue_mut(priority).push_back(task);
    }

    fn pop(&mut self) -> Option<Task> {
        Priority::DESCENDING
            .into_iter()
            .find_map(|priority| self.queue_mut(priority).pop_front())
    }

    fn len(&self) -> usize {
        self.critical.len() + self.high.len() + self.low.len()
    }
}

struct Shared {
    queues: Mutex<TaskQueues>,
    work_available: Condvar,
    shutdown: AtomicBool,
}

impl Shared {
    fn try_pop(&self) -> Option<Task> {
        self.queues.lock().pop()
    }
}

/// Cooperative task scheduler backed by a fixed pool of worker threads.
///
/// Jobs are plain `FnOnce` closures queued by [`Priority`]. Joining a group
/// of jobs goes through an [`AtomicCounter`]: [`wait_for_counter`] keeps the
/// calling thread busy executing queued jobs until the counter drains, so a
/// job that waits on its own children never starves the pool, even with a
/// single worker.
///
/// Dropping the scheduler lets the workers drain everything already queued
/// and then joins them.
///
/// [`wait_for_counter`]: TaskScheduler::wait_for_counter
pub struct TaskScheduler {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskScheduler {
    /// Creates a scheduler with `worker_threads` workers.
    ///
    /// Passing `0` sizes the pool to the number of available CPU cores.
    pub fn new(worker_threads: usize) -> Self {
        let count = if worker_threads == 0 {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            worker_threads
        };

        let shared = Arc::new(Shared {
            queues: Mutex::new(TaskQueues::default()),
            work_available: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let shared = Arc::clone(&shared);
            let spawned = std::thread::Builder::new()
                .name(format!("nova-worker-{index}"))
                .spawn(move || worker_loop(&shared));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => log::error!("Failed to spawn scheduler worker {}: {}", index, e),
            }
        }

        log::info!("Task scheduler started with {} workers", workers.len());

        Self { shared, workers }
    }

    /// Number of running worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Number of queued jobs not yet picked up by a thread.
    pub fn pending_tasks(&self) -> usize {
        self.shared.queues.lock().len()
    }

    /// Queues a fire-and-forget job.
    pub fn spawn<F>(&self, priority: Priority, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.push(
            priority,
            Task {
                job: Box::new(job),
                counter: None,
            },
        );
    }

    /// Queues a job tracked by `counter`.
    ///
    /// The counter is incremented before the job becomes visible to workers,
    /// so a subsequent [`wait_for_counter`](Self::wait_for_counter) always
    /// covers it.
    pub fn spawn_counted<F>(&self, priority: Priority, counter: &AtomicCounter, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        counter.increment();
        self.push(
            priority,
            Task {
                job: Box::new(job),
                counter: Some(counter.clone()),
            },
        );
    }

    /// Suspends the caller until `counter` reaches zero.
    ///
    /// While waiting, the calling thread runs queued jobs itself. It only
    /// parks when the queues are empty and the remaining jobs are executing
    /// on other threads.
    pub fn wait_for_counter(&self, counter: &AtomicCounter) {
        profile_scope!("wait_for_counter");

        while !counter.is_zero() {
            match self.shared.try_pop() {
                Some(task) => task.run(),
                None => {
                    counter.wait_zero_timeout(HELP_POLL_INTERVAL);
                }
            }
        }
    }

    fn push(&self, priority: Priority, task: Task) {
        if self.workers.is_empty() {
            // No workers: run inline so counted waits still complete.
            task.run();
            return;
        }
        self.shared.queues.lock().push(priority, task);
        self.shared.work_available.notify_one();
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        {
            // Hold the lock so no worker misses the wake-up between its
            // shutdown check and its wait.
            let _queues = self.shared.queues.lock();
            self.shared.work_available.notify_all();
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("Scheduler worker exited with a panic");
            }
        }
        log::debug!("Task scheduler stopped");
    }
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("workers", &self.workers.len())
            .field("pending", &self.pending_tasks())
            .finish()
    }
}

fn worker_loop(shared: &Shared) {
    set_thread_name!("nova-worker");

    loop {
        let task = {
            let mut queues = shared.queues.lock();
            loop {
                if let Some(task) = queues.pop() {
                    break Some(task);
                }
                if shared.shutdown.load(Ordering::Acquire) {
                    break None;
                }
                shared.work_available.wait(&mut queues);
            }
        };

        match task {
            Some(task) => task.run(),
            None => return,
        }
    }
}
