//! Dependency-graph job scheduler.
//!
//! Callers create jobs, wire "must run after" edges between them, enqueue a
//! root and block until it completes. A job becomes runnable exactly when
//! every job it depends on has completed; runnable jobs are consumed in
//! readiness order by a fixed pool of worker threads.
//!
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! use kiln_jobs::JobScheduler;
//!
//! let scheduler = JobScheduler::new(2);
//! let count = Arc::new(AtomicUsize::new(0));
//!
//! let root = scheduler.create_host_job();
//! for _ in 0..8 {
//!     let count = Arc::clone(&count);
//!     let job = scheduler.create_job(move || {
//!         count.fetch_add(1, Ordering::SeqCst);
//!     });
//!     scheduler.add_dependency(root, job).unwrap();
//! }
//! scheduler.enqueue(root).unwrap();
//! scheduler.wait(root).unwrap();
//! assert_eq!(count.load(Ordering::SeqCst), 8);
//! ```
//!
//! The scheduler never interprets job failure. Jobs that can fail share a
//! flag and return early once it is set; see the crate tests for the
//! pattern.

use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use thiserror::Error;

/// A unit of work.
type Work = Box<dyn FnOnce() + Send + 'static>;

/// Reference to a job owned by a [`JobScheduler`].
///
/// Handles are small indices into the scheduler's job arena and stay valid
/// until the scheduler is dropped. The default handle is
/// [`JobHandle::INVALID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobHandle(u32);

impl JobHandle {
    /// A handle that refers to no job.
    pub const INVALID: JobHandle = JobHandle(u32::MAX);

    /// Whether this handle could refer to a job.
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl Default for JobHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "job#{}", self.0)
        } else {
            f.write_str("job#invalid")
        }
    }
}

/// Errors from graph construction and waiting.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    /// The handle is invalid or belongs to another scheduler.
    #[error("{0} does not refer to a job")]
    InvalidHandle(JobHandle),

    /// The edge would close a cycle.
    #[error("{dependent} cannot depend on {dependency}: dependency cycle")]
    Cycle {
        /// Job that was to wait.
        dependent: JobHandle,
        /// Job it was to wait on.
        dependency: JobHandle,
    },

    /// Edges can only be added to jobs that have not been enqueued.
    #[error("{0} is already scheduled")]
    AlreadyScheduled(JobHandle),

    /// `wait` was called on a job that was never enqueued.
    #[error("{0} was never enqueued")]
    NotEnqueued(JobHandle),

    /// One or more jobs required by the waited-on root panicked.
    #[error("{count} job(s) panicked")]
    Panicked {
        /// Number of panicked jobs.
        count: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    /// Created, edges may still be added.
    Created,
    /// Enqueued; runs once `pending` reaches zero.
    Scheduled,
    Running,
    Done,
}

struct JobNode {
    work: Option<Work>,
    /// Dependencies that have not completed yet.
    pending: usize,
    dependents: Vec<JobHandle>,
    dependencies: Vec<JobHandle>,
    state: JobState,
    panicked: bool,
}

struct State {
    nodes: Vec<JobNode>,
    ready: VecDeque<JobHandle>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    /// Signalled when `ready` gains work or on shutdown.
    work_ready: Condvar,
    /// Signalled whenever a job completes.
    job_done: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Jobs run outside the lock, so a poisoned lock still holds a
        // consistent graph.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

thread_local! {
    static WORKER_ID: Cell<Option<usize>> = const { Cell::new(None) };
}

/// A job graph plus the worker pool that executes it.
///
/// Dropping the scheduler lets the workers drain any runnable jobs, then
/// joins them.
pub struct JobScheduler {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl JobScheduler {
    /// Start a pool of `workers` threads. `0` uses the host's available
    /// parallelism.
    pub fn new(workers: usize) -> Self {
        let count = match workers {
            0 => thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            n => n,
        };
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                nodes: Vec::new(),
                ready: VecDeque::new(),
                shutdown: false,
            }),
            work_ready: Condvar::new(),
            job_done: Condvar::new(),
        });

        let workers = (0..count)
            .map(|id| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("kiln-worker-{id}"))
                    .spawn(move || worker_loop(&shared, id))
                    .unwrap_or_else(|e| panic!("failed to spawn worker thread: {e}"))
            })
            .collect();

        Self { shared, workers }
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Index of the worker thread executing the caller, or `None` when
    /// called outside a job.
    pub fn thread_id() -> Option<usize> {
        WORKER_ID.with(Cell::get)
    }

    /// Create a job that runs `work`.
    pub fn create_job(&self, work: impl FnOnce() + Send + 'static) -> JobHandle {
        self.insert(Some(Box::new(work)))
    }

    /// Create a job with no work, used to group other jobs.
    pub fn create_host_job(&self) -> JobHandle {
        self.insert(None)
    }

    fn insert(&self, work: Option<Work>) -> JobHandle {
        let mut state = self.shared.lock();
        let handle = JobHandle(u32::try_from(state.nodes.len()).unwrap_or(u32::MAX));
        assert!(handle.is_valid(), "job arena exhausted");
        state.nodes.push(JobNode {
            work,
            pending: 0,
            dependents: Vec::new(),
            dependencies: Vec::new(),
            state: JobState::Created,
            panicked: false,
        });
        handle
    }

    /// `dependent` will not start until `dependency` has completed.
    ///
    /// An edge to a job that already completed is satisfied immediately.
    /// Edges that would form a cycle are rejected.
    pub fn add_dependency(&self, dependent: JobHandle, dependency: JobHandle) -> Result<(), JobError> {
        let mut state = self.shared.lock();
        check(&state, dependent)?;
        check(&state, dependency)?;

        if state.nodes[dependent.index()].state != JobState::Created {
            return Err(JobError::AlreadyScheduled(dependent));
        }
        if reaches(&state.nodes, dependency, dependent) {
            return Err(JobError::Cycle { dependent, dependency });
        }

        state.nodes[dependent.index()].dependencies.push(dependency);
        if state.nodes[dependency.index()].state != JobState::Done {
            state.nodes[dependency.index()].dependents.push(dependent);
            state.nodes[dependent.index()].pending += 1;
        }
        Ok(())
    }

    /// Schedule `root` and every job it transitively depends on.
    pub fn enqueue(&self, root: JobHandle) -> Result<(), JobError> {
        let mut state = self.shared.lock();
        check(&state, root)?;

        let mut stack = vec![root];
        let mut pushed = false;
        while let Some(handle) = stack.pop() {
            let node = &mut state.nodes[handle.index()];
            if node.state != JobState::Created {
                continue;
            }
            node.state = JobState::Scheduled;
            stack.extend(node.dependencies.iter().copied());
            if node.pending == 0 {
                state.ready.push_back(handle);
                pushed = true;
            }
        }
        drop(state);

        if pushed {
            self.shared.work_ready.notify_all();
        }
        Ok(())
    }

    /// Block until `root` has completed.
    ///
    /// Must not be called from inside a job of the same scheduler.
    pub fn wait(&self, root: JobHandle) -> Result<(), JobError> {
        let mut state = self.shared.lock();
        check(&state, root)?;
        if state.nodes[root.index()].state == JobState::Created {
            return Err(JobError::NotEnqueued(root));
        }
        while state.nodes[root.index()].state != JobState::Done {
            state = self
                .shared
                .job_done
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        let count = panicked_in(&state.nodes, root);
        if count > 0 {
            return Err(JobError::Panicked { count });
        }
        Ok(())
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.work_ready.notify_all();
        for worker in self.workers.drain(..) {
            // Job panics are caught inside the worker; a join error here
            // means the worker loop itself failed, which leaves nothing
            // to clean up.
            let _ = worker.join();
        }
    }
}

fn check(state: &State, handle: JobHandle) -> Result<(), JobError> {
    if handle.index() < state.nodes.len() {
        Ok(())
    } else {
        Err(JobError::InvalidHandle(handle))
    }
}

/// Whether `to` is reachable from `from` along dependency edges.
fn reaches(nodes: &[JobNode], from: JobHandle, to: JobHandle) -> bool {
    let mut visited = vec![false; nodes.len()];
    let mut stack = vec![from];
    while let Some(handle) = stack.pop() {
        if handle == to {
            return true;
        }
        if std::mem::replace(&mut visited[handle.index()], true) {
            continue;
        }
        stack.extend(nodes[handle.index()].dependencies.iter().copied());
    }
    false
}

/// Number of panicked jobs among `root` and its transitive dependencies.
fn panicked_in(nodes: &[JobNode], root: JobHandle) -> usize {
    let mut visited = vec![false; nodes.len()];
    let mut stack = vec![root];
    let mut count = 0;
    while let Some(handle) = stack.pop() {
        if std::mem::replace(&mut visited[handle.index()], true) {
            continue;
        }
        let node = &nodes[handle.index()];
        count += usize::from(node.panicked);
        stack.extend(node.dependencies.iter().copied());
    }
    count
}

fn worker_loop(shared: &Shared, id: usize) {
    WORKER_ID.with(|cell| cell.set(Some(id)));

    let mut state = shared.lock();
    loop {
        let Some(handle) = state.ready.pop_front() else {
            if state.shutdown {
                return;
            }
            state = shared.work_ready.wait(state).unwrap_or_else(PoisonError::into_inner);
            continue;
        };

        let node = &mut state.nodes[handle.index()];
        node.state = JobState::Running;
        let work = node.work.take();
        drop(state);

        let panicked = match work {
            Some(work) => panic::catch_unwind(AssertUnwindSafe(work)).is_err(),
            None => false,
        };

        state = shared.lock();
        let node = &mut state.nodes[handle.index()];
        node.state = JobState::Done;
        node.panicked = panicked;
        let dependents = std::mem::take(&mut node.dependents);

        let mut woke = false;
        for dependent in dependents {
            let node = &mut state.nodes[dependent.index()];
            node.pending -= 1;
            if node.pending == 0 && node.state == JobState::Scheduled {
                state.ready.push_back(dependent);
                woke = true;
            }
        }
        if woke {
            shared.work_ready.notify_all();
        }
        shared.job_done.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Shared event log for ordering assertions.
    #[derive(Clone, Default)]
    struct Log(Arc<Mutex<Vec<String>>>);

    impl Log {
        fn push(&self, event: impl Into<String>) {
            self.0.lock().unwrap().push(event.into());
        }

        fn position(&self, event: &str) -> usize {
            let events = self.0.lock().unwrap();
            events
                .iter()
                .position(|e| e == event)
                .unwrap_or_else(|| panic!("missing event {event}: {events:?}"))
        }
    }

    fn logged_job(scheduler: &JobScheduler, log: &Log, name: &'static str) -> JobHandle {
        let log = log.clone();
        scheduler.create_job(move || {
            log.push(format!("start:{name}"));
            thread::sleep(Duration::from_millis(5));
            log.push(format!("end:{name}"));
        })
    }

    fn diamond(workers: usize) {
        let scheduler = JobScheduler::new(workers);
        let log = Log::default();
        let a = logged_job(&scheduler, &log, "A");
        let x = logged_job(&scheduler, &log, "X");
        let y = logged_job(&scheduler, &log, "Y");
        let z = logged_job(&scheduler, &log, "Z");
        scheduler.add_dependency(x, a).unwrap();
        scheduler.add_dependency(y, a).unwrap();
        scheduler.add_dependency(z, x).unwrap();
        scheduler.add_dependency(z, y).unwrap();

        scheduler.enqueue(z).unwrap();
        scheduler.wait(z).unwrap();

        assert!(log.position("end:A") < log.position("start:X"));
        assert!(log.position("end:A") < log.position("start:Y"));
        assert!(log.position("end:X") < log.position("start:Z"));
        assert!(log.position("end:Y") < log.position("start:Z"));
    }

    #[test]
    fn diamond_single_worker() {
        diamond(1);
    }

    #[test]
    fn diamond_many_workers() {
        diamond(4);
    }

    #[test]
    fn chain_runs_in_order() {
        let scheduler = JobScheduler::new(8);
        let log = Log::default();
        let names = ["a", "b", "c", "d", "e"];
        let jobs: Vec<JobHandle> = names.iter().map(|n| logged_job(&scheduler, &log, n)).collect();
        for pair in jobs.windows(2) {
            scheduler.add_dependency(pair[1], pair[0]).unwrap();
        }
        let last = *jobs.last().unwrap();
        scheduler.enqueue(last).unwrap();
        scheduler.wait(last).unwrap();

        let events = log.0.lock().unwrap().clone();
        let expected: Vec<String> = names
            .iter()
            .flat_map(|n| [format!("start:{n}"), format!("end:{n}")])
            .collect();
        assert_eq!(events, expected);
    }

    #[test]
    fn wide_fan_in_runs_everything() {
        let scheduler = JobScheduler::new(4);
        let count = Arc::new(AtomicUsize::new(0));
        let root = scheduler.create_host_job();
        for _ in 0..500 {
            let count = Arc::clone(&count);
            let job = scheduler.create_job(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
            scheduler.add_dependency(root, job).unwrap();
        }
        scheduler.enqueue(root).unwrap();
        scheduler.wait(root).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 500);
    }

    #[test]
    fn cycles_are_rejected() {
        let scheduler = JobScheduler::new(1);
        let a = scheduler.create_host_job();
        let b = scheduler.create_host_job();
        let c = scheduler.create_host_job();
        scheduler.add_dependency(b, a).unwrap();
        scheduler.add_dependency(c, b).unwrap();

        assert_eq!(
            scheduler.add_dependency(a, c),
            Err(JobError::Cycle { dependent: a, dependency: c })
        );
        assert!(matches!(scheduler.add_dependency(a, a), Err(JobError::Cycle { .. })));

        // The rejected edge left the graph runnable.
        scheduler.enqueue(c).unwrap();
        scheduler.wait(c).unwrap();
    }

    #[test]
    fn invalid_handles_are_rejected() {
        let scheduler = JobScheduler::new(1);
        let a = scheduler.create_host_job();
        assert!(!JobHandle::default().is_valid());
        assert_eq!(
            scheduler.add_dependency(a, JobHandle::INVALID),
            Err(JobError::InvalidHandle(JobHandle::INVALID))
        );
        assert_eq!(scheduler.enqueue(JobHandle(7)), Err(JobError::InvalidHandle(JobHandle(7))));
    }

    #[test]
    fn wait_requires_enqueue() {
        let scheduler = JobScheduler::new(1);
        let a = scheduler.create_host_job();
        assert_eq!(scheduler.wait(a), Err(JobError::NotEnqueued(a)));
    }

    #[test]
    fn scheduled_jobs_cannot_gain_edges() {
        let scheduler = JobScheduler::new(1);
        let gate = Arc::new(AtomicBool::new(false));
        let a = {
            let gate = Arc::clone(&gate);
            scheduler.create_job(move || {
                while !gate.load(Ordering::SeqCst) {
                    thread::yield_now();
                }
            })
        };
        let b = scheduler.create_host_job();
        scheduler.enqueue(a).unwrap();
        assert_eq!(scheduler.add_dependency(a, b), Err(JobError::AlreadyScheduled(a)));
        gate.store(true, Ordering::SeqCst);
        scheduler.wait(a).unwrap();
    }

    #[test]
    fn completed_dependency_is_satisfied() {
        let scheduler = JobScheduler::new(2);
        let ran = Arc::new(AtomicUsize::new(0));
        let a = {
            let ran = Arc::clone(&ran);
            scheduler.create_job(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            })
        };
        scheduler.enqueue(a).unwrap();
        scheduler.wait(a).unwrap();

        let b = {
            let ran = Arc::clone(&ran);
            scheduler.create_job(move || {
                ran.fetch_add(10, Ordering::SeqCst);
            })
        };
        scheduler.add_dependency(b, a).unwrap();
        scheduler.enqueue(b).unwrap();
        scheduler.wait(b).unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn panics_are_contained() {
        let scheduler = JobScheduler::new(2);
        let after = Arc::new(AtomicBool::new(false));
        let bad = scheduler.create_job(|| panic!("job failed on purpose"));
        let next = {
            let after = Arc::clone(&after);
            scheduler.create_job(move || after.store(true, Ordering::SeqCst))
        };
        scheduler.add_dependency(next, bad).unwrap();
        scheduler.enqueue(next).unwrap();

        assert_eq!(scheduler.wait(next), Err(JobError::Panicked { count: 1 }));
        assert!(after.load(Ordering::SeqCst));

        // The pool keeps working, and unrelated roots are unaffected.
        let ok = scheduler.create_host_job();
        scheduler.enqueue(ok).unwrap();
        scheduler.wait(ok).unwrap();
    }

    #[test]
    fn thread_id_identifies_workers() {
        let scheduler = JobScheduler::new(3);
        assert_eq!(JobScheduler::thread_id(), None);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let root = scheduler.create_host_job();
        for _ in 0..16 {
            let seen = Arc::clone(&seen);
            let job = scheduler.create_job(move || {
                seen.lock().unwrap().push(JobScheduler::thread_id());
            });
            scheduler.add_dependency(root, job).unwrap();
        }
        scheduler.enqueue(root).unwrap();
        scheduler.wait(root).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 16);
        assert!(seen.iter().all(|id| matches!(id, Some(n) if *n < 3)));
    }

    #[test]
    fn zero_workers_detects_parallelism() {
        let scheduler = JobScheduler::new(0);
        assert!(scheduler.worker_count() >= 1);
    }

    #[test]
    fn failure_flag_skips_remaining_work() {
        let scheduler = JobScheduler::new(2);
        let failed = Arc::new(AtomicBool::new(false));
        let executed = Arc::new(AtomicUsize::new(0));

        let mut previous = JobHandle::INVALID;
        let mut last = JobHandle::INVALID;
        for i in 0..5 {
            let failed = Arc::clone(&failed);
            let executed = Arc::clone(&executed);
            let job = scheduler.create_job(move || {
                if failed.load(Ordering::SeqCst) {
                    return;
                }
                executed.fetch_add(1, Ordering::SeqCst);
                if i == 1 {
                    failed.store(true, Ordering::SeqCst);
                }
            });
            if previous.is_valid() {
                scheduler.add_dependency(job, previous).unwrap();
            }
            previous = job;
            last = job;
        }
        scheduler.enqueue(last).unwrap();
        scheduler.wait(last).unwrap();

        assert!(failed.load(Ordering::SeqCst));
        assert_eq!(executed.load(Ordering::SeqCst), 2);
    }
}
