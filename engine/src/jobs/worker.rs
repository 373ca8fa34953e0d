// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

mod background;
mod main_thread;

use core::time::Duration;
use std::{collections::VecDeque, sync::Arc, thread};

use crossbeam_utils::Backoff;
use parking_lot::{Mutex, RwLock};
use platform::Platform;
use tracing::{debug, error, trace, warn};

use super::{queues::JobQueues, ExecutionContext, Job, JobSystemError};

pub(crate) use background::BackgroundWorker;
pub(crate) use main_thread::MainThreadWorker;

/// The state of a worker. Workers start out paused, become idle when started,
/// and alternate between idle and busy while processing jobs. A worker can be
/// paused while idle and has nothing queued. Stopped workers are dead, and
/// stay that way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    Idle,
    Busy,
    Paused,
    Dead,
}

/// Independent bit flags for a worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WorkerFlags(u8);

impl WorkerFlags {
    pub const NONE: WorkerFlags = WorkerFlags(0);
    /// The job system replaces the worker with a new one if it dies.
    pub const PERSISTENT: WorkerFlags = WorkerFlags(1 << 0);

    pub const fn contains(self, other: WorkerFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

struct WorkerStatus {
    state: WorkerState,
    running: bool,
}

/// The parts of a worker shared with the thread that processes its jobs.
pub(crate) struct WorkerCore {
    name: String,
    flags: WorkerFlags,
    status: RwLock<WorkerStatus>,
    /// Locked before `status` whenever both are needed.
    jobs: Mutex<VecDeque<Job>>,
    queues: Arc<JobQueues>,
}

impl WorkerCore {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        self.status.read().state
    }

    pub fn is_running(&self) -> bool {
        self.status.read().running
    }

    /// Runs queued jobs on the calling thread until the queue is empty or the
    /// worker is stopped.
    pub fn process_jobs(&self, execution: ExecutionContext) {
        profiling::function_scope!();
        while self.is_running() {
            let job = {
                let mut jobs = self.jobs.lock();
                let Some(job) = jobs.pop_front() else {
                    break;
                };
                let mut status = self.status.write();
                if status.state != WorkerState::Dead {
                    status.state = WorkerState::Busy;
                }
                job
            };

            if job.is_completed() {
                self.queues.record_outcome(job);
                continue;
            }

            trace!("Worker '{}' running job '{}'.", self.name, job.name());
            if !job.run(execution) && job.is_pending() {
                trace!(
                    "Job '{}' is not ready yet, worker '{}' is handing it back.",
                    job.name(),
                    self.name,
                );
                self.queues.resubmit(job);
                continue;
            }
            self.queues.record_outcome(job);
        }

        let mut status = self.status.write();
        if status.state == WorkerState::Busy {
            status.state = WorkerState::Idle;
        }
    }

    /// Hands every queued job back to the job system's pending queue.
    pub fn drain_to_pending(&self) {
        let jobs = self.jobs.lock().drain(..).collect::<Vec<Job>>();
        if !jobs.is_empty() {
            debug!(
                "Worker '{}' handed {} queued jobs back to the job system.",
                self.name,
                jobs.len(),
            );
            self.queues.resubmit_all(jobs);
        }
    }

    /// Marks the worker dead without going through [`Worker::stop`], for
    /// when its thread has already exited.
    fn force_dead(&self) {
        let mut status = self.status.write();
        status.running = false;
        status.state = WorkerState::Dead;
    }

    fn set_state(&self, state: WorkerState) {
        self.status.write().state = state;
    }
}

/// The parts of a worker that differ between the main thread worker and the
/// background workers.
pub(crate) trait WorkerBackend: Send {
    /// Called by [`Worker::start`], after the worker is marked running.
    fn on_starting(&mut self, _core: &Arc<WorkerCore>, _platform: &dyn Platform) {}
    /// Called by [`Worker::stop`], after the worker has finished its current
    /// job and is not running anymore.
    fn on_stopping(&mut self, _core: &WorkerCore) {}
    fn on_pausing(&mut self, _core: &WorkerCore) {}
    fn on_resuming(&mut self, _core: &WorkerCore) {}
    /// Called after jobs were added to the worker's queue.
    fn on_queued(&self) {}
    /// Whether whatever processes the worker's jobs could still do so.
    fn is_alive(&self) -> bool {
        true
    }
    /// Called once per [`JobSystem::update`](super::JobSystem::update).
    fn update(&mut self, core: &WorkerCore);
}

/// A private job queue, and something which processes it.
pub(crate) struct Worker<B> {
    core: Arc<WorkerCore>,
    backend: B,
}

impl<B: WorkerBackend> Worker<B> {
    pub fn new(name: String, flags: WorkerFlags, queues: Arc<JobQueues>, backend: B) -> Worker<B> {
        Worker {
            core: Arc::new(WorkerCore {
                name,
                flags,
                status: RwLock::new(WorkerStatus {
                    state: WorkerState::Paused,
                    running: false,
                }),
                jobs: Mutex::new(VecDeque::new()),
                queues,
            }),
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn flags(&self) -> WorkerFlags {
        self.core.flags
    }

    pub fn state(&self) -> WorkerState {
        self.core.state()
    }

    pub fn is_running(&self) -> bool {
        self.core.is_running()
    }

    pub fn queued_len(&self) -> usize {
        self.core.jobs.lock().len()
    }

    pub fn start(&mut self, platform: &dyn Platform) -> Result<(), JobSystemError> {
        {
            let mut status = self.core.status.write();
            if status.state == WorkerState::Dead {
                error!("Worker '{}' is dead and can't be started.", self.core.name);
                return Err(JobSystemError::WorkerDead(self.core.name.clone()));
            }
            if status.running {
                error!("Worker '{}' was started while already running.", self.core.name);
                return Err(JobSystemError::WorkerAlreadyRunning(self.core.name.clone()));
            }
            status.running = true;
        }

        self.backend.on_starting(&self.core, platform);

        {
            let mut status = self.core.status.write();
            if status.state == WorkerState::Paused {
                status.state = WorkerState::Idle;
            }
        }
        debug!("Started worker '{}'.", self.core.name);
        Ok(())
    }

    /// Lets the current job finish, then shuts the worker down for good. Jobs
    /// still in its queue are handed back to the job system.
    pub fn stop(&mut self) -> Result<(), JobSystemError> {
        {
            let mut status = self.core.status.write();
            if !status.running {
                error!("Worker '{}' was stopped while not running.", self.core.name);
                return Err(JobSystemError::WorkerNotRunning(self.core.name.clone()));
            }
            status.running = false;
        }

        self.wait_for_idle();
        self.backend.on_stopping(&self.core);
        self.core.drain_to_pending();
        self.core.set_state(WorkerState::Dead);
        debug!("Stopped worker '{}'.", self.core.name);
        Ok(())
    }

    /// Pauses an idle worker with nothing queued. Returns false and does
    /// nothing otherwise.
    pub fn pause(&mut self) -> bool {
        let jobs = self.core.jobs.lock();
        let state = self.core.state();
        if state != WorkerState::Idle || !jobs.is_empty() {
            warn!(
                "Worker '{}' can't be paused while {state:?} with {} jobs queued.",
                self.core.name,
                jobs.len(),
            );
            return false;
        }

        self.backend.on_pausing(&self.core);
        self.core.set_state(WorkerState::Paused);
        debug!("Paused worker '{}'.", self.core.name);
        true
    }

    /// Returns false and does nothing if the worker isn't paused.
    pub fn resume(&mut self) -> bool {
        let state = self.core.state();
        if state != WorkerState::Paused {
            warn!("Worker '{}' was resumed while {state:?}.", self.core.name);
            return false;
        }

        self.backend.on_resuming(&self.core);
        let mut status = self.core.status.write();
        if status.state == WorkerState::Paused {
            status.state = WorkerState::Idle;
        }
        debug!("Resumed worker '{}'.", self.core.name);
        true
    }

    pub fn queue_job(&mut self, job: &Job) -> Result<(), JobSystemError> {
        self.queue_jobs(core::slice::from_ref(job))
    }

    /// Appends the jobs to the worker's queue, resuming the worker if it's
    /// paused. Fails if the worker is dead or not running, in which case the
    /// caller still owns the jobs.
    pub fn queue_jobs(&mut self, jobs: &[Job]) -> Result<(), JobSystemError> {
        let core = self.core.clone();
        let mut queue = core.jobs.lock();
        let state = {
            let status = core.status.read();
            if status.state == WorkerState::Dead {
                return Err(JobSystemError::WorkerDead(core.name.clone()));
            }
            if !status.running {
                return Err(JobSystemError::WorkerNotRunning(core.name.clone()));
            }
            status.state
        };

        // Pausing needs the queue lock, which is held until the jobs are in.
        if state == WorkerState::Paused {
            self.resume();
        }
        queue.extend(jobs.iter().cloned());
        drop(queue);

        self.backend.on_queued();
        Ok(())
    }

    pub fn update(&mut self) {
        self.backend.update(&self.core);
    }

    fn wait_for_idle(&mut self) {
        let backoff = Backoff::new();
        loop {
            match self.core.state() {
                WorkerState::Idle | WorkerState::Dead => break,
                WorkerState::Paused => {
                    self.resume();
                }
                WorkerState::Busy if !self.backend.is_alive() => {
                    warn!(
                        "Worker '{}' died while busy, not waiting for it.",
                        self.core.name,
                    );
                    break;
                }
                WorkerState::Busy if backoff.is_completed() => {
                    thread::sleep(Duration::from_millis(1));
                }
                WorkerState::Busy => backoff.snooze(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use crate::{
        jobs::{
            queues::JobQueues, ExecutionContext, Job, JobState, JobSystemError, WorkerFlags,
            WorkerState,
        },
        test_platform::TestPlatform,
    };

    use super::{Worker, WorkerBackend, WorkerCore};

    /// Processes jobs on the thread calling `update`, and counts hook calls.
    #[derive(Default)]
    struct ManualBackend {
        pauses: Arc<AtomicUsize>,
        resumes: Arc<AtomicUsize>,
    }

    impl WorkerBackend for ManualBackend {
        fn on_pausing(&mut self, _core: &WorkerCore) {
            self.pauses.fetch_add(1, Ordering::Relaxed);
        }
        fn on_resuming(&mut self, _core: &WorkerCore) {
            self.resumes.fetch_add(1, Ordering::Relaxed);
        }
        fn update(&mut self, core: &WorkerCore) {
            core.process_jobs(ExecutionContext::MainThread);
        }
    }

    fn worker(queues: &Arc<JobQueues>) -> Worker<ManualBackend> {
        Worker::new(
            String::from("Test Worker"),
            WorkerFlags::NONE,
            queues.clone(),
            ManualBackend::default(),
        )
    }

    #[test]
    fn lifecycle() {
        let platform = TestPlatform::new(false);
        let queues = Arc::new(JobQueues::default());
        let mut worker = worker(&queues);
        assert_eq!(WorkerState::Paused, worker.state());
        assert!(worker.start(&platform).is_ok());
        assert_eq!(WorkerState::Idle, worker.state());
        assert!(matches!(worker.start(&platform), Err(JobSystemError::WorkerAlreadyRunning(_))));

        assert!(worker.stop().is_ok());
        assert_eq!(WorkerState::Dead, worker.state());
        assert!(matches!(worker.stop(), Err(JobSystemError::WorkerNotRunning(_))));
        assert!(matches!(worker.start(&platform), Err(JobSystemError::WorkerDead(_))));
    }

    #[test]
    fn processes_jobs_in_order() {
        let platform = TestPlatform::new(false);
        let queues = Arc::new(JobQueues::default());
        let mut worker = worker(&queues);
        worker.start(&platform).unwrap();

        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let jobs = (0..3)
            .map(|i| {
                let order = order.clone();
                Job::from_fn(format!("job {i}"), move |_| order.lock().push(i))
            })
            .collect::<Vec<_>>();
        worker.queue_jobs(&jobs).unwrap();
        assert_eq!(3, worker.queued_len());

        worker.update();
        assert_eq!(vec![0, 1, 2], *order.lock());
        assert_eq!(0, worker.queued_len());
        assert_eq!(WorkerState::Idle, worker.state());
        assert_eq!(3, queues.completed().len());
    }

    #[test]
    fn unready_and_finished_jobs_are_not_run() {
        let platform = TestPlatform::new(false);
        let queues = Arc::new(JobQueues::default());
        let mut worker = worker(&queues);
        worker.start(&platform).unwrap();

        let dependency = Job::from_fn("dependency", |_| {});
        let blocked = Job::from_fn("blocked", |_| {});
        blocked.add_dependency(&dependency);
        let canceled = Job::from_fn("canceled", |_| {});
        canceled.cancel();

        worker.queue_job(&blocked).unwrap();
        worker.queue_job(&canceled).unwrap();
        worker.update();

        assert_eq!(JobState::Pending, blocked.state());
        let pending = queues.take_pending();
        assert_eq!(1, pending.len());
        assert!(pending[0].ptr_eq(&blocked));
        assert_eq!(1, queues.cancelled().len());
    }

    #[test]
    fn pause_requires_idle_and_empty_queue() {
        let platform = TestPlatform::new(false);
        let queues = Arc::new(JobQueues::default());
        let mut worker = worker(&queues);
        let pauses = worker.backend.pauses.clone();
        let resumes = worker.backend.resumes.clone();

        assert!(!worker.pause(), "a worker that was never started is not idle");
        worker.start(&platform).unwrap();
        worker.queue_job(&Job::from_fn("queued", |_| {})).unwrap();
        assert!(!worker.pause(), "paused with jobs in the queue");
        worker.update();

        assert!(worker.pause());
        assert_eq!(WorkerState::Paused, worker.state());
        assert!(!worker.pause());
        assert_eq!(1, pauses.load(Ordering::Relaxed));

        assert!(worker.resume());
        assert!(!worker.resume(), "resumed while idle");
        assert_eq!(1, resumes.load(Ordering::Relaxed));
    }

    #[test]
    fn queueing_resumes_a_paused_worker() {
        let platform = TestPlatform::new(false);
        let queues = Arc::new(JobQueues::default());
        let mut worker = worker(&queues);
        worker.start(&platform).unwrap();
        assert!(worker.pause());

        let job = Job::from_fn("wakes the worker", |_| {});
        worker.queue_job(&job).unwrap();
        assert_eq!(WorkerState::Idle, worker.state());
        worker.update();
        assert_eq!(JobState::Succeeded, job.state());
    }

    #[test]
    fn stop_hands_queued_jobs_back() {
        let platform = TestPlatform::new(false);
        let queues = Arc::new(JobQueues::default());
        let mut worker = worker(&queues);
        worker.start(&platform).unwrap();
        worker.queue_job(&Job::from_fn("left over", |_| {})).unwrap();
        worker.stop().unwrap();

        assert_eq!(1, queues.pending_len());
        let job = Job::from_fn("too late", |_| {});
        assert!(matches!(worker.queue_job(&job), Err(JobSystemError::WorkerDead(_))));
    }

    #[test]
    fn queueing_to_an_unstarted_worker_fails() {
        let queues = Arc::new(JobQueues::default());
        let mut worker = worker(&queues);
        let job = Job::from_fn("early", |_| {});
        assert!(matches!(worker.queue_job(&job), Err(JobSystemError::WorkerNotRunning(_))));
        assert_eq!(0, worker.queued_len());
    }
}
