// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use core::cmp::Reverse;
use std::sync::Arc;

use arrayvec::ArrayVec;
use enum_map::EnumMap;
use platform::Platform;
use tracing::{debug, error, trace, warn};

use crate::multithreading::{background_worker_count, MAX_WORKERS};

use super::{
    queues::JobQueues,
    worker::{BackgroundWorker, MainThreadWorker},
    CompletionCallback, Job, JobBuilder, JobContext, JobFlags, JobState, JobSubmitter,
    JobSystemConfig, JobSystemError, ResultJob, WorkerFlags, WorkerState,
};

/// Job counts from the last [`JobSystem::update`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    counts: EnumMap<JobState, usize>,
}

impl FrameStats {
    /// For the terminal states, the amount of jobs that finished that way
    /// since the previous update. [`JobState::Pending`] counts the jobs left
    /// waiting in the job system's queue, and [`JobState::Running`] the jobs
    /// handed to a worker but not finished yet.
    pub fn count(&self, state: JobState) -> usize {
        self.counts[state]
    }
}

/// Owns the workers, and hands jobs to them as they become ready.
///
/// Created stopped. Call [`JobSystem::startup`] once, then
/// [`JobSystem::update`] once per frame from the main thread, then
/// [`JobSystem::shutdown`] (or drop the job system).
pub struct JobSystem {
    config: JobSystemConfig,
    background_worker_count: usize,
    /// Indexed by slot. A dead non-persistent worker leaves its slot empty.
    workers: Vec<Option<BackgroundWorker>>,
    main_thread_worker: Option<MainThreadWorker>,
    queues: Arc<JobQueues>,
    last_frame: FrameStats,
}

impl JobSystem {
    pub fn new(platform: &dyn Platform, config: JobSystemConfig) -> JobSystem {
        let background_worker_count =
            background_worker_count(platform.available_parallelism(), config.worker_count);
        JobSystem {
            config,
            background_worker_count,
            workers: Vec::new(),
            main_thread_worker: None,
            queues: Arc::new(JobQueues::default()),
            last_frame: FrameStats::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.queues.is_running()
    }

    /// Creates and starts the workers.
    pub fn startup(&mut self, platform: &dyn Platform) -> Result<(), JobSystemError> {
        if self.is_running() {
            error!("The job system was started up while already running.");
            return Err(JobSystemError::AlreadyRunning);
        }

        let mut main_thread_worker = MainThreadWorker::for_main_thread(self.queues.clone());
        main_thread_worker.start(platform)?;
        self.main_thread_worker = Some(main_thread_worker);

        let flags = if self.config.persistent_workers {
            WorkerFlags::PERSISTENT
        } else {
            WorkerFlags::NONE
        };
        let mut workers = Vec::with_capacity(self.background_worker_count);
        for slot in 0..self.background_worker_count {
            workers.push(Some(self.spawn_worker(slot, flags, platform)?));
        }
        self.workers = workers;

        self.queues.set_running(true);
        debug!(
            "Started the job system with {} background workers.",
            self.background_worker_count,
        );
        Ok(())
    }

    /// Stops every worker, and cancels the jobs which haven't been run.
    pub fn shutdown(&mut self) -> Result<(), JobSystemError> {
        if !self.is_running() {
            error!("The job system was shut down while not running.");
            return Err(JobSystemError::NotRunning);
        }

        for worker in self.workers.iter_mut().flatten() {
            if worker.state() == WorkerState::Paused {
                worker.resume();
            }
            if worker.is_running() {
                worker.stop()?;
            } else {
                worker.update();
            }
        }
        if let Some(main_thread_worker) = &mut self.main_thread_worker {
            main_thread_worker.stop()?;
        }

        // Job bodies could still submit follow-up jobs until the workers were
        // stopped, so the queue is only closed now.
        self.queues.set_running(false);
        let mut canceled = 0;
        for job in self.queues.take_pending() {
            canceled += job.cancel();
            self.queues.record_outcome(job);
        }
        self.end_frame();

        self.workers.clear();
        self.main_thread_worker = None;
        debug!("Shut down the job system, canceling {canceled} jobs.");
        Ok(())
    }

    /// Hands the jobs that have become ready to workers, replaces dead
    /// workers, and runs the jobs assigned to the main thread.
    pub fn update(&mut self, platform: &dyn Platform) -> Result<(), JobSystemError> {
        profiling::function_scope!();
        if !self.is_running() {
            error!("The job system was updated while not running.");
            return Err(JobSystemError::NotRunning);
        }

        let mut jobs = self.queues.take_pending();
        // Stable, so submission order is kept within each priority.
        jobs.sort_by_key(|job| Reverse(job.priority()));
        for job in jobs {
            self.schedule(job);
        }

        self.update_background_workers(platform);
        if let Some(main_thread_worker) = &mut self.main_thread_worker {
            main_thread_worker.update();
        }

        self.end_frame();
        Ok(())
    }

    /// The amount of background workers currently alive.
    pub fn worker_count(&self) -> usize {
        self.workers.iter().flatten().count()
    }

    /// Pauses the background workers which are idle and have nothing queued,
    /// returning how many were paused. Paused workers are resumed when a job
    /// is handed to them, or by [`JobSystem::resume_workers`].
    pub fn pause_idle_workers(&mut self) -> usize {
        self.workers
            .iter_mut()
            .flatten()
            .filter(|worker| worker.state() == WorkerState::Idle && worker.queued_len() == 0)
            .map(|worker| worker.pause())
            .filter(|paused| *paused)
            .count()
    }

    /// Resumes every paused background worker.
    pub fn resume_workers(&mut self) -> usize {
        self.workers
            .iter_mut()
            .flatten()
            .filter(|worker| worker.state() == WorkerState::Paused)
            .map(|worker| worker.resume())
            .filter(|resumed| *resumed)
            .count()
    }

    pub fn config(&self) -> &JobSystemConfig {
        &self.config
    }

    /// Submits a job, to be handed to a worker once it's ready.
    ///
    /// ### Panics
    ///
    /// If the job system is not running.
    #[track_caller]
    pub fn add_job(&self, job: impl Into<Job>) {
        self.submitter().add_job(job);
    }

    /// Like [`JobSystem::add_job`], for many jobs at once.
    #[track_caller]
    pub fn add_jobs<J: Into<Job>>(&self, jobs: impl IntoIterator<Item = J>) {
        self.submitter().add_jobs(jobs);
    }

    /// Submits a job which runs the closure, and returns it.
    #[track_caller]
    pub fn add_job_fn<F>(&self, name: impl Into<String>, flags: JobFlags, func: F) -> Job
    where
        F: FnOnce(&JobContext) + Send + 'static,
    {
        let job = JobBuilder::new()
            .name(name)
            .flags(flags | JobFlags::AUTO_RELEASE)
            .build_fn(func);
        self.add_job(&job);
        job
    }

    /// Submits a job which runs the closure and keeps its return value, and
    /// returns it. `on_completed` is called with the value right after the
    /// job has run.
    #[track_caller]
    pub fn add_result_job_fn<T, F>(
        &self,
        name: impl Into<String>,
        flags: JobFlags,
        func: F,
        on_completed: Option<CompletionCallback<T>>,
    ) -> ResultJob<T>
    where
        T: Send + 'static,
        F: FnOnce(&JobContext) -> T + Send + 'static,
    {
        let job = JobBuilder::new()
            .name(name)
            .flags(flags | JobFlags::AUTO_RELEASE)
            .build_result(super::DelegateResultJob::new(func), on_completed);
        self.add_job(&job);
        job
    }

    /// Returns a handle for submitting jobs from other threads, e.g. from
    /// inside job bodies.
    pub fn submitter(&self) -> JobSubmitter {
        JobSubmitter {
            queues: self.queues.clone(),
        }
    }

    pub fn last_frame_stats(&self) -> &FrameStats {
        &self.last_frame
    }

    /// The jobs which have succeeded since the last update.
    pub fn completed_jobs(&self) -> Vec<Job> {
        self.queues.completed()
    }

    /// The jobs which have been canceled since the last update.
    pub fn cancelled_jobs(&self) -> Vec<Job> {
        self.queues.cancelled()
    }

    fn schedule(&mut self, job: Job) {
        if job.is_completed() {
            self.queues.record_outcome(job);
            return;
        }
        if !job.is_ready() {
            self.queues.resubmit(job);
            return;
        }

        let on_main_thread = job.flags().contains(JobFlags::RUN_ON_MAIN_THREAD);
        if on_main_thread || self.worker_count() == 0 {
            let queued = match &mut self.main_thread_worker {
                Some(worker) => worker.queue_job(&job),
                None => Err(JobSystemError::NotRunning),
            };
            if let Err(err) = queued {
                debug!("Could not queue job '{}' on the main thread: {err}", job.name());
                self.queues.resubmit(job);
            }
            return;
        }

        let Some(worker) = self.available_worker() else {
            trace!("No worker available for job '{}', retrying next update.", job.name());
            self.queues.resubmit(job);
            return;
        };
        if let Err(err) = worker.queue_job(&job) {
            debug!("Could not queue job '{}': {err}", job.name());
            self.queues.resubmit(job);
        }
    }

    /// The idle or paused worker with the fewest jobs queued.
    fn available_worker(&mut self) -> Option<&mut BackgroundWorker> {
        self.workers
            .iter_mut()
            .flatten()
            .filter(|worker| matches!(worker.state(), WorkerState::Idle | WorkerState::Paused))
            .min_by_key(|worker| worker.queued_len())
    }

    fn update_background_workers(&mut self, platform: &dyn Platform) {
        let mut dead_slots = ArrayVec::<usize, MAX_WORKERS>::new();
        for (slot, worker) in self.workers.iter_mut().enumerate() {
            if let Some(worker) = worker {
                worker.update();
                if worker.state() == WorkerState::Dead {
                    dead_slots.push(slot); // does not panic: there are at most MAX_WORKERS slots
                }
            }
        }

        for slot in dead_slots {
            let Some(dead) = self.workers[slot].take() else {
                continue;
            };
            if !dead.flags().contains(WorkerFlags::PERSISTENT) {
                debug!("Worker '{}' died, leaving its slot empty.", dead.name());
                continue;
            }
            match self.spawn_worker(slot, dead.flags(), platform) {
                Ok(worker) => {
                    warn!("Worker '{}' died and was replaced.", dead.name());
                    self.workers[slot] = Some(worker);
                }
                Err(err) => error!("Failed to replace worker '{}': {err}", dead.name()),
            }
        }
    }

    fn spawn_worker(
        &self,
        slot: usize,
        flags: WorkerFlags,
        platform: &dyn Platform,
    ) -> Result<BackgroundWorker, JobSystemError> {
        let mut worker = BackgroundWorker::with_thread(
            format!("Worker {slot}"),
            flags,
            self.queues.clone(),
            self.config.idle_sleep(),
        );
        worker.start(platform)?;
        Ok(worker)
    }

    fn end_frame(&mut self) {
        let (succeeded, canceled) = self.queues.clear_outcomes();
        let queued_on_workers: usize = self
            .workers
            .iter()
            .flatten()
            .map(BackgroundWorker::queued_len)
            .chain(self.main_thread_worker.iter().map(MainThreadWorker::queued_len))
            .sum();

        let mut counts = EnumMap::default();
        counts[JobState::Pending] = self.queues.pending_len();
        counts[JobState::Running] = queued_on_workers;
        counts[JobState::Succeeded] = succeeded;
        counts[JobState::Canceled] = canceled;
        self.last_frame = FrameStats { counts };
    }

    #[cfg(test)]
    fn terminate_worker_thread(&mut self, slot: usize) {
        if let Some(worker) = &mut self.workers[slot] {
            worker.terminate_thread();
        }
    }
}

impl Drop for JobSystem {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(err) = self.shutdown() {
                error!("Failed to shut down the job system: {err}");
            }
        }
    }
}
