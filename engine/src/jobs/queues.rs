// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use core::{
    mem,
    sync::atomic::{AtomicBool, Ordering},
};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::{Job, JobState};

/// The system-level job lists, shared between the
/// [`JobSystem`](super::JobSystem), its workers, and [`JobSubmitter`]s.
#[derive(Default)]
pub(crate) struct JobQueues {
    running: AtomicBool,
    /// Jobs waiting to be handed to a worker.
    pending: Mutex<Vec<Job>>,
    /// Jobs which succeeded during the current update cycle.
    completed: Mutex<Vec<Job>>,
    /// Jobs which were canceled during the current update cycle.
    cancelled: Mutex<Vec<Job>>,
}

impl JobQueues {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// Puts the job (back) into the pending queue, to be considered again
    /// during the next update.
    pub fn resubmit(&self, job: Job) {
        self.pending.lock().push(job);
    }

    pub fn resubmit_all(&self, jobs: impl IntoIterator<Item = Job>) {
        self.pending.lock().extend(jobs);
    }

    /// Swaps out the pending queue. Jobs added after this are left for the
    /// next cycle.
    pub fn take_pending(&self) -> Vec<Job> {
        mem::take(&mut *self.pending.lock())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Files a finished job into the completed or cancelled list. Jobs that
    /// are not finished yet are ignored.
    pub fn record_outcome(&self, job: Job) {
        match job.state() {
            JobState::Succeeded => self.completed.lock().push(job),
            JobState::Canceled => self.cancelled.lock().push(job),
            state => trace!("Not recording job '{}' as finished, it's {state:?}.", job.name()),
        }
    }

    /// Empties the completed and cancelled lists, returning how many jobs
    /// were in each.
    pub fn clear_outcomes(&self) -> (usize, usize) {
        let completed = mem::take(&mut *self.completed.lock()).len();
        let cancelled = mem::take(&mut *self.cancelled.lock()).len();
        (completed, cancelled)
    }

    pub fn completed(&self) -> Vec<Job> {
        self.completed.lock().clone()
    }

    pub fn cancelled(&self) -> Vec<Job> {
        self.cancelled.lock().clone()
    }
}

/// Adds jobs to a running [`JobSystem`](super::JobSystem) from any thread.
///
/// Returned by [`JobSystem::submitter`](super::JobSystem::submitter). Job
/// bodies can hold on to one to queue follow-up work.
#[derive(Clone)]
pub struct JobSubmitter {
    pub(crate) queues: Arc<JobQueues>,
}

impl JobSubmitter {
    /// Returns true if the job system this submitter belongs to is running,
    /// i.e. whether [`JobSubmitter::add_job`] would succeed.
    pub fn is_running(&self) -> bool {
        self.queues.is_running()
    }

    /// Appends the job to the pending queue. It's handed to a worker during
    /// the next [`JobSystem::update`](super::JobSystem::update) after it
    /// becomes ready.
    ///
    /// ### Panics
    ///
    /// If the job system is not running.
    #[track_caller]
    pub fn add_job(&self, job: impl Into<Job>) {
        let job = job.into();
        assert!(
            self.queues.is_running(),
            "job '{}' was added while the job system is not running",
            job.name(),
        );
        self.queues.resubmit(job);
    }

    /// Like [`JobSubmitter::add_job`], for many jobs at once.
    #[track_caller]
    pub fn add_jobs<J: Into<Job>>(&self, jobs: impl IntoIterator<Item = J>) {
        assert!(
            self.queues.is_running(),
            "jobs were added while the job system is not running",
        );
        self.queues.resubmit_all(jobs.into_iter().map(Into::into));
    }
}
