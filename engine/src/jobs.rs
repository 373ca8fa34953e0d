// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Dependency-aware job scheduling.
//!
//! The [`JobSystem`] owns a pool of background worker threads and one worker
//! which is driven from the main thread, once per [`JobSystem::update`].
//! [`Job`]s are submitted to the system, which hands each one to a worker once
//! all of its dependencies have succeeded. Jobs that aren't ready yet are kept
//! around and reconsidered on the next update.
//!
//! [`Job`] is a cheap, cloneable handle, so the submitter can keep one around
//! to query the job's [`JobState`], wait for it, or cancel it. The work itself
//! is a [`Runnable`], with [`ResultJob`] wrapping a [`ResultRunnable`] for
//! work that produces a value, and [`JobGroup`] running a list of jobs as one.

mod config;
mod delegate;
mod error;
mod group;
mod job;
mod queues;
mod result_job;
mod system;
mod worker;

use core::ops::BitOr;

use enum_map::Enum;

pub use config::JobSystemConfig;
pub use delegate::{DelegateJob, DelegateResultJob};
pub use error::JobSystemError;
pub use group::JobGroup;
pub use job::{Job, JobBuilder, JobContext, Runnable};
pub use queues::JobSubmitter;
pub use result_job::{CompletionCallback, ResultJob, ResultRunnable};
pub use system::{FrameStats, JobSystem};
pub use worker::{WorkerFlags, WorkerState};

/// The lifecycle of a [`Job`]: `Pending → Running → (Succeeded | Canceled)`,
/// with `Pending → Canceled` also possible. There are no transitions out of
/// the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Canceled,
}

impl JobState {
    /// Returns true for [`JobState::Succeeded`] and [`JobState::Canceled`].
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Canceled)
    }
}

/// Scheduling hint. Within one [`JobSystem::update`], critical jobs are handed
/// to workers before normal ones, otherwise jobs keep their submission order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobPriority {
    #[default]
    Normal,
    Critical,
}

/// Independent bit flags for a [`Job`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct JobFlags(u8);

impl JobFlags {
    pub const NONE: JobFlags = JobFlags(0);
    /// The job may only be run by the worker driven from the main thread.
    pub const RUN_ON_MAIN_THREAD: JobFlags = JobFlags(1 << 0);
    /// Informational: the job was created by the job system on behalf of the
    /// caller (e.g. [`JobSystem::add_job_fn`]), and nobody else necessarily
    /// holds a handle to it.
    pub const AUTO_RELEASE: JobFlags = JobFlags(1 << 1);

    pub const fn contains(self, other: JobFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: JobFlags) -> JobFlags {
        JobFlags(self.0 | other.0)
    }
}

impl BitOr for JobFlags {
    type Output = JobFlags;
    fn bitor(self, rhs: JobFlags) -> JobFlags {
        self.union(rhs)
    }
}

/// Where a job body is being executed. Passed to [`Runnable::execute`] via
/// [`JobContext::execution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionContext {
    /// The job is run by the main thread worker, during [`JobSystem::update`].
    MainThread,
    /// The job is run on one of the background worker threads.
    Background,
}

#[cfg(test)]
mod tests {
    use super::{JobFlags, JobPriority, JobState};

    #[test]
    fn flags_combine_independently() {
        let flags = JobFlags::RUN_ON_MAIN_THREAD | JobFlags::AUTO_RELEASE;
        assert!(flags.contains(JobFlags::RUN_ON_MAIN_THREAD));
        assert!(flags.contains(JobFlags::AUTO_RELEASE));
        assert!(!JobFlags::AUTO_RELEASE.contains(JobFlags::RUN_ON_MAIN_THREAD));
        assert!(JobFlags::NONE.contains(JobFlags::NONE));
    }

    #[test]
    fn only_succeeded_and_canceled_are_terminal() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Canceled.is_terminal());
    }

    #[test]
    fn critical_sorts_after_normal() {
        assert!(JobPriority::Critical > JobPriority::Normal);
        assert_eq!(JobPriority::Normal, JobPriority::default());
    }
}
