// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use core::{any::Any, cell::Cell, fmt, time::Duration};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Weak},
    time::Instant,
};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{error, trace};

use super::{DelegateJob, ExecutionContext, JobFlags, JobPriority, JobState};

/// The work done by a [`Job`].
///
/// Implement this for job types which need their own state, or use
/// [`JobBuilder::build_fn`] to wrap a closure.
pub trait Runnable: Send + 'static {
    /// Does the actual work. Called at most once, on whichever thread the job
    /// ended up being scheduled on (see [`JobContext::execution`]).
    fn execute(&mut self, ctx: &JobContext);

    /// Called after [`Runnable::execute`] returns and the job has reached its
    /// final state, unless `execute` panicked.
    fn on_completed(&mut self, _job: &Job) {}

    /// Called when the job is canceled before it started running. Jobs pushed
    /// into `cascade` are canceled next, the same way the job's dependents
    /// are.
    fn on_canceled(&mut self, _cascade: &mut Vec<Job>) {}
}

/// Passed to [`Runnable::execute`].
pub struct JobContext<'a> {
    job: &'a Job,
    execution: ExecutionContext,
    cancel_requested: Cell<bool>,
}

impl JobContext<'_> {
    pub fn job(&self) -> &Job {
        self.job
    }

    pub fn execution(&self) -> ExecutionContext {
        self.execution
    }

    /// Makes the running job end up [`JobState::Canceled`] instead of
    /// [`JobState::Succeeded`] once `execute` returns. Its dependents are
    /// canceled at that point as well.
    pub fn cancel(&self) {
        self.cancel_requested.set(true);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.get()
    }
}

type SharedState = Arc<RwLock<JobState>>;

struct Links {
    /// The state words of the jobs this job depends on. Only the state is
    /// shared, so a dependency's body is never kept alive by its dependents.
    dependencies: Vec<SharedState>,
    dependents: Vec<Weak<JobInner>>,
}

struct JobInner {
    name: String,
    flags: JobFlags,
    priority: JobPriority,
    state: SharedState,
    links: Mutex<Links>,
    /// Taken out by `run`. Still here if and only if the job never started.
    body: Mutex<Option<Box<dyn Runnable>>>,
    finished: Mutex<bool>,
    finished_signal: Condvar,
    failure: Mutex<Option<String>>,
}

/// Handle to a unit of work scheduled by a
/// [`JobSystem`](super::JobSystem).
///
/// Cloning the handle does not clone the job. Whichever queue currently holds
/// the job keeps it alive, and any number of handles can be held elsewhere to
/// observe or cancel it.
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

/// Configures the name, flags and priority of a job before creating it.
#[derive(Debug, Clone)]
pub struct JobBuilder {
    name: String,
    flags: JobFlags,
    priority: JobPriority,
}

impl Default for JobBuilder {
    fn default() -> Self {
        JobBuilder {
            name: String::from("Unnamed Job"),
            flags: JobFlags::NONE,
            priority: JobPriority::Normal,
        }
    }
}

impl JobBuilder {
    pub fn new() -> JobBuilder {
        JobBuilder::default()
    }

    /// Sets the name used in log messages. Names don't need to be unique.
    pub fn name(mut self, name: impl Into<String>) -> JobBuilder {
        self.name = name.into();
        self
    }

    pub fn flags(mut self, flags: JobFlags) -> JobBuilder {
        self.flags = flags;
        self
    }

    pub fn priority(mut self, priority: JobPriority) -> JobBuilder {
        self.priority = priority;
        self
    }

    pub fn build(self, body: impl Runnable) -> Job {
        Job {
            inner: Arc::new(JobInner {
                name: self.name,
                flags: self.flags,
                priority: self.priority,
                state: Arc::new(RwLock::new(JobState::Pending)),
                links: Mutex::new(Links {
                    dependencies: Vec::new(),
                    dependents: Vec::new(),
                }),
                body: Mutex::new(Some(Box::new(body))),
                finished: Mutex::new(false),
                finished_signal: Condvar::new(),
                failure: Mutex::new(None),
            }),
        }
    }

    /// Creates a job which runs the closure.
    pub fn build_fn<F>(self, func: F) -> Job
    where
        F: FnOnce(&JobContext) + Send + 'static,
    {
        self.build(DelegateJob::new(func))
    }
}

impl Job {
    pub fn builder() -> JobBuilder {
        JobBuilder::new()
    }

    /// Shorthand for `Job::builder().name(name).build(body)`.
    pub fn new(name: impl Into<String>, body: impl Runnable) -> Job {
        JobBuilder::new().name(name).build(body)
    }

    /// Shorthand for `Job::builder().name(name).build_fn(func)`.
    pub fn from_fn<F>(name: impl Into<String>, func: F) -> Job
    where
        F: FnOnce(&JobContext) + Send + 'static,
    {
        JobBuilder::new().name(name).build_fn(func)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn flags(&self) -> JobFlags {
        self.inner.flags
    }

    pub fn priority(&self) -> JobPriority {
        self.inner.priority
    }

    pub fn state(&self) -> JobState {
        *self.inner.state.read()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == JobState::Pending
    }

    /// Returns true if the job is pending and every one of its dependencies
    /// has succeeded.
    pub fn is_ready(&self) -> bool {
        let links = self.inner.links.lock();
        self.is_pending()
            && links
                .dependencies
                .iter()
                .all(|state| *state.read() == JobState::Succeeded)
    }

    /// Returns true if the job has succeeded or was canceled.
    pub fn is_completed(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn has_dependents(&self) -> bool {
        !self.inner.links.lock().dependents.is_empty()
    }

    /// Returns true if both handles refer to the same job.
    pub fn ptr_eq(&self, other: &Job) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The panic message of the job's body, if it panicked while running.
    pub fn failure(&self) -> Option<String> {
        self.inner.failure.lock().clone()
    }

    /// Makes this job wait until `dependency` has succeeded before running.
    ///
    /// ### Panics
    ///
    /// If `dependency` is this job, or if `dependency` already depends on
    /// this job. Longer dependency cycles are not detected, the jobs in them
    /// just never become ready.
    #[track_caller]
    pub fn add_dependency(&self, dependency: &Job) {
        if self.ptr_eq(dependency) {
            panic!("job '{}' cannot depend on itself", self.name());
        }

        // Locked in address order, and held for both the check and the update.
        let (mut links, mut their_links) =
            if Arc::as_ptr(&self.inner) < Arc::as_ptr(&dependency.inner) {
                let links = self.inner.links.lock();
                (links, dependency.inner.links.lock())
            } else {
                let their_links = dependency.inner.links.lock();
                (self.inner.links.lock(), their_links)
            };

        let cyclic = their_links
            .dependencies
            .iter()
            .any(|state| Arc::ptr_eq(state, &self.inner.state));
        if cyclic {
            drop((links, their_links));
            panic!(
                "job '{}' cannot depend on job '{}', which already depends on it",
                self.name(),
                dependency.name(),
            );
        }
        their_links.dependents.push(Arc::downgrade(&self.inner));
        links.dependencies.push(dependency.inner.state.clone());
    }

    /// Cancels the job if it hasn't started running yet, along with every job
    /// that depends on it, directly or indirectly.
    ///
    /// Jobs which are already running or done are left alone, so calling this
    /// more than once is harmless. Returns the amount of jobs that were
    /// canceled by this call.
    pub fn cancel(&self) -> usize {
        let mut canceled = 0;
        let mut to_cancel = vec![self.clone()];
        while let Some(job) = to_cancel.pop() {
            if job.transition_to_canceled(&mut to_cancel) {
                canceled += 1;
                to_cancel.extend(job.dependents());
            }
        }
        canceled
    }

    /// Blocks the calling thread until the job has finished running (including
    /// its completion hook) or has been canceled.
    pub fn wait(&self) {
        let mut finished = self.inner.finished.lock();
        while !*finished {
            self.inner.finished_signal.wait(&mut finished);
        }
    }

    /// Like [`Job::wait`], but gives up after `timeout`. Returns true if the
    /// job finished.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut finished = self.inner.finished.lock();
        while !*finished {
            if self
                .inner
                .finished_signal
                .wait_until(&mut finished, deadline)
                .timed_out()
            {
                break;
            }
        }
        *finished
    }

    /// Runs the job on the calling thread if it's ready. Only called by the
    /// workers and [`JobGroup`](super::JobGroup)s.
    ///
    /// Returns false if the job was not ready, in which case nothing happened.
    pub(crate) fn run(&self, execution: ExecutionContext) -> bool {
        if !self.is_ready() {
            return false;
        }

        {
            let mut state = self.inner.state.write();
            if *state != JobState::Pending {
                return false;
            }
            *state = JobState::Running;
        }

        let mut body = self.inner.body.lock().take();
        let ctx = JobContext {
            job: self,
            execution,
            cancel_requested: Cell::new(false),
        };

        let executed = panic::catch_unwind(AssertUnwindSafe(|| {
            if let Some(body) = &mut body {
                body.execute(&ctx);
            }
        }));

        let final_state = if executed.is_ok() && !ctx.is_cancel_requested() {
            JobState::Succeeded
        } else {
            JobState::Canceled
        };
        *self.inner.state.write() = final_state;

        match executed {
            Ok(()) => {
                let completed = panic::catch_unwind(AssertUnwindSafe(|| {
                    if let Some(body) = &mut body {
                        body.on_completed(self);
                    }
                }));
                if let Err(payload) = completed {
                    self.record_failure(payload.as_ref(), "completion hook");
                }
            }
            Err(payload) => self.record_failure(payload.as_ref(), "body"),
        }

        if final_state == JobState::Canceled {
            for dependent in self.dependents() {
                dependent.cancel();
            }
        }

        drop(body);
        self.finish();
        true
    }

    fn transition_to_canceled(&self, cascade: &mut Vec<Job>) -> bool {
        {
            let mut state = self.inner.state.write();
            match *state {
                JobState::Pending => *state = JobState::Canceled,
                JobState::Running => {
                    trace!("Not canceling job '{}', it's already running.", self.name());
                    return false;
                }
                JobState::Succeeded | JobState::Canceled => return false,
            }
        }

        trace!("Canceled job '{}'.", self.name());
        // The body is only taken out by `run`, which can't get past the
        // pending check anymore, so this is the last user of the body.
        if let Some(body) = self.inner.body.lock().as_mut() {
            body.on_canceled(cascade);
        }
        self.finish();
        true
    }

    fn dependents(&self) -> Vec<Job> {
        let links = self.inner.links.lock();
        links
            .dependents
            .iter()
            .filter_map(Weak::upgrade)
            .map(|inner| Job { inner })
            .collect()
    }

    fn record_failure(&self, payload: &(dyn Any + Send), what: &str) {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            String::from(*message)
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            String::from("(non-string panic payload)")
        };
        error!("The {what} of job '{}' panicked: {message}", self.name());
        *self.inner.failure.lock() = Some(message);
    }

    fn finish(&self) {
        let mut finished = self.inner.finished.lock();
        *finished = true;
        self.inner.finished_signal.notify_all();
    }
}

impl From<&Job> for Job {
    fn from(job: &Job) -> Job {
        job.clone()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("flags", &self.flags())
            .field("priority", &self.priority())
            .finish()
    }
}
