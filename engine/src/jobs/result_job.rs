// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use core::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{DelegateResultJob, Job, JobBuilder, JobContext, Runnable};

/// The work done by a [`ResultJob`], producing a `T`.
pub trait ResultRunnable<T>: Send + 'static {
    fn execute(&mut self, ctx: &JobContext) -> T;
}

/// Called with the value produced by a [`ResultJob`], right after the job has
/// finished running, on the thread that ran it.
pub type CompletionCallback<T> = Box<dyn FnOnce(&T) + Send>;

type ResultSlot<T> = Arc<Mutex<Option<T>>>;

struct ResultBody<T, R> {
    body: R,
    value: Option<T>,
    on_completed: Option<CompletionCallback<T>>,
    slot: ResultSlot<T>,
}

impl<T, R> Runnable for ResultBody<T, R>
where
    T: Send + 'static,
    R: ResultRunnable<T>,
{
    fn execute(&mut self, ctx: &JobContext) {
        self.value = Some(self.body.execute(ctx));
    }

    fn on_completed(&mut self, _job: &Job) {
        if let Some(value) = self.value.take() {
            if let Some(on_completed) = self.on_completed.take() {
                on_completed(&value);
            }
            // Published only after the callback, so `result` can't return
            // before the completion hook has run.
            *self.slot.lock() = Some(value);
        }
    }
}

/// A [`Job`] which produces a value of type `T`.
///
/// Derefs to the underlying [`Job`], so the handle can be used for
/// dependencies, cancellation and state queries directly.
pub struct ResultJob<T> {
    job: Job,
    slot: ResultSlot<T>,
}

impl<T> Clone for ResultJob<T> {
    fn clone(&self) -> Self {
        ResultJob {
            job: self.job.clone(),
            slot: self.slot.clone(),
        }
    }
}

impl JobBuilder {
    /// Creates a job which stores the value returned by `body`, to be read
    /// with [`ResultJob::result`]. `on_completed` is called with the value
    /// first, if one was given.
    pub fn build_result<T, R>(
        self,
        body: R,
        on_completed: Option<CompletionCallback<T>>,
    ) -> ResultJob<T>
    where
        T: Send + 'static,
        R: ResultRunnable<T>,
    {
        let slot: ResultSlot<T> = Arc::new(Mutex::new(None));
        let job = self.build(ResultBody {
            body,
            value: None,
            on_completed,
            slot: slot.clone(),
        });
        ResultJob { job, slot }
    }

    /// Creates a job which stores the value returned by the closure.
    pub fn build_result_fn<T, F>(self, func: F) -> ResultJob<T>
    where
        T: Send + 'static,
        F: FnOnce(&JobContext) -> T + Send + 'static,
    {
        self.build_result(DelegateResultJob::new(func), None)
    }
}

impl<T: Send + 'static> ResultJob<T> {
    /// Shorthand for `Job::builder().name(name).build_result_fn(func)`.
    pub fn from_fn<F>(name: impl Into<String>, func: F) -> ResultJob<T>
    where
        F: FnOnce(&JobContext) -> T + Send + 'static,
    {
        JobBuilder::new().name(name).build_result_fn(func)
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Blocks the calling thread until the job has finished, and returns a
    /// copy of its value. Returns None if the job was canceled before it
    /// could produce one.
    ///
    /// Note that waiting on a job from inside another job's body blocks that
    /// worker, which deadlocks if the awaited job can only be scheduled after
    /// the waiting one.
    pub fn result(&self) -> Option<T>
    where
        T: Clone,
    {
        self.job.wait();
        self.slot.lock().clone()
    }

    /// Like [`ResultJob::result`], but moves the value out, so subsequent
    /// calls return None.
    pub fn take_result(&self) -> Option<T> {
        self.job.wait();
        self.slot.lock().take()
    }

    /// Returns the value without blocking, if the job has already produced
    /// it.
    pub fn try_result(&self) -> Option<T>
    where
        T: Clone,
    {
        self.slot.lock().clone()
    }
}

impl<T> Deref for ResultJob<T> {
    type Target = Job;
    fn deref(&self) -> &Job {
        &self.job
    }
}

impl<T> From<ResultJob<T>> for Job {
    fn from(result_job: ResultJob<T>) -> Job {
        result_job.job
    }
}

impl<T> From<&ResultJob<T>> for Job {
    fn from(result_job: &ResultJob<T>) -> Job {
        result_job.job.clone()
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
        time::Instant,
    };

    use crate::jobs::{ExecutionContext, Job, JobContext, JobState, ResultJob, ResultRunnable};

    #[test]
    fn result_is_available_after_running() {
        let job = ResultJob::from_fn("answer", |_| 42);
        assert_eq!(None, job.try_result());
        job.run(ExecutionContext::MainThread);
        assert_eq!(Some(42), job.result());
        assert_eq!(Some(42), job.take_result());
        assert_eq!(None, job.take_result());
    }

    #[test]
    fn canceled_job_has_no_result() {
        let job = ResultJob::<u32>::from_fn("never", |_| 1);
        job.cancel();
        assert_eq!(None, job.result(), "result() should not block on a canceled job");
    }

    #[test]
    fn callback_runs_before_result_is_visible() {
        let callback_ran = Arc::new(AtomicBool::new(false));
        let job = {
            let callback_ran = callback_ran.clone();
            Job::builder().name("with callback").build_result(
                crate::jobs::DelegateResultJob::new(|_: &JobContext| String::from("done")),
                Some(Box::new(move |value: &String| {
                    assert_eq!("done", value);
                    thread::sleep(Duration::from_millis(20));
                    callback_ran.store(true, Ordering::Release);
                })),
            )
        };

        let runner = {
            let job = job.clone();
            thread::spawn(move || job.run(ExecutionContext::Background))
        };
        assert_eq!(Some(String::from("done")), job.result());
        assert!(callback_ran.load(Ordering::Acquire));
        runner.join().unwrap();
    }

    #[test]
    #[cfg(not(target_os = "emscripten"))]
    fn result_blocks_until_completion() {
        struct SlowAnswer;
        impl ResultRunnable<i32> for SlowAnswer {
            fn execute(&mut self, _ctx: &JobContext) -> i32 {
                thread::sleep(Duration::from_millis(50));
                42
            }
        }

        let job = Job::builder().name("slow").build_result(SlowAnswer, None);
        let started = Instant::now();
        let runner = {
            let job = job.clone();
            thread::spawn(move || job.run(ExecutionContext::Background))
        };

        let reader = {
            let job = job.clone();
            thread::spawn(move || job.result())
        };
        assert_eq!(Some(42), reader.join().unwrap());
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(JobState::Succeeded, job.state());
        runner.join().unwrap();
    }

    #[test]
    #[ignore = "the emscripten target doesn't support multithreading"]
    #[cfg(target_os = "emscripten")]
    fn result_blocks_until_completion() {}
}
