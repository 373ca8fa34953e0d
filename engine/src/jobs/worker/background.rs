// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use core::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use std::sync::Arc;

use crossbeam_utils::sync::{Parker, Unparker};
use platform::{Platform, ThreadHandle};
use tracing::{debug, error, warn};

use crate::jobs::{queues::JobQueues, ExecutionContext};

use super::{Worker, WorkerBackend, WorkerCore, WorkerFlags, WorkerState};

/// A worker with its own thread.
pub(crate) type BackgroundWorker = Worker<ThreadBackend>;

/// Runs a worker's jobs on a dedicated thread, which sleeps for a while
/// between checking the queue unless it's woken up by new jobs.
pub(crate) struct ThreadBackend {
    thread: Option<Box<dyn ThreadHandle>>,
    unparker: Option<Unparker>,
    idle_sleep: Duration,
    terminate: Arc<AtomicBool>,
}

impl BackgroundWorker {
    pub fn with_thread(
        name: String,
        flags: WorkerFlags,
        queues: Arc<JobQueues>,
        idle_sleep: Duration,
    ) -> BackgroundWorker {
        let backend = ThreadBackend {
            thread: None,
            unparker: None,
            idle_sleep,
            terminate: Arc::new(AtomicBool::new(false)),
        };
        Worker::new(name, flags, queues, backend)
    }

    /// Makes the worker's thread exit as if it had crashed, and waits for it
    /// to do so. The worker itself is left as is, for
    /// [`JobSystem::update`](crate::jobs::JobSystem::update) to notice.
    #[cfg(test)]
    pub fn terminate_thread(&mut self) {
        self.backend.terminate.store(true, Ordering::Release);
        if let Some(unparker) = &self.backend.unparker {
            unparker.unpark();
        }
        if let Some(thread) = self.backend.thread.take() {
            assert!(thread.join(), "the thread of worker '{}' panicked", self.name());
        }
    }
}

impl WorkerBackend for ThreadBackend {
    fn on_starting(&mut self, core: &Arc<WorkerCore>, platform: &dyn Platform) {
        let parker = Parker::new();
        let unparker = parker.unparker().clone();
        let thread_core = core.clone();
        let terminate = self.terminate.clone();
        let idle_sleep = self.idle_sleep;

        let spawned = platform.spawn_thread(
            core.name(),
            Box::new(move || {
                let core = thread_core;
                debug!("Thread for worker '{}' started.", core.name());
                while core.is_running() && !terminate.load(Ordering::Acquire) {
                    core.process_jobs(ExecutionContext::Background);
                    parker.park_timeout(idle_sleep);
                }
                debug!("Thread for worker '{}' exiting.", core.name());
            }),
        );

        match spawned {
            Some(thread) => {
                self.thread = Some(thread);
                self.unparker = Some(unparker);
            }
            // The missing thread is noticed in the next update, which
            // takes care of the rest.
            None => error!("Failed to spawn a thread for worker '{}'.", core.name()),
        }
    }

    fn on_stopping(&mut self, core: &WorkerCore) {
        if let Some(unparker) = &self.unparker {
            unparker.unpark();
        }
        if let Some(thread) = self.thread.take() {
            if !thread.join() {
                error!("The thread of worker '{}' panicked.", core.name());
            }
        }
    }

    fn on_queued(&self) {
        if let Some(unparker) = &self.unparker {
            unparker.unpark();
        }
    }

    fn is_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|thread| !thread.is_finished())
    }

    fn update(&mut self, core: &WorkerCore) {
        if !self.is_alive() && core.state() != WorkerState::Dead {
            if core.is_running() {
                warn!("The thread of worker '{}' exited unexpectedly.", core.name());
            }
            core.force_dead();
            if let Some(thread) = self.thread.take() {
                if !thread.join() {
                    error!("The thread of worker '{}' panicked.", core.name());
                }
            }
        }

        if !core.is_running() {
            core.drain_to_pending();
        }
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;
    use std::{sync::Arc, time::Instant};

    use platform::{Platform, ThreadHandle, ThreadMain};

    use crate::{
        jobs::{queues::JobQueues, Job, JobState, WorkerFlags, WorkerState},
        test_platform::TestPlatform,
    };

    use super::BackgroundWorker;

    fn spawn(queues: &Arc<JobQueues>) -> BackgroundWorker {
        let mut worker = BackgroundWorker::with_thread(
            String::from("Worker 0"),
            WorkerFlags::PERSISTENT,
            queues.clone(),
            Duration::from_millis(1),
        );
        worker.start(&TestPlatform::new(true)).unwrap();
        worker
    }

    #[test]
    #[cfg(not(target_os = "emscripten"))]
    fn runs_jobs_on_a_named_thread() {
        let queues = Arc::new(JobQueues::default());
        let mut worker = spawn(&queues);

        let job = Job::from_fn("check thread", |ctx| {
            assert_eq!(crate::jobs::ExecutionContext::Background, ctx.execution());
            assert_eq!(Some("Worker 0"), std::thread::current().name());
        });
        worker.queue_job(&job).unwrap();
        assert!(job.wait_timeout(Duration::from_secs(5)));
        assert_eq!(JobState::Succeeded, job.state());
        assert!(job.failure().is_none());

        worker.stop().unwrap();
        assert_eq!(WorkerState::Dead, worker.state());
    }

    #[test]
    #[cfg(not(target_os = "emscripten"))]
    fn stop_waits_for_the_current_job() {
        let queues = Arc::new(JobQueues::default());
        let mut worker = spawn(&queues);

        let job = Job::from_fn("slow", |_| std::thread::sleep(Duration::from_millis(50)));
        worker.queue_job(&job).unwrap();
        let started = Instant::now();
        while job.state() == JobState::Pending && started.elapsed() < Duration::from_secs(5) {
            std::thread::yield_now();
        }

        worker.stop().unwrap();
        assert_eq!(JobState::Succeeded, job.state());
    }

    #[test]
    #[cfg(not(target_os = "emscripten"))]
    fn update_notices_a_dead_thread() {
        let queues = Arc::new(JobQueues::default());
        let mut worker = spawn(&queues);
        worker.terminate_thread();
        assert_ne!(WorkerState::Dead, worker.state());

        worker.update();
        assert_eq!(WorkerState::Dead, worker.state());
        assert!(!worker.is_running());
    }

    /// A platform which fails to spawn any threads.
    struct ThreadlessPlatform;

    impl Platform for ThreadlessPlatform {
        fn available_parallelism(&self) -> usize {
            4
        }
        fn spawn_thread(&self, _name: &str, _main: ThreadMain) -> Option<Box<dyn ThreadHandle>> {
            None
        }
        fn now(&self) -> platform::Instant {
            platform::Instant::reference()
        }
        fn println(&self, _message: core::fmt::Arguments) {}
        fn exit(&self, _clean: bool) {}
    }

    #[test]
    fn failing_to_spawn_the_thread_kills_the_worker() {
        let queues = Arc::new(JobQueues::default());
        let mut worker = BackgroundWorker::with_thread(
            String::from("Worker 0"),
            WorkerFlags::PERSISTENT,
            queues.clone(),
            Duration::from_millis(1),
        );
        worker.start(&ThreadlessPlatform).unwrap();
        let job = Job::from_fn("stranded", |_| {});
        worker.queue_job(&job).unwrap();

        worker.update();
        assert_eq!(WorkerState::Dead, worker.state());
        assert_eq!(1, queues.pending_len(), "the queued job should be handed back");
        assert_eq!(JobState::Pending, job.state());
    }

    #[test]
    #[ignore = "the emscripten target doesn't support multithreading"]
    #[cfg(target_os = "emscripten")]
    fn runs_jobs_on_a_named_thread() {}
}
