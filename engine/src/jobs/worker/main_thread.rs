// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;

use crate::jobs::{queues::JobQueues, ExecutionContext};

use super::{Worker, WorkerBackend, WorkerCore, WorkerFlags};

/// The worker for jobs which need to run on the main thread. It has no thread
/// of its own, its jobs are run during
/// [`JobSystem::update`](crate::jobs::JobSystem::update).
pub(crate) type MainThreadWorker = Worker<MainThreadBackend>;

pub(crate) struct MainThreadBackend;

impl MainThreadWorker {
    pub fn for_main_thread(queues: Arc<JobQueues>) -> MainThreadWorker {
        Worker::new(
            String::from("Main Thread Worker"),
            WorkerFlags::PERSISTENT,
            queues,
            MainThreadBackend,
        )
    }
}

impl WorkerBackend for MainThreadBackend {
    fn update(&mut self, core: &WorkerCore) {
        core.process_jobs(ExecutionContext::MainThread);
    }
}
