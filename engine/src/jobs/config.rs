// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use core::time::Duration;

use serde::Deserialize;

/// Parameters for creating a [`JobSystem`](super::JobSystem).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobSystemConfig {
    /// How many background workers to spawn. None (or any count above what
    /// the hardware has threads for) uses the platform's parallelism minus
    /// one, the main thread being the remaining one.
    pub worker_count: Option<usize>,
    /// Whether background workers are replaced if their thread dies.
    pub persistent_workers: bool,
    /// How long an idle background worker sleeps between checking its queue,
    /// unless woken up by new jobs.
    pub idle_sleep_ms: u64,
}

impl JobSystemConfig {
    pub const DEFAULT: JobSystemConfig = JobSystemConfig {
        worker_count: None,
        persistent_workers: true,
        idle_sleep_ms: 1,
    };

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }
}

impl Default for JobSystemConfig {
    fn default() -> Self {
        JobSystemConfig::DEFAULT
    }
}
