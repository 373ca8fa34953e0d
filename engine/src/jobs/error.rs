// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

/// Misuse of the [`JobSystem`](super::JobSystem) or one of its workers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobSystemError {
    #[error("the job system is not running")]
    NotRunning,
    #[error("the job system is already running")]
    AlreadyRunning,
    #[error("worker '{0}' is already running")]
    WorkerAlreadyRunning(String),
    #[error("worker '{0}' is dead")]
    WorkerDead(String),
    #[error("worker '{0}' is not running")]
    WorkerNotRunning(String),
}
