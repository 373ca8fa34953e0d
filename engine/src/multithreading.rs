// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

/// The maximum amount of background workers a
/// [`JobSystem`](crate::jobs::JobSystem) will create, regardless of the
/// hardware it's running on.
pub const MAX_WORKERS: usize = 128;

/// Returns how many background workers to create, given the amount of threads
/// the platform can run in parallel.
///
/// One thread is left for the main thread. `requested` can lower the count,
/// but not raise it above what the hardware supports. None picks the maximum.
pub fn background_worker_count(available_parallelism: usize, requested: Option<usize>) -> usize {
    let hardware_limit = available_parallelism.saturating_sub(1).min(MAX_WORKERS);
    match requested {
        Some(requested) => requested.min(hardware_limit),
        None => hardware_limit,
    }
}
