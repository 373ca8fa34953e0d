// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use core::{ops::ControlFlow, time::Duration};

use platform::{EngineCallbacks, Instant, Platform};
use serde::Deserialize;
use tracing::{debug, error, trace};

use crate::jobs::{JobSystem, JobSystemConfig, JobSystemError};

/// Parameters for creating an [`Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub job_system: JobSystemConfig,
    /// How many times per second [`Game::fixed_update`] is called.
    pub fixed_updates_per_second: u32,
}

impl EngineConfig {
    pub const DEFAULT: EngineConfig = EngineConfig {
        job_system: JobSystemConfig::DEFAULT,
        fixed_updates_per_second: 60,
    };

    pub fn fixed_time_step(&self) -> Duration {
        Duration::from_secs(1) / self.fixed_updates_per_second.max(1)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::DEFAULT
    }
}

/// Frame timing passed to the [`Game`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateTime {
    /// Time since the previous frame (or fixed step).
    pub elapsed: Duration,
    /// Time since the engine was created (or, for fixed steps, the sum of all
    /// the fixed steps so far).
    pub total: Duration,
}

/// The game-specific parts of a game, driven by an [`Engine`].
pub trait Game {
    /// Passed to [`Game::init`] as-is.
    type InitParams;

    /// Called once, after the job system has been started.
    fn init(params: Self::InitParams, jobs: &JobSystem) -> Self;

    /// Called zero or more times before each [`Game::run_frame`], so that on
    /// average it's called at [`EngineConfig::fixed_updates_per_second`].
    fn fixed_update(&mut self, _time: UpdateTime, _jobs: &JobSystem) {}

    /// Called once per frame, after the job system has been updated. Returning
    /// [`ControlFlow::Break`] ends the game loop.
    fn run_frame(
        &mut self,
        time: UpdateTime,
        jobs: &mut JobSystem,
        platform: &dyn Platform,
    ) -> ControlFlow<()>;

    /// Called once before the job system is shut down.
    fn shutdown(&mut self, _jobs: &JobSystem) {}
}

/// The top-level structure of the game engine which owns all the runtime state
/// of the game engine and has methods for running the engine.
pub struct Engine<G: Game> {
    jobs: JobSystem,
    game: G,
    fixed_time_step: Duration,
    /// Fixed update time not yet simulated, carried over to the next frame.
    accumulator: Duration,
    fixed_total: Duration,
    started: Instant,
    last_frame: Instant,
    frame_count: u64,
}

impl<G: Game> Engine<G> {
    /// Creates a new instance of the engine, starts up its job system, and
    /// initializes the game.
    ///
    /// - `platform`: the platform implementation to be used for this instance
    ///   of the engine.
    pub fn new(platform: &dyn Platform, config: EngineConfig, params: G::InitParams) -> Engine<G> {
        let mut jobs = JobSystem::new(platform, config.job_system);
        jobs.startup(platform).expect("a freshly created job system should not be running yet");
        let game = G::init(params, &jobs);
        let now = platform.now();
        debug!(
            "Engine created with {} background workers, fixed time step {:?}.",
            jobs.worker_count(),
            config.fixed_time_step(),
        );

        Engine {
            jobs,
            game,
            fixed_time_step: config.fixed_time_step(),
            accumulator: Duration::ZERO,
            fixed_total: Duration::ZERO,
            started: now,
            last_frame: now,
            frame_count: 0,
        }
    }

    pub fn jobs(&self) -> &JobSystem {
        &self.jobs
    }

    pub fn jobs_mut(&mut self) -> &mut JobSystem {
        &mut self.jobs
    }

    pub fn game(&self) -> &G {
        &self.game
    }

    /// The amount of frames run so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Lets the game clean up, then shuts down the job system. Jobs that
    /// haven't been run by now are canceled.
    pub fn shutdown(&mut self) -> Result<(), JobSystemError> {
        self.game.shutdown(&self.jobs);
        self.jobs.shutdown()
    }

    /// Runs [`Game::fixed_update`] for each whole fixed step that fits into
    /// the accumulated time, returning how many were run.
    fn run_fixed_updates(&mut self, elapsed: Duration) -> u32 {
        self.accumulator += elapsed;
        let mut steps = 0;
        while self.accumulator >= self.fixed_time_step {
            self.accumulator -= self.fixed_time_step;
            self.fixed_total += self.fixed_time_step;
            let time = UpdateTime {
                elapsed: self.fixed_time_step,
                total: self.fixed_total,
            };
            self.game.fixed_update(time, &self.jobs);
            steps += 1;
        }
        steps
    }
}

impl<G: Game> EngineCallbacks for Engine<G> {
    fn iterate(&mut self, platform: &dyn Platform) -> ControlFlow<()> {
        profiling::function_scope!();
        let now = platform.now();
        let time = UpdateTime {
            elapsed: now - self.last_frame,
            total: now - self.started,
        };
        self.last_frame = now;

        if let Err(err) = self.jobs.update(platform) {
            error!("Stopping the game loop, the job system could not be updated: {err}");
            return ControlFlow::Break(());
        }

        let fixed_steps = self.run_fixed_updates(time.elapsed);
        trace!(
            "Frame {} took {:?}, ran {fixed_steps} fixed updates.",
            self.frame_count,
            time.elapsed,
        );
        self.frame_count += 1;
        self.game.run_frame(time, &mut self.jobs, platform)
    }
}
