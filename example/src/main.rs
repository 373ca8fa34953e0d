// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

mod cli;
mod game;
mod settings;

use std::process::ExitCode;

use anyhow::Context;
use engine::Engine;
use platform_std::StdPlatform;
use tracing::{error, info};

use crate::game::ExampleGame;

fn main() -> ExitCode {
    let opts = cli::options().run();

    tracing_subscriber::fmt()
        .with_max_level(opts.verbosity_level)
        .with_thread_names(true)
        .init();

    #[cfg(feature = "profile")]
    profiling::tracy_client::Client::start();

    match run(&opts) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(opts: &cli::Options) -> anyhow::Result<bool> {
    let settings = settings::read(opts.settings_path.as_deref())?;
    let mut config = settings.engine_config();
    if let Some(workers) = opts.workers {
        config.job_system.worker_count = Some(workers);
    }

    let platform = StdPlatform::new();
    let mut engine = Engine::<ExampleGame>::new(&platform, config, ());
    let clean = platform.run_game_loop(&mut engine, opts.fps, opts.frames);
    info!("Game loop ended after {} frames.", engine.frame_count());

    engine
        .shutdown()
        .context("Failed to shut down the job system")?;
    Ok(clean)
}
