// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;

use bpaf::{batteries::verbose_by_slice, construct, long, OptionParser, Parser};
use tracing::level_filters::LevelFilter;

#[derive(Debug, Clone)]
pub struct Options {
    pub verbosity_level: LevelFilter,
    pub settings_path: Option<PathBuf>,
    pub workers: Option<usize>,
    pub frames: Option<u64>,
    pub fps: u32,
}

pub fn options() -> OptionParser<Options> {
    let verbosity_level = verbose_by_slice(
        3,
        [
            LevelFilter::OFF,
            LevelFilter::ERROR,
            LevelFilter::WARN,
            LevelFilter::INFO,
            LevelFilter::DEBUG,
            LevelFilter::TRACE,
        ],
    );

    let settings_path = long("settings")
        .help("Reads the engine settings from a JSON file")
        .argument::<PathBuf>("FILE")
        .complete_shell(bpaf::ShellComp::File {
            mask: Some("*.json"),
        })
        .optional();

    let workers = long("workers")
        .help("Sets the amount of background workers, capped by the available parallelism")
        .argument::<usize>("N")
        .optional();

    let frames = long("frames")
        .help("Stops after running this many frames")
        .argument::<u64>("N")
        .optional();

    let fps = long("fps")
        .help("Sets the target frame rate")
        .argument::<u32>("N")
        .guard(|fps| *fps > 0, "the frame rate must be above zero")
        .fallback(60);

    construct!(Options {
        verbosity_level,
        settings_path,
        workers,
        frames,
        fps,
    })
    .to_options()
    .descr("Runs a small game which keeps the engine's job system busy")
}
