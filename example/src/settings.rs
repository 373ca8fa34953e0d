// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{fs, path::Path};

use anyhow::Context;
use engine::{jobs::JobSystemConfig, EngineConfig};
use serde::Deserialize;

/// The settings file of the example game.
///
/// Has enum variants for breaking changes in the format of the settings file,
/// but [`read`] always returns the newest variant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "settings_file_version", rename_all = "snake_case")]
pub enum Settings {
    V1 {
        #[serde(default)]
        job_system: JobSystemConfig,
        #[serde(default = "default_fixed_updates_per_second")]
        fixed_updates_per_second: u32,
    },
}

fn default_fixed_updates_per_second() -> u32 {
    EngineConfig::DEFAULT.fixed_updates_per_second
}

impl Settings {
    pub fn engine_config(&self) -> EngineConfig {
        match self {
            Settings::V1 {
                job_system,
                fixed_updates_per_second,
            } => EngineConfig {
                job_system: *job_system,
                fixed_updates_per_second: *fixed_updates_per_second,
            },
        }
    }
}

pub fn read(settings: Option<&Path>) -> anyhow::Result<Settings> {
    let Some(settings) = settings else {
        return Ok(Settings::V1 {
            job_system: JobSystemConfig::DEFAULT,
            fixed_updates_per_second: default_fixed_updates_per_second(),
        });
    };

    let settings = fs::read_to_string(settings)
        .with_context(|| format!("Failed to open the settings file {}", settings.display()))?;
    let settings = parse(&settings)?;

    // NOTE: When there's new versions of Settings, convert to the newest here
    // (main assumes it)

    Ok(settings)
}

fn parse(settings: &str) -> anyhow::Result<Settings> {
    serde_json::from_str(settings).context("Failed to parse the settings file")
}
