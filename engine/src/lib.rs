// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! The engine core: the [`jobs::JobSystem`] which spreads work over the main
//! thread and a pool of background workers, and the [`Engine`] which drives
//! it and a [`Game`] once per frame.

mod engine;
pub mod jobs;
pub mod multithreading;

#[cfg(test)]
mod test_platform;

pub use engine::*;
