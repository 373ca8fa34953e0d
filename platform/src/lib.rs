// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! This crate mainly revolves around the [`Platform`] trait, which can be
//! implemented to provide a "platform implementation" for the game engine.
//!
//! This is split off of the main engine crate so that the engine and the
//! platform implementation can be compiled independently, which appears to
//! speed up compilation time.

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

mod time;

use alloc::boxed::Box;
use core::{fmt::Arguments, ops::ControlFlow};

pub use time::*;

/// Interface to the engine for the platform implementation.
///
/// Used to allow engine to do its thing each frame.
pub trait EngineCallbacks {
    /// Run one iteration of the game loop. Returns [`ControlFlow::Break`] when
    /// the engine wants the platform to stop calling it.
    fn iterate(&mut self, platform: &dyn Platform) -> ControlFlow<()>;
}

/// The function run by a thread spawned with [`Platform::spawn_thread`].
pub type ThreadMain = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a thread spawned with [`Platform::spawn_thread`].
pub trait ThreadHandle: Send {
    /// Returns true if the thread's function has returned or panicked.
    fn is_finished(&self) -> bool;

    /// Blocks until the thread has exited. Returns false if the thread
    /// panicked.
    fn join(self: Box<Self>) -> bool;
}

/// A trait for using platform-dependent features from the engine without
/// depending on any platform implementation directly. A platform implementation
/// should implement this trait, and also call the engine's "iterate" method at
/// appropriate times.
///
/// All the functions have a `&self` parameter, so that the methods can access
/// some (possibly internally mutable) state, but still keeping the platform
/// object as widely usable as possible (a "platform" is about as global an
/// object as you get). None of these functions are (supposed to be) hot, and
/// this trait is object safe, so using &dyn [`Platform`] should be fine
/// performance-wise.
pub trait Platform {
    /// Returns how many threads the system could process in parallel
    /// efficiently.
    ///
    /// Note that this count shouldn't be decremented by one to "leave room for
    /// the main thread," the engine does that itself when deciding how many
    /// background workers to create.
    ///
    /// If this returns 1, the engine will not create background workers, and
    /// `spawn_thread` can just return `None`.
    fn available_parallelism(&self) -> usize;

    /// Spawns a thread with the given name, running `main` on it.
    ///
    /// Returns `None` if the thread could not be spawned, in which case the
    /// reason should be logged by the platform implementation. The engine
    /// catches panics inside the jobs it runs, so `main` only panics on
    /// actual bugs in the engine.
    fn spawn_thread(&self, name: &str, main: ThreadMain) -> Option<Box<dyn ThreadHandle>>;

    /// Returns the current point in time according to the platform
    /// implementation. Monotonic.
    fn now(&self) -> Instant;

    /// Print out a string. For very crude debugging.
    fn println(&self, message: Arguments);

    /// Request the process to exit, with `clean: false` if intending to signal
    /// failure. On a clean exit, the exit may be delayed until a moment later,
    /// e.g. at the end of the current frame of the game loop.
    fn exit(&self, clean: bool);
}
