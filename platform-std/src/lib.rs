// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! A [`Platform`] implementation on top of the standard library, for running
//! the engine headless: no window, just the game loop at a fixed frame rate.

use core::{cell::Cell, fmt::Arguments, time::Duration};
use std::{
    num::NonZeroUsize,
    thread::{self, JoinHandle},
};

use platform::{EngineCallbacks, Instant, Platform, ThreadHandle, ThreadMain};
use tracing::{debug, error, warn};

pub struct StdPlatform {
    start: std::time::Instant,
    parallelism: usize,
    exit_requested: Cell<Option<bool>>,
}

impl StdPlatform {
    pub fn new() -> StdPlatform {
        let parallelism = match thread::available_parallelism() {
            Ok(parallelism) => parallelism.get(),
            Err(err) => {
                warn!("Could not query the available parallelism, assuming 1: {err}");
                NonZeroUsize::MIN.get()
            }
        };
        StdPlatform {
            start: std::time::Instant::now(),
            parallelism,
            exit_requested: Cell::new(None),
        }
    }

    /// Returns Some if [`Platform::exit`] has been called, containing the
    /// `clean` parameter of the first call.
    pub fn exit_requested(&self) -> Option<bool> {
        self.exit_requested.get()
    }

    /// Calls [`EngineCallbacks::iterate`] `fps` times per second, until the
    /// engine breaks out of the loop, [`Platform::exit`] is called, or
    /// `max_frames` frames have been run. Returns false if the loop ended due
    /// to an unclean exit.
    pub fn run_game_loop(
        &self,
        engine: &mut dyn EngineCallbacks,
        fps: u32,
        max_frames: Option<u64>,
    ) -> bool {
        let frame_time = Duration::from_secs(1) / fps.max(1);
        let mut frames = 0;
        let mut next_frame = self.now();
        loop {
            if max_frames.is_some_and(|max_frames| frames >= max_frames) {
                debug!("Ran the requested {frames} frames, stopping.");
                break;
            }

            {
                profiling::scope!("frame");
                if engine.iterate(self).is_break() {
                    debug!("The engine ended the game loop after {frames} frames.");
                    break;
                }
            }
            frames += 1;
            profiling::finish_frame!();

            if let Some(clean) = self.exit_requested() {
                debug!("Exit requested (clean: {clean}) after {frames} frames.");
                return clean;
            }

            next_frame = next_frame + frame_time;
            let now = self.now();
            match next_frame.duration_since(now) {
                Some(until_next_frame) => thread::sleep(until_next_frame),
                // Running behind, don't try to catch up with a burst of frames.
                None => next_frame = now,
            }
        }
        true
    }
}

struct StdThread(JoinHandle<()>);

impl ThreadHandle for StdThread {
    fn is_finished(&self) -> bool {
        self.0.is_finished()
    }

    fn join(self: Box<Self>) -> bool {
        self.0.join().is_ok()
    }
}

impl Default for StdPlatform {
    fn default() -> Self {
        StdPlatform::new()
    }
}

impl Platform for StdPlatform {
    fn available_parallelism(&self) -> usize {
        self.parallelism
    }

    fn spawn_thread(&self, name: &str, main: ThreadMain) -> Option<Box<dyn ThreadHandle>> {
        match thread::Builder::new().name(name.to_owned()).spawn(main) {
            Ok(thread) => Some(Box::new(StdThread(thread))),
            Err(err) => {
                error!("Failed to spawn thread '{name}': {err}");
                None
            }
        }
    }

    fn now(&self) -> Instant {
        Instant::reference() + self.start.elapsed()
    }

    fn println(&self, message: Arguments) {
        println!("{message}");
    }

    fn exit(&self, clean: bool) {
        if self.exit_requested.get().is_none() {
            self.exit_requested.set(Some(clean));
        }
    }
}

#[cfg(test)]
mod tests {
    use core::{ops::ControlFlow, time::Duration};

    use platform::{EngineCallbacks, Platform};

    use super::StdPlatform;

    struct Counter {
        frames: u32,
        exit_at: Option<u32>,
        break_at: Option<u32>,
    }

    impl EngineCallbacks for Counter {
        fn iterate(&mut self, platform: &dyn Platform) -> ControlFlow<()> {
            self.frames += 1;
            if self.exit_at == Some(self.frames) {
                platform.exit(false);
            }
            if self.break_at == Some(self.frames) {
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        }
    }

    #[test]
    fn runs_the_requested_amount_of_frames() {
        let platform = StdPlatform::new();
        let mut counter = Counter {
            frames: 0,
            exit_at: None,
            break_at: None,
        };
        assert!(platform.run_game_loop(&mut counter, 1000, Some(5)));
        assert_eq!(5, counter.frames);
    }

    #[test]
    fn engine_can_break_out() {
        let platform = StdPlatform::new();
        let mut counter = Counter {
            frames: 0,
            exit_at: None,
            break_at: Some(3),
        };
        assert!(platform.run_game_loop(&mut counter, 1000, None));
        assert_eq!(3, counter.frames);
    }

    #[test]
    fn unclean_exit_is_reported() {
        let platform = StdPlatform::new();
        let mut counter = Counter {
            frames: 0,
            exit_at: Some(2),
            break_at: None,
        };
        assert!(!platform.run_game_loop(&mut counter, 1000, Some(10)));
        assert_eq!(2, counter.frames);
        assert_eq!(Some(false), platform.exit_requested());
    }

    #[test]
    #[cfg(not(target_os = "emscripten"))]
    fn spawned_threads_are_named_and_joinable() {
        let platform = StdPlatform::new();
        let thread = platform
            .spawn_thread(
                "Test Thread",
                Box::new(|| assert_eq!(Some("Test Thread"), std::thread::current().name())),
            )
            .unwrap();
        assert!(thread.join());

        let panicking = platform
            .spawn_thread("Panicking Thread", Box::new(|| panic!("expected panic")))
            .unwrap();
        assert!(!panicking.join());
    }

    #[test]
    fn time_moves_forward() {
        let platform = StdPlatform::new();
        let before = platform.now();
        std::thread::sleep(Duration::from_millis(2));
        assert!(platform.now() - before >= Duration::from_millis(2));
        assert!(platform.available_parallelism() >= 1);
    }
}
