// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use core::{cell::Cell, fmt::Arguments, time::Duration};
use std::thread::{self, JoinHandle};

use platform::{Instant, Platform, ThreadHandle, ThreadMain};

/// A [`Platform`] for tests, with a configurable thread count and a clock
/// which only moves when told to.
pub struct TestPlatform {
    parallelism: usize,
    now: Cell<Instant>,
}

impl TestPlatform {
    pub fn new(multithreaded: bool) -> TestPlatform {
        TestPlatform::with_parallelism(if multithreaded { 4 } else { 1 })
    }

    pub fn with_parallelism(parallelism: usize) -> TestPlatform {
        TestPlatform {
            parallelism,
            now: Cell::new(Instant::reference()),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }
}

struct TestThread(JoinHandle<()>);

impl ThreadHandle for TestThread {
    fn is_finished(&self) -> bool {
        self.0.is_finished()
    }

    fn join(self: Box<Self>) -> bool {
        self.0.join().is_ok()
    }
}

impl Platform for TestPlatform {
    fn available_parallelism(&self) -> usize {
        self.parallelism
    }

    fn spawn_thread(&self, name: &str, main: ThreadMain) -> Option<Box<dyn ThreadHandle>> {
        let thread = thread::Builder::new().name(name.to_owned()).spawn(main).unwrap();
        Some(Box::new(TestThread(thread)))
    }

    fn now(&self) -> Instant {
        self.now.get()
    }

    fn println(&self, _message: Arguments) {}

    fn exit(&self, clean: bool) {
        panic!("TestPlatform::exit({clean}) was called");
    }
}
