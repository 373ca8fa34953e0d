// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use super::{JobContext, ResultRunnable, Runnable};

/// A [`Runnable`] which calls a closure.
pub struct DelegateJob<F> {
    func: Option<F>,
}

impl<F> DelegateJob<F>
where
    F: FnOnce(&JobContext) + Send + 'static,
{
    pub fn new(func: F) -> DelegateJob<F> {
        DelegateJob { func: Some(func) }
    }
}

impl<F> Runnable for DelegateJob<F>
where
    F: FnOnce(&JobContext) + Send + 'static,
{
    fn execute(&mut self, ctx: &JobContext) {
        if let Some(func) = self.func.take() {
            func(ctx);
        }
    }
}

/// A [`ResultRunnable`] which calls a closure.
pub struct DelegateResultJob<F> {
    func: Option<F>,
}

impl<T, F> DelegateResultJob<F>
where
    F: FnOnce(&JobContext) -> T + Send + 'static,
{
    pub fn new(func: F) -> DelegateResultJob<F> {
        DelegateResultJob { func: Some(func) }
    }
}

impl<T, F> ResultRunnable<T> for DelegateResultJob<F>
where
    F: FnOnce(&JobContext) -> T + Send + 'static,
{
    fn execute(&mut self, ctx: &JobContext) -> T {
        let func = self.func.take();
        // does not panic: jobs are only ever executed once
        let func = func.expect("delegate result job should not be executed twice");
        func(ctx)
    }
}
