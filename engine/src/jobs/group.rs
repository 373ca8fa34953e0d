// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use core::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::{Job, JobBuilder, JobContext, Runnable};

type Children = Arc<Mutex<Vec<Job>>>;

struct GroupBody {
    children: Children,
}

impl Runnable for GroupBody {
    fn execute(&mut self, ctx: &JobContext) {
        // Cloned out so children can't deadlock by touching the group.
        let children = self.children.lock().clone();
        for child in &children {
            if !child.run(ctx.execution()) {
                trace!(
                    "Group '{}' skipped child '{}' ({:?}), it was not ready.",
                    ctx.job().name(),
                    child.name(),
                    child.state(),
                );
            }
        }
    }

    fn on_canceled(&mut self, cascade: &mut Vec<Job>) {
        cascade.extend(self.children.lock().iter().cloned());
    }
}

/// A [`Job`] which runs a list of other jobs, in the order they were added,
/// on the same worker.
///
/// The children are not submitted to the job system themselves: the group is
/// submitted, and it runs each child that is ready once it's run. Canceling
/// the group cancels the children that haven't run yet.
#[derive(Clone)]
pub struct JobGroup {
    job: Job,
    children: Children,
}

impl JobBuilder {
    pub fn build_group(self) -> JobGroup {
        let children: Children = Arc::new(Mutex::new(Vec::new()));
        let job = self.build(GroupBody {
            children: children.clone(),
        });
        JobGroup { job, children }
    }
}

impl JobGroup {
    /// Shorthand for `Job::builder().name(name).build_group()`.
    pub fn new(name: impl Into<String>) -> JobGroup {
        JobBuilder::new().name(name).build_group()
    }

    /// Appends a job to be run by this group.
    ///
    /// ### Panics
    ///
    /// If the group is not pending anymore.
    #[track_caller]
    pub fn add_job(&self, job: impl Into<Job>) {
        let mut children = self.children.lock();
        assert!(
            self.job.is_pending(),
            "jobs can't be added to group '{}' after it has started running or was canceled",
            self.job.name(),
        );
        children.push(job.into());
    }

    pub fn len(&self) -> usize {
        self.children.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.lock().is_empty()
    }

    pub fn children(&self) -> Vec<Job> {
        self.children.lock().clone()
    }

    pub fn job(&self) -> &Job {
        &self.job
    }
}

impl Deref for JobGroup {
    type Target = Job;
    fn deref(&self) -> &Job {
        &self.job
    }
}

impl From<JobGroup> for Job {
    fn from(group: JobGroup) -> Job {
        group.job
    }
}

impl From<&JobGroup> for Job {
    fn from(group: &JobGroup) -> Job {
        group.job.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::jobs::{ExecutionContext, Job, JobGroup, JobState};

    fn recording(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Job {
        let log = log.clone();
        Job::from_fn(name, move |_| log.lock().push(name))
    }

    #[test]
    fn runs_children_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let group = JobGroup::new("group");
        group.add_job(recording("first", &log));
        group.add_job(recording("second", &log));
        group.add_job(recording("third", &log));
        assert_eq!(3, group.len());

        assert!(group.run(ExecutionContext::Background));
        assert_eq!(JobState::Succeeded, group.state());
        assert_eq!(vec!["first", "second", "third"], *log.lock());
        assert!(group.children().iter().all(|child| child.state() == JobState::Succeeded));
    }

    #[test]
    fn empty_group_succeeds() {
        let group = JobGroup::new("empty");
        assert!(group.is_empty());
        group.run(ExecutionContext::MainThread);
        assert_eq!(JobState::Succeeded, group.state());
    }

    #[test]
    fn children_see_the_groups_execution_context() {
        let group = JobGroup::new("group");
        let child = Job::from_fn("child", |ctx| {
            assert_eq!(ExecutionContext::MainThread, ctx.execution());
        });
        group.add_job(&child);
        group.run(ExecutionContext::MainThread);
        assert_eq!(JobState::Succeeded, child.state());
        assert!(child.failure().is_none());
    }

    #[test]
    fn canceling_the_group_cancels_children() {
        let group = JobGroup::new("group");
        let a = Job::from_fn("a", |_| {});
        let b = Job::from_fn("b", |_| {});
        group.add_job(&a);
        group.add_job(&b);

        assert_eq!(3, group.cancel());
        assert_eq!(JobState::Canceled, group.state());
        assert_eq!(JobState::Canceled, a.state());
        assert_eq!(JobState::Canceled, b.state());
        assert_eq!(0, group.cancel());
    }

    #[test]
    fn cancel_counts_the_dependents_of_children() {
        let group = JobGroup::new("group");
        let a = Job::from_fn("a", |_| {});
        let b = Job::from_fn("b", |_| {});
        let c = Job::from_fn("c", |_| {});
        c.add_dependency(&a);
        group.add_job(&a);
        group.add_job(&b);

        assert_eq!(4, group.cancel());
        assert_eq!(JobState::Canceled, c.state());
        assert_eq!(0, a.cancel(), "already canceled along with the group");
    }

    #[test]
    fn canceling_a_running_group_does_nothing() {
        let group = JobGroup::new("group");
        let canceled_from_inside = Arc::new(Mutex::new(None));
        let child = {
            let group = group.clone();
            let canceled_from_inside = canceled_from_inside.clone();
            Job::from_fn("cancels its group", move |_| {
                *canceled_from_inside.lock() = Some(group.cancel());
            })
        };
        let sibling = Job::from_fn("sibling", |_| {});
        group.add_job(&child);
        group.add_job(&sibling);

        assert!(group.run(ExecutionContext::Background));
        assert_eq!(Some(0), *canceled_from_inside.lock());
        assert_eq!(JobState::Succeeded, group.state());
        assert_eq!(JobState::Succeeded, child.state());
        assert_eq!(JobState::Succeeded, sibling.state());
    }

    #[test]
    #[should_panic(expected = "after it has started running or was canceled")]
    fn adding_to_a_finished_group_panics() {
        let group = JobGroup::new("group");
        group.run(ExecutionContext::Background);
        group.add_job(Job::from_fn("late", |_| {}));
    }
}
