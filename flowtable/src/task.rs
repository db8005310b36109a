// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Background iteration tasks.
//!
//! A task walks the entries matching a query and hands them to a callback, a
//! bounded number at a time so that other work can be interleaved. The owner of
//! the table drives the tasks with [`FlowTable::run_tasks`].

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Display;
use std::time::Instant;

use ahash::RandomState;
use priority_queue::PriorityQueue;
use tracing::{debug, error, trace, warn};

use crate::entry::FlowEntry;
use crate::errors::{FlowTableError, FlowTableResult};
use crate::iterator::FtIterator;
use crate::list::Chain;
use crate::query::MetaMatch;
use crate::table::{FlowTable, hasher_state};
use crate::types::FlowId;

use tracectl::trace_target;
trace_target!("flowtable-task", tracectl::LevelFilter::INFO, &["flowtable"]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Called once per matching entry, then once with `None` when the iteration is over
pub type IterTaskCallback = Box<dyn FnMut(&mut FlowTable, Option<FlowId>) + Send>;

/// Outcome of running a task for one quantum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// the quantum ran out, the task is queued again
    Yielded,
    /// the iteration is over and the callback got its final call
    Finished,
}

/// Higher priorities run first, then tasks run in the order they were queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rank {
    priority: i32,
    seq: u64,
}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct IterTask {
    iter: FtIterator,
    callback: IterTaskCallback,
    priority: i32,
    /// entries handed to the callback so far
    visited: usize,
}

pub(crate) struct TaskQueue {
    ready: PriorityQueue<TaskId, Rank, RandomState>,
    tasks: HashMap<TaskId, IterTask, RandomState>,
    next_id: u64,
    seq: u64,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            ready: PriorityQueue::with_default_hasher(),
            tasks: HashMap::with_hasher(hasher_state().clone()),
            next_id: 0,
            seq: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    fn push(&mut self, id: TaskId, task: IterTask) {
        let rank = Rank {
            priority: task.priority,
            seq: self.seq,
        };
        self.seq += 1;
        self.tasks.insert(id, task);
        self.ready.push(id, rank);
    }

    fn pop(&mut self) -> Option<(TaskId, IterTask)> {
        while let Some((id, _)) = self.ready.pop() {
            match self.tasks.remove(&id) {
                Some(task) => return Some((id, task)),
                None => error!("Task {id} was queued but has no state"),
            }
        }
        None
    }

    fn remove(&mut self, id: TaskId) -> Option<IterTask> {
        self.ready.remove(&id);
        self.tasks.remove(&id)
    }

    fn drain(&mut self) -> Vec<(TaskId, IterTask)> {
        self.ready.clear();
        self.tasks.drain().collect()
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.tasks.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl FlowTable {
    /// Spawn a task calling `callback` for each entry matching `query`, and one
    /// final time with `None`. Tasks with a higher `priority` run first.
    ///
    /// # Errors
    ///
    /// Fails if too many tasks are pending or if the query designates an invalid table.
    pub fn spawn_iter_task(
        &mut self,
        query: MetaMatch,
        callback: IterTaskCallback,
        priority: i32,
    ) -> FlowTableResult<TaskId> {
        let pending = self.tasks.len();
        if pending >= self.config.max_iter_tasks {
            warn!("spawn_iter_task: refused, {pending} tasks pending");
            return Err(FlowTableError::TooManyTasks(pending));
        }
        // the list of all entries is the only one overwrites never reorder
        let iter = self.iterator_on(query, Chain::All)?;
        let id = TaskId(self.tasks.next_id);
        self.tasks.next_id += 1;
        self.tasks.push(
            id,
            IterTask {
                iter,
                callback,
                priority,
                visited: 0,
            },
        );
        debug!("spawn_iter_task: spawned {id} with priority {priority}");
        Ok(id)
    }

    /// Run the highest priority task for one quantum. Returns `None` if no task is pending.
    pub fn run_tasks(&mut self) -> Option<(TaskId, TaskStatus)> {
        let (id, mut task) = self.tasks.pop()?;
        let started = Instant::now();
        let budget = self.config.task_quantum();
        let mut steps = 0;
        loop {
            // a quantum always visits at least one entry
            if steps >= self.config.task_quantum_entries
                || (steps > 0 && budget.is_some_and(|budget| started.elapsed() >= budget))
            {
                trace!("run_tasks: {id} yields after {steps} entries");
                self.tasks.push(id, task);
                return Some((id, TaskStatus::Yielded));
            }
            let Some(flow_id) = self.iterator_next(&mut task.iter).map(FlowEntry::id) else {
                self.iterator_cleanup(&mut task.iter);
                (task.callback)(self, None);
                debug!("run_tasks: {id} finished, {} entries visited", task.visited);
                return Some((id, TaskStatus::Finished));
            };
            (task.callback)(self, Some(flow_id));
            task.visited += 1;
            steps += 1;
        }
    }

    /// Run tasks until none is left, including the ones spawned meanwhile.
    /// Returns the number of tasks that finished.
    pub fn run_all_tasks(&mut self) -> usize {
        let mut finished = 0;
        while let Some((_, status)) = self.run_tasks() {
            if status == TaskStatus::Finished {
                finished += 1;
            }
        }
        finished
    }

    /// Stop a task. Its callback is not called again.
    ///
    /// # Errors
    ///
    /// Fails if the task does not exist or has already finished.
    pub fn cancel_iter_task(&mut self, id: TaskId) -> FlowTableResult<()> {
        let mut task = self
            .tasks
            .remove(id)
            .ok_or(FlowTableError::NoSuchTask(id))?;
        self.iterator_cleanup(&mut task.iter);
        debug!("cancel_iter_task: cancelled {id}");
        Ok(())
    }

    /// Cancel every pending task
    pub(crate) fn cancel_all_tasks(&mut self) {
        for (id, mut task) in self.tasks.drain() {
            self.iterator_cleanup(&mut task.iter);
            debug!("cancel_all_tasks: cancelled {id}");
        }
    }

    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }
}
