//! Per-frame update task dispatch
//!
//! Game-logic work for one frame is registered as named tasks with
//! explicit dependencies, then dispatched across a worker pool. A task
//! runs only after every dependency has finished; independent tasks run
//! concurrently. The dispatcher is built fresh each frame and consumed
//! by [`UpdateDispatcher::run`].

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crossbeam::channel::{unbounded, Sender};
use log::{debug, trace};
use thiserror::Error;

/// Dispatch errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The dependency graph contains a cycle
    #[error("cyclic task dependency involving '{0}'")]
    CyclicDependency(String),
}

/// Identifier of a registered task, valid for one dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(usize);

type Work = Box<dyn FnOnce() + Send>;

struct Task {
    name: String,
    deps: Vec<TaskId>,
    work: Option<Work>,
}

/// Collects one frame's tasks and runs them in dependency order
pub struct UpdateDispatcher {
    tasks: Vec<Task>,
    workers: usize,
}

impl Default for UpdateDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateDispatcher {
    /// Create a dispatcher sized to the machine's parallelism
    pub fn new() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_workers(workers)
    }

    /// Create a dispatcher with an explicit worker count
    pub fn with_workers(workers: usize) -> Self {
        Self {
            tasks: Vec::new(),
            workers: workers.max(1),
        }
    }

    /// Register a task that runs after every task in `deps`
    pub fn add_task(
        &mut self,
        name: &str,
        deps: &[TaskId],
        work: impl FnOnce() + Send + 'static,
    ) -> TaskId {
        let id = TaskId(self.tasks.len());
        self.tasks.push(Task {
            name: name.to_string(),
            deps: deps.to_vec(),
            work: Some(Box::new(work)),
        });
        id
    }

    /// Add a dependency edge after both tasks exist
    pub fn add_dependency(&mut self, task: TaskId, dep: TaskId) {
        if let Some(entry) = self.tasks.get_mut(task.0) {
            if !entry.deps.contains(&dep) {
                entry.deps.push(dep);
            }
        }
    }

    /// Number of registered tasks
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Dispatch every task, respecting dependencies
    ///
    /// The cycle check runs up front, so a cyclic graph fails before any
    /// task has started. Ready tasks are handed to workers in
    /// registration order.
    pub fn run(mut self) -> Result<(), DispatchError> {
        let count = self.tasks.len();
        if count == 0 {
            return Ok(());
        }

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut in_degree = vec![0usize; count];
        for (i, task) in self.tasks.iter().enumerate() {
            for dep in &task.deps {
                if dep.0 != i && dep.0 < count {
                    dependents[dep.0].push(i);
                    in_degree[i] += 1;
                }
            }
        }

        // Dry-run Kahn to reject cycles before spawning anything
        {
            let mut degree = in_degree.clone();
            let mut ready: Vec<usize> = (0..count).filter(|&i| degree[i] == 0).collect();
            let mut seen = 0;
            while let Some(task) = ready.pop() {
                seen += 1;
                for &next in &dependents[task] {
                    degree[next] -= 1;
                    if degree[next] == 0 {
                        ready.push(next);
                    }
                }
            }
            if seen != count {
                let stuck = (0..count)
                    .find(|&i| degree[i] > 0)
                    .map(|i| self.tasks[i].name.clone())
                    .unwrap_or_default();
                return Err(DispatchError::CyclicDependency(stuck));
            }
        }

        debug!("dispatching {} tasks on {} workers", count, self.workers);
        let (job_tx, job_rx) = unbounded::<(usize, Work)>();
        let (done_tx, done_rx) = unbounded::<usize>();

        std::thread::scope(|scope| {
            for _ in 0..self.workers {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move || {
                    while let Ok((task, work)) = job_rx.recv() {
                        work();
                        if done_tx.send(task).is_err() {
                            break;
                        }
                    }
                });
            }

            let mut ready: BinaryHeap<Reverse<usize>> = (0..count)
                .filter(|&i| in_degree[i] == 0)
                .map(Reverse)
                .collect();
            let submit = |task: usize, tasks: &mut Vec<Task>, job_tx: &Sender<(usize, Work)>| {
                trace!("dispatching task '{}'", tasks[task].name);
                if let Some(work) = tasks[task].work.take() {
                    let _ = job_tx.send((task, work));
                }
            };

            while let Some(Reverse(task)) = ready.pop() {
                submit(task, &mut self.tasks, &job_tx);
            }

            let mut finished = 0;
            while finished < count {
                let Ok(task) = done_rx.recv() else { break };
                finished += 1;
                let mut newly_ready: BinaryHeap<Reverse<usize>> = BinaryHeap::new();
                for &next in &dependents[task] {
                    in_degree[next] -= 1;
                    if in_degree[next] == 0 {
                        newly_ready.push(Reverse(next));
                    }
                }
                while let Some(Reverse(next)) = newly_ready.pop() {
                    submit(next, &mut self.tasks, &job_tx);
                }
            }
            drop(job_tx);
        });

        Ok(())
    }
}
