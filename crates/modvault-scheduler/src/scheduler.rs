use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::SchedulerError;
use crate::registrar::{PendingOp, Registrar};
use crate::task::{PureFn, TaskDataDependencies, TaskKind, TaskOutput};

enum Status {
    Waiting,
    Ready,
    Done(TaskOutput),
    Cancelled,
    Failed,
}

struct Node<C> {
    deps: Vec<String>,
    remaining: usize,
    kind: Option<TaskKind<C>>,
    status: Status,
}

/// A dependency-ordered task graph executed with bounded worker
/// parallelism (§4.H).
///
/// Pure tasks run on a semaphore-bounded pool of blocking worker threads;
/// coordinator tasks run one at a time, serialized on the `run` future
/// itself, and may mutate the shared `C` state and register further tasks.
pub struct Scheduler<C> {
    nodes: FxHashMap<String, Node<C>>,
    dependents: FxHashMap<String, Vec<String>>,
    pure_ready: VecDeque<String>,
    coordinator_ready: VecDeque<String>,
    worker_limit: usize,
    first_error: Option<SchedulerError>,
}

impl<C> Scheduler<C> {
    #[must_use]
    pub fn new(worker_limit: usize) -> Self {
        Self {
            nodes: FxHashMap::default(),
            dependents: FxHashMap::default(),
            pure_ready: VecDeque::new(),
            coordinator_ready: VecDeque::new(),
            worker_limit,
            first_error: None,
        }
    }

    /// Register a pure task: runs on a worker, may run concurrently with
    /// any other task that isn't one of its (transitive) dependents.
    pub fn register_pure(
        &mut self,
        name: impl Into<String>,
        deps: Vec<String>,
        func: impl FnOnce(&[TaskOutput]) -> Result<TaskOutput, anyhow::Error> + Send + 'static,
    ) -> Result<(), SchedulerError> {
        self.register(name.into(), deps, TaskKind::Pure(Box::new(func)))
    }

    /// Register a coordinator task: runs serialized with every other
    /// coordinator task, on whatever thread drives the `run` future.
    pub fn register_coordinator(
        &mut self,
        name: impl Into<String>,
        deps: Vec<String>,
        data_deps: Option<TaskDataDependencies>,
        func: impl FnOnce(&mut C, &[TaskOutput], &mut Registrar<C>) -> Result<TaskOutput, anyhow::Error> + Send + 'static,
    ) -> Result<(), SchedulerError> {
        self.register(name.into(), deps, TaskKind::Coordinator(Box::new(func), data_deps))
    }

    /// Reserve a name with no behavior yet. Must be replaced with
    /// [`Self::replace_placeholder_with_pure`] or
    /// [`Self::replace_placeholder_with_coordinator`] before the scheduler
    /// finishes, or `run` fails with [`SchedulerError::UnresolvedPlaceholder`].
    pub fn register_placeholder(&mut self, name: impl Into<String>) -> Result<(), SchedulerError> {
        self.register(name.into(), Vec::new(), TaskKind::Placeholder)
    }

    pub fn replace_placeholder_with_pure(
        &mut self,
        name: &str,
        deps: Vec<String>,
        func: impl FnOnce(&[TaskOutput]) -> Result<TaskOutput, anyhow::Error> + Send + 'static,
    ) -> Result<(), SchedulerError> {
        self.replace_placeholder(name, deps, TaskKind::Pure(Box::new(func)))
    }

    pub fn replace_placeholder_with_coordinator(
        &mut self,
        name: &str,
        deps: Vec<String>,
        data_deps: Option<TaskDataDependencies>,
        func: impl FnOnce(&mut C, &[TaskOutput], &mut Registrar<C>) -> Result<TaskOutput, anyhow::Error> + Send + 'static,
    ) -> Result<(), SchedulerError> {
        self.replace_placeholder(name, deps, TaskKind::Coordinator(Box::new(func), data_deps))
    }

    /// Drive the graph to completion.
    ///
    /// On the first task failure, the scheduler cancels that task's
    /// transitive dependents but lets unrelated tasks — already running or
    /// not yet started — run to completion, then returns the first error.
    pub async fn run(mut self, coordinator_state: &mut C) -> Result<(), SchedulerError> {
        let semaphore = Arc::new(Semaphore::new(self.worker_limit.max(1)));
        let mut join_set: JoinSet<(String, Result<TaskOutput, anyhow::Error>)> = JoinSet::new();

        loop {
            while let Some(name) = self.coordinator_ready.pop_front() {
                self.run_coordinator_task(&name, coordinator_state)?;
            }
            while let Some(name) = self.pure_ready.pop_front() {
                self.dispatch_pure(&name, &semaphore, &mut join_set);
            }

            if self.all_terminal() {
                break;
            }

            let Some(finished) = join_set.join_next().await else {
                if let Some(name) = self.first_unresolved_placeholder() {
                    return Err(SchedulerError::UnresolvedPlaceholder(name));
                }
                return Err(SchedulerError::Deadlock);
            };

            let (name, result) = match finished {
                Ok(pair) => pair,
                Err(join_err) => {
                    return Err(SchedulerError::WorkerPanicked("<unknown>".to_string(), join_err.to_string()));
                }
            };

            match result {
                Ok(output) => self.complete(&name, output)?,
                Err(err) => self.fail(&name, err),
            }
        }

        if let Some(err) = self.first_error {
            return Err(err);
        }
        Ok(())
    }

    fn register(&mut self, name: String, deps: Vec<String>, kind: TaskKind<C>) -> Result<(), SchedulerError> {
        if self.nodes.contains_key(&name) {
            return Err(SchedulerError::DuplicateTask(name));
        }
        let expanded = self.expand_deps(&name, &deps)?;
        let (remaining, any_failed) = self.dependency_state(&expanded);

        for dep in &expanded {
            self.dependents.entry(dep.clone()).or_default().push(name.clone());
        }

        let status = if any_failed {
            Status::Cancelled
        } else if remaining == 0 {
            Status::Ready
        } else {
            Status::Waiting
        };
        let is_ready = matches!(status, Status::Ready);

        self.nodes.insert(
            name.clone(),
            Node {
                deps: expanded,
                remaining,
                kind: Some(kind),
                status,
            },
        );

        if is_ready {
            self.enqueue_ready(&name)?;
        }
        Ok(())
    }

    fn replace_placeholder(&mut self, name: &str, deps: Vec<String>, kind: TaskKind<C>) -> Result<(), SchedulerError> {
        match self.nodes.get(name) {
            Some(node) if matches!(node.kind, Some(TaskKind::Placeholder)) => {}
            Some(_) => return Err(SchedulerError::NotAPlaceholder(name.to_string())),
            None => return Err(SchedulerError::UnknownDependency(name.to_string(), name.to_string())),
        }

        let expanded = self.expand_deps(name, &deps)?;
        let (remaining, any_failed) = self.dependency_state(&expanded);

        for dep in &expanded {
            self.dependents.entry(dep.clone()).or_default().push(name.to_string());
        }

        let status = if any_failed {
            Status::Cancelled
        } else if remaining == 0 {
            Status::Ready
        } else {
            Status::Waiting
        };
        let is_ready = matches!(status, Status::Ready);

        let node = self.nodes.get_mut(name).expect("checked above");
        node.deps = expanded;
        node.remaining = remaining;
        node.kind = Some(kind);
        node.status = status;

        if is_ready {
            self.enqueue_ready(name)?;
        }
        Ok(())
    }

    fn dependency_state(&self, expanded: &[String]) -> (usize, bool) {
        let mut remaining = 0;
        let mut any_failed = false;
        for dep in expanded {
            match &self.nodes[dep].status {
                Status::Done(_) => {}
                Status::Cancelled | Status::Failed => any_failed = true,
                Status::Waiting | Status::Ready => remaining += 1,
            }
        }
        (remaining, any_failed)
    }

    fn expand_deps(&self, owner: &str, deps: &[String]) -> Result<Vec<String>, SchedulerError> {
        let mut expanded = Vec::new();
        for dep in deps {
            if let Some(prefix) = dep.strip_suffix('*') {
                let mut matches: Vec<String> =
                    self.nodes.keys().filter(|k| k.starts_with(prefix)).cloned().collect();
                matches.sort();
                expanded.extend(matches);
            } else {
                if !self.nodes.contains_key(dep) {
                    return Err(SchedulerError::UnknownDependency(owner.to_string(), dep.clone()));
                }
                expanded.push(dep.clone());
            }
        }
        expanded.sort();
        expanded.dedup();
        Ok(expanded)
    }

    fn enqueue_ready(&mut self, name: &str) -> Result<(), SchedulerError> {
        match &self.nodes[name].kind {
            Some(TaskKind::Coordinator(_, data_deps)) => {
                if let Some(dd) = data_deps {
                    for other in &self.coordinator_ready {
                        if let Some(TaskKind::Coordinator(_, Some(other_dd))) = &self.nodes[other].kind {
                            if dd.conflicts_with(other_dd) {
                                return Err(SchedulerError::DataDependencyConflict {
                                    first: other.clone(),
                                    second: name.to_string(),
                                });
                            }
                        }
                    }
                }
                self.coordinator_ready.push_back(name.to_string());
            }
            Some(TaskKind::Pure(_)) => self.pure_ready.push_back(name.to_string()),
            Some(TaskKind::Placeholder) | None => {}
        }
        Ok(())
    }

    fn collect_inputs(&self, name: &str) -> Vec<TaskOutput> {
        self.nodes[name]
            .deps
            .iter()
            .map(|dep| match &self.nodes[dep].status {
                Status::Done(output) => Arc::clone(output),
                _ => unreachable!("dependency {dep} of ready task {name} was not Done"),
            })
            .collect()
    }

    fn run_coordinator_task(&mut self, name: &str, state: &mut C) -> Result<(), SchedulerError> {
        let inputs = self.collect_inputs(name);
        let kind = self.nodes.get_mut(name).and_then(|n| n.kind.take());
        let Some(TaskKind::Coordinator(func, _)) = kind else {
            unreachable!("coordinator_ready only ever holds coordinator tasks");
        };

        let mut registrar = Registrar::new();
        match func(state, &inputs, &mut registrar) {
            Ok(output) => self.complete(name, output)?,
            Err(err) => {
                self.fail(name, err);
                return Ok(());
            }
        }
        self.apply_registrar(registrar)
    }

    fn apply_registrar(&mut self, registrar: Registrar<C>) -> Result<(), SchedulerError> {
        for op in registrar.pending {
            match op {
                PendingOp::Pure { name, deps, func } => self.register(name, deps, TaskKind::Pure(func))?,
                PendingOp::Coordinator { name, deps, data_deps, func } => {
                    self.register(name, deps, TaskKind::Coordinator(func, data_deps))?;
                }
                PendingOp::Placeholder { name } => self.register(name, Vec::new(), TaskKind::Placeholder)?,
                PendingOp::ReplaceWithPure { name, deps, func } => {
                    self.replace_placeholder(&name, deps, TaskKind::Pure(func))?;
                }
                PendingOp::ReplaceWithCoordinator { name, deps, data_deps, func } => {
                    self.replace_placeholder(&name, deps, TaskKind::Coordinator(func, data_deps))?;
                }
            }
        }
        Ok(())
    }

    fn dispatch_pure(
        &mut self,
        name: &str,
        semaphore: &Arc<Semaphore>,
        join_set: &mut JoinSet<(String, Result<TaskOutput, anyhow::Error>)>,
    ) {
        let inputs = self.collect_inputs(name);
        let kind = self.nodes.get_mut(name).and_then(|n| n.kind.take());
        let Some(TaskKind::Pure(func)) = kind else {
            unreachable!("pure_ready only ever holds pure tasks");
        };

        let semaphore = Arc::clone(semaphore);
        let owned_name = name.to_string();
        join_set.spawn(run_pure(owned_name, func, inputs, semaphore));
    }

    fn complete(&mut self, name: &str, output: TaskOutput) -> Result<(), SchedulerError> {
        if let Some(node) = self.nodes.get_mut(name) {
            node.status = Status::Done(output);
            node.kind = None;
        }
        self.on_dependency_satisfied(name)
    }

    fn fail(&mut self, name: &str, err: anyhow::Error) {
        if self.first_error.is_none() {
            self.first_error = Some(SchedulerError::TaskFailed(name.to_string(), err));
        } else {
            tracing::warn!(task = name, error = %err, "task failed after an earlier failure was already recorded");
        }
        if let Some(node) = self.nodes.get_mut(name) {
            node.status = Status::Failed;
            node.kind = None;
        }
        self.cancel_dependents(name);
    }

    fn cancel_dependents(&mut self, name: &str) {
        let dependents = self.dependents.get(name).cloned().unwrap_or_default();
        for dependent in dependents {
            let newly_cancelled = match self.nodes.get_mut(&dependent) {
                Some(node) if matches!(node.status, Status::Waiting) => {
                    node.status = Status::Cancelled;
                    node.kind = None;
                    true
                }
                _ => false,
            };
            if newly_cancelled {
                tracing::debug!(task = %dependent, upstream = name, "cancelling dependent of failed task");
                self.cancel_dependents(&dependent);
            }
        }
    }

    fn on_dependency_satisfied(&mut self, dep_name: &str) -> Result<(), SchedulerError> {
        let dependents = self.dependents.get(dep_name).cloned().unwrap_or_default();
        for dependent in dependents {
            let became_ready = {
                let node = self.nodes.get_mut(&dependent).expect("dependent must be registered");
                if node.remaining > 0 {
                    node.remaining -= 1;
                }
                node.remaining == 0 && matches!(node.status, Status::Waiting)
            };
            if became_ready {
                self.nodes.get_mut(&dependent).expect("checked above").status = Status::Ready;
                self.enqueue_ready(&dependent)?;
            }
        }
        Ok(())
    }

    fn all_terminal(&self) -> bool {
        self.nodes
            .values()
            .all(|n| matches!(n.status, Status::Done(_) | Status::Cancelled | Status::Failed))
    }

    fn first_unresolved_placeholder(&self) -> Option<String> {
        self.nodes
            .iter()
            .find(|(_, node)| matches!(node.kind, Some(TaskKind::Placeholder)))
            .map(|(name, _)| name.clone())
    }
}

async fn run_pure(
    name: String,
    func: PureFn,
    inputs: Vec<TaskOutput>,
    semaphore: Arc<Semaphore>,
) -> (String, Result<TaskOutput, anyhow::Error>) {
    let permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return (name, Err(anyhow::anyhow!("worker semaphore was closed"))),
    };

    let result = tokio::task::spawn_blocking(move || {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| func(&inputs)))
    })
    .await;
    drop(permit);

    let output = match result {
        Ok(Ok(value)) => value,
        Ok(Err(panic_payload)) => Err(anyhow::anyhow!("task panicked: {}", describe_panic(&panic_payload))),
        Err(join_err) => Err(anyhow::anyhow!("worker join error: {join_err}")),
    };
    (name, output)
}

fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
