use std::any::Any;
use std::sync::Arc;

/// The type-erased result a task hands to its dependents.
///
/// Every task's `func` returns one of these; dependents downcast it back
/// to the concrete type they expect via [`downcast`].
pub type TaskOutput = Arc<dyn Any + Send + Sync>;

/// Downcast a [`TaskOutput`] to the concrete type a dependent expects.
///
/// # Errors
/// Returns an error string (not a panic) if the task published a value of
/// a different type than requested — a task-graph wiring bug.
pub fn downcast<T: Send + Sync + 'static>(output: &TaskOutput) -> Result<&T, String> {
    output
        .downcast_ref::<T>()
        .ok_or_else(|| format!("task output is not a {}", std::any::type_name::<T>()))
}

pub(crate) type PureFn = Box<dyn FnOnce(&[TaskOutput]) -> Result<TaskOutput, anyhow::Error> + Send>;
pub(crate) type CoordinatorFn<C> =
    Box<dyn FnOnce(&mut C, &[TaskOutput], &mut crate::registrar::Registrar<C>) -> Result<TaskOutput, anyhow::Error> + Send>;

/// Named keys a coordinator task touches, declared so the scheduler can
/// statically catch overlapping accesses between tasks that might become
/// eligible to run in either order.
///
/// `signals` are sequencing-only markers (e.g. "catalog loaded") that carry
/// no data of their own; they participate in dependency edges but not in
/// the write/write or read/write conflict check.
#[derive(Debug, Clone, Default)]
pub struct TaskDataDependencies {
    pub reads: Vec<String>,
    pub writes: Vec<String>,
    pub signals: Vec<String>,
}

impl TaskDataDependencies {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn reads(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.reads.extend(keys.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn writes(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.writes.extend(keys.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn signals(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.signals.extend(keys.into_iter().map(Into::into));
        self
    }

    /// `true` if `self` and `other` declare an overlapping write/write or
    /// read/write access — the condition the scheduler treats as a fatal
    /// programming error when both tasks are simultaneously eligible.
    #[must_use]
    pub fn conflicts_with(&self, other: &Self) -> bool {
        self.writes.iter().any(|w| other.writes.contains(w) || other.reads.contains(w))
            || other.writes.iter().any(|w| self.reads.contains(w))
    }
}

/// What a task does once all its dependencies are satisfied.
pub(crate) enum TaskKind<C> {
    /// Runs on the bounded worker pool; may run concurrently with other
    /// pure tasks and with the coordinator loop.
    Pure(PureFn),
    /// Runs on the coordinator, serialized with every other coordinator
    /// task; may mutate `C` and register further tasks.
    Coordinator(CoordinatorFn<C>, Option<TaskDataDependencies>),
    /// Reserves a name with no behavior yet; must be replaced via
    /// [`crate::Scheduler::replace_placeholder`] before it can run.
    Placeholder,
}
