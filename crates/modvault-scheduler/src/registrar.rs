use crate::task::{CoordinatorFn, PureFn, TaskDataDependencies, TaskOutput};

pub(crate) enum PendingOp<C> {
    Pure {
        name: String,
        deps: Vec<String>,
        func: PureFn,
    },
    Coordinator {
        name: String,
        deps: Vec<String>,
        data_deps: Option<TaskDataDependencies>,
        func: CoordinatorFn<C>,
    },
    Placeholder {
        name: String,
    },
    ReplaceWithPure {
        name: String,
        deps: Vec<String>,
        func: PureFn,
    },
    ReplaceWithCoordinator {
        name: String,
        deps: Vec<String>,
        data_deps: Option<TaskDataDependencies>,
        func: CoordinatorFn<C>,
    },
}

/// Handed to a coordinator task so it can register follow-up tasks —
/// including replacing a placeholder — without holding a live reference
/// to the [`crate::Scheduler`] that is currently running it.
///
/// Registrations queued here are applied, in order, immediately after the
/// coordinator task's closure returns.
pub struct Registrar<C> {
    pub(crate) pending: Vec<PendingOp<C>>,
}

impl<C> Default for Registrar<C> {
    fn default() -> Self {
        Self { pending: Vec::new() }
    }
}

impl<C> Registrar<C> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn register_pure(
        &mut self,
        name: impl Into<String>,
        deps: Vec<String>,
        func: impl FnOnce(&[TaskOutput]) -> Result<TaskOutput, anyhow::Error> + Send + 'static,
    ) {
        self.pending.push(PendingOp::Pure {
            name: name.into(),
            deps,
            func: Box::new(func),
        });
    }

    pub fn register_coordinator(
        &mut self,
        name: impl Into<String>,
        deps: Vec<String>,
        data_deps: Option<TaskDataDependencies>,
        func: impl FnOnce(&mut C, &[TaskOutput], &mut Registrar<C>) -> Result<TaskOutput, anyhow::Error> + Send + 'static,
    ) {
        self.pending.push(PendingOp::Coordinator {
            name: name.into(),
            deps,
            data_deps,
            func: Box::new(func),
        });
    }

    pub fn register_placeholder(&mut self, name: impl Into<String>) {
        self.pending.push(PendingOp::Placeholder { name: name.into() });
    }

    pub fn replace_placeholder_with_pure(
        &mut self,
        name: impl Into<String>,
        deps: Vec<String>,
        func: impl FnOnce(&[TaskOutput]) -> Result<TaskOutput, anyhow::Error> + Send + 'static,
    ) {
        self.pending.push(PendingOp::ReplaceWithPure {
            name: name.into(),
            deps,
            func: Box::new(func),
        });
    }

    pub fn replace_placeholder_with_coordinator(
        &mut self,
        name: impl Into<String>,
        deps: Vec<String>,
        data_deps: Option<TaskDataDependencies>,
        func: impl FnOnce(&mut C, &[TaskOutput], &mut Registrar<C>) -> Result<TaskOutput, anyhow::Error> + Send + 'static,
    ) {
        self.pending.push(PendingOp::ReplaceWithCoordinator {
            name: name.into(),
            deps,
            data_deps,
            func: Box::new(func),
        });
    }
}
