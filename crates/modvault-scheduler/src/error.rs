#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("task {0:?} failed: {1}")]
    TaskFailed(String, #[source] anyhow::Error),
    #[error("worker thread for task {0:?} panicked: {1}")]
    WorkerPanicked(String, String),
    #[error(
        "data-dependency conflict between tasks {first:?} and {second:?}: both are eligible to run and declare overlapping reads/writes"
    )]
    DataDependencyConflict { first: String, second: String },
    #[error("task {0:?} registered twice")]
    DuplicateTask(String),
    #[error("task {0:?} depends on unknown task {1:?}")]
    UnknownDependency(String, String),
    #[error("placeholder {0:?} was never replaced before the scheduler ran to completion")]
    UnresolvedPlaceholder(String),
    #[error("task {0:?} is not a placeholder and cannot be replaced")]
    NotAPlaceholder(String),
    #[error("scheduler deadlocked: tasks remain but none are eligible and no workers are in flight")]
    Deadlock,
}
