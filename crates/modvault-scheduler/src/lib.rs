//! The dependency-ordered task scheduler (§4.H): bounded worker
//! parallelism for pure tasks, a single serialized coordinator for tasks
//! that touch shared state, and static conflict detection between
//! coordinator tasks whose data-dependency declarations overlap.

mod error;
mod registrar;
mod scheduler;
mod task;

pub use error::SchedulerError;
pub use registrar::Registrar;
pub use scheduler::Scheduler;
pub use task::{downcast, TaskDataDependencies, TaskOutput};
