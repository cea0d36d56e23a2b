//! Gated background execution of tasks.

pub mod task_queue;

pub use task_queue::{Job, TaskQueue};
