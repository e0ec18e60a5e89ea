//! 编排层：批次协调器与后台任务队列

pub mod batch_coordinator;
pub mod task_queue;

pub use batch_coordinator::{BatchCoordinator, StopOutcome};
pub use task_queue::{QueueHandle, TaskQueue};
