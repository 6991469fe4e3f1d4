//! Cooperative task scheduling.
//!
//! - [`Priority`]: task priority levels (Critical, High, Low)
//! - [`TaskScheduler`]: worker pool with priority queues
//! - [`AtomicCounter`]: join primitive for a group of scheduled tasks
//!
//! Waiting on a counter from inside a scheduled task does not block the
//! worker: the waiter runs other queued tasks until its counter drains.

mod counter;
mod priority;
mod scheduler;

pub use counter::AtomicCounter;
pub use priority::Priority;
pub use scheduler::TaskScheduler;
