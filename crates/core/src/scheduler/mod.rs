//! Background scheduling.
//!
//! [`Scheduler`] runs the bounded pool of worker tasks that call the
//! acquisition pipeline in a loop. [`DirectoryWatcher`] periodically
//! cross-references pre-staged archives on disk against the open-deal
//! list and pushes matches through the short staged path.

mod watcher;
mod workers;

pub use watcher::DirectoryWatcher;
pub use workers::{Scheduler, SchedulerStatus, WorkerPoolConfig};
