//! Long-running server tasks and the poller that waits on them.

mod poller;
mod types;

pub use poller::{
  next_interval, poll_for_completion, PollError, PollOptions, TaskSource, DEFAULT_INTERVAL,
  DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_INTERVAL,
};
pub use types::{TaskInfo, TaskResponse, TaskStatus};
