//! Durable queue of mutations made while offline.

mod processor;
mod request;

pub use processor::{backoff_delay, MutationQueue, ProcessReport, QueueEvent, QueueSettings};
pub use request::{QueuedRequest, DEFAULT_MAX_RETRIES};
