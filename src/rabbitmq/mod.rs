// src/rabbitmq/mod.rs
// Queue plumbing for the relay: connection management, the publisher used by
// the HTTP ingress, and the polling worker.

pub mod connection;
pub mod errors;
pub mod publisher;
pub mod worker;

// Re-export specific items to simplify imports elsewhere
pub use connection::ConnectionManager;
pub use errors::{QueueError, Result};
pub use publisher::{Enqueue, Publisher};
pub use worker::{Worker, WorkerOptions};
