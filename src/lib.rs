pub mod env;
pub mod handler;
pub mod http;
pub mod message;
pub mod rabbitmq;

// Re-export the types both binaries wire together
pub use env::Config;
pub use handler::{JobContext, JobHandler, ProcessRequest};
pub use message::{RequestMessage, SOURCE_DIRECT_HTTP};
pub use rabbitmq::{Enqueue, Publisher, QueueError, Worker, WorkerOptions};
