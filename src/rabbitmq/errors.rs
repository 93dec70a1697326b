// src/rabbitmq/errors.rs

use serde_json::Error as SerdeError;
use thiserror::Error;
use tokio::time::error::Elapsed;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("broker connection error: {0}")]
    Connection(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("message serialization error: {0}")]
    Serialization(#[from] SerdeError),

    #[error("message deserialization error: {0}")]
    Deserialization(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("consume error: {0}")]
    Consume(String),

    #[error("acknowledge error: {0}")]
    Ack(String),

    #[error("timed out: {0}")]
    Timeout(String),
}

// Custom Result type for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;

impl From<lapin::Error> for QueueError {
    fn from(error: lapin::Error) -> Self {
        QueueError::Connection(error.to_string())
    }
}

impl From<Elapsed> for QueueError {
    fn from(_: Elapsed) -> Self {
        QueueError::Timeout("connection timed out".to_string())
    }
}
