use std::time::Duration;

use amq_protocol_types::{AMQPValue, FieldTable};
use lapin::options::QueueDeclareOptions;
use lapin::{Channel, Connection, ConnectionProperties};
use tokio::time::{sleep, timeout};
use tracing::{error, info};

use super::errors::{QueueError, Result};

pub struct ConnectionManager {
    uri: String,
    connect_timeout: Duration,
    connection: Option<Connection>,
    max_reconnect_attempts: u32,
    reconnect_delay_ms: u64,
}

impl ConnectionManager {
    pub fn new(uri: &str, connect_timeout: Duration) -> Self {
        ConnectionManager {
            uri: uri.to_string(),
            connect_timeout,
            connection: None,
            max_reconnect_attempts: 10,
            reconnect_delay_ms: 1000,
        }
    }

    pub fn with_reconnect_policy(mut self, max_attempts: u32, initial_delay_ms: u64) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self.reconnect_delay_ms = initial_delay_ms;
        self
    }

    pub async fn get_connection(&mut self) -> Result<&Connection> {
        if self
            .connection
            .as_ref()
            .map_or(false, |conn| conn.status().connected())
        {
            return Ok(self.connection.as_ref().unwrap());
        }
        self.establish_connection().await
    }

    async fn establish_connection(&mut self) -> Result<&Connection> {
        let mut attempts = 0;
        let mut delay = self.reconnect_delay_ms;

        loop {
            info!("Connecting to broker at {}", self.uri);

            let connecting = Connection::connect(&self.uri, ConnectionProperties::default());
            match timeout(self.connect_timeout, connecting).await {
                Ok(Ok(conn)) => {
                    info!("Connected to broker");
                    self.connection = Some(conn);
                    return Ok(self.connection.as_ref().unwrap());
                }
                Ok(Err(err)) => {
                    attempts += 1;
                    error!(
                        "Failed to connect to broker (attempt {}/{}): {:?}",
                        attempts, self.max_reconnect_attempts, err
                    );
                    if attempts >= self.max_reconnect_attempts {
                        return Err(err.into());
                    }
                }
                Err(elapsed) => {
                    attempts += 1;
                    error!(
                        "Connection attempt timed out ({}/{})",
                        attempts, self.max_reconnect_attempts
                    );
                    if attempts >= self.max_reconnect_attempts {
                        return Err(elapsed.into());
                    }
                }
            }

            // Exponential backoff with jitter, capped at 30 seconds
            let jitter = (rand::random::<f64>() * 0.3 - 0.15) * delay as f64;
            let sleep_time = (delay as i64 + jitter as i64).max(0) as u64;
            info!("Waiting {}ms before next connection attempt", sleep_time);
            sleep(Duration::from_millis(sleep_time)).await;
            delay = std::cmp::min(delay * 2, 30_000);
        }
    }

    pub async fn create_channel(&mut self) -> Result<Channel> {
        let connection = self.get_connection().await?;
        connection
            .create_channel()
            .await
            .map_err(|e| QueueError::Channel(e.to_string()))
    }

    pub async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.connection.take() {
            info!("Closing broker connection");
            conn.close(0, "closing").await?;
        }
        Ok(())
    }
}

/// Declares the relay queue. Durable and quorum-typed so the broker tracks
/// per-message delivery counts across requeues.
pub(crate) async fn declare_queue(channel: &Channel, queue: &str) -> Result<()> {
    let mut arguments = FieldTable::default();
    arguments.insert(
        "x-queue-type".into(),
        AMQPValue::LongString("quorum".into()),
    );

    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            arguments,
        )
        .await
        .map_err(|e| QueueError::Channel(format!("Failed to declare queue: {}", e)))?;

    Ok(())
}
