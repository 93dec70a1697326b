use std::time::Duration;

use amq_protocol_types::AMQPValue;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicGetOptions, BasicNackOptions, BasicRejectOptions};
use lapin::{BasicProperties, Channel};
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use crate::env::Config;
use crate::handler::{JobContext, JobHandler};
use crate::message::RequestMessage;

use super::connection::{declare_queue, ConnectionManager};
use super::errors::{QueueError, Result};

/// Worker loop options, mirroring the console command's flags.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkerOptions {
    /// Number of times to attempt a job before marking it failed.
    pub tries: u64,
    /// Wall-clock limit for a single handler invocation.
    pub timeout: Duration,
    /// Idle interval when no message is available.
    pub sleep: Duration,
    /// Number of jobs to process before exiting; 0 means run indefinitely.
    pub max_jobs: u64,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        WorkerOptions {
            tries: 3,
            timeout: Duration::from_secs(300),
            sleep: Duration::from_secs(3),
            max_jobs: 0,
        }
    }
}

/// Pulls messages from the relay queue one at a time and runs the job
/// handler on each.
pub struct Worker {
    queue: String,
    manager: ConnectionManager,
    channel: Option<Channel>,
}

impl Worker {
    pub fn new(config: &Config) -> Self {
        Worker {
            queue: config.request_queue.clone(),
            manager: ConnectionManager::new(&config.amqp_addr, config.connect_timeout()),
            channel: None,
        }
    }

    async fn channel(&mut self) -> Result<Channel> {
        if let Some(channel) = &self.channel {
            if channel.status().connected() {
                return Ok(channel.clone());
            }
        }

        let channel = self.manager.create_channel().await?;
        declare_queue(&channel, &self.queue).await?;
        self.channel = Some(channel.clone());
        Ok(channel)
    }

    /// Polls the queue until terminated, handing each message to `handler`.
    /// Returns only when `max_jobs` is reached or reconnection attempts are
    /// exhausted.
    pub async fn run(&mut self, options: WorkerOptions, handler: &dyn JobHandler) -> Result<()> {
        let queue = self.queue.clone();
        let mut processed: u64 = 0;

        info!("Worker consuming from queue '{}'", queue);

        loop {
            let channel = self.channel().await?;

            match channel.basic_get(&queue, BasicGetOptions::default()).await {
                Ok(Some(message)) => {
                    process_delivery(&queue, message.delivery, &options, handler).await;

                    processed += 1;
                    if options.max_jobs != 0 && processed >= options.max_jobs {
                        info!("Processed {} jobs, stopping worker", processed);
                        return Ok(());
                    }
                }
                Ok(None) => sleep(options.sleep).await,
                Err(err) => {
                    let err = QueueError::Consume(err.to_string());
                    warn!("{}, reconnecting", err);
                    self.channel = None;
                    sleep(options.sleep).await;
                }
            }
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        self.channel = None;
        self.manager.close().await
    }
}

async fn process_delivery(
    queue: &str,
    delivery: Delivery,
    options: &WorkerOptions,
    handler: &dyn JobHandler,
) {
    let attempt = delivery_attempt(&delivery.properties, delivery.redelivered);
    let job_id = delivery
        .properties
        .message_id()
        .as_ref()
        .map(|id| id.as_str().to_string())
        .unwrap_or_else(|| delivery.delivery_tag.to_string());
    let ctx = JobContext {
        job_id,
        queue: queue.to_string(),
    };

    let message = match serde_json::from_slice::<RequestMessage>(&delivery.data) {
        Ok(message) => message,
        Err(err) => {
            let err = QueueError::Deserialization(err.to_string());
            error!("Dropping message {}: {}", ctx.job_id, err);
            if let Err(err) = delivery.reject(BasicRejectOptions { requeue: false }).await {
                error!("Failed to reject message {}: {}", ctx.job_id, err);
            }
            return;
        }
    };

    match timeout(options.timeout, handler.handle(message, &ctx)).await {
        Ok(Ok(())) => {
            if let Err(err) = delivery
                .ack(BasicAckOptions::default())
                .await
                .map_err(|e| QueueError::Ack(e.to_string()))
            {
                error!("Failed to acknowledge message {}: {}", ctx.job_id, err);
            }
        }
        Ok(Err(err)) => {
            error!(
                "Job {} failed on attempt {}/{}: {}",
                ctx.job_id, attempt, options.tries, err
            );
            retry_or_fail(&delivery, attempt, options.tries, &ctx.job_id).await;
        }
        Err(_) => {
            error!(
                "Job {} timed out after {:?} on attempt {}/{}",
                ctx.job_id, options.timeout, attempt, options.tries
            );
            retry_or_fail(&delivery, attempt, options.tries, &ctx.job_id).await;
        }
    }
}

async fn retry_or_fail(delivery: &Delivery, attempt: u64, tries: u64, job_id: &str) {
    if attempt < tries {
        if let Err(err) = delivery
            .nack(BasicNackOptions {
                requeue: true,
                ..BasicNackOptions::default()
            })
            .await
        {
            error!("Failed to requeue message {}: {}", job_id, err);
        }
    } else {
        warn!(
            "Job {} exhausted {} attempts, marking it failed",
            job_id, tries
        );
        if let Err(err) = delivery.reject(BasicRejectOptions { requeue: false }).await {
            error!("Failed to reject message {}: {}", job_id, err);
        }
    }
}

/// Attempt number for a delivery. Quorum queues report prior deliveries in
/// the `x-delivery-count` header; classic queues only expose the redelivered
/// flag, which cannot count past the second attempt.
fn delivery_attempt(properties: &BasicProperties, redelivered: bool) -> u64 {
    let delivery_count = properties.headers().as_ref().and_then(|headers| {
        headers
            .inner()
            .iter()
            .find(|(key, _)| key.as_str() == "x-delivery-count")
            .and_then(|(_, value)| match value {
                AMQPValue::ShortShortInt(n) => Some(*n as u64),
                AMQPValue::ShortInt(n) => Some(*n as u64),
                AMQPValue::LongInt(n) => Some(*n as u64),
                AMQPValue::LongLongInt(n) => Some(*n as u64),
                AMQPValue::LongUInt(n) => Some(*n as u64),
                _ => None,
            })
    });

    match delivery_count {
        Some(count) => count + 1,
        None if redelivered => 2,
        None => 1,
    }
}
