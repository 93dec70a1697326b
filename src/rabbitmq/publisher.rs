use async_trait::async_trait;
use chrono::Utc;
use lapin::options::BasicPublishOptions;
use lapin::{BasicProperties, Channel};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::env::Config;
use crate::message::RequestMessage;

use super::connection::{declare_queue, ConnectionManager};
use super::errors::{QueueError, Result};

/// Enqueue seam between the HTTP layer and the broker.
#[async_trait]
pub trait Enqueue: Send + Sync {
    async fn enqueue(&self, message: &RequestMessage) -> Result<()>;
}

/// Publishes request messages to the relay queue. The channel sits behind a
/// mutex because HTTP handlers publish concurrently.
pub struct Publisher {
    queue: String,
    state: Mutex<PublisherState>,
}

struct PublisherState {
    manager: ConnectionManager,
    channel: Option<Channel>,
}

impl PublisherState {
    async fn channel(&mut self, queue: &str) -> Result<Channel> {
        if let Some(channel) = &self.channel {
            if channel.status().connected() {
                return Ok(channel.clone());
            }
        }

        let channel = self.manager.create_channel().await?;
        declare_queue(&channel, queue).await?;
        self.channel = Some(channel.clone());
        Ok(channel)
    }
}

impl Publisher {
    pub fn new(config: &Config) -> Self {
        Publisher {
            queue: config.request_queue.clone(),
            state: Mutex::new(PublisherState {
                manager: ConnectionManager::new(&config.amqp_addr, config.connect_timeout()),
                channel: None,
            }),
        }
    }

    /// Connects eagerly and declares the queue, so startup fails fast when
    /// the broker is unreachable.
    pub async fn connect(config: &Config) -> Result<Self> {
        let publisher = Publisher::new(config);
        {
            let mut state = publisher.state.lock().await;
            state.channel(&publisher.queue).await?;
        }
        Ok(publisher)
    }

    pub async fn publish(&self, message: &RequestMessage) -> Result<()> {
        let payload = serde_json::to_vec(message)?;

        let channel = {
            let mut state = self.state.lock().await;
            state.channel(&self.queue).await?
        };

        let properties = BasicProperties::default()
            .with_message_id(Uuid::new_v4().to_string().into())
            .with_content_type("application/json".into())
            .with_delivery_mode(2)
            .with_timestamp(Utc::now().timestamp() as u64);

        channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|e| QueueError::Publish(e.to_string()))?;

        info!("Published message to queue '{}'", self.queue);

        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.channel = None;
        state.manager.close().await
    }
}

#[async_trait]
impl Enqueue for Publisher {
    async fn enqueue(&self, message: &RequestMessage) -> Result<()> {
        self.publish(message).await
    }
}
