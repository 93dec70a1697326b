use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::message::RequestMessage;

/// Broker-side identity of the job being processed.
#[derive(Clone, Debug)]
pub struct JobContext {
    pub job_id: String,
    pub queue: String,
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, message: RequestMessage, ctx: &JobContext) -> Result<()>;
}

/// Handler for relayed request messages. Logs what was received; actual
/// processing (creating records, sending notifications, and so on) slots in
/// between the two log events.
pub struct ProcessRequest;

#[async_trait]
impl JobHandler for ProcessRequest {
    async fn handle(&self, message: RequestMessage, ctx: &JobContext) -> Result<()> {
        let data = serde_json::to_string(&message)?;
        info!(
            data = %data,
            source = %message.source,
            received_at = ?message.received_at,
            "Processing request from queue"
        );

        info!(
            job_id = %ctx.job_id,
            queue = %ctx.queue,
            "Request processed successfully"
        );

        Ok(())
    }
}
