use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use request_relay::env::Config;
use request_relay::handler::ProcessRequest;
use request_relay::rabbitmq::{Worker, WorkerOptions};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Consume request messages from the relay queue.
#[derive(Debug, Parser)]
#[command(name = "relay-worker", version)]
struct Cli {
    /// Number of times to attempt a job before marking it failed
    #[arg(long, default_value_t = 3)]
    tries: u64,

    /// Number of seconds a job may run before it is timed out
    #[arg(long, default_value_t = 300)]
    timeout: u64,

    /// Number of seconds to sleep when no job is available
    #[arg(long, default_value_t = 3)]
    sleep: u64,

    /// Number of jobs to process before exiting (0 = process indefinitely)
    #[arg(long, default_value_t = 0)]
    max_jobs: u64,
}

impl Cli {
    fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            tries: self.tries,
            timeout: Duration::from_secs(self.timeout),
            sleep: Duration::from_secs(self.sleep),
            max_jobs: self.max_jobs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "request_relay=debug,relay_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;

    info!("Starting queue consumer...");
    info!("Queue: {}", config.request_queue);
    info!("Broker: {}", config.amqp_addr);

    let mut worker = Worker::new(&config);

    tokio::select! {
        result = worker.run(cli.worker_options(), &ProcessRequest) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, stopping worker");
        }
    }

    worker.close().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_defaults_match_worker_defaults() {
        let cli = Cli::parse_from(["relay-worker"]);
        assert_eq!(cli.worker_options(), WorkerOptions::default());
    }

    #[test]
    fn test_cli_flags_override_defaults() {
        let cli = Cli::parse_from([
            "relay-worker",
            "--tries",
            "5",
            "--timeout",
            "60",
            "--sleep",
            "1",
            "--max-jobs",
            "10",
        ]);

        let options = cli.worker_options();
        assert_eq!(options.tries, 5);
        assert_eq!(options.timeout, Duration::from_secs(60));
        assert_eq!(options.sleep, Duration::from_secs(1));
        assert_eq!(options.max_jobs, 10);
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }
}
