use std::sync::Arc;

use anyhow::Result;
use request_relay::env::Config;
use request_relay::http::{build_app, AppState};
use request_relay::rabbitmq::Publisher;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "request_relay=info,relay_api=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;

    let publisher = Publisher::connect(&config).await?;
    let app = build_app(AppState {
        enqueuer: Arc::new(publisher),
    });

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
