use std::sync::Arc;

use promptbridge::config::{self, Config};
use promptbridge::mediator::Mediator;
use promptbridge::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the framed protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    config::load_dotenv();

    tracing::info!("promptbridge starting");

    let config = Config::from_env();
    let mediator = Arc::new(Mediator::from_config(&config)?);

    server::serve(
        mediator,
        &config.origins,
        tokio::io::stdin(),
        tokio::io::stdout(),
    )
    .await
    .inspect_err(|e| tracing::error!("serving error: {e:?}"))?;

    tracing::info!("promptbridge shutting down");
    Ok(())
}
