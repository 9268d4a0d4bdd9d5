//! Native credential host. The extension-side bridge launches this once per
//! lookup; it answers a single `getApiKey` request on stdio and exits.

use promptbridge::config;
use promptbridge::native::host;

const API_KEY_VAR: &str = "PROMPTBRIDGE_HOST_API_KEY";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    config::load_dotenv();

    let api_key = std::env::var(API_KEY_VAR).ok();
    if api_key.as_deref().is_none_or(str::is_empty) {
        tracing::warn!("{API_KEY_VAR} not set, answering as not configured");
    }

    let served = host::serve_once(tokio::io::stdin(), tokio::io::stdout(), api_key.as_deref())
        .await
        .inspect_err(|e| tracing::error!("native host error: {e:?}"))?;
    if !served {
        tracing::warn!("stdin closed before any request");
    }
    Ok(())
}
