//! Command-line caller for the TrueNAS middleware.
//!
//! Connects, authenticates, runs one method, and tracks any job the
//! method spawns to completion before printing the result as JSON.
//!
//! Usage:
//!   TRUENAS_HOST=nas.example.net TRUENAS_TOKEN=1-abcd... \
//!     tn-call system.info
//!   tn-call service.started '["ssh"]'
//!   tn-call pool.dataset.query
//!
//! Env vars:
//!   TRUENAS_HOST   — middleware host, or a full ws(s):// endpoint
//!   TRUENAS_TOKEN  — API key for auth.login_with_api_key

use std::time::Duration;

use tracing_subscriber::EnvFilter;

use tn_client::{Client, ClientConfig, Params};

const JOB_BUDGET: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let method = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: tn-call <method> [params-json-array]"))?;
    let params = match args.next() {
        Some(raw) => {
            let values: Vec<serde_json::Value> = serde_json::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("params must be a JSON array: {e}"))?;
            Params::positional(values)
        }
        None => Params::none(),
    };

    let config = ClientConfig::from_env()?;
    tracing::info!(host = %config.host, method = %method, "connecting to middleware");

    let client = Client::connect(config).await?;

    let outcome = client.call_and_wait(&method, params, JOB_BUDGET).await;
    client.close().await;

    let value = outcome?.into_value()?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
