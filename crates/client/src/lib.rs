//! Persistent-connection client for the TrueNAS middleware.
//!
//! One websocket session carries any number of concurrent method
//! calls, each correlated by id so replies route back to the right
//! caller. Methods that spawn server-side jobs are detected
//! automatically and can be tracked to completion with bounded
//! polling.
//!
//! ```no_run
//! use std::time::Duration;
//! use tn_client::{Client, ClientConfig, Params};
//!
//! # async fn run() -> Result<(), tn_client::ClientError> {
//! let config = ClientConfig::builder()
//!     .host("nas.example.net")
//!     .token(std::env::var("TRUENAS_TOKEN").unwrap_or_default())
//!     .build()?;
//!
//! let client = Client::connect(config).await?;
//!
//! let outcome = client
//!     .call_and_wait("pool.dataset.query", Params::none(), Duration::from_secs(60))
//!     .await?;
//! println!("{}", outcome.into_value()?);
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod jobs;
mod reconnect;
mod session;
mod transport;
mod upload;

pub use client::{CallReply, Client};
pub use config::{ClientBuilder, ClientConfig, ENV_HOST, ENV_TOKEN};
pub use error::ClientError;
pub use jobs::{CallOutcome, JobReport, PollInterval};
pub use reconnect::ReconnectPolicy;
pub use session::SessionState;
pub use transport::{Transport, TransportError, WsTransport};

// Wire-level types callers need when building params or inspecting
// job snapshots.
pub use tn_ddp::{JobId, JobProgress, JobSnapshot, JobState, Params, RpcError};
