//! Error taxonomy for the middleware client.
//!
//! The split that matters to consumers: `Connection` and `Auth` doom
//! the whole client and should abort whatever is constructing it;
//! everything else is a per-call outcome the caller decides how to
//! report. A job that reaches `FAILED`/`ABORTED` is *not* an error
//! here — it comes back inside an `Ok(JobReport)`, because a terminal
//! failed state is a fully-informative result.

use std::time::Duration;

use tn_ddp::{JobId, JobState, RpcError};

use crate::session::SessionState;

/// Top-level client error.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Caller misconfiguration (empty host, zero timeout, …).
    #[error("config: {0}")]
    Config(String),

    /// The connection could not be established or the protocol
    /// handshake failed. Fatal.
    #[error("connection: {0}")]
    Connection(String),

    /// The middleware rejected the API key. Fatal.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// A call was issued while the session is not `Connected`.
    #[error("not connected (session is {0})")]
    NotConnected(SessionState),

    /// The connection dropped (or was closed) while the call was in
    /// flight; the call's fate on the server is unknown.
    #[error("transport closed")]
    TransportClosed,

    /// The middleware answered the call with an error payload.
    /// Recoverable — the connection stays up.
    #[error("middleware: {0}")]
    Remote(RpcError),

    /// A call or job wait exceeded its budget. For job waits the job
    /// may well still be running server-side.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// A tracked job ended in `FAILED` or `ABORTED` and the caller
    /// asked for its payload. Produced only by
    /// [`JobReport::into_result`](crate::JobReport::into_result) — the
    /// wait itself reports failed jobs as `Ok`.
    #[error("job {id} ended {state}: {message}")]
    JobFailed {
        id: JobId,
        state: JobState,
        message: String,
    },

    /// The caller's cancellation token fired while waiting.
    #[error("cancelled")]
    Cancelled,

    /// The middleware sent something the client cannot make sense of.
    #[error("protocol: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Whether this error dooms the client as a whole rather than the
    /// single call that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Auth(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_split() {
        assert!(ClientError::Connection("refused".into()).is_fatal());
        assert!(ClientError::Auth("bad key".into()).is_fatal());
        assert!(!ClientError::TransportClosed.is_fatal());
        assert!(!ClientError::Timeout(Duration::from_secs(30)).is_fatal());
        assert!(!ClientError::Cancelled.is_fatal());
        assert!(!ClientError::Remote(RpcError::default()).is_fatal());
    }

    #[test]
    fn not_connected_names_the_state() {
        let err = ClientError::NotConnected(SessionState::Closed);
        assert_eq!(err.to_string(), "not connected (session is closed)");
    }
}
