//! The middleware client: connection lifecycle, authentication, and
//! the correlated call dispatcher.
//!
//! One spawned dispatcher task owns the transport and the map of
//! pending calls. Callers hand it frames over an mpsc channel (which
//! serializes all writes to the shared connection) and get their reply
//! on a oneshot; the task routes each inbound `result` frame to the
//! one caller whose correlation id matches. No caller can ever observe
//! another caller's response.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use tn_ddp::{ClientMessage, JobId, Params, RpcError, ServerMessage};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::session::{SessionHandle, SessionState};
use crate::transport::{Transport, TransportError, WsTransport};

const CMD_CHANNEL_CAPACITY: usize = 64;

/// What a call came back with, classified exactly once at the
/// dispatcher boundary.
///
/// The middleware signals a long-running operation by answering with a
/// bare integer job id instead of a structured value. Consumers used
/// to sniff this themselves; here the sniff happens in one place and
/// the two cases are spelled out.
#[derive(Debug, Clone, PartialEq)]
pub enum CallReply {
    /// The method completed and this is its result.
    Immediate(Value),
    /// The method spawned a job; track it with
    /// [`Client::wait_for_job`].
    Job(JobId),
}

impl CallReply {
    /// Collapse back to the raw wire value.
    pub fn into_value(self) -> Value {
        match self {
            Self::Immediate(value) => value,
            Self::Job(id) => Value::from(id.0),
        }
    }
}

fn classify(value: Value) -> CallReply {
    if let Value::Number(n) = &value {
        if let Some(id) = n.as_i64() {
            return CallReply::Job(JobId(id));
        }
        // Some middleware builds report job ids as whole floats.
        if let Some(f) = n.as_f64() {
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                return CallReply::Job(JobId(f as i64));
            }
        }
    }
    CallReply::Immediate(value)
}

pub(crate) enum Command {
    Call {
        id: String,
        frame: ClientMessage,
        reply: oneshot::Sender<Result<Value, ClientError>>,
    },
    /// Drop the pending slot for a call whose caller gave up waiting.
    Forget { id: String },
    /// Tear the connection down and resolve everything in flight.
    Shutdown,
}

/// Persistent-connection client for the TrueNAS middleware.
///
/// Cheap to share behind an `Arc`; every method takes `&self` and any
/// number of tasks may call concurrently.
#[derive(Debug)]
pub struct Client {
    pub(crate) config: ClientConfig,
    session: Arc<SessionHandle>,
    cmd_tx: Mutex<mpsc::Sender<Command>>,
    next_id: AtomicU64,
    // Serializes reconnect attempts; two tasks racing `reconnect()`
    // must not both dial and then fight over the session.
    reconnect_gate: tokio::sync::Mutex<()>,
    pub(crate) http: reqwest::Client,
}

impl Client {
    /// Dial the middleware, run the protocol handshake, and
    /// authenticate with the configured API key.
    ///
    /// A network or handshake failure is [`ClientError::Connection`];
    /// a rejected key is [`ClientError::Auth`]. Both are fatal
    /// ([`ClientError::is_fatal`]) — there is no client to use.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let session = Arc::new(SessionHandle::new());
        let cmd_tx = establish(&config, &session).await?;
        let client = Self::assemble(config, session, cmd_tx)?;

        if let Err(e) = client.authenticate().await {
            client.close().await;
            return Err(e);
        }

        tracing::info!(host = %client.config.host, "connected and authenticated");
        Ok(client)
    }

    /// Build a client on top of an already-established transport,
    /// skipping the handshake and authentication. The caller owns
    /// those semantics — this is the seam for custom transports and
    /// for tests.
    pub fn with_transport(
        transport: Box<dyn Transport>,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let session = Arc::new(SessionHandle::new());
        let generation = session.begin_connection();
        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_CHANNEL_CAPACITY);
        tokio::spawn(dispatch_loop(
            transport,
            cmd_rx,
            Arc::clone(&session),
            generation,
        ));
        session.set(SessionState::Connected);
        Self::assemble(config, session, cmd_tx)
    }

    fn assemble(
        config: ClientConfig,
        session: Arc<SessionHandle>,
        cmd_tx: mpsc::Sender<Command>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.call_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("http client: {e}")))?;
        Ok(Self {
            config,
            session,
            cmd_tx: Mutex::new(cmd_tx),
            next_id: AtomicU64::new(1),
            reconnect_gate: tokio::sync::Mutex::new(()),
            http,
        })
    }

    /// Current lifecycle state of the session.
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Issue one correlated call under the configured per-call
    /// deadline.
    pub async fn call(&self, method: &str, params: Params) -> Result<CallReply, ClientError> {
        self.call_with_deadline(method, params, self.config.call_timeout)
            .await
    }

    /// Issue one correlated call under an explicit deadline.
    pub async fn call_with_deadline(
        &self,
        method: &str,
        params: Params,
        deadline: Duration,
    ) -> Result<CallReply, ClientError> {
        Ok(classify(self.call_raw(method, params, deadline).await?))
    }

    /// The unclassified request/response exchange.
    pub(crate) async fn call_raw(
        &self,
        method: &str,
        params: Params,
        deadline: Duration,
    ) -> Result<Value, ClientError> {
        self.call_raw_cancellable(method, params, deadline, &CancellationToken::new())
            .await
    }

    /// `call_raw` that also gives up, with [`ClientError::Cancelled`],
    /// when `cancel` fires. Both the timeout and the cancel path tell
    /// the dispatcher to drop the pending slot instead of leaving it
    /// for a reply nobody is waiting on.
    pub(crate) async fn call_raw_cancellable(
        &self,
        method: &str,
        params: Params,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<Value, ClientError> {
        if method.is_empty() {
            return Err(ClientError::Config("method must not be empty".into()));
        }
        self.session.require_connected()?;

        let id = format!("req{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let frame = ClientMessage::method(method, params.into_wire(), id.clone());
        let (tx, rx) = oneshot::channel();

        let cmd_tx = self.cmd_tx.lock().clone();
        cmd_tx
            .send(Command::Call {
                id: id.clone(),
                frame,
                reply: tx,
            })
            .await
            .map_err(|_| ClientError::TransportClosed)?;

        tracing::debug!(method, id = %id, "call dispatched");

        tokio::select! {
            res = tokio::time::timeout(deadline, rx) => match res {
                Ok(Ok(outcome)) => outcome,
                // Dispatcher went away with the slot unresolved.
                Ok(Err(_)) => Err(ClientError::TransportClosed),
                Err(_) => {
                    let _ = cmd_tx.send(Command::Forget { id }).await;
                    Err(ClientError::Timeout(deadline))
                }
            },
            () = cancel.cancelled() => {
                let _ = cmd_tx.send(Command::Forget { id }).await;
                Err(ClientError::Cancelled)
            }
        }
    }

    async fn authenticate(&self) -> Result<(), ClientError> {
        let params = Params::positional([Value::String(self.config.token.clone())]);
        let reply = self
            .call_with_deadline("auth.login_with_api_key", params, self.config.connect_timeout)
            .await;
        match reply {
            Ok(CallReply::Immediate(Value::Bool(true))) => Ok(()),
            Ok(_) => Err(ClientError::Auth("middleware rejected the API key".into())),
            Err(ClientError::Remote(e)) => Err(ClientError::Auth(e.message())),
            Err(ClientError::Timeout(_)) => Err(ClientError::Auth("authentication timed out".into())),
            Err(other) => Err(other),
        }
    }

    /// Re-dial and re-authenticate after a transport drop, retrying
    /// per the configured [`ReconnectPolicy`](crate::ReconnectPolicy).
    ///
    /// A no-op when already connected. Returns `NotConnected(Closed)`
    /// after [`close`](Self::close) — a closed client stays closed.
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        // One reconnect at a time. A task that queued behind a
        // successful attempt sees `Connected` on the re-check and
        // returns without dialing a second connection.
        let _gate = self.reconnect_gate.lock().await;
        match self.session.state() {
            SessionState::Connected => return Ok(()),
            SessionState::Closed => {
                return Err(ClientError::NotConnected(SessionState::Closed));
            }
            SessionState::Disconnected | SessionState::Connecting => {}
        }

        let policy = self.config.reconnect.clone();
        let mut attempt: u32 = 0;
        loop {
            let delay = policy.delay_before_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let err = match establish(&self.config, &self.session).await {
                Ok(cmd_tx) => {
                    *self.cmd_tx.lock() = cmd_tx;
                    match self.authenticate().await {
                        Ok(()) => {
                            tracing::info!(host = %self.config.host, attempt, "reconnected");
                            return Ok(());
                        }
                        Err(e) => {
                            self.hang_up().await;
                            // A rejected key will not improve by retrying.
                            if matches!(e, ClientError::Auth(_)) {
                                return Err(e);
                            }
                            e
                        }
                    }
                }
                Err(e) => e,
            };

            attempt += 1;
            if policy.exhausted(attempt) {
                return Err(err);
            }
            tracing::warn!(attempt, error = %err, "reconnect attempt failed");
        }
    }

    /// Close the session. Idempotent; every in-flight call resolves
    /// with [`ClientError::TransportClosed`], and the client can never
    /// be used again.
    pub async fn close(&self) {
        self.session.set(SessionState::Closed);
        self.hang_up().await;
    }

    async fn hang_up(&self) {
        let cmd_tx = self.cmd_tx.lock().clone();
        let _ = cmd_tx.send(Command::Shutdown).await;
    }
}

/// Dial, handshake, and spawn the dispatcher. On success the session
/// is `Connected` and the returned sender feeds the new dispatcher.
async fn establish(
    config: &ClientConfig,
    session: &Arc<SessionHandle>,
) -> Result<mpsc::Sender<Command>, ClientError> {
    session.set(SessionState::Connecting);

    let handshake = tokio::time::timeout(config.connect_timeout, async {
        let mut transport = WsTransport::connect(&config.endpoint(), &config.token)
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        transport
            .send(ClientMessage::connect())
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        loop {
            match transport.recv().await {
                Some(Ok(ServerMessage::Connected { session: sid })) => {
                    tracing::debug!(session = %sid, "middleware session established");
                    return Ok(transport);
                }
                Some(Ok(ServerMessage::Failed { version })) => {
                    return Err(ClientError::Connection(format!(
                        "protocol handshake rejected (server supports version {version})"
                    )));
                }
                Some(Ok(_)) => continue,
                Some(Err(TransportError::Frame(e))) => {
                    tracing::debug!(error = %e, "skipping unparseable frame during handshake");
                    continue;
                }
                Some(Err(e)) => return Err(ClientError::Connection(e.to_string())),
                None => {
                    return Err(ClientError::Connection(
                        "connection closed during handshake".into(),
                    ));
                }
            }
        }
    })
    .await;

    let transport = match handshake {
        Ok(Ok(t)) => t,
        Ok(Err(e)) => {
            session.set(SessionState::Disconnected);
            return Err(e);
        }
        Err(_) => {
            session.set(SessionState::Disconnected);
            return Err(ClientError::Connection(format!(
                "handshake timed out after {:?}",
                config.connect_timeout
            )));
        }
    };

    let generation = session.begin_connection();
    let (cmd_tx, cmd_rx) = mpsc::channel(CMD_CHANNEL_CAPACITY);
    tokio::spawn(dispatch_loop(
        Box::new(transport),
        cmd_rx,
        Arc::clone(session),
        generation,
    ));
    session.set(SessionState::Connected);
    Ok(cmd_tx)
}

/// The dispatcher: single owner of the transport and the pending-call
/// map. Runs until the peer hangs up, a write fails, all client
/// handles are gone, or a `Shutdown` arrives.
pub(crate) async fn dispatch_loop(
    mut transport: Box<dyn Transport>,
    mut cmd_rx: mpsc::Receiver<Command>,
    session: Arc<SessionHandle>,
    generation: u64,
) {
    let mut pending: HashMap<String, oneshot::Sender<Result<Value, ClientError>>> = HashMap::new();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Call { id, frame, reply }) => {
                        pending.insert(id.clone(), reply);
                        if let Err(e) = transport.send(frame).await {
                            tracing::warn!(error = %e, "write failed, dropping connection");
                            if let Some(tx) = pending.remove(&id) {
                                let _ = tx.send(Err(ClientError::TransportClosed));
                            }
                            break;
                        }
                    }
                    Some(Command::Forget { id }) => {
                        pending.remove(&id);
                    }
                    Some(Command::Shutdown) | None => break,
                }
            }
            inbound = transport.recv() => {
                match inbound {
                    Some(Ok(ServerMessage::Result { id, result, error })) => {
                        let Some(tx) = pending.remove(&id) else {
                            tracing::debug!(id = %id, "response with no pending call (late reply?)");
                            continue;
                        };
                        let outcome = match error {
                            Some(payload) => {
                                let rpc = RpcError::from_value(payload);
                                tracing::debug!(id = %id, error = ?rpc, "middleware reported error");
                                Err(ClientError::Remote(rpc))
                            }
                            None => Ok(result.unwrap_or(Value::Null)),
                        };
                        let _ = tx.send(outcome);
                    }
                    Some(Ok(ServerMessage::Ping { id })) => {
                        if transport.send(ClientMessage::Pong { id }).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(ServerMessage::Pong { .. })) => {}
                    Some(Ok(event)) => {
                        // Collection events — the polling tracker has no use for them.
                        tracing::trace!(?event, "ignoring unsolicited frame");
                    }
                    Some(Err(TransportError::Frame(e))) => {
                        tracing::debug!(error = %e, "skipping unparseable frame");
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "transport error, dropping connection");
                        break;
                    }
                    None => {
                        tracing::info!("middleware closed the connection");
                        break;
                    }
                }
            }
        }
    }

    transport.close().await;
    session.retire(generation);
    for (_, tx) in pending.drain() {
        let _ = tx.send(Err(ClientError::TransportClosed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integers_are_job_ids() {
        assert_eq!(classify(json!(42)), CallReply::Job(JobId(42)));
        assert_eq!(classify(json!(42.0)), CallReply::Job(JobId(42)));
    }

    #[test]
    fn everything_else_is_immediate() {
        assert_eq!(classify(json!(true)), CallReply::Immediate(json!(true)));
        assert_eq!(classify(json!("42")), CallReply::Immediate(json!("42")));
        assert_eq!(classify(json!([1, 2])), CallReply::Immediate(json!([1, 2])));
        assert_eq!(
            classify(json!({"id": 42})),
            CallReply::Immediate(json!({"id": 42}))
        );
        assert_eq!(classify(json!(1.5)), CallReply::Immediate(json!(1.5)));
        assert_eq!(classify(Value::Null), CallReply::Immediate(Value::Null));
    }

    #[test]
    fn reply_collapses_to_wire_value() {
        assert_eq!(CallReply::Job(JobId(7)).into_value(), json!(7));
        assert_eq!(
            CallReply::Immediate(json!({"ok": true})).into_value(),
            json!({"ok": true})
        );
    }
}
