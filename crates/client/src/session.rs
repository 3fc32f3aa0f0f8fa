//! Session lifecycle state.
//!
//! `Disconnected → Connecting → Connected`, then either `Closed` (the
//! caller hung up) or back to `Disconnected` (the transport dropped).
//! No transition ever leaves `Closed`. The client never reconnects on
//! its own; see [`Client::reconnect`](crate::Client::reconnect).

use parking_lot::RwLock;

use crate::error::ClientError;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Shared session handle. The client and its dispatcher task both hold
/// an `Arc` of this; the dispatcher flips it to `Disconnected` when the
/// transport drops.
///
/// Each established connection gets a generation number. A dispatcher
/// retiring late (its connection already replaced) must not clobber
/// the state of the connection that superseded it, so the epilogue
/// goes through [`retire`](Self::retire) with its own generation.
#[derive(Debug)]
pub(crate) struct SessionHandle {
    inner: RwLock<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    generation: u64,
}

impl SessionHandle {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: SessionState::Disconnected,
                generation: 0,
            }),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.inner.read().state
    }

    /// Set the state. `Closed` is final: once set, no other state can
    /// overwrite it (the dispatcher racing a `close()` must not revive
    /// the session as `Disconnected`).
    pub(crate) fn set(&self, next: SessionState) {
        let mut inner = self.inner.write();
        if inner.state == SessionState::Closed {
            return;
        }
        inner.state = next;
    }

    /// Mint the generation for a freshly established connection. Any
    /// earlier generation is superseded from this point on.
    pub(crate) fn begin_connection(&self) -> u64 {
        let mut inner = self.inner.write();
        inner.generation += 1;
        inner.generation
    }

    /// A dispatcher's exit path: mark the session `Disconnected`, but
    /// only if `generation` is still the current connection and the
    /// caller has not closed the client.
    pub(crate) fn retire(&self, generation: u64) {
        let mut inner = self.inner.write();
        if inner.generation != generation || inner.state == SessionState::Closed {
            return;
        }
        inner.state = SessionState::Disconnected;
    }

    pub(crate) fn require_connected(&self) -> Result<(), ClientError> {
        let state = self.state();
        if state == SessionState::Connected {
            Ok(())
        } else {
            Err(ClientError::NotConnected(state))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let s = SessionHandle::new();
        assert_eq!(s.state(), SessionState::Disconnected);
        assert!(s.require_connected().is_err());
    }

    #[test]
    fn connect_path() {
        let s = SessionHandle::new();
        s.set(SessionState::Connecting);
        s.set(SessionState::Connected);
        assert!(s.require_connected().is_ok());
    }

    #[test]
    fn closed_is_final() {
        let s = SessionHandle::new();
        s.set(SessionState::Connected);
        s.set(SessionState::Closed);
        s.set(SessionState::Disconnected); // dispatcher racing close()
        assert_eq!(s.state(), SessionState::Closed);
    }

    #[test]
    fn transport_drop_returns_to_disconnected() {
        let s = SessionHandle::new();
        let generation = s.begin_connection();
        s.set(SessionState::Connected);
        s.retire(generation);
        let err = s.require_connected().unwrap_err();
        assert!(matches!(
            err,
            ClientError::NotConnected(SessionState::Disconnected)
        ));
    }

    #[test]
    fn superseded_connection_cannot_clobber_state() {
        let s = SessionHandle::new();
        let old = s.begin_connection();
        s.set(SessionState::Connected);

        // A replacement connection comes up before the old dispatcher
        // gets around to exiting.
        let new = s.begin_connection();
        s.set(SessionState::Connected);

        s.retire(old);
        assert_eq!(s.state(), SessionState::Connected);

        s.retire(new);
        assert_eq!(s.state(), SessionState::Disconnected);
    }

    #[test]
    fn retire_never_reopens_a_closed_session() {
        let s = SessionHandle::new();
        let generation = s.begin_connection();
        s.set(SessionState::Connected);
        s.set(SessionState::Closed);
        s.retire(generation);
        assert_eq!(s.state(), SessionState::Closed);
    }
}
