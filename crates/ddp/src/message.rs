//! Frame envelopes for the middleware's DDP-flavored protocol.
//!
//! Each frame is one JSON object tagged by `msg`. Frames the client
//! sends and frames the server sends are disjoint enough to warrant two
//! enums; `ping`/`pong` appear in both because heartbeats are
//! bidirectional.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version announced in the `connect` handshake.
pub const PROTOCOL_VERSION: &str = "1";

/// Frames the client writes to the middleware.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Session handshake. Must be the first frame on a fresh connection.
    Connect {
        version: String,
        support: Vec<String>,
    },

    /// A correlated method call. `params` is always a JSON array on the
    /// wire — see [`Params`](crate::Params) for the two caller forms.
    Method {
        method: String,
        params: Value,
        id: String,
    },

    /// Heartbeat.
    Ping {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Heartbeat response, echoing the server's ping id.
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
}

impl ClientMessage {
    /// Build the handshake frame for the current protocol version.
    pub fn connect() -> Self {
        Self::Connect {
            version: PROTOCOL_VERSION.into(),
            support: vec![PROTOCOL_VERSION.into()],
        }
    }

    /// Build a correlated method frame.
    pub fn method(method: impl Into<String>, params: Value, id: impl Into<String>) -> Self {
        Self::Method {
            method: method.into(),
            params,
            id: id.into(),
        }
    }
}

/// Frames the middleware writes to the client.
///
/// Collection events (`added`/`changed`/`removed`/`ready`/`nosub`) are
/// part of the protocol's subscription surface; the client parses them
/// so a push-based tracker can be layered on later, but the polling
/// job tracker ignores them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake accepted.
    Connected { session: String },

    /// Handshake rejected; `version` is the highest version the server
    /// would have accepted.
    Failed { version: String },

    /// Correlated reply to a `method` frame. Exactly one of `result`
    /// and `error` is meaningful.
    Result {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<Value>,
    },

    /// Heartbeat from the server; must be answered with `pong`.
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Reply to a client `ping`.
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    Added {
        collection: String,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Value>,
    },

    Changed {
        collection: String,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Value>,
    },

    Removed { collection: String, id: String },

    Ready { subs: Vec<String> },

    Nosub {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<Value>,
    },

    /// Methods whose writes have been flushed; carries no data we act on.
    Updated { methods: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_frame_shape() {
        let json = serde_json::to_string(&ClientMessage::connect()).unwrap();
        assert!(json.contains("\"msg\":\"connect\""));
        assert!(json.contains("\"version\":\"1\""));
        assert!(json.contains("\"support\":[\"1\"]"));
    }

    #[test]
    fn method_frame_shape() {
        let msg = ClientMessage::method("service.started", serde_json::json!(["ssh"]), "req1");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"msg\":\"method\""));
        assert!(json.contains("\"method\":\"service.started\""));
        assert!(json.contains("\"params\":[\"ssh\"]"));
        assert!(json.contains("\"id\":\"req1\""));
    }

    #[test]
    fn pong_without_id_omits_field() {
        let json = serde_json::to_string(&ClientMessage::Pong { id: None }).unwrap();
        assert_eq!(json, r#"{"msg":"pong"}"#);
    }

    #[test]
    fn parse_connected() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"msg":"connected","session":"abc123"}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Connected {
                session: "abc123".into()
            }
        );
    }

    #[test]
    fn parse_result_with_value() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"msg":"result","id":"req7","result":true}"#).unwrap();
        let ServerMessage::Result { id, result, error } = msg else {
            panic!("expected result frame");
        };
        assert_eq!(id, "req7");
        assert_eq!(result, Some(serde_json::json!(true)));
        assert!(error.is_none());
    }

    #[test]
    fn parse_result_with_error() {
        let raw = r#"{"msg":"result","id":"req8","error":{"error":22,"reason":"[EINVAL] ssh"}}"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        let ServerMessage::Result { error, .. } = msg else {
            panic!("expected result frame");
        };
        assert!(error.is_some());
    }

    #[test]
    fn parse_changed_event() {
        let raw = r#"{"msg":"changed","collection":"core.get_jobs","id":"42","fields":{"state":"RUNNING"}}"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        let ServerMessage::Changed { collection, id, fields } = msg else {
            panic!("expected changed frame");
        };
        assert_eq!(collection, "core.get_jobs");
        assert_eq!(id, "42");
        assert_eq!(fields.unwrap()["state"], "RUNNING");
    }

    #[test]
    fn unknown_msg_tag_is_a_parse_error() {
        let parsed: Result<ServerMessage, _> =
            serde_json::from_str(r#"{"msg":"server_id","id":"x"}"#);
        assert!(parsed.is_err());
    }
}
