//! The middleware's method-level error payload.
//!
//! A failed `result` frame carries an `error` object of the shape
//! `{error, errname, type, reason, trace, extra}`. `reason` is the
//! human-readable message; validation failures instead populate `extra`
//! with `[field, message, code]` triples. Either way callers want one
//! clean line, so [`RpcError::message`] does the extraction.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A method-level error reported by the middleware.
///
/// This is a recoverable, per-call outcome — the connection stays up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, thiserror::Error)]
#[error("{}", self.message())]
pub struct RpcError {
    /// Numeric errno-style code, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<i64>,
    /// Symbolic name, e.g. `"EINVAL"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errname: Option<String>,
    /// Human-readable reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Validation errors as `[field, message, code]` triples.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
    /// Server-side traceback. Kept for debug logging, never shown to
    /// end users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Value>,
}

impl RpcError {
    /// Interpret an arbitrary `error` payload. Non-object payloads
    /// (the protocol does not promise a shape) become the `reason`
    /// verbatim.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<RpcError>(value.clone()) {
            Ok(err) => err,
            Err(_) => RpcError {
                reason: Some(stringify_payload(&value)),
                ..Default::default()
            },
        }
    }

    /// The one-line, user-presentable message.
    pub fn message(&self) -> String {
        if let Some(reason) = self.reason.as_deref() {
            if !reason.is_empty() {
                return reason.trim_end().to_string();
            }
        }

        // Validation errors: take the first [field, message, ...] entry.
        if let Some(Value::Array(entries)) = &self.extra {
            if let Some(Value::Array(entry)) = entries.first() {
                if entry.len() >= 2 {
                    let field = stringify_payload(&entry[0]);
                    let msg = stringify_payload(&entry[1]);
                    return format!("{field}: {msg}");
                }
            }
        }

        if let Some(name) = &self.errname {
            return name.clone();
        }

        "unknown middleware error".into()
    }
}

fn stringify_payload(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reason_wins() {
        let err = RpcError::from_value(json!({
            "error": 22,
            "errname": "EINVAL",
            "reason": "[EINVAL] service.service: Service not found",
            "extra": [["service.service", "Service not found", 22]],
        }));
        assert_eq!(err.message(), "[EINVAL] service.service: Service not found");
    }

    #[test]
    fn extra_used_when_reason_missing() {
        let err = RpcError::from_value(json!({
            "extra": [["pool_name", "name already in use", 17]],
        }));
        assert_eq!(err.message(), "pool_name: name already in use");
    }

    #[test]
    fn errname_fallback() {
        let err = RpcError::from_value(json!({ "errname": "EPERM" }));
        assert_eq!(err.message(), "EPERM");
    }

    #[test]
    fn non_object_payload_becomes_reason() {
        let err = RpcError::from_value(json!("connection refused"));
        assert_eq!(err.message(), "connection refused");
    }

    #[test]
    fn empty_payload_has_generic_message() {
        let err = RpcError::from_value(json!({}));
        assert_eq!(err.message(), "unknown middleware error");
    }

    #[test]
    fn display_matches_message() {
        let err = RpcError::from_value(json!({ "reason": "denied" }));
        assert_eq!(format!("{err}"), "denied");
    }
}
