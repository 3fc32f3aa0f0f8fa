//! File uploads over the middleware's HTTP surface.
//!
//! Bulk payloads go around the websocket: a multipart POST carries a
//! `data` part (the JSON method envelope) and a `file` part (the raw
//! bytes), authorized with the same bearer token as the socket.

use serde_json::Value;

use tn_ddp::RpcError;

use crate::client::Client;
use crate::error::ClientError;

impl Client {
    /// Upload `content` through an HTTP endpoint such as
    /// `/_upload`. `data` is the method envelope the endpoint expects,
    /// e.g. `{"method": "filesystem.put", "params": [...]}`.
    ///
    /// Returns the endpoint's JSON response body; most upload
    /// endpoints answer with the spawned job's id.
    pub async fn upload(
        &self,
        endpoint: &str,
        data: Value,
        filename: &str,
        content: Vec<u8>,
    ) -> Result<Value, ClientError> {
        let url = format!("{}{}", self.config.http_base(), endpoint);
        let envelope = serde_json::to_string(&data)
            .map_err(|e| ClientError::Config(format!("upload envelope: {e}")))?;

        let form = reqwest::multipart::Form::new()
            .text("data", envelope)
            .part(
                "file",
                reqwest::multipart::Part::bytes(content).file_name(filename.to_string()),
            );

        tracing::debug!(endpoint, filename, "uploading file");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::Connection(format!("upload: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Connection(format!("upload response: {e}")))?;

        if !status.is_success() {
            let payload = serde_json::from_str(&body).unwrap_or(Value::String(body));
            return Err(ClientError::Remote(RpcError::from_value(payload)));
        }

        serde_json::from_str(&body)
            .map_err(|e| ClientError::Protocol(format!("upload response was not JSON: {e}")))
    }
}
