//! Remote archive backends for exported artifacts.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tracing::info;
use url::Url;

use crate::application::export::{RemoteError, RemoteStore};

/// Dropbox content upload client. One request per artifact, no retry, no
/// read-back verification; a 2xx acknowledgment is taken as ground truth.
pub struct DropboxRemote {
    client: reqwest::Client,
    endpoint: Url,
    access_token: String,
}

impl DropboxRemote {
    pub fn new(endpoint: Url, access_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            access_token,
        }
    }
}

#[async_trait]
impl RemoteStore for DropboxRemote {
    async fn upload(&self, remote_path: &str, payload: Bytes) -> Result<(), RemoteError> {
        let url = self
            .endpoint
            .join("2/files/upload")
            .map_err(|err| RemoteError::transport(format!("invalid upload url: {err}")))?;

        let arg = serde_json::json!({
            "path": remote_path,
            "mode": "add",
            "autorename": false,
            "mute": false,
        })
        .to_string();

        let size_bytes = payload.len();
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .header("Dropbox-API-Arg", arg)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(payload)
            .send()
            .await
            .map_err(|err| RemoteError::transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RemoteError::rejected(status.as_u16(), detail));
        }

        info!(
            target = "ratevault::remote",
            remote_path = %remote_path,
            size_bytes,
            "uploaded artifact to remote storage"
        );
        Ok(())
    }
}

/// Stand-in used when no remote credentials are configured. Every upload
/// reports a sync failure, which the pipeline records without escalating.
pub struct DisabledRemote;

#[async_trait]
impl RemoteStore for DisabledRemote {
    async fn upload(&self, _remote_path: &str, _payload: Bytes) -> Result<(), RemoteError> {
        Err(RemoteError::Disabled)
    }
}
