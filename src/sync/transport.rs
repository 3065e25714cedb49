//! Upload transport.
//!
//! The orchestrator talks to the upload service only through
//! [`UploadTransport`], so runs can be driven against an in-memory fake.
//! [`HttpTransport`] is the production implementation.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::types::{UploadBatch, UploadResponse};
use crate::error::{Error, Result};

/// Sends upload batches to the analytics service.
pub trait UploadTransport: Send + Sync {
    /// Fail with `Error::Auth` if no usable credential is available.
    fn ensure_authenticated(&self) -> impl Future<Output = Result<()>> + Send;

    /// Upload one batch.
    ///
    /// Connection failures map to `Error::Network`, 5xx to `Error::Server`,
    /// 401/403 to `Error::Auth` and other 4xx to `Error::Client`.
    fn upload_batch(&self, batch: &UploadBatch) -> impl Future<Output = Result<UploadResponse>> + Send;
}

/// Request timeout for one batch.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Bearer-token HTTP transport.
pub struct HttpTransport {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(api_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            token,
        }
    }

    fn sessions_url(&self) -> String {
        format!("{}/api/sessions", self.api_url.trim_end_matches('/'))
    }
}

/// Map a non-success HTTP status to an error.
#[must_use]
pub fn status_error(status: u16, body: &str) -> Error {
    let message = if body.trim().is_empty() {
        "no response body".to_string()
    } else {
        body.chars().take(200).collect()
    };
    match status {
        401 | 403 => Error::Auth(format!("upload service rejected the token ({status})")),
        500..=599 => Error::Server { status, message },
        _ => Error::Client { status, message },
    }
}

impl UploadTransport for HttpTransport {
    async fn ensure_authenticated(&self) -> Result<()> {
        match &self.token {
            Some(token) if !token.trim().is_empty() => Ok(()),
            _ => Err(Error::Auth("no API token configured".into())),
        }
    }

    async fn upload_batch(&self, batch: &UploadBatch) -> Result<UploadResponse> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| Error::Auth("no API token configured".into()))?;
        let url = self.sessions_url();

        debug!(
            %url,
            batch = batch.batch_number,
            total = batch.total_batches,
            sessions = batch.sessions.len(),
            "Uploading batch"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .timeout(UPLOAD_TIMEOUT)
            .json(batch)
            .send()
            .await
            .map_err(|e| Error::Network(format!("upload request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Other(format!("Unexpected response from upload service: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(status_error(401, ""), Error::Auth(_)));
        assert!(matches!(status_error(403, ""), Error::Auth(_)));
        assert!(matches!(status_error(400, "bad"), Error::Client { status: 400, .. }));
        assert!(matches!(status_error(429, ""), Error::Client { status: 429, .. }));
        assert!(matches!(status_error(502, ""), Error::Server { status: 502, .. }));
        assert!(status_error(503, "").is_transient());
        assert!(!status_error(422, "").is_transient());
    }

    #[test]
    fn test_sessions_url() {
        let t = HttpTransport::new("https://api.example.com/", None);
        assert_eq!(t.sessions_url(), "https://api.example.com/api/sessions");
    }

    #[tokio::test]
    async fn test_missing_token_is_auth_error() {
        let t = HttpTransport::new("https://api.example.com", None);
        let err = t.ensure_authenticated().await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));

        let t = HttpTransport::new("https://api.example.com", Some("tok".into()));
        assert!(t.ensure_authenticated().await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let t = HttpTransport::new("http://127.0.0.1:9", Some("tok".into()));
        let batch = UploadBatch {
            sessions: Vec::new(),
            checksum: String::new(),
            batch_number: 1,
            total_batches: 1,
            total_sessions: 0,
        };
        let err = t.upload_batch(&batch).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert!(err.is_transient());
    }
}
