//! HTTP-backed capabilities.
//!
//! - [`HttpUploader`] posts each record as JSON and reads back `{ "id": ... }`
//! - [`HttpBroadcaster`] posts `{ "ids": [...] }` to a signing relay and
//!   reads back `{ "txHash": ... }`
//!
//! The relay reports a refused signature either with HTTP 403 or with a
//! body of `{ "error": "declined" }`.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use super::{Broadcaster, TxResult, Uploader};
use crate::config::ServiceConfig;
use crate::error::{SubmitError, SubmitResult};
use crate::models::TransformedRecord;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RelayError {
    error: String,
}

/// Uploads records to a storage service.
#[derive(Clone)]
pub struct HttpUploader {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpUploader {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` with each upload.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Build from `FIELDLOAD_UPLOAD_URL` / `FIELDLOAD_UPLOAD_TOKEN`.
    pub fn from_config(config: &ServiceConfig) -> Option<Self> {
        let uploader = Self::new(config.upload_url.clone()?);
        Some(match &config.upload_token {
            Some(token) => uploader.with_token(token.clone()),
            None => uploader,
        })
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload_one(&self, record: &TransformedRecord) -> SubmitResult<String> {
        let mut request = self.client.post(&self.url).json(&record.to_json());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        parse_upload_response(status, &body)
    }
}

/// Submits chunks of external ids to a signing relay.
#[derive(Clone)]
pub struct HttpBroadcaster {
    client: reqwest::Client,
    url: String,
}

impl HttpBroadcaster {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Option<Self> {
        config.broadcast_url.clone().map(Self::new)
    }
}

#[async_trait]
impl Broadcaster for HttpBroadcaster {
    async fn broadcast_chunk(&self, external_ids: &[String]) -> SubmitResult<TxResult> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "ids": external_ids }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        parse_broadcast_response(status, &body)
    }
}

fn parse_upload_response(status: StatusCode, body: &str) -> SubmitResult<String> {
    if !status.is_success() {
        return Err(SubmitError::Upload(format!("HTTP {}: {}", status, truncate(body))));
    }
    let parsed: UploadResponse = serde_json::from_str(body)
        .map_err(|e| SubmitError::Upload(format!("invalid response: {}", e)))?;
    Ok(parsed.id)
}

fn parse_broadcast_response(status: StatusCode, body: &str) -> SubmitResult<TxResult> {
    if status == StatusCode::FORBIDDEN {
        return Err(SubmitError::Declined);
    }
    if let Ok(relay) = serde_json::from_str::<RelayError>(body) {
        if relay.error.eq_ignore_ascii_case("declined") {
            return Err(SubmitError::Declined);
        }
        return Err(SubmitError::Broadcast(relay.error));
    }
    if !status.is_success() {
        return Err(SubmitError::Broadcast(format!("HTTP {}: {}", status, truncate(body))));
    }
    serde_json::from_str(body).map_err(|e| SubmitError::Broadcast(format!("invalid response: {}", e)))
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_response_id() {
        let id = parse_upload_response(StatusCode::OK, r#"{"id":"bafy123"}"#).unwrap();
        assert_eq!(id, "bafy123");
    }

    #[test]
    fn test_upload_http_error() {
        let err = parse_upload_response(StatusCode::INTERNAL_SERVER_ERROR, "boom").unwrap_err();
        assert!(matches!(err, SubmitError::Upload(ref m) if m.contains("500")));
    }

    #[test]
    fn test_broadcast_success() {
        let tx = parse_broadcast_response(StatusCode::OK, r#"{"txHash":"0xabc"}"#).unwrap();
        assert_eq!(tx.tx_hash, "0xabc");
    }

    #[test]
    fn test_broadcast_declined_forms() {
        assert_eq!(parse_broadcast_response(StatusCode::FORBIDDEN, ""), Err(SubmitError::Declined));
        assert_eq!(
            parse_broadcast_response(StatusCode::OK, r#"{"error":"declined"}"#),
            Err(SubmitError::Declined)
        );
    }

    #[test]
    fn test_broadcast_relay_error_is_retryable() {
        let err = parse_broadcast_response(StatusCode::BAD_GATEWAY, r#"{"error":"node offline"}"#).unwrap_err();
        assert_eq!(err, SubmitError::Broadcast("node offline".into()));
        assert!(!err.is_declined());
    }

    #[test]
    fn test_from_config_requires_url() {
        assert!(HttpUploader::from_config(&ServiceConfig::default()).is_none());
        let config = ServiceConfig {
            upload_url: Some("http://localhost:9000/records".into()),
            upload_token: Some("secret".into()),
            broadcast_url: None,
        };
        let uploader = HttpUploader::from_config(&config).unwrap();
        assert_eq!(uploader.token.as_deref(), Some("secret"));
        assert!(HttpBroadcaster::from_config(&config).is_none());
    }
}
