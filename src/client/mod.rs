//! Outbound secured REST exchange with peer devices.
//!
//! The client serializes a request, seals it with the shared cipher, issues
//! a single bounded-timeout POST to the peer's internal surface, and opens
//! the sealed response. Transport failures classify into distinct
//! recoverable error kinds; the resolution engine downgrades all of them
//! into failure responses. There is no automatic retry here; the `count`
//! parameter at the external boundary is the only repetition mechanism.

pub mod mock;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use tracing::debug;

use crate::cipher::{Cipher, CipherError};
use crate::types::{ScoreQuery, ScoreReport, ServiceRequest, ServiceResponse};

/// Route serving placement requests on a peer's internal surface.
pub const SERVICE_ROUTE: &str = "/api/v1/orchestration/services";
/// Route serving score queries on a peer's internal surface.
pub const SCORE_ROUTE: &str = "/api/v1/orchestration/score";
/// Unencrypted liveness route.
pub const PING_ROUTE: &str = "/api/v1/ping";

/// Result type for peer client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur during a peer exchange. All variants are
/// recoverable at the resolution layer.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Client construction failed.
    #[error("client construction failed: {0}")]
    Build(String),

    /// The peer could not be reached at all.
    #[error("peer unreachable at {endpoint}: {message}")]
    Unreachable { endpoint: String, message: String },

    /// The exchange did not complete within the bounded timeout.
    #[error("exchange with {endpoint} timed out")]
    Timeout { endpoint: String },

    /// The peer answered with a non-success status.
    #[error("peer {endpoint} rejected the exchange with status {status}")]
    Rejected { endpoint: String, status: u16 },

    /// The peer's response could not be read or parsed.
    #[error("malformed response from {endpoint}: {message}")]
    Malformed { endpoint: String, message: String },

    /// Sealing or opening a payload failed.
    #[error(transparent)]
    Cipher(#[from] CipherError),
}

/// Outbound exchange with a peer's internal orchestration surface.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Ask the peer at `endpoint` to host `request`. Single bounded attempt.
    async fn request_service(
        &self,
        endpoint: &str,
        request: &ServiceRequest,
    ) -> Result<ServiceResponse>;

    /// Fetch the peer's self-reported fitness for `execution_type`.
    async fn query_score(&self, endpoint: &str, execution_type: &str) -> Result<ScoreReport>;
}

/// REST implementation of [`PeerClient`] over the shared cipher.
pub struct RestClient {
    http: reqwest::Client,
    cipher: Arc<dyn Cipher>,
}

impl RestClient {
    /// Create a client whose every exchange is bounded by `timeout`.
    pub fn new(cipher: Arc<dyn Cipher>, timeout: Duration) -> Result<RestClient> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;
        Ok(Self { http, cipher })
    }

    /// Seal `plain`, POST it to `endpoint` + `route`, open the response.
    async fn exchange(&self, endpoint: &str, route: &str, plain: &[u8]) -> Result<Vec<u8>> {
        let url = format!("{}{}", endpoint.trim_end_matches('/'), route);
        let body = self.cipher.encrypt(plain)?;

        debug!(url = %url, bytes = body.len(), "peer exchange");

        let response = self
            .http
            .post(&url)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| classify_send_error(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Rejected {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let sealed = response
            .bytes()
            .await
            .map_err(|e| ClientError::Malformed {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;

        Ok(self.cipher.decrypt(&sealed)?)
    }
}

/// Map a reqwest send error onto the transport failure taxonomy.
fn classify_send_error(endpoint: &str, err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout {
            endpoint: endpoint.to_string(),
        }
    } else {
        ClientError::Unreachable {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl PeerClient for RestClient {
    async fn request_service(
        &self,
        endpoint: &str,
        request: &ServiceRequest,
    ) -> Result<ServiceResponse> {
        let plain = serde_json::to_vec(request).map_err(|e| ClientError::Malformed {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        let raw = self.exchange(endpoint, SERVICE_ROUTE, &plain).await?;

        serde_json::from_slice(&raw).map_err(|e| ClientError::Malformed {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }

    async fn query_score(&self, endpoint: &str, execution_type: &str) -> Result<ScoreReport> {
        let query = ScoreQuery {
            execution_type: execution_type.to_string(),
        };
        let plain = serde_json::to_vec(&query).map_err(|e| ClientError::Malformed {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        let raw = self.exchange(endpoint, SCORE_ROUTE, &plain).await?;

        serde_json::from_slice(&raw).map_err(|e| ClientError::Malformed {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }
}
