//! Mock peer client for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::types::{ScoreReport, ServiceRequest, ServiceResponse, TargetInfo};

use super::{ClientError, PeerClient, Result};

/// Mock peer client that plays the role of every remote device at once.
///
/// Accepts any placement request in the name of `device_id` and records what
/// was dispatched where.
pub struct MockPeerClient {
    device_id: String,
    dispatched: RwLock<Vec<(String, ServiceRequest)>>,
    scores: RwLock<HashMap<String, f64>>,
    fail_unreachable: RwLock<bool>,
    decline: RwLock<bool>,
}

impl MockPeerClient {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            dispatched: RwLock::new(Vec::new()),
            scores: RwLock::new(HashMap::new()),
            fail_unreachable: RwLock::new(false),
            decline: RwLock::new(false),
        }
    }

    /// Make every exchange fail as unreachable.
    pub async fn set_unreachable(&self, fail: bool) {
        *self.fail_unreachable.write().await = fail;
    }

    /// Make the fake peer answer placement requests with a failure response.
    pub async fn set_decline(&self, decline: bool) {
        *self.decline.write().await = decline;
    }

    /// Set the score reported for queries against `endpoint`.
    pub async fn set_score(&self, endpoint: impl Into<String>, score: f64) {
        self.scores.write().await.insert(endpoint.into(), score);
    }

    /// Every (endpoint, request) pair dispatched so far.
    pub async fn dispatched(&self) -> Vec<(String, ServiceRequest)> {
        self.dispatched.read().await.clone()
    }
}

#[async_trait]
impl PeerClient for MockPeerClient {
    async fn request_service(
        &self,
        endpoint: &str,
        request: &ServiceRequest,
    ) -> Result<ServiceResponse> {
        if *self.fail_unreachable.read().await {
            return Err(ClientError::Unreachable {
                endpoint: endpoint.to_string(),
                message: "mock unreachable".to_string(),
            });
        }

        self.dispatched
            .write()
            .await
            .push((endpoint.to_string(), request.clone()));

        if *self.decline.read().await {
            return Ok(ServiceResponse::failure(
                request.service_name.clone(),
                "mock peer declined",
            ));
        }

        let execution_type = request
            .service_info
            .first()
            .map(|info| info.execution_type.clone())
            .unwrap_or_default();

        Ok(ServiceResponse::accepted(
            request.service_name.clone(),
            TargetInfo {
                execution_type,
                target: self.device_id.clone(),
            },
        ))
    }

    async fn query_score(&self, endpoint: &str, _execution_type: &str) -> Result<ScoreReport> {
        if *self.fail_unreachable.read().await {
            return Err(ClientError::Unreachable {
                endpoint: endpoint.to_string(),
                message: "mock unreachable".to_string(),
            });
        }

        let score = self
            .scores
            .read()
            .await
            .get(endpoint)
            .copied()
            .unwrap_or(50.0);

        Ok(ScoreReport {
            device_id: self.device_id.clone(),
            score,
        })
    }
}
