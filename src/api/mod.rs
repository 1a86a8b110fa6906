//! API facades over the orchestration engine.
//!
//! Two access boundaries exist over one engine, distinguished by caller
//! trust. [`ExternalApi`] serves trusted local applications reached through
//! the native bridge. [`InternalApi`] serves untrusted remote peers reached
//! through the network layer; it exposes strictly placement resolution and
//! score reporting, never lifecycle or local-configuration operations,
//! because everything arriving on it came off the wire.
//!
//! Both facades are handed out by the engine only after `start()` has
//! completed; before that, requesting one is a fatal "not initialized"
//! condition for the composition root to act on.

use std::sync::Arc;

use tracing::debug;

use crate::collaborators::ScoringError;
use crate::diagnostics::Diagnostics;
use crate::engine::OrchestrationEngine;
use crate::types::{ScoreReport, ServiceInfo, ServiceRequest, ServiceResponse};

/// Errors from facade access.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// `start()` has not completed; no meaningful engine exists yet.
    #[error("orchestration engine not initialized")]
    NotInitialized,
}

/// Facade for trusted local callers.
#[derive(Clone)]
pub struct ExternalApi {
    engine: Arc<OrchestrationEngine>,
    diagnostics: Arc<Diagnostics>,
}

impl ExternalApi {
    pub(crate) fn new(engine: Arc<OrchestrationEngine>, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            engine,
            diagnostics,
        }
    }

    /// Request placement and dispatch of a service.
    ///
    /// `count` is a caller-driven repetition hint: up to that many
    /// independent resolution attempts are made, stopping at the first
    /// accepted placement. The engine itself never retries; `count` is
    /// clamped to at least one attempt.
    pub async fn request_service(
        &self,
        app_name: &str,
        service_info: Vec<ServiceInfo>,
        count: u32,
    ) -> ServiceResponse {
        let attempts = count.max(1);
        let mut last = ServiceResponse::failure(app_name, "no resolution attempt made");

        for attempt in 1..=attempts {
            let request = ServiceRequest {
                service_name: app_name.to_string(),
                service_info: service_info.clone(),
            };
            let response = self.engine.request_service(request).await;
            if !response.is_failure() {
                if attempt > 1 {
                    debug!(app = app_name, attempt, "placement accepted after retry");
                }
                return response;
            }
            debug!(
                app = app_name,
                attempt,
                message = %response.message,
                "resolution attempt failed"
            );
            last = response;
        }

        last
    }

    /// Diagnostic hook for host applications. Returns the process-wide
    /// message counter.
    pub fn log_message(&self, message: &str) -> u64 {
        self.diagnostics.log_message(message)
    }
}

/// Reduced facade for untrusted remote peers.
#[derive(Clone)]
pub struct InternalApi {
    engine: Arc<OrchestrationEngine>,
}

impl InternalApi {
    pub(crate) fn new(engine: Arc<OrchestrationEngine>) -> Self {
        Self { engine }
    }

    /// Host a service on this device at a peer's request.
    pub async fn handle_service_request(&self, request: ServiceRequest) -> ServiceResponse {
        self.engine.execute_local(request).await
    }

    /// This device's self-reported fitness for `execution_type`.
    pub async fn score(&self, execution_type: &str) -> Result<ScoreReport, ScoringError> {
        self.engine.local_score_report(execution_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockPeerClient;
    use crate::collaborators::mock::{
        MockDiscovery, MockExecutor, MockScoring, MockServiceRegistry, MockWatcher,
    };
    use crate::engine::{EngineConfig, OrchestrationBuilder};

    struct Harness {
        engine: Arc<OrchestrationEngine>,
        discovery: Arc<MockDiscovery>,
        scoring: Arc<MockScoring>,
        _dir: tempfile::TempDir,
    }

    async fn started_harness() -> Harness {
        let discovery = Arc::new(MockDiscovery::new());
        let scoring = Arc::new(MockScoring::new());
        let engine = Arc::new(
            OrchestrationBuilder::new(EngineConfig::default())
                .set_watcher(Arc::new(MockWatcher::new()))
                .set_discovery(discovery.clone())
                .set_scoring(scoring.clone())
                .set_service_registry(Arc::new(MockServiceRegistry::new()))
                .set_executor(Arc::new(MockExecutor::new()))
                .set_client(Arc::new(MockPeerClient::new("peer")))
                .build()
                .unwrap(),
        );
        let dir = tempfile::tempdir().unwrap();
        engine
            .start(dir.path().join("deviceID.txt"), "linux", "rpm")
            .await
            .unwrap();
        Harness {
            engine,
            discovery,
            scoring,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_request_service_via_external_api() {
        let harness = started_harness().await;
        let api = harness.engine.external_api().await.unwrap();
        let local_id = harness.engine.identity().unwrap().device_id.clone();

        let response = api
            .request_service("service-x", vec![ServiceInfo::parse_command("rpm", "run")], 1)
            .await;

        assert!(!response.is_failure());
        assert_eq!(response.remote_target_info.target, local_id);
    }

    #[tokio::test]
    async fn test_count_zero_still_attempts_once() {
        let harness = started_harness().await;
        let api = harness.engine.external_api().await.unwrap();

        let response = api
            .request_service("service-x", vec![ServiceInfo::parse_command("rpm", "run")], 0)
            .await;

        assert!(!response.is_failure());
    }

    #[tokio::test]
    async fn test_count_attempts_are_independent() {
        let harness = started_harness().await;
        let api = harness.engine.external_api().await.unwrap();

        // Every attempt fails the same way: the failure response of the
        // last attempt is surfaced, not an error.
        let response = api
            .request_service(
                "service-x",
                vec![ServiceInfo::parse_command("container", "run")],
                3,
            )
            .await;

        assert!(response.is_failure());
        assert!(!response.message.is_empty());

        // Making the request feasible lets a later attempt succeed.
        harness
            .discovery
            .push_device(crate::types::DeviceRecord {
                device_id: "peer-a".to_string(),
                platform: "linux".to_string(),
                execution_types: ["container".to_string()].into_iter().collect(),
                endpoint: "http://peer-a:56001".to_string(),
                is_local: false,
            })
            .await;
        harness.scoring.set_score("peer-a", 75.0).await;

        let response = api
            .request_service(
                "service-x",
                vec![ServiceInfo::parse_command("container", "run")],
                3,
            )
            .await;
        assert!(!response.is_failure());
        assert_eq!(response.remote_target_info.target, "peer-a");
    }

    #[tokio::test]
    async fn test_log_message_counter() {
        let harness = started_harness().await;
        let api = harness.engine.external_api().await.unwrap();

        assert_eq!(api.log_message("first"), 1);
        assert_eq!(api.log_message("second"), 2);
    }

    #[tokio::test]
    async fn test_internal_api_score_reports_identity() {
        let harness = started_harness().await;
        let api = harness.engine.internal_api().await.unwrap();
        let local_id = harness.engine.identity().unwrap().device_id.clone();
        harness.scoring.set_score(&local_id, 33.0).await;

        let report = api.score("rpm").await.unwrap();
        assert_eq!(report.device_id, local_id);
        assert_eq!(report.score, 33.0);
    }

    #[tokio::test]
    async fn test_internal_api_handles_peer_request() {
        let harness = started_harness().await;
        let api = harness.engine.internal_api().await.unwrap();

        let response = api
            .handle_service_request(ServiceRequest {
                service_name: "service-x".to_string(),
                service_info: vec![ServiceInfo::parse_command("rpm", "run")],
            })
            .await;

        assert!(!response.is_failure());
    }
}
