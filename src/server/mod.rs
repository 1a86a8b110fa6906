//! Internal peer-facing route group.
//!
//! Serves the reduced operation set of [`InternalApi`] to remote peers:
//! - `POST /api/v1/orchestration/services`: placement resolution
//! - `POST /api/v1/orchestration/score`: health/score reporting
//! - `GET  /api/v1/ping`: unencrypted liveness probe
//!
//! Every payload other than the liveness probe passes through the shared
//! cipher. Undecryptable or malformed bodies are rejected with a logged
//! diagnostic, never a panic.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::api::InternalApi;
use crate::cipher::Cipher;
use crate::client::{PING_ROUTE, SCORE_ROUTE, SERVICE_ROUTE};
use crate::types::{ScoreQuery, ServiceRequest};

/// Shared state for the route handlers.
#[derive(Clone)]
struct InternalState {
    api: InternalApi,
    cipher: Arc<dyn Cipher>,
}

/// Serve the internal route group on the given port.
///
/// When `port` is 0 the OS assigns an ephemeral port; the bound port is
/// always logged so it can be discovered.
pub async fn serve(
    api: InternalApi,
    cipher: Arc<dyn Cipher>,
    port: u16,
) -> Result<(), std::io::Error> {
    let app = router(api, cipher);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let actual_port = listener.local_addr()?.port();
    info!(port = actual_port, "internal orchestration surface listening");
    axum::serve(listener, app).await
}

/// Build the axum router (separated for testing).
pub fn router(api: InternalApi, cipher: Arc<dyn Cipher>) -> Router {
    Router::new()
        .route(SERVICE_ROUTE, post(request_service))
        .route(SCORE_ROUTE, post(score))
        .route(PING_ROUTE, get(ping))
        .with_state(InternalState { api, cipher })
}

// ============================================================================
// Handlers
// ============================================================================

async fn ping() -> StatusCode {
    StatusCode::OK
}

async fn request_service(State(state): State<InternalState>, body: Bytes) -> Response {
    let request: ServiceRequest = match open(&state, &body) {
        Ok(request) => request,
        Err(status) => return status.into_response(),
    };

    let response = state.api.handle_service_request(request).await;
    seal(&state, &response)
}

async fn score(State(state): State<InternalState>, body: Bytes) -> Response {
    let query: ScoreQuery = match open(&state, &body) {
        Ok(query) => query,
        Err(status) => return status.into_response(),
    };

    match state.api.score(&query.execution_type).await {
        Ok(report) => seal(&state, &report),
        Err(e) => {
            warn!(error = %e, "score reporting unavailable");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

// ============================================================================
// Payload framing
// ============================================================================

/// Open a sealed request body. Anything that fails to decrypt or parse is
/// an untrusted-input rejection, logged and answered with 400.
fn open<T: DeserializeOwned>(state: &InternalState, body: &[u8]) -> Result<T, StatusCode> {
    let plain = state.cipher.decrypt(body).map_err(|e| {
        warn!(error = %e, "rejecting undecryptable payload");
        StatusCode::BAD_REQUEST
    })?;
    serde_json::from_slice(&plain).map_err(|e| {
        warn!(error = %e, "rejecting malformed payload");
        StatusCode::BAD_REQUEST
    })
}

/// Seal a response value for the wire.
fn seal<T: Serialize>(state: &InternalState, value: &T) -> Response {
    let plain = match serde_json::to_vec(value) {
        Ok(plain) => plain,
        Err(e) => {
            error!(error = %e, "failed to serialize response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    match state.cipher.encrypt(&plain) {
        Ok(sealed) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            sealed,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to seal response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::cipher::AesGcmCipher;
    use crate::client::mock::MockPeerClient;
    use crate::collaborators::mock::{
        MockDiscovery, MockExecutor, MockScoring, MockServiceRegistry, MockWatcher,
    };
    use crate::engine::{EngineConfig, OrchestrationBuilder};
    use crate::types::{ScoreReport, ServiceInfo, ServiceResponse};

    struct Harness {
        router: Router,
        cipher: Arc<AesGcmCipher>,
        executor: Arc<MockExecutor>,
        local_id: String,
        _dir: tempfile::TempDir,
    }

    async fn started_router() -> Harness {
        let executor = Arc::new(MockExecutor::new());
        let scoring = Arc::new(MockScoring::with_default(64.0));
        let engine = Arc::new(
            OrchestrationBuilder::new(EngineConfig::default())
                .set_watcher(Arc::new(MockWatcher::new()))
                .set_discovery(Arc::new(MockDiscovery::new()))
                .set_scoring(scoring)
                .set_service_registry(Arc::new(MockServiceRegistry::new()))
                .set_executor(executor.clone())
                .set_client(Arc::new(MockPeerClient::new("peer")))
                .build()
                .unwrap(),
        );
        let dir = tempfile::tempdir().unwrap();
        engine
            .start(dir.path().join("deviceID.txt"), "linux", "rpm")
            .await
            .unwrap();
        let local_id = engine.identity().unwrap().device_id.clone();

        let cipher = Arc::new(AesGcmCipher::from_secret(b"router-test-secret"));
        let api = engine.internal_api().await.unwrap();
        let router = router(api, cipher.clone());

        Harness {
            router,
            cipher,
            executor,
            local_id,
            _dir: dir,
        }
    }

    fn sealed_post(route: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(route)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_ping_is_unencrypted() {
        let harness = started_router().await;
        let response = harness
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(PING_ROUTE)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_service_request_round_trip() {
        let harness = started_router().await;

        let request = crate::types::ServiceRequest {
            service_name: "service-x".to_string(),
            service_info: vec![ServiceInfo::parse_command("rpm", "run foo")],
        };
        let sealed = harness
            .cipher
            .encrypt(&serde_json::to_vec(&request).unwrap())
            .unwrap();

        let response = harness
            .router
            .clone()
            .oneshot(sealed_post(SERVICE_ROUTE, sealed))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let plain = harness
            .cipher
            .decrypt(&body_bytes(response).await)
            .unwrap();
        let acknowledgement: ServiceResponse = serde_json::from_slice(&plain).unwrap();
        assert!(!acknowledgement.is_failure());
        assert_eq!(acknowledgement.remote_target_info.target, harness.local_id);

        harness.executor.wait_for(1).await;
    }

    #[tokio::test]
    async fn test_infeasible_peer_request_is_declined_in_band() {
        let harness = started_router().await;

        let request = crate::types::ServiceRequest {
            service_name: "service-x".to_string(),
            service_info: vec![ServiceInfo::parse_command("container", "run")],
        };
        let sealed = harness
            .cipher
            .encrypt(&serde_json::to_vec(&request).unwrap())
            .unwrap();

        let response = harness
            .router
            .clone()
            .oneshot(sealed_post(SERVICE_ROUTE, sealed))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let plain = harness
            .cipher
            .decrypt(&body_bytes(response).await)
            .unwrap();
        let acknowledgement: ServiceResponse = serde_json::from_slice(&plain).unwrap();
        assert!(acknowledgement.is_failure());
        assert!(!acknowledgement.message.is_empty());
    }

    #[tokio::test]
    async fn test_score_round_trip() {
        let harness = started_router().await;

        let query = ScoreQuery {
            execution_type: "rpm".to_string(),
        };
        let sealed = harness
            .cipher
            .encrypt(&serde_json::to_vec(&query).unwrap())
            .unwrap();

        let response = harness
            .router
            .clone()
            .oneshot(sealed_post(SCORE_ROUTE, sealed))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let plain = harness
            .cipher
            .decrypt(&body_bytes(response).await)
            .unwrap();
        let report: ScoreReport = serde_json::from_slice(&plain).unwrap();
        assert_eq!(report.device_id, harness.local_id);
        assert_eq!(report.score, 64.0);
    }

    #[tokio::test]
    async fn test_plaintext_body_rejected() {
        let harness = started_router().await;

        let response = harness
            .router
            .clone()
            .oneshot(sealed_post(SERVICE_ROUTE, b"not sealed".to_vec()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_wrong_key_rejected() {
        let harness = started_router().await;
        let other = AesGcmCipher::from_secret(b"some-other-secret");

        let request = crate::types::ServiceRequest {
            service_name: "service-x".to_string(),
            service_info: vec![ServiceInfo::parse_command("rpm", "run")],
        };
        let sealed = other
            .encrypt(&serde_json::to_vec(&request).unwrap())
            .unwrap();

        let response = harness
            .router
            .clone()
            .oneshot(sealed_post(SERVICE_ROUTE, sealed))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sealed_garbage_rejected() {
        let harness = started_router().await;

        // Decrypts fine, parses as nothing useful.
        let sealed = harness.cipher.encrypt(b"{\"wrong\": true}").unwrap();
        let response = harness
            .router
            .clone()
            .oneshot(sealed_post(SCORE_ROUTE, sealed))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
