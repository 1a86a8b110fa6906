//! Orchestration engine: collaborator composition, lifecycle, and the
//! request resolution algorithm.
//!
//! The engine owns its lifecycle state and the device identity; candidate
//! tables belong to the discovery and scoring collaborators, and each
//! resolution only borrows a point-in-time snapshot of them.

pub mod builder;
mod identity;
mod resolution;

pub use builder::{BuildError, OrchestrationBuilder};

use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{info, warn};

use crate::api::{ApiError, ExternalApi, InternalApi};
use crate::client::PeerClient;
use crate::collaborators::{Discovery, DiscoveryError, Executor, Scoring, ServiceRegistry, Watcher};
use crate::diagnostics::Diagnostics;
use crate::types::{DeviceIdentity, EngineState};

/// Engine tunables fixed at build time.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL under which peers reach this device's internal surface.
    pub advertise_endpoint: String,
    /// Period of the discovery refresh loop.
    pub refresh_interval: Duration,
    /// Period of the scoring refresh loop.
    pub score_interval: Duration,
    /// Period of the watcher poll loop.
    pub watch_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            advertise_endpoint: "http://127.0.0.1:56001".to_string(),
            refresh_interval: Duration::from_secs(15),
            score_interval: Duration::from_secs(30),
            watch_interval: Duration::from_secs(10),
        }
    }
}

/// Errors from engine startup.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("engine already started")]
    AlreadyStarted,

    #[error("device identity file {path}: {source}")]
    Identity {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// The composed orchestration runtime.
pub struct OrchestrationEngine {
    config: EngineConfig,
    watcher: Arc<dyn Watcher>,
    discovery: Arc<dyn Discovery>,
    scoring: Arc<dyn Scoring>,
    service_registry: Arc<dyn ServiceRegistry>,
    executor: Arc<dyn Executor>,
    client: Arc<dyn PeerClient>,
    diagnostics: Arc<Diagnostics>,
    identity: OnceLock<DeviceIdentity>,
    state: RwLock<EngineState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl OrchestrationEngine {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        config: EngineConfig,
        watcher: Arc<dyn Watcher>,
        discovery: Arc<dyn Discovery>,
        scoring: Arc<dyn Scoring>,
        service_registry: Arc<dyn ServiceRegistry>,
        executor: Arc<dyn Executor>,
        client: Arc<dyn PeerClient>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            config,
            watcher,
            discovery,
            scoring,
            service_registry,
            executor,
            client,
            diagnostics,
            identity: OnceLock::new(),
            state: RwLock::new(EngineState::Built),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// This device's identity; `None` until `start()` has set it.
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.get()
    }

    /// Bootstrap the engine.
    ///
    /// Synchronously loads or generates the device identity and registers it
    /// with discovery, then launches the background refresh loops. The
    /// identity is guaranteed set once this returns; everything after it is
    /// best-effort background work. Callable once per process.
    pub async fn start(
        &self,
        identity_path: impl AsRef<Path>,
        platform: &str,
        execution_type: &str,
    ) -> Result<(), StartError> {
        {
            let mut state = self.state.write().await;
            if *state != EngineState::Built {
                return Err(StartError::AlreadyStarted);
            }
            *state = EngineState::Starting;
        }

        let (device_identity, generated) =
            identity::load_or_generate(identity_path.as_ref(), platform, execution_type)?;
        info!(
            device_id = %device_identity.device_id,
            platform,
            execution_type,
            generated,
            "device identity ready"
        );

        if self.identity.set(device_identity.clone()).is_err() {
            return Err(StartError::AlreadyStarted);
        }

        self.discovery
            .register_device(&device_identity, &self.config.advertise_endpoint)
            .await?;

        self.spawn_background_loops().await;

        *self.state.write().await = EngineState::Running;
        info!("orchestration engine running");
        Ok(())
    }

    /// Facade for trusted local callers. Fails until `start()` completes.
    pub async fn external_api(self: &Arc<Self>) -> Result<ExternalApi, ApiError> {
        if self.state().await != EngineState::Running {
            return Err(ApiError::NotInitialized);
        }
        Ok(ExternalApi::new(
            Arc::clone(self),
            Arc::clone(&self.diagnostics),
        ))
    }

    /// Reduced facade serving untrusted remote peers. Fails until `start()`
    /// completes.
    pub async fn internal_api(self: &Arc<Self>) -> Result<InternalApi, ApiError> {
        if self.state().await != EngineState::Running {
            return Err(ApiError::NotInitialized);
        }
        Ok(InternalApi::new(Arc::clone(self)))
    }

    async fn spawn_background_loops(&self) {
        let mut tasks = self.tasks.lock().await;

        let discovery = Arc::clone(&self.discovery);
        let period = self.config.refresh_interval;
        tasks.push(tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = discovery.refresh().await {
                    warn!(error = %e, "discovery refresh failed");
                }
            }
        }));

        let scoring = Arc::clone(&self.scoring);
        let period = self.config.score_interval;
        tasks.push(tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = scoring.refresh().await {
                    warn!(error = %e, "scoring refresh failed");
                }
            }
        }));

        let watcher = Arc::clone(&self.watcher);
        let service_registry = Arc::clone(&self.service_registry);
        let period = self.config.watch_interval;
        tasks.push(tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                match watcher.poll_changes().await {
                    Ok(descriptors) => {
                        for descriptor in descriptors {
                            service_registry.register_app(descriptor).await;
                        }
                    }
                    Err(e) => warn!(error = %e, "configuration poll failed"),
                }
            }
        }));
    }
}

impl Drop for OrchestrationEngine {
    fn drop(&mut self) {
        // Background loops hold no engine reference; abort them so a dropped
        // engine (tests, mainly) does not leak tickers.
        if let Ok(tasks) = self.tasks.try_lock() {
            for task in tasks.iter() {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockPeerClient;
    use crate::collaborators::mock::{
        MockDiscovery, MockExecutor, MockScoring, MockServiceRegistry, MockWatcher,
    };
    use crate::types::AppDescriptor;

    struct Mocks {
        watcher: Arc<MockWatcher>,
        discovery: Arc<MockDiscovery>,
        scoring: Arc<MockScoring>,
        service_registry: Arc<MockServiceRegistry>,
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            refresh_interval: Duration::from_millis(10),
            score_interval: Duration::from_millis(10),
            watch_interval: Duration::from_millis(10),
            ..EngineConfig::default()
        }
    }

    fn engine_with_mocks(config: EngineConfig) -> (Arc<OrchestrationEngine>, Mocks) {
        let mocks = Mocks {
            watcher: Arc::new(MockWatcher::new()),
            discovery: Arc::new(MockDiscovery::new()),
            scoring: Arc::new(MockScoring::new()),
            service_registry: Arc::new(MockServiceRegistry::new()),
        };
        let engine = OrchestrationBuilder::new(config)
            .set_watcher(mocks.watcher.clone())
            .set_discovery(mocks.discovery.clone())
            .set_scoring(mocks.scoring.clone())
            .set_service_registry(mocks.service_registry.clone())
            .set_executor(Arc::new(MockExecutor::new()))
            .set_client(Arc::new(MockPeerClient::new("peer")))
            .build()
            .unwrap();
        (Arc::new(engine), mocks)
    }

    #[tokio::test]
    async fn test_start_sets_identity_and_registers_device() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, mocks) = engine_with_mocks(EngineConfig::default());

        engine
            .start(dir.path().join("deviceID.txt"), "linux", "rpm")
            .await
            .unwrap();

        let identity = engine.identity().unwrap();
        assert_eq!(identity.platform, "linux");
        assert_eq!(identity.execution_type, "rpm");
        assert_eq!(engine.state().await, EngineState::Running);

        let (registered, endpoint) = mocks.discovery.registered().await.unwrap();
        assert_eq!(registered.device_id, identity.device_id);
        assert_eq!(endpoint, EngineConfig::default().advertise_endpoint);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _mocks) = engine_with_mocks(EngineConfig::default());
        let path = dir.path().join("deviceID.txt");

        engine.start(&path, "linux", "rpm").await.unwrap();
        let again = engine.start(&path, "linux", "rpm").await;
        assert!(matches!(again, Err(StartError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn test_registration_failure_aborts_start() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, mocks) = engine_with_mocks(EngineConfig::default());
        mocks.discovery.set_fail_on_register(true).await;

        let result = engine
            .start(dir.path().join("deviceID.txt"), "linux", "rpm")
            .await;
        assert!(matches!(result, Err(StartError::Discovery(_))));
        assert_ne!(engine.state().await, EngineState::Running);
    }

    #[tokio::test]
    async fn test_background_loops_drive_collaborators() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, mocks) = engine_with_mocks(fast_config());
        mocks
            .watcher
            .push_batch(vec![AppDescriptor {
                name: "hello".to_string(),
                execution_type: "rpm".to_string(),
                command: vec!["hello".to_string()],
            }])
            .await;

        engine
            .start(dir.path().join("deviceID.txt"), "linux", "rpm")
            .await
            .unwrap();

        mocks.service_registry.wait_for_apps(1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(mocks.discovery.refresh_count() >= 2);
        assert!(mocks.scoring.refresh_count() >= 2);
        assert_eq!(mocks.service_registry.apps().await.len(), 1);
    }

    #[tokio::test]
    async fn test_facades_unavailable_before_start() {
        let (engine, _mocks) = engine_with_mocks(EngineConfig::default());
        assert!(matches!(
            engine.external_api().await,
            Err(ApiError::NotInitialized)
        ));
        assert!(matches!(
            engine.internal_api().await,
            Err(ApiError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_facades_available_after_start() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _mocks) = engine_with_mocks(EngineConfig::default());
        engine
            .start(dir.path().join("deviceID.txt"), "linux", "rpm")
            .await
            .unwrap();

        assert!(engine.external_api().await.is_ok());
        assert!(engine.internal_api().await.is_ok());
    }
}
