//! Mock collaborator implementations for testing.
//!
//! Each mock stores its state in memory, records the calls made against it,
//! and can be armed to fail so error paths are exercisable without real
//! devices.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::{
    AppDescriptor, DeviceIdentity, DeviceRecord, ExecutionState, ServiceInfo, TargetInfo,
};

use super::{
    Discovery, DiscoveryError, ExecError, Executor, Scoring, ScoringError, ServiceRegistry,
    WatchError, Watcher,
};

/// Mock discovery backed by a preset device table.
#[derive(Default)]
pub struct MockDiscovery {
    devices: RwLock<Vec<DeviceRecord>>,
    registered: RwLock<Option<(DeviceIdentity, String)>>,
    refreshes: AtomicUsize,
    fail_on_register: RwLock<bool>,
}

impl MockDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the table with peer records.
    pub fn with_devices(devices: Vec<DeviceRecord>) -> Self {
        Self {
            devices: RwLock::new(devices),
            ..Self::default()
        }
    }

    pub async fn set_devices(&self, devices: Vec<DeviceRecord>) {
        *self.devices.write().await = devices;
    }

    pub async fn push_device(&self, device: DeviceRecord) {
        self.devices.write().await.push(device);
    }

    pub async fn set_fail_on_register(&self, fail: bool) {
        *self.fail_on_register.write().await = fail;
    }

    /// Identity and endpoint handed to `register_device`, if any.
    pub async fn registered(&self) -> Option<(DeviceIdentity, String)> {
        self.registered.read().await.clone()
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Discovery for MockDiscovery {
    async fn register_device(
        &self,
        identity: &DeviceIdentity,
        endpoint: &str,
    ) -> Result<(), DiscoveryError> {
        if *self.fail_on_register.read().await {
            return Err(DiscoveryError::Registration(
                "mock registration failure".to_string(),
            ));
        }

        *self.registered.write().await = Some((identity.clone(), endpoint.to_string()));

        let local = DeviceRecord {
            device_id: identity.device_id.clone(),
            platform: identity.platform.clone(),
            execution_types: HashSet::from([identity.execution_type.clone()]),
            endpoint: endpoint.to_string(),
            is_local: true,
        };
        self.devices.write().await.push(local);
        Ok(())
    }

    async fn snapshot(&self) -> Vec<DeviceRecord> {
        self.devices.read().await.clone()
    }

    async fn refresh(&self) -> Result<(), DiscoveryError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock scoring with per-device fixed scores.
pub struct MockScoring {
    scores: RwLock<HashMap<String, f64>>,
    default_score: f64,
    fail_for: RwLock<HashSet<String>>,
    refreshes: AtomicUsize,
}

impl MockScoring {
    pub fn new() -> Self {
        Self::with_default(50.0)
    }

    /// Score returned for devices without an explicit entry.
    pub fn with_default(default_score: f64) -> Self {
        Self {
            scores: RwLock::new(HashMap::new()),
            default_score,
            fail_for: RwLock::new(HashSet::new()),
            refreshes: AtomicUsize::new(0),
        }
    }

    pub async fn set_score(&self, device_id: impl Into<String>, score: f64) {
        self.scores.write().await.insert(device_id.into(), score);
    }

    /// Make scoring fail for one device id.
    pub async fn set_fail_for(&self, device_id: impl Into<String>) {
        self.fail_for.write().await.insert(device_id.into());
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl Default for MockScoring {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scoring for MockScoring {
    async fn score(
        &self,
        device: &DeviceRecord,
        _service: &ServiceInfo,
    ) -> Result<f64, ScoringError> {
        if self.fail_for.read().await.contains(&device.device_id) {
            return Err(ScoringError::Unavailable(format!(
                "mock scoring failure for {}",
                device.device_id
            )));
        }

        Ok(self
            .scores
            .read()
            .await
            .get(&device.device_id)
            .copied()
            .unwrap_or(self.default_score))
    }

    async fn refresh(&self) -> Result<(), ScoringError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock executor that records what was launched.
#[derive(Default)]
pub struct MockExecutor {
    executions: RwLock<Vec<(String, Vec<String>)>>,
    fail_on_execute: RwLock<bool>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_execute(&self, fail: bool) {
        *self.fail_on_execute.write().await = fail;
    }

    /// Every (service, command) executed so far.
    pub async fn executions(&self) -> Vec<(String, Vec<String>)> {
        self.executions.read().await.clone()
    }

    /// Wait until at least `count` executions were recorded. Dispatch is
    /// detached from the request path, so tests have to wait for it.
    pub async fn wait_for(&self, count: usize) {
        for _ in 0..200 {
            if self.executions.read().await.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {count} mock executions");
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn execute(&self, service_name: &str, command: &[String]) -> Result<(), ExecError> {
        self.executions
            .write()
            .await
            .push((service_name.to_string(), command.to_vec()));

        if *self.fail_on_execute.read().await {
            return Err(ExecError::Exited {
                service: service_name.to_string(),
                status: "mock failure".to_string(),
            });
        }
        Ok(())
    }
}

/// One placement recorded by the mock registry.
#[derive(Debug, Clone)]
pub struct RecordedDispatch {
    pub execution_id: u64,
    pub service_name: String,
    pub target: TargetInfo,
}

/// Mock service registry.
#[derive(Default)]
pub struct MockServiceRegistry {
    next_id: AtomicU64,
    dispatches: RwLock<Vec<RecordedDispatch>>,
    states: RwLock<HashMap<u64, ExecutionState>>,
    apps: RwLock<Vec<AppDescriptor>>,
}

impl MockServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn dispatches(&self) -> Vec<RecordedDispatch> {
        self.dispatches.read().await.clone()
    }

    pub async fn state_of(&self, execution_id: u64) -> Option<ExecutionState> {
        self.states.read().await.get(&execution_id).copied()
    }

    pub async fn apps(&self) -> Vec<AppDescriptor> {
        self.apps.read().await.clone()
    }

    /// Wait until at least `count` apps were registered.
    pub async fn wait_for_apps(&self, count: usize) {
        for _ in 0..200 {
            if self.apps.read().await.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {count} registered apps");
    }
}

#[async_trait]
impl ServiceRegistry for MockServiceRegistry {
    async fn record_dispatch(&self, service_name: &str, target: &TargetInfo) -> u64 {
        let execution_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.dispatches.write().await.push(RecordedDispatch {
            execution_id,
            service_name: service_name.to_string(),
            target: target.clone(),
        });
        self.states
            .write()
            .await
            .insert(execution_id, ExecutionState::Dispatched);
        execution_id
    }

    async fn update_state(&self, execution_id: u64, state: ExecutionState) {
        self.states.write().await.insert(execution_id, state);
    }

    async fn register_app(&self, descriptor: AppDescriptor) {
        self.apps.write().await.push(descriptor);
    }
}

/// Mock watcher that replays scripted descriptor batches, one per poll.
#[derive(Default)]
pub struct MockWatcher {
    batches: RwLock<Vec<Vec<AppDescriptor>>>,
    polls: AtomicUsize,
}

impl MockWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_batch(&self, batch: Vec<AppDescriptor>) {
        self.batches.write().await.push(batch);
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Watcher for MockWatcher {
    async fn poll_changes(&self) -> Result<Vec<AppDescriptor>, WatchError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut batches = self.batches.write().await;
        if batches.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(batches.remove(0))
        }
    }
}
