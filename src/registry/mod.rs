//! In-memory tracking of dispatched executions and installed applications.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::collaborators::ServiceRegistry;
use crate::types::{AppDescriptor, ExecutionState, TargetInfo};

/// One accepted placement and its current lifecycle state.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub service_name: String,
    pub target: TargetInfo,
    pub state: ExecutionState,
    pub updated_at: DateTime<Utc>,
}

/// Service registry holding executions and applications in process memory.
#[derive(Default)]
pub struct InMemoryServiceRegistry {
    next_id: AtomicU64,
    executions: RwLock<HashMap<u64, ExecutionRecord>>,
    apps: RwLock<HashMap<String, AppDescriptor>>,
}

impl InMemoryServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up one execution record.
    pub async fn execution(&self, execution_id: u64) -> Option<ExecutionRecord> {
        self.executions.read().await.get(&execution_id).cloned()
    }

    /// All executions recorded for `service_name`, oldest first.
    pub async fn executions_for(&self, service_name: &str) -> Vec<ExecutionRecord> {
        let executions = self.executions.read().await;
        let mut matching: Vec<(u64, ExecutionRecord)> = executions
            .iter()
            .filter(|(_, record)| record.service_name == service_name)
            .map(|(id, record)| (*id, record.clone()))
            .collect();
        matching.sort_by_key(|(id, _)| *id);
        matching.into_iter().map(|(_, record)| record).collect()
    }

    /// Look up one installed application.
    pub async fn app(&self, name: &str) -> Option<AppDescriptor> {
        self.apps.read().await.get(name).cloned()
    }

    /// Number of installed applications.
    pub async fn app_count(&self) -> usize {
        self.apps.read().await.len()
    }
}

#[async_trait]
impl ServiceRegistry for InMemoryServiceRegistry {
    async fn record_dispatch(&self, service_name: &str, target: &TargetInfo) -> u64 {
        let execution_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.executions.write().await.insert(
            execution_id,
            ExecutionRecord {
                service_name: service_name.to_string(),
                target: target.clone(),
                state: ExecutionState::Dispatched,
                updated_at: Utc::now(),
            },
        );
        debug!(
            execution_id,
            service = service_name,
            target = %target.target,
            "placement recorded"
        );
        execution_id
    }

    async fn update_state(&self, execution_id: u64, state: ExecutionState) {
        let mut executions = self.executions.write().await;
        match executions.get_mut(&execution_id) {
            Some(record) => {
                record.state = state;
                record.updated_at = Utc::now();
                debug!(execution_id, state = ?state, "execution state updated");
            }
            None => warn!(execution_id, state = ?state, "state update for unknown execution"),
        }
    }

    async fn register_app(&self, descriptor: AppDescriptor) {
        let mut apps = self.apps.write().await;
        match apps.insert(descriptor.name.clone(), descriptor.clone()) {
            None => info!(
                app = %descriptor.name,
                execution_type = %descriptor.execution_type,
                "application registered"
            ),
            Some(_) => debug!(app = %descriptor.name, "application descriptor replaced"),
        }
    }
}
