//! Collaborator contracts composed by the orchestration engine.
//!
//! The engine consumes these capabilities, it does not implement them. Each
//! trait is supplied to the [`crate::engine::OrchestrationBuilder`] by the
//! composition root; default implementations live in their own modules
//! ([`crate::discovery`], [`crate::scoring`], [`crate::registry`],
//! [`crate::executor`], [`crate::watcher`]) and mocks for testing in
//! [`mock`].

pub mod mock;

use async_trait::async_trait;

use crate::types::{AppDescriptor, DeviceIdentity, DeviceRecord, ExecutionState, ServiceInfo, TargetInfo};

/// Errors from the discovery collaborator.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("device registration failed: {0}")]
    Registration(String),

    #[error("peer refresh failed: {0}")]
    Refresh(String),
}

/// Device discovery: maintains the table of devices (self plus peers)
/// eligible to host services.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Make this device visible to peers under `endpoint`.
    async fn register_device(
        &self,
        identity: &DeviceIdentity,
        endpoint: &str,
    ) -> Result<(), DiscoveryError>;

    /// Point-in-time copy of every currently known device, self included.
    ///
    /// The returned vector is owned by the caller; concurrent refreshes
    /// never mutate it.
    async fn snapshot(&self) -> Vec<DeviceRecord>;

    /// Re-poll peers and prune stale entries. Called from a background
    /// refresh loop, never on the request path.
    async fn refresh(&self) -> Result<(), DiscoveryError>;
}

/// Errors from the scoring collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("no score known for device {0}")]
    Unknown(String),

    #[error("scoring unavailable: {0}")]
    Unavailable(String),
}

/// Candidate fitness scoring.
#[async_trait]
pub trait Scoring: Send + Sync {
    /// Fitness of `device` for hosting `service`; higher is better.
    ///
    /// Must be deterministic for a fixed device/service pair between two
    /// refreshes, so that repeated resolutions against an identical
    /// discovery snapshot reach the same decision.
    async fn score(&self, device: &DeviceRecord, service: &ServiceInfo)
        -> Result<f64, ScoringError>;

    /// Re-sample the inputs scores are derived from. Called from a
    /// background refresh loop, never on the request path.
    async fn refresh(&self) -> Result<(), ScoringError> {
        Ok(())
    }
}

/// Errors from the executor collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("empty command for service {0}")]
    EmptyCommand(String),

    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("service {service} exited with {status}")]
    Exited { service: String, status: String },
}

/// Local command execution.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Launch `command` for `service_name` on this device and wait for it
    /// to finish. The engine detaches this call; it never blocks a request.
    async fn execute(&self, service_name: &str, command: &[String]) -> Result<(), ExecError>;
}

/// Tracking of accepted placements and locally installed applications.
///
/// Dispatch is fire-and-forget relative to actual completion; this registry
/// is where completion eventually lands.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Record an accepted placement. Returns the execution id used for
    /// later state updates.
    async fn record_dispatch(&self, service_name: &str, target: &TargetInfo) -> u64;

    /// Update the lifecycle state of a recorded execution.
    async fn update_state(&self, execution_id: u64, state: ExecutionState);

    /// Register an application installed on this device, as reported by the
    /// watcher.
    async fn register_app(&self, descriptor: AppDescriptor);
}

/// Errors from the watcher collaborator.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("application configuration directory {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Application-configuration watching.
#[async_trait]
pub trait Watcher: Send + Sync {
    /// Descriptors added or changed since the previous poll.
    async fn poll_changes(&self) -> Result<Vec<AppDescriptor>, WatchError>;
}
