//! Core data model shared across the orchestration engine and its
//! collaborators.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// One acceptable way of executing a requested service: the execution type
/// the hosting device must support, plus the launch command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Execution type the hosting device must support (e.g. "rpm", "container").
    pub execution_type: String,
    /// Launch command and its arguments, in order.
    #[serde(default)]
    pub command: Vec<String>,
}

impl ServiceInfo {
    /// Build a `ServiceInfo` from a flat command line.
    ///
    /// The line is split on whitespace. An empty or all-whitespace command
    /// line yields an empty argument vector, never a single empty string.
    pub fn parse_command(execution_type: impl Into<String>, command_line: &str) -> Self {
        Self {
            execution_type: execution_type.into(),
            command: command_line
                .split_whitespace()
                .map(str::to_string)
                .collect(),
        }
    }
}

/// A request to run a named service somewhere in the device mesh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    /// Name of the application service being requested.
    pub service_name: String,
    /// Acceptable executions, in caller preference order. Must be non-empty;
    /// an empty list produces a failure response, never a panic.
    pub service_info: Vec<ServiceInfo>,
}

/// The placement a resolution round decided on.
///
/// The `Default` value (both fields empty) is the zero placement carried by
/// failure responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetInfo {
    /// Execution type the service was placed under.
    pub execution_type: String,
    /// Device id of the host the service was placed on.
    pub target: String,
}

impl TargetInfo {
    /// True for the zero placement used by failure responses.
    pub fn is_zero(&self) -> bool {
        self.execution_type.is_empty() && self.target.is_empty()
    }
}

/// Response returned for every service request, success or failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceResponse {
    /// Human-readable outcome. Non-empty on failure.
    pub message: String,
    /// Echo of the requested service name.
    pub service_name: String,
    /// Accepted placement; the zero value on failure.
    pub remote_target_info: TargetInfo,
}

impl ServiceResponse {
    /// Successful placement acknowledgement.
    pub fn accepted(service_name: impl Into<String>, target: TargetInfo) -> Self {
        Self {
            message: "service placement accepted".to_string(),
            service_name: service_name.into(),
            remote_target_info: target,
        }
    }

    /// Failure response with a guaranteed non-empty message and zero target.
    pub fn failure(service_name: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            message: if message.is_empty() {
                "service placement failed".to_string()
            } else {
                message
            },
            service_name: service_name.into(),
            remote_target_info: TargetInfo::default(),
        }
    }

    /// True when this response carries no accepted placement.
    pub fn is_failure(&self) -> bool {
        self.remote_target_info.is_zero()
    }
}

/// A device currently known to this node, as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Stable, persisted device id.
    pub device_id: String,
    /// Platform string (e.g. "linux").
    pub platform: String,
    /// Execution types this device can host.
    pub execution_types: HashSet<String>,
    /// Base URL of the device's internal orchestration surface.
    pub endpoint: String,
    /// True for the record describing this device itself.
    pub is_local: bool,
}

/// A device eligible to host a requested service, with the fitness score
/// computed for it during one resolution round. Assembled transiently per
/// call from the discovery snapshot plus scoring; never persisted.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub device: DeviceRecord,
    pub score: f64,
}

/// Identity of this device. Loaded or generated once at engine start and
/// immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub platform: String,
    pub execution_type: String,
}

/// Lifecycle state of the orchestration engine. Transitions are monotonic;
/// a restart means a new process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Built by the builder, not yet started.
    Built,
    /// `start()` in progress.
    Starting,
    /// Bootstrap complete; facades are available.
    Running,
}

/// Lifecycle of a dispatched execution as tracked by the service registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// Placement accepted, command not yet launched.
    Dispatched,
    /// Command launched locally.
    Running,
    /// Launch or execution failed.
    Failed,
    /// Execution finished.
    Done,
}

/// A locally installed application, parsed from a descriptor file in the
/// application-configuration directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDescriptor {
    /// Application name.
    pub name: String,
    /// Execution type the application is packaged for.
    pub execution_type: String,
    /// Launch command and arguments.
    #[serde(default)]
    pub command: Vec<String>,
}

/// Encrypted score query carried on the internal score route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreQuery {
    /// Execution type the asking peer wants this device scored for.
    pub execution_type: String,
}

/// A device's self-reported fitness, returned on the internal score route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    /// Device id of the reporting device.
    pub device_id: String,
    /// Fitness score; higher is better.
    pub score: f64,
}
