//! Request resolution: turning a service request into a concrete placement
//! and a dispatched execution.
//!
//! Each call works against a point-in-time snapshot of the candidate table;
//! no lock is held across network I/O, and concurrent resolutions never see
//! each other's intermediate state.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::collaborators::ScoringError;
use crate::types::{
    Candidate, DeviceRecord, ExecutionState, ScoreReport, ServiceInfo, ServiceRequest,
    ServiceResponse, TargetInfo,
};

use super::OrchestrationEngine;

/// Strict preference between two scored candidates: higher score wins;
/// equal scores prefer the local device, then the lexicographically
/// smallest device id. Device ids are unique, so this is a total order and
/// the selected maximum is independent of iteration order.
pub(crate) fn prefers(challenger: &Candidate, incumbent: &Candidate) -> bool {
    match challenger.score.total_cmp(&incumbent.score) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => {
            if challenger.device.is_local != incumbent.device.is_local {
                challenger.device.is_local
            } else {
                challenger.device.device_id < incumbent.device.device_id
            }
        }
    }
}

impl OrchestrationEngine {
    /// Resolve a service request into a placement and dispatch it.
    ///
    /// The response communicates the accepted placement, not finished
    /// execution. Infeasible requests and remote transport failures come
    /// back as failure responses; they are normal outcomes, never engine
    /// faults.
    pub async fn request_service(&self, request: ServiceRequest) -> ServiceResponse {
        let service_name = request.service_name.clone();

        if request.service_info.is_empty() {
            warn!(service = %service_name, "request carried no service info entries");
            return ServiceResponse::failure(
                service_name,
                "request carried no service info entries",
            );
        }

        let snapshot = self.discovery.snapshot().await;
        debug!(
            service = %service_name,
            devices = snapshot.len(),
            "resolving placement"
        );

        let Some((candidate, matched)) = self
            .select_candidate(&snapshot, &request.service_info)
            .await
        else {
            info!(service = %service_name, "no feasible candidate");
            return ServiceResponse::failure(
                service_name,
                "no device supports any requested execution type",
            );
        };

        info!(
            service = %service_name,
            device_id = %candidate.device.device_id,
            score = candidate.score,
            local = candidate.device.is_local,
            execution_type = %matched.execution_type,
            "placement selected"
        );

        if candidate.device.is_local {
            self.dispatch_local(&service_name, &matched, &candidate.device.device_id)
                .await
        } else {
            self.dispatch_remote(&service_name, &matched, &candidate)
                .await
        }
    }

    /// Local placement for a request arriving from a peer: this device has
    /// already been chosen by the caller; check feasibility against the
    /// local identity and dispatch.
    pub(crate) async fn execute_local(&self, request: ServiceRequest) -> ServiceResponse {
        let service_name = request.service_name.clone();

        let Some(identity) = self.identity.get() else {
            warn!(service = %service_name, "local execution requested before initialization");
            return ServiceResponse::failure(service_name, "engine not initialized");
        };

        if request.service_info.is_empty() {
            warn!(service = %service_name, "request carried no service info entries");
            return ServiceResponse::failure(
                service_name,
                "request carried no service info entries",
            );
        }

        let Some(matched) = request
            .service_info
            .iter()
            .find(|info| info.execution_type == identity.execution_type)
        else {
            info!(
                service = %service_name,
                supported = %identity.execution_type,
                "no requested execution type is supported here"
            );
            return ServiceResponse::failure(
                service_name,
                format!(
                    "device supports execution type {} only",
                    identity.execution_type
                ),
            );
        };

        let device_id = identity.device_id.clone();
        self.dispatch_local(&service_name, matched, &device_id).await
    }

    /// This device's fitness for `execution_type`, for peer score reporting.
    pub(crate) async fn local_score_report(
        &self,
        execution_type: &str,
    ) -> Result<ScoreReport, ScoringError> {
        let identity = self
            .identity
            .get()
            .ok_or_else(|| ScoringError::Unavailable("engine not initialized".to_string()))?;

        let device = DeviceRecord {
            device_id: identity.device_id.clone(),
            platform: identity.platform.clone(),
            execution_types: [identity.execution_type.clone()].into_iter().collect(),
            endpoint: self.config.advertise_endpoint.clone(),
            is_local: true,
        };
        let service = ServiceInfo {
            execution_type: execution_type.to_string(),
            command: Vec::new(),
        };

        let score = self.scoring.score(&device, &service).await?;
        Ok(ScoreReport {
            device_id: identity.device_id.clone(),
            score,
        })
    }

    /// Filter the snapshot per requested execution type, score the
    /// survivors, and keep the strict maximum. A candidate whose score is
    /// unavailable drops out of the round; it does not abort resolution.
    async fn select_candidate(
        &self,
        snapshot: &[DeviceRecord],
        requested: &[ServiceInfo],
    ) -> Option<(Candidate, ServiceInfo)> {
        let mut best: Option<(Candidate, ServiceInfo)> = None;

        for info in requested {
            for device in snapshot {
                if !device.execution_types.contains(&info.execution_type) {
                    continue;
                }

                let score = match self.scoring.score(device, info).await {
                    Ok(score) => score,
                    Err(e) => {
                        warn!(
                            device_id = %device.device_id,
                            error = %e,
                            "dropping candidate: scoring failed"
                        );
                        continue;
                    }
                };

                let challenger = Candidate {
                    device: device.clone(),
                    score,
                };
                let replace = match &best {
                    None => true,
                    Some((incumbent, _)) => prefers(&challenger, incumbent),
                };
                if replace {
                    best = Some((challenger, info.clone()));
                }
            }
        }

        best
    }

    /// Record the placement and launch the command as detached background
    /// work, so the response returns once placement is decided.
    async fn dispatch_local(
        &self,
        service_name: &str,
        matched: &ServiceInfo,
        device_id: &str,
    ) -> ServiceResponse {
        let target = TargetInfo {
            execution_type: matched.execution_type.clone(),
            target: device_id.to_string(),
        };
        let execution_id = self
            .service_registry
            .record_dispatch(service_name, &target)
            .await;

        let executor = Arc::clone(&self.executor);
        let registry = Arc::clone(&self.service_registry);
        let name = service_name.to_string();
        let command = matched.command.clone();
        tokio::spawn(async move {
            registry
                .update_state(execution_id, ExecutionState::Running)
                .await;
            match executor.execute(&name, &command).await {
                Ok(()) => {
                    registry.update_state(execution_id, ExecutionState::Done).await;
                }
                Err(e) => {
                    warn!(service = %name, error = %e, "local execution failed");
                    registry
                        .update_state(execution_id, ExecutionState::Failed)
                        .await;
                }
            }
        });

        ServiceResponse::accepted(service_name, target)
    }

    /// Dispatch to the winning peer over the encrypted client; adapt the
    /// acknowledgement, downgrading any transport failure into a failure
    /// response.
    async fn dispatch_remote(
        &self,
        service_name: &str,
        matched: &ServiceInfo,
        candidate: &Candidate,
    ) -> ServiceResponse {
        let peer_request = ServiceRequest {
            service_name: service_name.to_string(),
            service_info: vec![matched.clone()],
        };

        match self
            .client
            .request_service(&candidate.device.endpoint, &peer_request)
            .await
        {
            Ok(acknowledgement) if acknowledgement.is_failure() => {
                warn!(
                    service = %service_name,
                    peer = %candidate.device.device_id,
                    message = %acknowledgement.message,
                    "peer declined placement"
                );
                ServiceResponse::failure(
                    service_name,
                    format!(
                        "peer {} declined placement: {}",
                        candidate.device.device_id, acknowledgement.message
                    ),
                )
            }
            Ok(acknowledgement) => {
                let target = TargetInfo {
                    execution_type: matched.execution_type.clone(),
                    target: candidate.device.device_id.clone(),
                };
                self.service_registry
                    .record_dispatch(service_name, &target)
                    .await;
                ServiceResponse {
                    message: acknowledgement.message,
                    service_name: service_name.to_string(),
                    remote_target_info: target,
                }
            }
            Err(e) => {
                warn!(
                    service = %service_name,
                    peer = %candidate.device.device_id,
                    error = %e,
                    "remote dispatch failed"
                );
                ServiceResponse::failure(
                    service_name,
                    format!(
                        "remote dispatch to {} failed: {e}",
                        candidate.device.device_id
                    ),
                )
            }
        }
    }
}
