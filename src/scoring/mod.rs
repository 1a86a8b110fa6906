//! Resource-based candidate scoring.
//!
//! The local device's score derives from a load sample taken off the
//! request path; remote devices are scored from the figures they advertised
//! during the last discovery refresh. Between refreshes every score is
//! fixed, so repeated resolutions against one snapshot stay deterministic.
//! The formula itself is a heuristic, not a contract.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::collaborators::{Scoring, ScoringError};
use crate::types::{DeviceRecord, ServiceInfo};

/// Score assumed when the platform exposes no load figures.
const FALLBACK_LOCAL_SCORE: f64 = 50.0;

/// Receiver for peer scores learned during discovery refresh.
///
/// The composition root hands the same instance to discovery (as a sink)
/// and to the engine (as the scoring collaborator).
pub trait ScoreSink: Send + Sync {
    fn record_peer_score(&self, device_id: &str, score: f64);
}

/// Scoring collaborator backed by local load sampling and advertised peer
/// scores.
pub struct ResourceScoring {
    local: RwLock<f64>,
    peers: RwLock<HashMap<String, f64>>,
}

impl ResourceScoring {
    pub fn new() -> Self {
        Self {
            local: RwLock::new(sample_local_score()),
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// Current local score.
    pub fn local_score(&self) -> f64 {
        *self.local.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ResourceScoring {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scoring for ResourceScoring {
    async fn score(
        &self,
        device: &DeviceRecord,
        _service: &ServiceInfo,
    ) -> Result<f64, ScoringError> {
        if device.is_local {
            return Ok(self.local_score());
        }
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&device.device_id)
            .copied()
            .ok_or_else(|| ScoringError::Unknown(device.device_id.clone()))
    }

    async fn refresh(&self) -> Result<(), ScoringError> {
        let sampled = sample_local_score();
        *self.local.write().unwrap_or_else(PoisonError::into_inner) = sampled;
        debug!(score = sampled, "local score refreshed");
        Ok(())
    }
}

impl ScoreSink for ResourceScoring {
    fn record_peer_score(&self, device_id: &str, score: f64) {
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device_id.to_string(), score);
    }
}

/// Sample this device's fitness from the 1-minute load average, normalized
/// per core. An idle device scores near 100, a saturated one approaches 0.
fn sample_local_score() -> f64 {
    let Some(load) = read_loadavg() else {
        return FALLBACK_LOCAL_SCORE;
    };
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1) as f64;
    100.0 / (1.0 + load / cores)
}

fn read_loadavg() -> Option<f64> {
    let contents = std::fs::read_to_string("/proc/loadavg").ok()?;
    contents.split_whitespace().next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn local_device() -> DeviceRecord {
        DeviceRecord {
            device_id: "local".to_string(),
            platform: "linux".to_string(),
            execution_types: HashSet::from(["rpm".to_string()]),
            endpoint: "http://127.0.0.1:56001".to_string(),
            is_local: true,
        }
    }

    fn peer_device(id: &str) -> DeviceRecord {
        DeviceRecord {
            device_id: id.to_string(),
            platform: "linux".to_string(),
            execution_types: HashSet::from(["rpm".to_string()]),
            endpoint: format!("http://{id}:56001"),
            is_local: false,
        }
    }

    fn any_service() -> ServiceInfo {
        ServiceInfo::parse_command("rpm", "run")
    }

    #[tokio::test]
    async fn test_local_score_is_positive_and_stable_between_refreshes() {
        let scoring = ResourceScoring::new();
        let first = scoring.score(&local_device(), &any_service()).await.unwrap();
        let second = scoring.score(&local_device(), &any_service()).await.unwrap();
        assert!(first > 0.0 && first <= 100.0);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unknown_peer_score_errors() {
        let scoring = ResourceScoring::new();
        let result = scoring.score(&peer_device("peer-a"), &any_service()).await;
        assert!(matches!(result, Err(ScoringError::Unknown(id)) if id == "peer-a"));
    }

    #[tokio::test]
    async fn test_recorded_peer_score_is_returned() {
        let scoring = ResourceScoring::new();
        scoring.record_peer_score("peer-a", 72.5);
        let score = scoring.score(&peer_device("peer-a"), &any_service()).await.unwrap();
        assert_eq!(score, 72.5);
    }

    #[tokio::test]
    async fn test_refresh_resamples_local() {
        let scoring = ResourceScoring::new();
        scoring.refresh().await.unwrap();
        assert!(scoring.local_score() > 0.0);
    }
}
