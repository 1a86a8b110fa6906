//! Peer discovery backed by a statically seeded peer table.
//!
//! Peers are seeded from configuration or the `EDGED_PEERS` environment
//! variable and probed over the encrypted score route on every refresh. A
//! reachable peer enters the live table with the device id it reported; a
//! peer that misses enough consecutive probes is evicted until it answers
//! again. Dynamic mesh discovery protocols stay out of scope; this is the
//! static discovery meant for fixed fleets and local development.
//!
//! # Environment Variable Configuration
//!
//! ```bash
//! EDGED_PEERS='[{"endpoint":"http://10.0.0.7:56001","platform":"linux","execution_types":["rpm"]}]'
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::client::PeerClient;
use crate::collaborators::{Discovery, DiscoveryError};
use crate::scoring::ScoreSink;
use crate::types::{DeviceIdentity, DeviceRecord};

/// Environment variable holding the JSON peer seed array.
pub const PEERS_ENV_VAR: &str = "EDGED_PEERS";

/// Consecutive failed probes after which a peer leaves the live table.
const DEFAULT_STALE_AFTER: u32 = 3;

/// A statically configured peer before it has been probed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PeerSeed {
    /// Base URL of the peer's internal orchestration surface.
    pub endpoint: String,
    /// Platform string advertised for the peer.
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Execution types the peer is expected to host.
    pub execution_types: Vec<String>,
}

fn default_platform() -> String {
    "linux".to_string()
}

/// A probed peer in the live table.
struct PeerEntry {
    record: DeviceRecord,
    last_seen: DateTime<Utc>,
    misses: u32,
}

/// Static peer-table discovery.
pub struct PeerTableDiscovery {
    seeds: Vec<PeerSeed>,
    client: Arc<dyn PeerClient>,
    sink: Option<Arc<dyn ScoreSink>>,
    local: RwLock<Option<DeviceRecord>>,
    peers: RwLock<HashMap<String, PeerEntry>>,
    stale_after: u32,
}

impl PeerTableDiscovery {
    /// Create a discovery instance over the given seeds.
    pub fn new(seeds: Vec<PeerSeed>, client: Arc<dyn PeerClient>) -> Self {
        Self {
            seeds,
            client,
            sink: None,
            local: RwLock::new(None),
            peers: RwLock::new(HashMap::new()),
            stale_after: DEFAULT_STALE_AFTER,
        }
    }

    /// Create from the `EDGED_PEERS` environment variable.
    pub fn from_env(client: Arc<dyn PeerClient>) -> Self {
        let seeds = match std::env::var(PEERS_ENV_VAR) {
            Ok(json) => match serde_json::from_str::<Vec<PeerSeed>>(&json) {
                Ok(seeds) => seeds,
                Err(e) => {
                    warn!(error = %e, "failed to parse {PEERS_ENV_VAR} JSON");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self::new(seeds, client)
    }

    /// Forward advertised peer scores into the scoring collaborator.
    pub fn with_score_sink(mut self, sink: Arc<dyn ScoreSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Override the consecutive-miss eviction threshold.
    pub fn with_stale_after(mut self, misses: u32) -> Self {
        self.stale_after = misses.max(1);
        self
    }

    /// Number of live (probed, non-stale) peers.
    pub async fn live_peers(&self) -> usize {
        self.peers.read().await.len()
    }

    async fn probe_seed(&self, seed: &PeerSeed) {
        let Some(probe_type) = seed.execution_types.first() else {
            warn!(endpoint = %seed.endpoint, "peer seed advertises no execution types; skipping");
            return;
        };

        match self.client.query_score(&seed.endpoint, probe_type).await {
            Ok(report) => {
                if let Some(sink) = &self.sink {
                    sink.record_peer_score(&report.device_id, report.score);
                }

                let mut peers = self.peers.write().await;
                let known = peers.contains_key(&seed.endpoint);
                peers.insert(
                    seed.endpoint.clone(),
                    PeerEntry {
                        record: DeviceRecord {
                            device_id: report.device_id.clone(),
                            platform: seed.platform.clone(),
                            execution_types: seed.execution_types.iter().cloned().collect(),
                            endpoint: seed.endpoint.clone(),
                            is_local: false,
                        },
                        last_seen: Utc::now(),
                        misses: 0,
                    },
                );
                if !known {
                    info!(
                        endpoint = %seed.endpoint,
                        device_id = %report.device_id,
                        "peer joined the device table"
                    );
                } else {
                    debug!(endpoint = %seed.endpoint, score = report.score, "peer probed");
                }
            }
            Err(e) => {
                let mut peers = self.peers.write().await;
                if let Some(entry) = peers.get_mut(&seed.endpoint) {
                    entry.misses += 1;
                    debug!(
                        endpoint = %seed.endpoint,
                        misses = entry.misses,
                        error = %e,
                        "peer probe failed"
                    );
                    if entry.misses >= self.stale_after {
                        let evicted = peers.remove(&seed.endpoint);
                        if let Some(entry) = evicted {
                            info!(
                                endpoint = %seed.endpoint,
                                device_id = %entry.record.device_id,
                                last_seen = %entry.last_seen,
                                "evicting stale peer"
                            );
                        }
                    }
                } else {
                    debug!(endpoint = %seed.endpoint, error = %e, "seeded peer not reachable");
                }
            }
        }
    }
}

#[async_trait]
impl Discovery for PeerTableDiscovery {
    async fn register_device(
        &self,
        identity: &DeviceIdentity,
        endpoint: &str,
    ) -> Result<(), DiscoveryError> {
        let record = DeviceRecord {
            device_id: identity.device_id.clone(),
            platform: identity.platform.clone(),
            execution_types: [identity.execution_type.clone()].into_iter().collect(),
            endpoint: endpoint.to_string(),
            is_local: true,
        };
        info!(
            device_id = %record.device_id,
            endpoint = %record.endpoint,
            "local device registered"
        );
        *self.local.write().await = Some(record);
        Ok(())
    }

    async fn snapshot(&self) -> Vec<DeviceRecord> {
        let mut devices = Vec::new();
        if let Some(local) = self.local.read().await.as_ref() {
            devices.push(local.clone());
        }
        let peers = self.peers.read().await;
        devices.extend(peers.values().map(|entry| entry.record.clone()));
        devices
    }

    async fn refresh(&self) -> Result<(), DiscoveryError> {
        let before = self.peers.read().await.len();
        join_all(self.seeds.iter().map(|seed| self.probe_seed(seed))).await;
        let after = self.peers.read().await.len();
        if before != after {
            debug!(before, after, "peer table size changed");
        }
        Ok(())
    }
}
