//! Engine builder.
//!
//! The composition root constructs each collaborator once and registers it
//! here; `build()` validates the set and assembles the engine. A missing
//! collaborator is a typed error, never a silently partial engine. This is
//! a long-running infrastructure daemon, and the hosting process decides
//! the shutdown policy.

use std::sync::Arc;

use crate::client::PeerClient;
use crate::collaborators::{Discovery, Executor, Scoring, ServiceRegistry, Watcher};
use crate::diagnostics::Diagnostics;

use super::{EngineConfig, OrchestrationEngine};

/// Errors from engine construction.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),
}

/// Builder collecting the engine's collaborators.
///
/// Each setter registers exactly one instance; setting the same collaborator
/// twice keeps the last one. Diagnostics is the only optional collaborator
/// and defaults to a fresh instance.
#[derive(Default)]
pub struct OrchestrationBuilder {
    config: EngineConfig,
    watcher: Option<Arc<dyn Watcher>>,
    discovery: Option<Arc<dyn Discovery>>,
    scoring: Option<Arc<dyn Scoring>>,
    service_registry: Option<Arc<dyn ServiceRegistry>>,
    executor: Option<Arc<dyn Executor>>,
    client: Option<Arc<dyn PeerClient>>,
    diagnostics: Option<Arc<Diagnostics>>,
}

impl OrchestrationBuilder {
    /// Create a builder with the given engine configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn set_watcher(mut self, watcher: Arc<dyn Watcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn set_discovery(mut self, discovery: Arc<dyn Discovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn set_scoring(mut self, scoring: Arc<dyn Scoring>) -> Self {
        self.scoring = Some(scoring);
        self
    }

    pub fn set_service_registry(mut self, registry: Arc<dyn ServiceRegistry>) -> Self {
        self.service_registry = Some(registry);
        self
    }

    pub fn set_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn set_client(mut self, client: Arc<dyn PeerClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Override the default diagnostics collaborator.
    pub fn set_diagnostics(mut self, diagnostics: Arc<Diagnostics>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Validate the collaborator set and assemble the engine.
    pub fn build(self) -> Result<OrchestrationEngine, BuildError> {
        let watcher = self
            .watcher
            .ok_or(BuildError::MissingCollaborator("watcher"))?;
        let discovery = self
            .discovery
            .ok_or(BuildError::MissingCollaborator("discovery"))?;
        let scoring = self
            .scoring
            .ok_or(BuildError::MissingCollaborator("scoring"))?;
        let service_registry = self
            .service_registry
            .ok_or(BuildError::MissingCollaborator("service registry"))?;
        let executor = self
            .executor
            .ok_or(BuildError::MissingCollaborator("executor"))?;
        let client = self
            .client
            .ok_or(BuildError::MissingCollaborator("client"))?;
        let diagnostics = self.diagnostics.unwrap_or_default();

        Ok(OrchestrationEngine::from_parts(
            self.config,
            watcher,
            discovery,
            scoring,
            service_registry,
            executor,
            client,
            diagnostics,
        ))
    }
}
