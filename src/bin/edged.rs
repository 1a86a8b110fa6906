//! edged: edge orchestration daemon
//!
//! Composition root for the orchestration engine. Constructs each
//! collaborator once, hands them to the builder, starts the engine, and
//! serves the internal peer-facing surface until interrupted. Any failure
//! during that chain terminates startup with a non-zero exit; a partially
//! constructed daemon never runs.
//!
//! ## Configuration
//! - First CLI argument: optional path to a YAML configuration file
//! - `EDGED_CONFIG`: alternative configuration file path
//! - `EDGED_LOG`: tracing filter (default: info)
//! - `EDGED__*`: individual configuration overrides

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use edged::cipher::AesGcmCipher;
use edged::client::RestClient;
use edged::config::{Config, LOG_ENV_VAR};
use edged::diagnostics::Diagnostics;
use edged::discovery::PeerTableDiscovery;
use edged::engine::OrchestrationBuilder;
use edged::executor::NativeExecutor;
use edged::registry::InMemoryServiceRegistry;
use edged::scoring::ResourceScoring;
use edged::server;
use edged::watcher::DirWatcher;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting edged orchestration daemon");

    let cipher = Arc::new(AesGcmCipher::from_key_file(&config.cipher_key_file)?);
    let client = Arc::new(RestClient::new(cipher.clone(), config.request_timeout())?);
    let scoring = Arc::new(ResourceScoring::new());
    let discovery = Arc::new(
        PeerTableDiscovery::new(config.peers.clone(), client.clone())
            .with_score_sink(scoring.clone()),
    );

    let engine = Arc::new(
        OrchestrationBuilder::new(config.engine_config())
            .set_watcher(Arc::new(DirWatcher::new(&config.app_config_dir)))
            .set_discovery(discovery)
            .set_scoring(scoring)
            .set_service_registry(Arc::new(InMemoryServiceRegistry::new()))
            .set_executor(Arc::new(NativeExecutor::new()))
            .set_client(client)
            .set_diagnostics(Arc::new(Diagnostics::new()))
            .build()?,
    );

    engine
        .start(
            &config.identity_file,
            &config.platform,
            &config.execution_type,
        )
        .await?;

    let internal_api = engine.internal_api().await?;
    let internal_surface = tokio::spawn(server::serve(
        internal_api,
        cipher,
        config.internal_port,
    ));

    info!("edged running, press Ctrl+C to exit");

    tokio::select! {
        result = internal_surface => {
            match result {
                Ok(Ok(())) => error!("internal surface stopped unexpectedly"),
                Ok(Err(e)) => error!("internal surface failed: {}", e),
                Err(e) => error!("internal surface task failed: {}", e),
            }
            return Err("internal surface terminated".into());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    Ok(())
}
