//! Native command execution.
//!
//! Launches service commands as child processes of the daemon. The engine
//! detaches every call, so waiting on the child here never blocks a
//! request. Sandboxing is out of scope.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::collaborators::{ExecError, Executor};

/// Executor spawning service commands as OS processes.
#[derive(Debug, Default)]
pub struct NativeExecutor;

impl NativeExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for NativeExecutor {
    async fn execute(&self, service_name: &str, command: &[String]) -> Result<(), ExecError> {
        let Some((program, args)) = command.split_first() else {
            return Err(ExecError::EmptyCommand(service_name.to_string()));
        };

        debug!(service = service_name, program = %program, "launching service");

        let mut child = Command::new(program)
            .args(args)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                command: program.clone(),
                source,
            })?;

        let status = child.wait().await.map_err(|source| ExecError::Spawn {
            command: program.clone(),
            source,
        })?;

        if status.success() {
            info!(service = service_name, "service finished");
            Ok(())
        } else {
            Err(ExecError::Exited {
                service: service_name.to_string(),
                status: status.to_string(),
            })
        }
    }
}
