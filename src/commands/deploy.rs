//! Deploy command
//!
//! Runs one release transaction. A failure has already been rolled back
//! (or reported as not rollback-able) by the time it reaches here.

use anyhow::{Context, Result};
use tracing::error;

use crate::error::{DeployError, TransactionError};

use super::release_service;

pub async fn execute(config_path: &str) -> Result<()> {
    let service = release_service(config_path)?;

    match service.deploy().await {
        Ok(_) => Ok(()),
        Err(DeployError::Transaction(failure)) => {
            let TransactionError::StepFailed { release, rollback, .. } = &failure;
            if let Some(reason) = &rollback.terminal {
                error!(release = %release, "Manual intervention needed: {}", reason);
            }
            for message in &rollback.failures {
                error!(release = %release, "Compensation failed: {}", message);
            }
            Err(failure.into())
        }
        Err(e) => Err(e).context("Deployment did not start"),
    }
}
