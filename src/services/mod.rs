//! Services layer - orchestration logic
//!
//! This module coordinates between domain logic and infrastructure.
//! Services use infrastructure adapters to perform I/O operations.

pub mod backup_service;
pub mod maintenance_service;
pub mod migration_service;
pub mod release_catalog;
pub mod release_service;
pub mod site_service;
pub mod transaction;

// Re-export commonly used types
pub use backup_service::BackupService;
pub use maintenance_service::MaintenanceService;
pub use migration_service::MigrationService;
pub use release_catalog::ReleaseCatalog;
pub use release_service::ReleaseService;
pub use site_service::SiteService;
pub use transaction::{StepRunner, TransactionRunner};

use futures::future::join_all;
use std::fmt::Display;
use std::future::Future;
use tracing::warn;

use crate::config::DomainConfig;

/// Run one independent operation per domain concurrently.
///
/// Every domain runs to completion; each failure is logged with its domain
/// and the first one (in domain order) is returned.
pub(crate) async fn for_each_domain<'a, T, E, F, Fut>(
    domains: &'a [DomainConfig],
    operation: F,
) -> Result<Vec<T>, E>
where
    F: Fn(&'a DomainConfig) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let results = join_all(domains.iter().map(operation)).await;

    let mut values = Vec::with_capacity(results.len());
    let mut first_error = None;
    for (domain, result) in domains.iter().zip(results) {
        match result {
            Ok(value) => values.push(value),
            Err(e) => {
                warn!(domain = %domain.name, error = %e, "domain operation failed");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(values),
    }
}
