//! Domain layer - pure business logic
//!
//! This module contains business logic with no external I/O.
//! Types and functions here can be unit tested without mocking.

pub mod backup;
pub mod command;
pub mod maintenance;
pub mod migration;
pub mod release;
pub mod transaction;

// Re-export commonly used types
pub use backup::{RestoreReport, SnapshotKind};
pub use command::{Privilege, RemoteCommand};
pub use maintenance::MaintenanceMechanism;
pub use migration::{MigrationKind, MigrationReport};
pub use release::{Release, ReleaseId, ReleasePhase, ReleaseStep, StepResult};
pub use transaction::{Compensation, RollbackReport, StepPolicy, TransactionPlan};
