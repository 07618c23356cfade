//! Infrastructure layer - external I/O adapters
//!
//! This module contains all code that interacts with external systems:
//! - Command execution on the deployment hosts (local shell or ssh)
//! - The site-management CLI
//! - Git checkouts of release code

pub mod executor;
pub mod shell;
pub mod site_cli;
pub mod source;

// Re-export commonly used types
pub use executor::{CommandOutput, LocalExecutor, Remote, RemoteExecutor, SshExecutor};
pub use site_cli::SiteCli;
pub use source::{DependencyReport, GitCheckout, SourceStrategy};
