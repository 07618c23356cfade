//! CLI definitions for cutover
//!
//! This module contains all CLI argument parsing structures using clap.

use clap::{Parser, Subcommand, ValueEnum};

use crate::domain::SnapshotKind;

#[derive(Parser)]
#[command(
    name = "cutover",
    version,
    about = "Transactional release deployment for multi-site web applications",
    long_about = "Deploys timestamped releases with a compensating rollback.\nApplies ledgered migrations, snapshots files and databases, toggles maintenance per domain."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Deployment configuration file
    #[arg(short, long, global = true, env = "CUTOVER_CONFIG", default_value = "deploy.yaml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy a new release and run the post-deploy hooks
    Deploy,

    /// Return to the previous release and restore its snapshots
    Rollback,

    /// List deployed releases
    Releases {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Apply pending migrations against the current release
    Migrate {
        /// Only this domain
        #[arg(long)]
        domain: Option<String>,

        /// List pending migrations without applying them
        #[arg(long)]
        pending: bool,
    },

    /// Snapshot shared files and databases of the current release
    Backup {
        /// Only this domain
        #[arg(long)]
        domain: Option<String>,

        /// What to snapshot
        #[arg(long, value_enum, default_value = "all")]
        kind: BackupKind,
    },

    /// Restore shared files and databases from a release's snapshots
    Restore {
        /// Only this domain
        #[arg(long)]
        domain: Option<String>,

        /// Release whose snapshots to restore (default: current)
        #[arg(long)]
        release: Option<String>,
    },

    /// Prune old releases and snapshots
    Cleanup {
        /// Releases to keep (default: keep_releases)
        #[arg(long)]
        keep: Option<usize>,
    },

    /// Switch maintenance mode per domain
    Maintenance {
        #[command(subcommand)]
        command: MaintenanceCommands,
    },

    /// Check prerequisites on the hosts and locally
    Check,
}

/// Maintenance subcommands
#[derive(Subcommand)]
pub enum MaintenanceCommands {
    /// Put domains into maintenance
    On {
        /// Only this domain
        #[arg(long)]
        domain: Option<String>,
    },

    /// Take domains out of maintenance
    Off {
        /// Only this domain
        #[arg(long)]
        domain: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackupKind {
    Files,
    Database,
    All,
}

impl BackupKind {
    pub fn kinds(&self) -> Vec<SnapshotKind> {
        match self {
            Self::Files => vec![SnapshotKind::Files],
            Self::Database => vec![SnapshotKind::Database],
            Self::All => SnapshotKind::ALL.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_maintenance_off_with_domain() {
        let cli = Cli::parse_from(["cutover", "--config", "site.yaml", "maintenance", "off", "--domain", "blog"]);
        assert_eq!(cli.config, "site.yaml");
        match cli.command {
            Commands::Maintenance {
                command: MaintenanceCommands::Off { domain },
            } => assert_eq!(domain.as_deref(), Some("blog")),
            _ => panic!("expected maintenance off"),
        }
    }

    #[test]
    fn test_backup_kind_defaults_to_all() {
        let cli = Cli::parse_from(["cutover", "backup"]);
        match cli.command {
            Commands::Backup { kind, domain } => {
                assert_eq!(kind.kinds(), SnapshotKind::ALL.to_vec());
                assert!(domain.is_none());
            }
            _ => panic!("expected backup"),
        }
    }
}
