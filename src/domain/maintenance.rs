//! Maintenance mode mechanisms
//!
//! A domain is taken offline either through the read-only module or
//! through the core maintenance flag. Which one applies is discovered at
//! runtime from the domain's enabled modules.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Mechanism used to put a domain into maintenance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MaintenanceMechanism {
    /// Read-only module: content stays visible, writes are refused
    #[serde(rename = "readonly")]
    ReadOnly,
    /// Full maintenance page
    #[default]
    #[serde(rename = "full")]
    FullMaintenance,
}

fn readonly_module() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Read Only Mode\s*\(readonlymode\)").expect("readonly pattern should compile")
    })
}

impl MaintenanceMechanism {
    /// Site variable toggled to switch maintenance on or off
    pub fn variable_key(&self) -> &'static str {
        match self {
            Self::ReadOnly => "site_readonly",
            Self::FullMaintenance => "maintenance_mode",
        }
    }

    /// Select the mechanism from the site CLI's enabled-module listing
    pub fn from_module_status(output: &str) -> Self {
        if readonly_module().is_match(output) {
            Self::ReadOnly
        } else {
            Self::FullMaintenance
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::FullMaintenance => "full maintenance",
        }
    }
}

impl fmt::Display for MaintenanceMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
