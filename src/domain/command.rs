//! Command values handed to the remote executor

use std::fmt;

/// How a command is run on the remote host
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Privilege {
    /// As the connecting user
    #[default]
    User,
    /// Through sudo, optionally as a specific user
    Sudo { as_user: Option<String> },
}

/// A shell command line plus the privilege it runs with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub line: String,
    pub privilege: Privilege,
}

impl RemoteCommand {
    pub fn new(line: impl Into<String>, privilege: Privilege) -> Self {
        Self {
            line: line.into(),
            privilege,
        }
    }

    pub fn user(line: impl Into<String>) -> Self {
        Self::new(line, Privilege::User)
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.privilege {
            Privilege::User => write!(f, "{}", self.line),
            Privilege::Sudo { as_user: None } => write!(f, "sudo {}", self.line),
            Privilege::Sudo { as_user: Some(user) } => write!(f, "sudo -u {} {}", user, self.line),
        }
    }
}
