//! Shell quoting for command lines sent to hosts

use std::path::Path;

use crate::domain::{Privilege, RemoteCommand};

fn is_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || b"-_./=:@%+,".contains(&byte)
}

/// Quote a word for POSIX sh; plain words pass through unchanged
pub fn quote(value: &str) -> String {
    if !value.is_empty() && value.bytes().all(is_safe) {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

pub fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

/// The line actually handed to the host shell, privilege applied
pub fn wrap(command: &RemoteCommand) -> String {
    match &command.privilege {
        Privilege::User => command.line.clone(),
        Privilege::Sudo { as_user: None } => format!("sudo -n sh -c {}", quote(&command.line)),
        Privilege::Sudo {
            as_user: Some(user),
        } => format!("sudo -n -u {} sh -c {}", quote(user), quote(&command.line)),
    }
}
