//! Migration domain types
//!
//! Natural version ordering, the pending-set computation and the parsing of
//! ledgers and script artifacts. Everything here is pure; the apply engine
//! in `services::migration_service` performs the I/O.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// The two migration kinds, each with its own history ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationKind {
    /// Script artifacts: one site-CLI invocation per line
    Script,
    /// SQL artifacts run against the domain database
    Sql,
}

impl MigrationKind {
    pub const ALL: [MigrationKind; 2] = [MigrationKind::Script, MigrationKind::Sql];

    /// Base name of the ledger and scratch listing files
    pub fn ledger_name(&self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Sql => "sql",
        }
    }

    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Script => "Script",
            Self::Sql => "SQL",
        }
    }
}

impl fmt::Display for MigrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ledger_name())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

fn chunks(value: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut digits = None;

    for (idx, ch) in value.char_indices() {
        let is_digit = ch.is_ascii_digit();
        match digits {
            Some(prev) if prev != is_digit => {
                out.push(chunk(&value[start..idx], prev));
                start = idx;
            }
            _ => {}
        }
        digits = Some(is_digit);
    }
    if let Some(prev) = digits {
        out.push(chunk(&value[start..], prev));
    }
    out
}

fn chunk(slice: &str, digits: bool) -> Chunk<'_> {
    if digits {
        Chunk::Digits(slice)
    } else {
        Chunk::Text(slice)
    }
}

fn cmp_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Version-aware comparison: digit runs compare numerically, so "9" < "10".
///
/// Leading zeros are not significant, which means "1_a.sql" and "01_a.sql"
/// compare equal.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (ca, cb) = (chunks(a), chunks(b));
    for (x, y) in ca.iter().zip(cb.iter()) {
        let ord = match (x, y) {
            (Chunk::Digits(x), Chunk::Digits(y)) => cmp_digits(x, y),
            (Chunk::Text(x), Chunk::Text(y)) => x.cmp(y),
            (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ca.len().cmp(&cb.len())
}

/// Two distinct artifact names that share a sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousOrder {
    pub first: String,
    pub second: String,
}

/// Sort artifact names naturally, refusing names whose order would be undefined
pub fn sort_natural(mut names: Vec<String>) -> Result<Vec<String>, AmbiguousOrder> {
    names.sort_by(|a, b| natural_cmp(a, b).then_with(|| a.cmp(b)));
    names.dedup();
    for pair in names.windows(2) {
        if natural_cmp(&pair[0], &pair[1]) == Ordering::Equal {
            return Err(AmbiguousOrder {
                first: pair[0].clone(),
                second: pair[1].clone(),
            });
        }
    }
    Ok(names)
}

/// pending = available - history, in the order of `available`
pub fn pending(available: &[String], history: &[String]) -> Vec<String> {
    let applied: HashSet<&str> = history.iter().map(String::as_str).collect();
    available
        .iter()
        .filter(|name| !applied.contains(name.as_str()))
        .cloned()
        .collect()
}

/// Parse a history ledger into identifiers, treating it as a set.
///
/// Entries that hold an absolute artifact path below `legacy_prefix` are
/// reduced to their relative identifier.
pub fn parse_ledger(content: &str, legacy_prefix: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let id = line
            .strip_prefix(legacy_prefix)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(line);
        if seen.insert(id.to_string()) {
            entries.push(id.to_string());
        }
    }
    entries
}

/// Commands of a script artifact: non-blank lines that are not comments
pub fn parse_script(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Outcome of one (domain, kind) pass of the apply engine
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub domain: String,
    pub kind: MigrationKind,
    /// Artifacts applied and ledgered during this pass, in order
    pub applied: Vec<String>,
    /// Artifacts skipped because the ledger already held them
    pub skipped: usize,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}
