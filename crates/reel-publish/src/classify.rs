//! Classification of publish failures into transient and hard.

use std::collections::HashSet;

use crate::error::PublishError;

/// Graph error code for "media not ready".
pub const DEFAULT_TRANSIENT_CODE: i64 = 9007;
/// Graph error subcode for "media not ready".
pub const DEFAULT_TRANSIENT_SUBCODE: i64 = 2207027;

/// Platform error codes and subcodes that mean "try publishing again later".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientErrorTable {
    pub codes: HashSet<i64>,
    pub subcodes: HashSet<i64>,
}

impl Default for TransientErrorTable {
    fn default() -> Self {
        Self {
            codes: HashSet::from([DEFAULT_TRANSIENT_CODE]),
            subcodes: HashSet::from([DEFAULT_TRANSIENT_SUBCODE]),
        }
    }
}

impl TransientErrorTable {
    /// Create a table from comma-separated `REELS_TRANSIENT_CODES` and
    /// `REELS_TRANSIENT_SUBCODES`, falling back to the defaults per list.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            codes: parse_list(std::env::var("REELS_TRANSIENT_CODES").ok().as_deref())
                .unwrap_or(defaults.codes),
            subcodes: parse_list(std::env::var("REELS_TRANSIENT_SUBCODES").ok().as_deref())
                .unwrap_or(defaults.subcodes),
        }
    }

    /// Check if `err` is a platform rejection listed in the table.
    ///
    /// Transport failures are not in scope here; they are hard failures for
    /// a publish attempt.
    pub fn is_transient(&self, err: &PublishError) -> bool {
        match err {
            PublishError::Api { code, subcode, .. } => {
                code.is_some_and(|c| self.codes.contains(&c))
                    || subcode.is_some_and(|s| self.subcodes.contains(&s))
            }
            _ => false,
        }
    }
}

fn parse_list(raw: Option<&str>) -> Option<HashSet<i64>> {
    let raw = raw?;
    let parsed: HashSet<i64> = raw
        .split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect();
    if parsed.is_empty() {
        None
    } else {
        Some(parsed)
    }
}
