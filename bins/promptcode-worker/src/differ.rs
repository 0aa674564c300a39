/// Entry Differ - One-to-One Structural Matching
///
/// Matches expected entries against actual entries by canonical key,
/// independent of position. Each actual entry satisfies at most one expected
/// entry; among equal actual entries the earliest ones are consumed first.
///
/// - `missing`: expected entries left unmatched, in expected order
/// - `extra`: actual entries left unmatched, in actual order

use crate::normalizer::Entry;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct EntryDiff {
    pub expected_count: usize,
    pub matched_count: usize,
    pub missing: Vec<Value>,
    pub extra: Vec<Value>,
}

impl EntryDiff {
    pub fn is_exact(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }
}

pub fn diff_entries(expected: &[Entry], actual: &[Entry]) -> EntryDiff {
    // Remaining multiplicity of each actual key
    let mut available: HashMap<&str, usize> = HashMap::new();
    for entry in actual {
        *available.entry(entry.key.as_str()).or_insert(0) += 1;
    }

    // How many actual entries of each key got matched
    let mut consumed: HashMap<&str, usize> = HashMap::new();
    let mut missing = Vec::new();

    for entry in expected {
        match available.get_mut(entry.key.as_str()) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                *consumed.entry(entry.key.as_str()).or_insert(0) += 1;
            }
            _ => missing.push(entry.value.clone()),
        }
    }

    let mut extra = Vec::new();
    for entry in actual {
        match consumed.get_mut(entry.key.as_str()) {
            Some(left) if *left > 0 => *left -= 1,
            _ => extra.push(entry.value.clone()),
        }
    }

    EntryDiff {
        expected_count: expected.len(),
        matched_count: expected.len() - missing.len(),
        missing,
        extra,
    }
}
