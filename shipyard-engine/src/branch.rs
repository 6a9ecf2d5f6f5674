//! Matching a user-supplied branch token against the real remote branches.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchMatch {
    Exact(String),
    Fuzzy(String),
    /// More than one branch matched; the user has to pick.
    Ambiguous(Vec<String>),
    NotFound,
}

impl BranchMatch {
    /// The branch to check out, if the match was unambiguous.
    pub fn branch(&self) -> Option<&str> {
        match self {
            BranchMatch::Exact(name) | BranchMatch::Fuzzy(name) => Some(name),
            BranchMatch::Ambiguous(_) | BranchMatch::NotFound => None,
        }
    }
}

/// Spellings of the input worth trying: as typed, spaces as `_`, as `-`, and removed.
fn variants(input: &str) -> Vec<String> {
    let mut out = vec![
        input.to_string(),
        input.replace(' ', "_"),
        input.replace(' ', "-"),
        input.replace(' ', ""),
    ];
    out.dedup();
    out
}

/// Resolve `input` against `remote_branches`.
///
/// An exact name wins outright. Otherwise every branch containing any variant
/// of the input (case-insensitive, unanchored) is a candidate. The unanchored
/// search can pick up unrelated branches that merely contain the token; that
/// surfaces as `Ambiguous` rather than a wrong guess.
pub fn resolve_branch(input: &str, remote_branches: &[String]) -> BranchMatch {
    let input = input.trim();
    if input.is_empty() {
        return BranchMatch::NotFound;
    }
    if let Some(exact) = remote_branches.iter().find(|b| b.as_str() == input) {
        return BranchMatch::Exact(exact.clone());
    }

    let lowered: Vec<String> = remote_branches.iter().map(|b| b.to_lowercase()).collect();
    let mut candidates = BTreeSet::new();
    for variant in variants(input) {
        let needle = variant.to_lowercase();
        if needle.is_empty() {
            continue;
        }
        for (branch, lower) in remote_branches.iter().zip(&lowered) {
            if lower.contains(&needle) {
                candidates.insert(branch.clone());
            }
        }
    }

    match candidates.len() {
        0 => BranchMatch::NotFound,
        1 => BranchMatch::Fuzzy(candidates.into_iter().next().unwrap_or_default()),
        _ => BranchMatch::Ambiguous(candidates.into_iter().collect()),
    }
}
