// ⚖️ Reconciliation Engine - Merge local and remote record sets
//
// Policy: identity is `text`. Remote wins on collision, union otherwise.
//
//   merged = local (in order, collisions replaced in place) ++ remote-only additions
//
// Local-only records are never dropped. Inputs are never mutated.

use crate::quote::{Quote, RecordSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// MERGE RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overwrite {
    pub text: String,
    pub old: Quote,
    pub new: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResult {
    /// The new authoritative set
    pub merged: RecordSet,

    /// Records introduced by this merge, in remote order
    pub additions: Vec<Quote>,

    /// Local records whose category or id were replaced by the remote copy
    pub overwrites: Vec<Overwrite>,

    pub had_changes: bool,

    pub reconciled_at: DateTime<Utc>,
}

impl MergeResult {
    pub fn summary(&self) -> String {
        if !self.had_changes {
            return format!("Quotes up to date ({} total)", self.merged.len());
        }

        format!(
            "Synced with server: {} new, {} updated ({} total)",
            self.additions.len(),
            self.overwrites.len(),
            self.merged.len()
        )
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct ReconciliationEngine;

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine
    }

    /// Merge `remote` into `local`.
    ///
    /// Example:
    /// ```
    /// use quote_sync::{Quote, RecordSet, ReconciliationEngine};
    ///
    /// let local = RecordSet::from_quotes(vec![Quote::local("Be kind", "A").unwrap()]);
    /// let remote = RecordSet::from_quotes(vec![Quote::remote("Be kind", "B", Some(7)).unwrap()]);
    ///
    /// let result = ReconciliationEngine::new().reconcile(&local, &remote);
    /// assert_eq!(result.merged.get("Be kind").unwrap().category(), "B");
    /// assert_eq!(result.overwrites.len(), 1);
    /// ```
    pub fn reconcile(&self, local: &RecordSet, remote: &RecordSet) -> MergeResult {
        let remote_by_text: HashMap<&str, &Quote> =
            remote.iter().map(|q| (q.text(), q)).collect();

        let mut merged = Vec::with_capacity(local.len() + remote.len());
        let mut overwrites = Vec::new();

        // Pass 1: local order, remote copy replaces on collision
        for existing in local {
            match remote_by_text.get(existing.text()) {
                Some(incoming) => {
                    if existing.differs_from(incoming) {
                        overwrites.push(Overwrite {
                            text: existing.text().to_string(),
                            old: existing.clone(),
                            new: (*incoming).clone(),
                        });
                    }
                    merged.push((*incoming).clone());
                }
                None => merged.push(existing.clone()),
            }
        }

        // Pass 2: remote-only records appended in remote order
        let additions: Vec<Quote> = remote
            .iter()
            .filter(|q| !local.contains(q.text()))
            .cloned()
            .collect();
        merged.extend(additions.iter().cloned());

        let had_changes = !additions.is_empty() || !overwrites.is_empty();

        MergeResult {
            merged: RecordSet::from_quotes(merged),
            additions,
            overwrites,
            had_changes,
            reconciled_at: Utc::now(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
