//! Staged resource ledger
//!
//! An insertion-ordered keyed store of resources being edited, plus the
//! per-identity apply states. The baseline of an entry is written once, when
//! the entry is first added; later edits only touch `current`.

use crate::diff;
use crate::edit::{Edit, apply_edits};
use crate::session::LoadedSession;
use crate::types::{ApplyState, LedgerEntry, ResourceId, ResourceKind, StagedResource};
use crate::validate::ValidationError;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Pending change counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeCount {
    pub total: usize,
    pub by_kind: BTreeMap<ResourceKind, usize>,
}

impl ChangeCount {
    pub fn of(&self, kind: ResourceKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }
}

/// In-memory store of staged resources
#[derive(Debug, Default)]
pub struct Ledger {
    entries: Vec<StagedResource>,
    index: HashMap<ResourceId, usize>,
    pub(crate) apply_states: HashMap<ResourceId, ApplyState>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource if its identity is new
    ///
    /// The resource's `original` becomes the baseline. Returns `false` and
    /// leaves the existing entry untouched when the identity is present.
    pub fn upsert(&mut self, resource: impl Into<StagedResource>) -> bool {
        let resource = resource.into();
        let id = resource.id();
        if self.index.contains_key(&id) {
            log::debug!("{id} already staged, keeping existing baseline");
            return false;
        }

        log::debug!("staging {id}");
        self.index.insert(id, self.entries.len());
        self.entries.push(resource);
        true
    }

    /// Merge edits into the live values of an entry
    ///
    /// Returns `Ok(false)` when the identity is not staged. Edits are
    /// validated as a whole; a rejected batch leaves the entry unchanged.
    pub fn update(&mut self, id: &ResourceId, edits: Vec<Edit>) -> Result<bool, ValidationError> {
        let Some(&pos) = self.index.get(id) else {
            log::debug!("ignoring update for unstaged {id}");
            return Ok(false);
        };

        apply_edits(&mut self.entries[pos], edits)?;
        log::debug!("updated {id}");
        Ok(true)
    }

    /// Delete an entry; its apply state is kept
    pub fn remove(&mut self, id: &ResourceId) -> Option<StagedResource> {
        let pos = self.index.remove(id)?;
        let removed = self.entries.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        log::debug!("unstaged {id}");
        Some(removed)
    }

    /// Empty the ledger and every apply state
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.apply_states.clear();
    }

    /// Replace the contents with a loaded session in one step
    pub fn load(&mut self, loaded: &LoadedSession) {
        self.clear();
        for resource in &loaded.entries {
            self.upsert(resource.clone());
        }
    }

    /// All entries in insertion order
    pub fn list(&self) -> Vec<LedgerEntry<'_>> {
        self.entries
            .iter()
            .map(|resource| LedgerEntry {
                resource,
                is_modified: diff::is_modified(resource),
            })
            .collect()
    }

    pub fn get(&self, id: &ResourceId) -> Option<&StagedResource> {
        self.index.get(id).map(|&pos| &self.entries[pos])
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    /// Insertion position, used to break ordering ties
    pub fn position(&self, id: &ResourceId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identities of modified entries in insertion order
    pub fn pending(&self) -> Vec<ResourceId> {
        self.entries
            .iter()
            .filter(|r| diff::is_modified(r))
            .map(StagedResource::id)
            .collect()
    }

    /// Count modified entries, in total and per kind
    pub fn change_count(&self) -> ChangeCount {
        let mut count = ChangeCount::default();
        for entry in self.list().into_iter().filter(|e| e.is_modified) {
            count.total += 1;
            *count.by_kind.entry(entry.resource.kind()).or_default() += 1;
        }
        count
    }

    pub fn apply_state(&self, id: &ResourceId) -> Option<&ApplyState> {
        self.apply_states.get(id)
    }

    pub fn apply_states(&self) -> &HashMap<ResourceId, ApplyState> {
        &self.apply_states
    }
}
