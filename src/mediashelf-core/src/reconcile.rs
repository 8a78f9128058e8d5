//! Incremental refresh: patch a displayed tree so it matches a fresh scan
//! while keeping the entries (and therefore the ids) of surviving nodes.

use crate::node::{LibraryTree, NodeId};
use std::collections::HashSet;
use std::fmt;

/// Structural and content differences applied by [`reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
    pub renamed: Vec<NodeId>,
    /// Kind, metadata or resource location changed.
    pub updated: Vec<NodeId>,
    /// Node now lives under a different parent.
    pub moved: Vec<NodeId>,
    /// Parents whose children were only reordered.
    pub reordered: Vec<NodeId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.renamed.is_empty()
            && self.updated.is_empty()
            && self.moved.is_empty()
            && self.reordered.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len()
            + self.removed.len()
            + self.renamed.len()
            + self.updated.len()
            + self.moved.len()
            + self.reordered.len()
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} removed, {} renamed, {} updated, {} moved, {} reordered",
            self.added.len(),
            self.removed.len(),
            self.renamed.len(),
            self.updated.len(),
            self.moved.len(),
            self.reordered.len()
        )
    }
}

/// Brings `existing` up to date with `scanned`.
///
/// Returns `None` without touching `existing` when the two trees have
/// different roots; callers then replace the tree wholesale. Otherwise the
/// patched tree compares equal to `scanned`, and every node present in both
/// keeps its original entry.
pub fn reconcile(existing: &mut LibraryTree, scanned: &LibraryTree) -> Option<ChangeSet> {
    if existing.root_id() != scanned.root_id() {
        return None;
    }

    let mut changes = ChangeSet::default();

    // Stale nodes go one by one: a removed folder may have had children that
    // survive elsewhere in the scan.
    let mut stale: Vec<NodeId> = existing
        .ids()
        .filter(|id| !scanned.contains(id))
        .cloned()
        .collect();
    stale.sort();
    for id in &stale {
        existing.remove_node(id);
    }
    changes.removed = stale;

    let mut added = HashSet::new();
    for fresh in scanned.depth_first() {
        match existing.get_mut(fresh.id()) {
            Some(current) => {
                if current.name() != fresh.name() {
                    current.set_name(fresh.name());
                    changes.renamed.push(fresh.id().clone());
                }
                let content_changed = current.kind() != fresh.kind()
                    || current.metadata_map() != fresh.metadata_map()
                    || current.resource_location() != fresh.resource_location();
                if content_changed {
                    current.set_kind(fresh.kind());
                    current.replace_metadata(fresh.metadata_map().clone());
                    current.set_resource_location(fresh.resource_location().map(str::to_owned));
                    changes.updated.push(fresh.id().clone());
                }
            }
            None => {
                existing.insert_detached(fresh.detached());
                added.insert(fresh.id().clone());
                changes.added.push(fresh.id().clone());
            }
        }
    }

    // Every surviving node is in the scan, so rewriting links from the scan
    // also clears references to the stale nodes removed above.
    for fresh in scanned.depth_first() {
        let Some(current) = existing.get_mut(fresh.id()) else {
            continue;
        };
        let is_new = added.contains(fresh.id());
        if !is_new && current.parent() != fresh.parent() {
            changes.moved.push(fresh.id().clone());
        }
        if !is_new && current.children() != fresh.children() && same_members(current.children(), fresh.children()) {
            changes.reordered.push(fresh.id().clone());
        }
        current.set_parent(fresh.parent().cloned());
        current.set_children(fresh.children().to_vec());
    }

    Some(changes)
}

fn same_members(a: &[NodeId], b: &[NodeId]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let a: HashSet<&NodeId> = a.iter().collect();
    b.iter().all(|id| a.contains(id))
}
