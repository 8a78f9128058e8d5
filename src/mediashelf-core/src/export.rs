//! Serialized subtree snapshots used for drag-and-drop style exchange.

use crate::node::{LibraryNode, LibraryTree, NodeId, NodeKind, TreeError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// One node of an exported subtree, children nested in source order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub resource_location: Option<String>,
    #[serde(default)]
    pub children: Vec<NodeRecord>,
}

impl NodeRecord {
    /// Copies the subtree rooted at `id` out of `tree`.
    pub fn from_tree(tree: &LibraryTree, id: &NodeId) -> Option<Self> {
        let node = tree.get(id)?;
        let children = node
            .children()
            .iter()
            .filter_map(|child| Self::from_tree(tree, child))
            .collect();
        Some(Self {
            id: node.id().clone(),
            name: node.name().to_string(),
            kind: node.kind(),
            metadata: node.metadata_map().clone(),
            resource_location: node.resource_location().map(str::to_owned),
            children,
        })
    }

    /// Rebuilds a tree equal to the one this record was taken from.
    pub fn into_tree(self) -> Result<LibraryTree, TreeError> {
        let NodeRecord {
            id,
            name,
            kind,
            metadata,
            resource_location,
            children,
        } = self;
        let mut tree = LibraryTree::new(node_from_parts(id.clone(), name, kind, metadata, resource_location));
        for child in children {
            attach(&mut tree, &id, child)?;
        }
        Ok(tree)
    }

    /// Resource locations of this record and its descendants, depth first.
    pub fn resource_locations(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_locations(&mut out);
        out
    }

    fn collect_locations<'a>(&'a self, out: &mut Vec<&'a str>) {
        if let Some(location) = self.resource_location.as_deref() {
            out.push(location);
        }
        for child in &self.children {
            child.collect_locations(out);
        }
    }
}

fn node_from_parts(
    id: NodeId,
    name: String,
    kind: NodeKind,
    metadata: BTreeMap<String, String>,
    resource_location: Option<String>,
) -> LibraryNode {
    let mut node = LibraryNode::new(id, name, kind);
    for (key, value) in metadata {
        node.set_metadata(key, value);
    }
    node.set_resource_location(resource_location);
    node
}

fn attach(tree: &mut LibraryTree, parent: &NodeId, record: NodeRecord) -> Result<(), TreeError> {
    let NodeRecord {
        id,
        name,
        kind,
        metadata,
        resource_location,
        children,
    } = record;
    tree.add_child(
        parent,
        node_from_parts(id.clone(), name, kind, metadata, resource_location),
    )?;
    for child in children {
        attach(tree, &id, child)?;
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to encode export snapshot: {0}")]
    Encode(serde_json::Error),
    #[error("failed to decode export snapshot: {0}")]
    Decode(serde_json::Error),
}

/// A consistent copy of selected subtrees, taken from one tree generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSnapshot {
    pub media_type: String,
    pub generation: u64,
    pub nodes: Vec<NodeRecord>,
}

impl ExportSnapshot {
    pub fn to_json(&self) -> Result<String, ExportError> {
        serde_json::to_string_pretty(self).map_err(ExportError::Encode)
    }

    pub fn from_json(json: &str) -> Result<Self, ExportError> {
        serde_json::from_str(json).map_err(ExportError::Decode)
    }

    /// Flat list of locations for drop targets that only accept files/URLs.
    pub fn resource_locations(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .flat_map(|record| record.resource_locations())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> LibraryTree {
        let mut tree = LibraryTree::new(LibraryNode::container("music", "Music"));
        let root = NodeId::new("music");
        tree.add_child(&root, LibraryNode::container("artist:Nina", "Nina"))
            .unwrap();
        tree.add_child(
            &NodeId::new("artist:Nina"),
            LibraryNode::container("album:Nina::Blue", "Blue").with_metadata("year", "1971"),
        )
        .unwrap();
        for (n, title) in ["Intro", "Outro"].iter().enumerate() {
            tree.add_child(
                &NodeId::new("album:Nina::Blue"),
                LibraryNode::item(format!("/music/{title}.flac"), *title)
                    .with_metadata("track_number", (n + 1).to_string())
                    .with_resource_location(format!("file:///music/{title}.flac")),
            )
            .unwrap();
        }
        tree.add_child(&root, LibraryNode::container("empty", "Empty"))
            .unwrap();
        tree
    }

    #[test]
    fn round_trip_preserves_structure_and_metadata() {
        let tree = library();
        let record = NodeRecord::from_tree(&tree, &NodeId::new("artist:Nina")).unwrap();
        let snapshot = ExportSnapshot {
            media_type: "music".into(),
            generation: 3,
            nodes: vec![record],
        };

        let json = snapshot.to_json().unwrap();
        let decoded = ExportSnapshot::from_json(&json).unwrap();
        assert_eq!(decoded, snapshot);

        let rebuilt = decoded.nodes.into_iter().next().unwrap().into_tree().unwrap();
        assert_eq!(rebuilt, tree.subtree(&NodeId::new("artist:Nina")).unwrap());
    }

    #[test]
    fn leaf_without_children_round_trips() {
        let tree = library();
        let record = NodeRecord::from_tree(&tree, &NodeId::new("empty")).unwrap();
        assert!(record.children.is_empty());
        let rebuilt = record.into_tree().unwrap();
        assert_eq!(rebuilt, tree.subtree(&NodeId::new("empty")).unwrap());
    }

    #[test]
    fn resource_locations_follow_tree_order() {
        let tree = library();
        let snapshot = ExportSnapshot {
            media_type: "music".into(),
            generation: 1,
            nodes: vec![NodeRecord::from_tree(&tree, &NodeId::new("music")).unwrap()],
        };
        assert_eq!(
            snapshot.resource_locations(),
            vec!["file:///music/Intro.flac", "file:///music/Outro.flac"]
        );
    }

    #[test]
    fn duplicate_ids_in_payload_are_rejected() {
        let json = r#"{"id":"a","name":"A","kind":"container","children":[
            {"id":"b","name":"B","kind":"item"},
            {"id":"b","name":"B again","kind":"item"}]}"#;
        let record: NodeRecord = serde_json::from_str(json).unwrap();
        assert!(matches!(
            record.into_tree(),
            Err(TreeError::InvalidStructure(_))
        ));
    }
}
