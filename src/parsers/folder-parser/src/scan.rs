use mediashelf_core::{LibraryNode, LibraryTree, NodeId, ParserError, ParserResult};
use path_clean::PathClean;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use url::Url;
use walkdir::WalkDir;

/// What one scan needs to know about the source.
#[derive(Debug, Clone)]
pub struct ScanSettings<'a> {
    pub media_type: &'a str,
    pub name: &'a str,
    pub roots: &'a [PathBuf],
    /// Lowercase extensions without the dot. Empty accepts every file.
    pub extensions: &'a BTreeSet<String>,
}

pub fn node_id_for(path: &Path) -> NodeId {
    NodeId::new(path.to_string_lossy().to_string())
}

pub fn file_location(path: &Path) -> Option<String> {
    Url::from_file_path(path).ok().map(|url| url.to_string())
}

fn canonicalize_within_root(path: &Path, root: &Path) -> Option<PathBuf> {
    let Ok(canon) = path.canonicalize() else {
        return None;
    };
    let cleaned = canon.clean();
    if cleaned.starts_with(root) {
        Some(cleaned)
    } else {
        None
    }
}

/// Canonical roots that exist, with roots nested in an earlier root dropped.
pub fn resolve_roots(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut resolved: Vec<PathBuf> = Vec::new();
    for root in roots {
        let Ok(canon) = root.canonicalize() else {
            tracing::warn!(root = %root.display(), "media root missing; skipping");
            continue;
        };
        let canon = canon.clean();
        if resolved
            .iter()
            .any(|r| canon.starts_with(r) || r.starts_with(&canon))
        {
            tracing::warn!(root = %canon.display(), "media root overlaps another root; skipping");
            continue;
        }
        resolved.push(canon);
    }
    resolved
}

pub fn scan_folders(settings: &ScanSettings<'_>) -> ParserResult<LibraryTree> {
    let roots = resolve_roots(settings.roots);
    if roots.is_empty() {
        return Err(ParserError::unavailable(format!(
            "none of the {} roots exist",
            settings.media_type
        )));
    }

    let mut tree = LibraryTree::new(LibraryNode::container(settings.media_type, settings.name));
    let root_id = tree.root_id().clone();
    for root in &roots {
        let container = LibraryNode::container(node_id_for(root), display_name(root))
            .with_metadata("path", root.to_string_lossy().to_string());
        tree.add_child(&root_id, container)?;
        scan_root(&mut tree, root, settings.extensions)?;
    }
    tracing::debug!(
        media_type = settings.media_type,
        nodes = tree.node_count(),
        "folder scan complete"
    );
    Ok(tree)
}

fn scan_root(tree: &mut LibraryTree, root: &Path, extensions: &BTreeSet<String>) -> ParserResult<()> {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(root = %root.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_media_file(entry.path(), extensions) {
            continue;
        }
        let Some(canonical) = canonicalize_within_root(entry.path(), root) else {
            continue;
        };
        let parent = ensure_folders(tree, root, &canonical)?;

        let mut item = LibraryNode::item(node_id_for(&canonical), file_name(&canonical));
        if let Some(ext) = canonical.extension().and_then(|s| s.to_str()) {
            item = item.with_metadata("extension", ext.to_ascii_lowercase());
        }
        if let Ok(meta) = entry.metadata() {
            item = item.with_metadata("size_bytes", meta.len().to_string());
        }
        if let Some(location) = file_location(&canonical) {
            item = item.with_resource_location(location);
        }
        tree.add_child(&parent, item)?;
    }
    Ok(())
}

/// Creates the folder containers between `root` and `file`, returning the id
/// of the file's parent. Folders appear only once they hold media, so empty
/// ones never reach the tree.
fn ensure_folders(tree: &mut LibraryTree, root: &Path, file: &Path) -> ParserResult<NodeId> {
    let mut parent = node_id_for(root);
    let Some(dir) = file.parent() else {
        return Ok(parent);
    };
    let Ok(relative) = dir.strip_prefix(root) else {
        return Ok(parent);
    };
    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        let id = node_id_for(&current);
        if !tree.contains(&id) {
            tree.add_child(&parent, LibraryNode::container(id.clone(), file_name(&current)))?;
        }
        parent = id;
    }
    Ok(parent)
}

fn is_media_file(path: &Path, extensions: &BTreeSet<String>) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| extensions.contains(&ext.to_ascii_lowercase()))
        .unwrap_or(false)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn display_name(root: &Path) -> String {
    file_name(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn exts(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_folders_are_pruned_and_order_follows_names() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("Pictures");
        fs::create_dir_all(root.join("b-trip")).unwrap();
        fs::create_dir_all(root.join("a-empty/nested")).unwrap();
        fs::create_dir_all(root.join("c-notes")).unwrap();
        fs::write(root.join("b-trip/2.JPG"), b"x").unwrap();
        fs::write(root.join("b-trip/1.jpg"), b"xy").unwrap();
        fs::write(root.join("c-notes/readme.txt"), b"x").unwrap();
        fs::write(root.join("a.png"), b"x").unwrap();

        let extensions = exts(&["jpg", "png"]);
        let roots = vec![root.clone()];
        let tree = scan_folders(&ScanSettings {
            media_type: "photos",
            name: "Photos",
            roots: &roots,
            extensions: &extensions,
        })
        .unwrap();

        let canon = root.canonicalize().unwrap();
        let top: Vec<_> = tree.children(&node_id_for(&canon)).map(|n| n.name().to_string()).collect();
        assert_eq!(top, vec!["a.png", "b-trip"]);

        let trip = node_id_for(&canon.join("b-trip"));
        let files: Vec<_> = tree.children(&trip).collect();
        assert_eq!(files[0].name(), "1.jpg");
        assert_eq!(files[0].metadata("size_bytes"), Some("2"));
        assert_eq!(files[1].metadata("extension"), Some("jpg"));
        assert!(files[0].resource_location().unwrap().starts_with("file://"));
    }

    #[test]
    fn missing_roots_mean_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let roots = vec![dir.path().join("nope")];
        let extensions = exts(&["jpg"]);
        let err = scan_folders(&ScanSettings {
            media_type: "photos",
            name: "Photos",
            roots: &roots,
            extensions: &extensions,
        })
        .unwrap_err();
        assert!(matches!(err, ParserError::SourceUnavailable { .. }));
    }

    #[test]
    fn nested_roots_are_collapsed() {
        let dir = tempfile::tempdir().unwrap();
        let outer = dir.path().join("media");
        fs::create_dir_all(outer.join("inner")).unwrap();
        let resolved = resolve_roots(&[outer.clone(), outer.join("inner")]);
        assert_eq!(resolved, vec![outer.canonicalize().unwrap().clean()]);
    }
}
