mod scan;

pub use scan::{file_location, node_id_for};

use mediashelf_core::{
    watch_paths, ChangeNotifier, LibraryTree, Parser, ParserResult, Refreshed, WatchGuard,
};
use scan::{scan_folders, ScanSettings};
use std::collections::BTreeSet;
use std::path::PathBuf;

pub const PHOTO_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "heic", "heif", "tif", "tiff", "webp", "bmp", "raw", "cr2",
    "nef", "arw", "dng",
];
pub const MOVIE_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "avi", "mkv", "webm"];

/// Browses media files laid out in ordinary folders.
///
/// Each configured root becomes a top-level container; sub-folders and files
/// below it keep their on-disk shape. Ids are canonical paths, so a refresh
/// keeps every folder and file that is still there.
#[derive(Clone, Debug)]
pub struct FolderParser {
    media_type: String,
    name: String,
    roots: Vec<PathBuf>,
    extensions: BTreeSet<String>,
}

impl FolderParser {
    pub fn new<I, S>(
        media_type: impl Into<String>,
        name: impl Into<String>,
        roots: Vec<PathBuf>,
        extensions: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            media_type: media_type.into(),
            name: name.into(),
            roots,
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn photos(roots: Vec<PathBuf>) -> Self {
        Self::new("photos", "Photos", roots, PHOTO_EXTENSIONS)
    }

    pub fn movies(roots: Vec<PathBuf>) -> Self {
        Self::new("movies", "Movies", roots, MOVIE_EXTENSIONS)
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn settings(&self) -> ScanSettings<'_> {
        ScanSettings {
            media_type: &self.media_type,
            name: &self.name,
            roots: &self.roots,
            extensions: &self.extensions,
        }
    }
}

impl Parser for FolderParser {
    fn media_type(&self) -> &str {
        &self.media_type
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn build_library(&self) -> ParserResult<LibraryTree> {
        scan_folders(&self.settings())
    }

    fn refresh_library(&self, existing: LibraryTree) -> ParserResult<Refreshed> {
        let scanned = scan_folders(&self.settings())?;
        Ok(Refreshed::patch(existing, scanned))
    }

    fn watch(&self, notifier: ChangeNotifier) -> ParserResult<Option<WatchGuard>> {
        watch_paths(&self.roots, notifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediashelf_core::parser_contract::{run_parser_contract, ParserContractExpectations};
    use mediashelf_core::NodeId;
    use std::fs;

    fn fixture() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("Pictures");
        for album in ["Album A", "Album B"] {
            fs::create_dir_all(root.join(album)).unwrap();
            fs::write(root.join(album).join("cover.jpg"), b"jpg").unwrap();
        }
        (dir, root)
    }

    #[test]
    fn folder_parser_satisfies_contract() {
        let (_dir, root) = fixture();
        let parser = FolderParser::photos(vec![root.clone()]);
        let known = node_id_for(&root.canonicalize().unwrap().join("Album A"));
        let tree = run_parser_contract(
            &parser,
            &ParserContractExpectations {
                media_type: "photos".into(),
                top_level: vec!["Pictures".into()],
                known_node: Some(known),
            },
        )
        .unwrap();
        assert_eq!(tree.root_id(), &NodeId::new("photos"));
    }

    #[test]
    fn refresh_keeps_ids_and_appends_new_album() {
        let (_dir, root) = fixture();
        let parser = FolderParser::photos(vec![root.clone()]);
        let before = parser.build_library().unwrap();
        let canon = root.canonicalize().unwrap();
        let album_a = node_id_for(&canon.join("Album A"));

        fs::create_dir_all(root.join("Album C")).unwrap();
        fs::write(root.join("Album C/one.png"), b"png").unwrap();
        fs::remove_file(root.join("Album B/cover.jpg")).unwrap();

        let Refreshed::Patched { tree, changes } = parser.refresh_library(before).unwrap() else {
            panic!("expected an in-place patch");
        };
        let names: Vec<_> = tree
            .children(&node_id_for(&canon))
            .map(|n| n.name().to_string())
            .collect();
        assert_eq!(names, vec!["Album A", "Album C"]);
        assert!(tree.contains(&album_a));
        assert_eq!(changes.added.len(), 2);
        assert_eq!(changes.removed.len(), 2);
    }

    #[test]
    fn extensions_are_normalised() {
        let parser = FolderParser::new("scans", "Scans", Vec::new(), [".PDF", "", "tiff"]);
        assert_eq!(
            parser.extensions.iter().cloned().collect::<Vec<_>>(),
            vec!["pdf", "tiff"]
        );
    }
}
