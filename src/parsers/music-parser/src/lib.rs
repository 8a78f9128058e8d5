mod playlist;
mod scan;
mod tags;

pub use scan::{album_id_for, artist_id_for, playlist_id_for, ARTISTS_NAME, PLAYLISTS_NAME};

use mediashelf_core::{
    watch_paths, ChangeNotifier, LibraryTree, Parser, ParserResult, Refreshed, WatchGuard,
};
use scan::{build_tree, scan_library};
use std::path::PathBuf;

/// Browses a tagged music collection by artist and album, plus any M3U
/// playlists stored alongside it.
#[derive(Clone, Debug)]
pub struct MusicParser {
    media_type: String,
    name: String,
    roots: Vec<PathBuf>,
}

impl MusicParser {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self::with_identity("music", "Music", roots)
    }

    pub fn with_identity(
        media_type: impl Into<String>,
        name: impl Into<String>,
        roots: Vec<PathBuf>,
    ) -> Self {
        Self {
            media_type: media_type.into(),
            name: name.into(),
            roots,
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl Parser for MusicParser {
    fn media_type(&self) -> &str {
        &self.media_type
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn build_library(&self) -> ParserResult<LibraryTree> {
        let index = scan_library(&self.roots)?;
        let tree = build_tree(&self.media_type, &self.name, &index)?;
        tracing::debug!(
            media_type = %self.media_type,
            tracks = index.tracks.len(),
            playlists = index.playlists.len(),
            "music scan complete"
        );
        Ok(tree)
    }

    fn refresh_library(&self, existing: LibraryTree) -> ParserResult<Refreshed> {
        Ok(Refreshed::patch(existing, self.build_library()?))
    }

    fn watch(&self, notifier: ChangeNotifier) -> ParserResult<Option<WatchGuard>> {
        watch_paths(&self.roots, notifier)
    }
}
