use crate::playlist::{is_playlist, read_playlist, EntryTarget};
use crate::tags::parse_tags;
use mediashelf_core::{LibraryNode, LibraryTree, NodeId, ParserError, ParserResult};
use path_clean::PathClean;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use url::Url;
use walkdir::WalkDir;

pub const ARTISTS_NAME: &str = "Artists";
pub const PLAYLISTS_NAME: &str = "Playlists";
const UNKNOWN_ARTIST: &str = "Unknown Artist";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: NodeId,
    pub path: PathBuf,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_seconds: Option<u32>,
    pub track_number: Option<u32>,
}

/// Everything found under the music roots, before it is shaped into a tree.
#[derive(Debug, Clone, Default)]
pub struct LibraryIndex {
    pub tracks: Vec<Track>,
    pub playlists: Vec<PathBuf>,
}

pub fn artist_id_for(artist: &str) -> NodeId {
    NodeId::new(format!("artist:{artist}"))
}

/// The artist's byte length leads the id, so no pair of names containing
/// separators can spell another pair's id.
pub fn album_id_for(artist: &str, album: &str) -> NodeId {
    NodeId::new(format!("album:{}:{artist}/{album}", artist.len()))
}

pub fn playlist_id_for(path: &Path) -> NodeId {
    NodeId::new(format!("playlist:{}", path.to_string_lossy()))
}

fn track_id_for(path: &Path) -> NodeId {
    NodeId::new(path.to_string_lossy().to_string())
}

fn file_location(path: &Path) -> Option<String> {
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

pub fn is_supported_extension(ext: &str) -> bool {
    matches!(
        ext.to_ascii_lowercase().as_str(),
        "mp3" | "m4a" | "flac" | "wav" | "ogg"
    )
}

pub fn scan_library(roots: &[PathBuf]) -> ParserResult<LibraryIndex> {
    let mut index = LibraryIndex::default();
    let mut found_root = false;
    for root in roots {
        let Ok(root_path) = root.canonicalize().map(|p| p.clean()) else {
            tracing::warn!(root = %root.display(), "music root missing; skipping");
            continue;
        };
        found_root = true;
        for entry in WalkDir::new(&root_path).follow_links(false).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(root = %root_path.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(canonical) = canonicalize_within_root(path, &root_path) else {
                continue;
            };
            if is_playlist(&canonical) {
                index.playlists.push(canonical);
                continue;
            }
            let supported = canonical
                .extension()
                .and_then(|s| s.to_str())
                .map(is_supported_extension)
                .unwrap_or(false);
            if supported {
                index.tracks.push(parse_track(&canonical, &root_path));
            }
        }
    }
    if !found_root {
        return Err(ParserError::unavailable("none of the music roots exist"));
    }
    index.tracks.sort_by(|a, b| {
        a.track_number
            .unwrap_or(u32::MAX)
            .cmp(&b.track_number.unwrap_or(u32::MAX))
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.id.cmp(&b.id))
    });
    index.tracks.dedup_by(|a, b| a.id == b.id);
    index.playlists.sort();
    index.playlists.dedup();
    Ok(index)
}

fn parse_track(canonical: &Path, root: &Path) -> Track {
    let relative = canonical.strip_prefix(root).unwrap_or(canonical);
    let mut components = relative.components().collect::<Vec<_>>();
    let _ = components.pop(); // drop file name
    let component_name = |c: Option<std::path::Component<'_>>| {
        c.and_then(|c| c.as_os_str().to_str()).map(str::to_string)
    };
    let (inferred_artist, inferred_album) = match components.len() {
        0 => (None, None),
        1 => (component_name(components.pop()), None),
        _ => {
            let album = component_name(components.pop());
            (component_name(components.pop()), album)
        }
    };

    let file_stem = canonical
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Unknown");

    let tags = parse_tags(canonical);
    Track {
        id: track_id_for(canonical),
        path: canonical.to_path_buf(),
        title: tags.title.unwrap_or_else(|| file_stem.to_string()),
        artist: tags
            .artist
            .or(inferred_artist)
            .unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
        album: tags.album.or(inferred_album),
        duration_seconds: tags.duration_seconds,
        track_number: tags.track_number,
    }
}

/// Shapes the index into `root -> Artists -> artist -> album -> track` and
/// `root -> Playlists -> playlist -> entry`. Tracks with no album hang off
/// their artist directly.
pub fn build_tree(media_type: &str, name: &str, index: &LibraryIndex) -> ParserResult<LibraryTree> {
    let mut tree = LibraryTree::new(LibraryNode::container(media_type, name));
    let root = tree.root_id().clone();
    let artists_id = NodeId::new(format!("{media_type}#artists"));
    let playlists_id = NodeId::new(format!("{media_type}#playlists"));
    tree.add_child(&root, LibraryNode::container(artists_id.clone(), ARTISTS_NAME))?;
    tree.add_child(&root, LibraryNode::container(playlists_id.clone(), PLAYLISTS_NAME))?;

    let mut by_artist: BTreeMap<&str, BTreeMap<Option<&str>, Vec<&Track>>> = BTreeMap::new();
    for track in &index.tracks {
        by_artist
            .entry(track.artist.as_str())
            .or_default()
            .entry(track.album.as_deref())
            .or_default()
            .push(track);
    }

    for (artist, albums) in &by_artist {
        let artist_id = artist_id_for(artist);
        tree.add_child(&artists_id, LibraryNode::container(artist_id.clone(), *artist))?;
        for (album, tracks) in albums {
            let parent = match album {
                Some(album) => {
                    let album_id = album_id_for(artist, album);
                    tree.add_child(
                        &artist_id,
                        LibraryNode::container(album_id.clone(), *album)
                            .with_metadata("artist", *artist)
                            .with_metadata("track_count", tracks.len().to_string()),
                    )?;
                    album_id
                }
                None => artist_id.clone(),
            };
            for track in tracks {
                tree.add_child(&parent, track_node(track))?;
            }
        }
    }

    for path in &index.playlists {
        add_playlist(&mut tree, &playlists_id, path, index)?;
    }
    Ok(tree)
}

fn track_node(track: &Track) -> LibraryNode {
    let mut node = LibraryNode::item(track.id.clone(), track.title.clone())
        .with_metadata("title", track.title.clone())
        .with_metadata("artist", track.artist.clone());
    if let Some(album) = &track.album {
        node = node.with_metadata("album", album.clone());
    }
    if let Some(duration) = track.duration_seconds {
        node = node.with_metadata("duration_seconds", duration.to_string());
    }
    if let Some(number) = track.track_number {
        node = node.with_metadata("track_number", number.to_string());
    }
    if let Some(location) = file_location(&track.path) {
        node = node.with_resource_location(location);
    }
    node
}

fn add_playlist(
    tree: &mut LibraryTree,
    parent: &NodeId,
    path: &Path,
    index: &LibraryIndex,
) -> ParserResult<()> {
    let entries = match read_playlist(path) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "skipping unreadable playlist");
            return Ok(());
        }
    };
    let playlist_id = playlist_id_for(path);
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());
    tree.add_child(
        parent,
        LibraryNode::container(playlist_id.clone(), name)
            .with_metadata("path", path.to_string_lossy().to_string()),
    )?;

    // Entries get positional ids: a playlist may list the same file twice.
    for (n, entry) in entries.iter().enumerate() {
        let id = NodeId::new(format!("{}#{}", playlist_id, n + 1));
        let mut node = LibraryNode::item(id, entry.display_name());
        if let Some(duration) = entry.duration_seconds {
            node = node.with_metadata("duration_seconds", duration.to_string());
        }
        match &entry.target {
            EntryTarget::File(file) => {
                let file = file.canonicalize().map(|p| p.clean()).unwrap_or_else(|_| file.clone());
                if let Some(track) = index.tracks.iter().find(|t| t.path == file) {
                    node = node.with_metadata("track_id", track.id.as_str());
                }
                if let Some(location) = file_location(&file) {
                    node = node.with_resource_location(location);
                }
            }
            EntryTarget::Url(url) => {
                node = node.with_resource_location(url.clone());
            }
        }
        tree.add_child(&playlist_id, node)?;
    }
    Ok(())
}
