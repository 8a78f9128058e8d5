use path_clean::PathClean;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One entry of an extended M3U playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub target: EntryTarget,
    pub title: Option<String>,
    pub duration_seconds: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryTarget {
    /// A local file, resolved against the playlist's folder and cleaned.
    File(PathBuf),
    /// Anything with a URL scheme, kept verbatim.
    Url(String),
}

impl PlaylistEntry {
    pub fn display_name(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        match &self.target {
            EntryTarget::File(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| path.to_string_lossy().to_string()),
            EntryTarget::Url(url) => url.clone(),
        }
    }
}

pub fn is_playlist(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "m3u" | "m3u8"))
        .unwrap_or(false)
}

pub fn read_playlist(path: &Path) -> io::Result<Vec<PlaylistEntry>> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    Ok(parse_m3u(&text, base))
}

/// Parses M3U text. `#EXTINF:<seconds>,<title>` annotates the next entry;
/// other `#` lines are ignored.
pub fn parse_m3u(text: &str, base: &Path) -> Vec<PlaylistEntry> {
    let mut entries = Vec::new();
    let mut pending: Option<(Option<u32>, Option<String>)> = None;
    for line in text.lines() {
        let line = line.trim().trim_start_matches('\u{feff}');
        if line.is_empty() {
            continue;
        }
        if let Some(info) = line.strip_prefix("#EXTINF:") {
            pending = Some(parse_extinf(info));
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        let (duration_seconds, title) = pending.take().unwrap_or((None, None));
        entries.push(PlaylistEntry {
            target: resolve_target(line, base),
            title,
            duration_seconds,
        });
    }
    entries
}

fn parse_extinf(info: &str) -> (Option<u32>, Option<String>) {
    let (duration, title) = match info.split_once(',') {
        Some((duration, title)) => (duration, Some(title.trim())),
        None => (info, None),
    };
    // Attributes such as tvg-id may follow the duration.
    let duration = duration
        .split_whitespace()
        .next()
        .and_then(|d| d.parse::<i64>().ok())
        .filter(|d| *d > 0)
        .map(|d| d as u32);
    let title = title.filter(|t| !t.is_empty()).map(str::to_string);
    (duration, title)
}

fn resolve_target(line: &str, base: &Path) -> EntryTarget {
    if has_scheme(line) {
        return EntryTarget::Url(line.to_string());
    }
    let path = Path::new(line);
    if path.is_absolute() {
        EntryTarget::File(path.clean())
    } else {
        EntryTarget::File(base.join(path).clean())
    }
}

fn has_scheme(line: &str) -> bool {
    match line.split_once("://") {
        Some((scheme, _)) => {
            scheme.len() > 1
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}
