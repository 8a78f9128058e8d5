use lofty::{Accessor, AudioFile, ItemKey, Probe, TaggedFileExt};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_seconds: Option<u32>,
    pub track_number: Option<u32>,
}

/// Reads whatever tags the file carries. Unreadable files yield empty tags
/// and the scanner falls back to the folder layout.
pub fn parse_tags(path: &Path) -> ParsedTags {
    let tagged = match Probe::open(path).and_then(|p| p.read()) {
        Ok(tagged) => tagged,
        Err(err) => {
            tracing::trace!(path = %path.display(), error = %err, "no readable tags");
            return ParsedTags::default();
        }
    };

    let tag = tagged.primary_tag().or_else(|| tagged.first_tag());
    let properties = tagged.properties();

    let title = tag.and_then(|t| t.get_string(&ItemKey::TrackTitle).map(|s| s.to_string()));
    let artist = tag.and_then(|t| t.artist().map(|s| s.to_string()));
    let album = tag.and_then(|t| t.album().map(|s| s.to_string()));
    let duration_seconds = whole_seconds(properties.duration());
    let track_number = tag.and_then(|t| t.track());

    ParsedTags {
        title: title.filter(|s| !s.trim().is_empty()),
        artist: artist.filter(|s| !s.trim().is_empty()),
        album: album.filter(|s| !s.trim().is_empty()),
        duration_seconds,
        track_number,
    }
}

/// Zero and durations past `u32::MAX` seconds count as unknown.
fn whole_seconds(duration: Duration) -> Option<u32> {
    u32::try_from(duration.as_secs()).ok().filter(|secs| *secs > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_file_has_no_tags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mp3");
        std::fs::write(&path, b"not really audio").unwrap();
        assert_eq!(parse_tags(&path), ParsedTags::default());
    }

    #[test]
    fn out_of_range_durations_are_unknown() {
        assert_eq!(whole_seconds(Duration::from_millis(215_400)), Some(215));
        assert_eq!(whole_seconds(Duration::from_millis(400)), None);
        assert_eq!(whole_seconds(Duration::from_secs(u64::from(u32::MAX) + 1)), None);
    }
}
