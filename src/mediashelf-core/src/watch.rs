use crate::parser::{ChangeNotifier, ParserError, ParserResult, WatchGuard};
use notify::{EventKind, RecursiveMode, Watcher};
use std::path::PathBuf;

/// Watches `paths` recursively and signals `notifier` whenever something
/// under them is created, modified or removed.
///
/// Bursts of filesystem events need no debouncing here: the notifier folds
/// everything that arrives while a refresh is queued into that refresh.
/// Paths that do not exist are skipped; if none can be watched the result
/// is `Ok(None)`.
pub fn watch_paths(paths: &[PathBuf], notifier: ChangeNotifier) -> ParserResult<Option<WatchGuard>> {
    let mut watcher = notify::recommended_watcher(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if is_structural(&event.kind) {
                    tracing::trace!(paths = ?event.paths, "source change detected");
                    notifier.source_changed();
                }
            }
            Err(err) => tracing::warn!(error = %err, "filesystem watcher error"),
        },
    )
    .map_err(|e| ParserError::Other {
        message: format!("failed to start filesystem watcher: {e}"),
    })?;

    let mut watched = 0usize;
    for path in paths {
        if !path.exists() {
            continue;
        }
        match watcher.watch(path, RecursiveMode::Recursive) {
            Ok(()) => watched += 1,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "cannot watch source path")
            }
        }
    }

    if watched == 0 {
        return Ok(None);
    }
    tracing::debug!(count = watched, "watching source paths");
    Ok(Some(WatchGuard::new(watcher)))
}

fn is_structural(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind};

    #[test]
    fn access_events_are_ignored() {
        assert!(!is_structural(&EventKind::Access(AccessKind::Any)));
        assert!(is_structural(&EventKind::Create(CreateKind::File)));
    }

    #[test]
    fn nothing_to_watch_yields_no_guard() {
        let dir = tempfile::tempdir().unwrap();
        let (notifier, _requests) = ChangeNotifier::channel();
        let guard = watch_paths(&[dir.path().join("missing")], notifier).unwrap();
        assert!(guard.is_none());
    }
}
