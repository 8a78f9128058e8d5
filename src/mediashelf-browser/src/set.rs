use crate::session::{BrowserSession, SessionError};
use mediashelf_core::ParserRegistry;
use std::sync::Arc;

/// One session per registered media type, in registration order.
#[derive(Debug)]
pub struct BrowserSet {
    sessions: Vec<BrowserSession>,
}

impl BrowserSet {
    pub fn from_registry(registry: Arc<ParserRegistry>, watch_sources: bool) -> Self {
        Self::with_watch_policy(registry, |_| watch_sources)
    }

    /// Like [`BrowserSet::from_registry`], deciding source watching per
    /// media type.
    pub fn with_watch_policy<F>(registry: Arc<ParserRegistry>, watch: F) -> Self
    where
        F: Fn(&str) -> bool,
    {
        let sessions = registry
            .all_types()
            .iter()
            .map(|media_type| {
                BrowserSession::new(media_type.clone(), registry.clone())
                    .with_source_watching(watch(media_type))
            })
            .collect();
        Self { sessions }
    }

    /// Activates every session. A session whose parser reports a structural
    /// bug is logged and left inactive; the others still come up.
    pub async fn activate_all(&mut self) -> Vec<SessionError> {
        let mut errors = Vec::new();
        for session in &mut self.sessions {
            if let Err(err) = session.activate().await {
                tracing::error!(media_type = %session.media_type(), error = %err, "browser failed to activate");
                errors.push(err);
            }
        }
        errors
    }

    pub fn get(&self, media_type: &str) -> Option<&BrowserSession> {
        self.sessions.iter().find(|s| s.media_type() == media_type)
    }

    pub fn get_mut(&mut self, media_type: &str) -> Option<&mut BrowserSession> {
        self.sessions.iter_mut().find(|s| s.media_type() == media_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BrowserSession> {
        self.sessions.iter()
    }

    /// Sessions a display layer should show: unavailable sources are hidden.
    pub fn visible(&self) -> impl Iterator<Item = &BrowserSession> {
        self.sessions.iter().filter(|s| !s.status().is_hidden())
    }

    pub fn deactivate_all(&mut self) {
        for session in &mut self.sessions {
            session.deactivate();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStatus;
    use mediashelf_core::{LibraryNode, LibraryTree, Parser, ParserError, ParserResult};

    struct Fixed {
        media_type: &'static str,
        available: bool,
    }

    impl Parser for Fixed {
        fn media_type(&self) -> &str {
            self.media_type
        }

        fn name(&self) -> &str {
            self.media_type
        }

        fn build_library(&self) -> ParserResult<LibraryTree> {
            if !self.available {
                return Err(ParserError::unavailable("not installed"));
            }
            Ok(LibraryTree::new(LibraryNode::container(
                self.media_type,
                self.media_type,
            )))
        }
    }

    fn registry() -> Arc<ParserRegistry> {
        let mut builder = ParserRegistry::builder();
        for (media_type, available) in [("photos", true), ("movies", false), ("music", true)] {
            builder
                .register(media_type, move || -> ParserResult<Box<dyn Parser>> {
                    Ok(Box::new(Fixed {
                        media_type,
                        available,
                    }))
                })
                .unwrap();
        }
        Arc::new(builder.freeze())
    }

    #[tokio::test]
    async fn unavailable_sources_are_hidden() {
        let mut set = BrowserSet::from_registry(registry(), false);
        assert!(set.activate_all().await.is_empty());

        let visible: Vec<_> = set.visible().map(|s| s.media_type().to_string()).collect();
        assert_eq!(visible, vec!["photos", "music"]);
        assert_eq!(
            set.get("movies").unwrap().status(),
            SessionStatus::SourceUnavailable
        );

        set.deactivate_all();
        assert!(set.iter().all(|s| !s.is_active()));
        assert_eq!(set.len(), 3);
    }
}
