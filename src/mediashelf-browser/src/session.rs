use crate::events::SessionEvent;
use mediashelf_core::{
    ChangeNotifier, Delivery, ExportSnapshot, LibraryNode, LibraryTree, NodeId, NodeRecord,
    Parser, ParserError, ParserRegistry, ParserResult, RefreshReason, RefreshRequests, Refreshed,
    TreeError, WatchGuard,
};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no parser registered for media type {media_type}")]
    UnknownMediaType { media_type: String },
    #[error("{media_type} parser produced an invalid tree: {error}")]
    Structure {
        media_type: String,
        error: TreeError,
    },
    #[error("node not found: {id}")]
    NodeNotFound { id: NodeId },
    #[error("no library loaded for media type {media_type}")]
    NoLibrary { media_type: String },
    #[error("background task failed: {message}")]
    Worker { message: String },
}

/// What the display layer should show for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Inactive,
    Building,
    Ready,
    /// The source is not installed or cannot be found; hide the browser.
    SourceUnavailable,
    /// The catalog could not be read; show an empty browser with the error.
    Failed,
}

impl SessionStatus {
    pub fn is_hidden(&self) -> bool {
        matches!(self, SessionStatus::SourceUnavailable)
    }

    fn from_error(err: &ParserError) -> Self {
        match err {
            ParserError::SourceUnavailable { .. } => SessionStatus::SourceUnavailable,
            _ => SessionStatus::Failed,
        }
    }
}

/// The tree as seen at one generation. Holding a snapshot never blocks a
/// refresh; the refresh swaps in a new tree instead of editing this one.
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    pub tree: Arc<LibraryTree>,
    pub generation: u64,
}

impl TreeSnapshot {
    pub fn root(&self) -> &LibraryNode {
        self.tree.root()
    }
}

#[derive(Debug, Default)]
struct SessionState {
    tree: Option<Arc<LibraryTree>>,
    generation: u64,
    status: SessionStatus,
    last_error: Option<String>,
    /// Bumped on activate and deactivate; results from an older epoch are dropped.
    epoch: u64,
    refreshing: bool,
    display_name: Option<String>,
}

impl SessionState {
    fn record_failure(&mut self, err: &ParserError) {
        self.status = SessionStatus::from_error(err);
        self.last_error = Some(err.to_string());
    }
}

type SharedState = Arc<RwLock<SessionState>>;

struct ActiveParser {
    parser: Arc<dyn Parser>,
    notifier: ChangeNotifier,
    worker: JoinHandle<()>,
    watch: Option<WatchGuard>,
}

/// Binds one media type to its parser and the tree it produces.
///
/// Control methods are meant to be called from one task; scans run on the
/// blocking pool and a per-session worker applies their results.
pub struct BrowserSession {
    media_type: String,
    registry: Arc<ParserRegistry>,
    watch_sources: bool,
    state: SharedState,
    events: broadcast::Sender<SessionEvent>,
    active: Option<ActiveParser>,
}

impl std::fmt::Debug for BrowserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read_state();
        f.debug_struct("BrowserSession")
            .field("media_type", &self.media_type)
            .field("status", &state.status)
            .field("generation", &state.generation)
            .field("active", &self.active.is_some())
            .finish()
    }
}

impl BrowserSession {
    pub fn new(media_type: impl Into<String>, registry: Arc<ParserRegistry>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            media_type: media_type.into(),
            registry,
            watch_sources: true,
            state: Arc::new(RwLock::new(SessionState::default())),
            events,
            active: None,
        }
    }

    /// Whether the parser may watch its source and request refreshes itself.
    pub fn with_source_watching(mut self, enabled: bool) -> Self {
        self.watch_sources = enabled;
        self
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// The parser's browser name once activated, the media type before.
    pub fn display_name(&self) -> String {
        self.read_state()
            .display_name
            .clone()
            .unwrap_or_else(|| self.media_type.clone())
    }

    pub fn status(&self) -> SessionStatus {
        self.read_state().status
    }

    pub fn last_error(&self) -> Option<String> {
        self.read_state().last_error.clone()
    }

    pub fn generation(&self) -> u64 {
        self.read_state().generation
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// A refresh has been requested and has not started yet.
    pub fn is_dirty(&self) -> bool {
        self.active
            .as_ref()
            .map(|a| a.notifier.is_dirty())
            .unwrap_or(false)
    }

    pub fn is_refreshing(&self) -> bool {
        self.read_state().refreshing
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The channel this session's parser reports changes on. Hosts use it to
    /// forward change signals from sources the parser cannot watch itself.
    pub fn notifier(&self) -> Option<ChangeNotifier> {
        self.active.as_ref().map(|a| a.notifier.clone())
    }

    /// Resolves the parser, builds the first tree and starts the refresh
    /// worker. Source failures become session status; only structural bugs
    /// and unknown media types are returned as errors.
    pub async fn activate(&mut self) -> Result<(), SessionError> {
        if self.active.is_some() {
            return Ok(());
        }
        let factory = self
            .registry
            .resolve(&self.media_type)
            .ok_or_else(|| SessionError::UnknownMediaType {
                media_type: self.media_type.clone(),
            })?;

        let epoch = {
            let mut state = self.write_state();
            state.epoch += 1;
            state.status = SessionStatus::Building;
            state.last_error = None;
            state.epoch
        };
        tracing::info!(media_type = %self.media_type, "activating browser");

        let scan = tokio::task::spawn_blocking(
            move || -> ParserResult<(Arc<dyn Parser>, ParserResult<LibraryTree>)> {
                let parser: Arc<dyn Parser> = Arc::from(factory.create()?);
                let tree = parser.build_library();
                Ok((parser, tree))
            },
        )
        .await
        .map_err(|e| SessionError::Worker {
            message: e.to_string(),
        })?;

        let (parser, built) = match scan {
            Ok(scan) => scan,
            Err(err) => {
                tracing::warn!(media_type = %self.media_type, error = %err, "parser could not be created");
                self.publish_failure(&err);
                return self.escalate(err);
            }
        };

        let (notifier, requests) = ChangeNotifier::channel();
        {
            let mut state = self.write_state();
            state.display_name = Some(parser.name().to_string());
            if let Ok(tree) = &built {
                state.tree = Some(Arc::new(tree.clone()));
                state.generation = 1;
                state.status = SessionStatus::Ready;
            }
        }

        match built {
            Ok(tree) => {
                tracing::info!(
                    media_type = %self.media_type,
                    nodes = tree.node_count(),
                    "library built"
                );
                let _ = self.events.send(SessionEvent::Activated {
                    media_type: self.media_type.clone(),
                    generation: 1,
                });
            }
            Err(ParserError::InvalidStructure(error)) => {
                tracing::error!(media_type = %self.media_type, %error, "parser built an invalid tree");
                let err = ParserError::InvalidStructure(error);
                self.publish_failure(&err);
                parser.stop();
                return self.escalate(err);
            }
            Err(err) => {
                tracing::warn!(media_type = %self.media_type, error = %err, "library build failed");
                self.publish_failure(&err);
            }
        }

        let worker = RefreshWorker {
            media_type: self.media_type.clone(),
            parser: parser.clone(),
            state: self.state.clone(),
            events: self.events.clone(),
            epoch,
        };
        let worker = tokio::spawn(worker.run(requests));

        let watch = if self.watch_sources {
            match parser.watch(notifier.clone()) {
                Ok(guard) => guard,
                Err(err) => {
                    tracing::warn!(media_type = %self.media_type, error = %err, "source watching unavailable");
                    None
                }
            }
        } else {
            None
        };

        self.active = Some(ActiveParser {
            parser,
            notifier,
            worker,
            watch,
        });
        Ok(())
    }

    /// Asks for a refresh. At most one refresh runs at a time and at most
    /// one more waits behind it; further requests fold into the waiting one.
    pub fn request_refresh(&self) -> Delivery {
        match &self.active {
            Some(active) => {
                let delivery = active.notifier.notify(RefreshReason::User);
                tracing::debug!(media_type = %self.media_type, ?delivery, "refresh requested");
                delivery
            }
            None => Delivery::Closed,
        }
    }

    /// The current tree and its generation. Callers must treat the tree as
    /// read-only; it changes only by being replaced on refresh.
    pub fn current_root(&self) -> Option<TreeSnapshot> {
        let state = self.read_state();
        state.tree.as_ref().map(|tree| TreeSnapshot {
            tree: tree.clone(),
            generation: state.generation,
        })
    }

    /// Copies the selected subtrees out of a single generation of the tree.
    ///
    /// If any id is missing from that generation the whole export fails with
    /// [`SessionError::NodeNotFound`]; partial exports are never returned.
    pub fn export_selection(&self, ids: &[NodeId]) -> Result<ExportSnapshot, SessionError> {
        let snapshot = self.current_root().ok_or_else(|| SessionError::NoLibrary {
            media_type: self.media_type.clone(),
        })?;
        let nodes = ids
            .iter()
            .map(|id| {
                NodeRecord::from_tree(&snapshot.tree, id)
                    .ok_or_else(|| SessionError::NodeNotFound { id: id.clone() })
            })
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(
            media_type = %self.media_type,
            generation = snapshot.generation,
            count = nodes.len(),
            "selection exported"
        );
        Ok(ExportSnapshot {
            media_type: self.media_type.clone(),
            generation: snapshot.generation,
            nodes,
        })
    }

    /// Stops the parser and releases the tree. Work still in flight is
    /// detached and its result discarded.
    pub fn deactivate(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        {
            let mut state = self.write_state();
            state.epoch += 1;
            state.tree = None;
            state.generation = 0;
            state.status = SessionStatus::Inactive;
            state.refreshing = false;
            state.last_error = None;
        }
        active.worker.abort();
        drop(active.watch);
        active.parser.stop();
        drop(active.parser);
        tracing::info!(media_type = %self.media_type, "browser deactivated");
        let _ = self.events.send(SessionEvent::Deactivated {
            media_type: self.media_type.clone(),
        });
    }

    fn publish_failure(&self, err: &ParserError) {
        let status = {
            let mut state = self.write_state();
            state.tree = None;
            state.generation = 0;
            state.record_failure(err);
            state.status
        };
        let _ = self.events.send(failure_event(&self.media_type, status, err));
    }

    fn escalate(&self, err: ParserError) -> Result<(), SessionError> {
        match err {
            ParserError::InvalidStructure(error) => Err(SessionError::Structure {
                media_type: self.media_type.clone(),
                error,
            }),
            _ => Ok(()),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().expect("session state poisoned")
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().expect("session state poisoned")
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.deactivate();
    }
}

fn failure_event(media_type: &str, status: SessionStatus, err: &ParserError) -> SessionEvent {
    let media_type = media_type.to_string();
    let message = err.to_string();
    match status {
        SessionStatus::SourceUnavailable => SessionEvent::Unavailable {
            media_type,
            message,
        },
        _ => SessionEvent::Failed {
            media_type,
            message,
        },
    }
}

/// Drains refresh requests for one activation of a session.
struct RefreshWorker {
    media_type: String,
    parser: Arc<dyn Parser>,
    state: SharedState,
    events: broadcast::Sender<SessionEvent>,
    epoch: u64,
}

impl RefreshWorker {
    async fn run(self, mut requests: RefreshRequests) {
        while let Some(reason) = requests.next().await {
            let Some(current) = self.begin() else {
                break;
            };
            tracing::debug!(media_type = %self.media_type, ?reason, "refresh started");

            let parser = self.parser.clone();
            let outcome = tokio::task::spawn_blocking(move || match current {
                Some(tree) => parser.refresh_library(LibraryTree::clone(&tree)),
                None => parser.build_library().map(Refreshed::Replaced),
            })
            .await;

            match outcome {
                Ok(result) => self.finish(result),
                Err(err) => self.finish(Err(ParserError::Other {
                    message: format!("refresh task failed: {err}"),
                })),
            }
        }
        tracing::debug!(media_type = %self.media_type, "refresh worker stopped");
    }

    /// Marks the refresh as running and hands out the tree to patch, or
    /// `None` when the session has moved on.
    fn begin(&self) -> Option<Option<Arc<LibraryTree>>> {
        let mut state = self.state.write().expect("session state poisoned");
        if state.epoch != self.epoch {
            return None;
        }
        state.refreshing = true;
        Some(state.tree.clone())
    }

    fn finish(&self, result: ParserResult<Refreshed>) {
        let mut state = self.state.write().expect("session state poisoned");
        if state.epoch != self.epoch {
            tracing::debug!(media_type = %self.media_type, "discarding refresh for a deactivated session");
            return;
        }
        state.refreshing = false;

        let event = match result {
            Ok(refreshed) => {
                let unchanged = match &refreshed {
                    Refreshed::Patched { changes, .. } => changes.is_empty(),
                    Refreshed::Replaced(tree) => state.tree.as_deref() == Some(tree),
                };
                state.status = SessionStatus::Ready;
                state.last_error = None;
                if unchanged {
                    tracing::debug!(media_type = %self.media_type, "refresh found no changes");
                    return;
                }

                let replaced = refreshed.is_replacement();
                if let Refreshed::Patched { changes, .. } = &refreshed {
                    tracing::info!(media_type = %self.media_type, %changes, "library patched");
                } else {
                    tracing::info!(media_type = %self.media_type, "library replaced");
                }
                state.tree = Some(Arc::new(refreshed.into_tree()));
                state.generation += 1;
                SessionEvent::TreeChanged {
                    media_type: self.media_type.clone(),
                    generation: state.generation,
                    replaced,
                }
            }
            Err(err) => self.failed(&mut state, err),
        };
        drop(state);
        let _ = self.events.send(event);
    }

    fn failed(&self, state: &mut SessionState, err: ParserError) -> SessionEvent {
        let media_type = self.media_type.clone();
        match &err {
            ParserError::SourceUnavailable { .. } => {
                tracing::warn!(media_type = %media_type, error = %err, "source went away");
                if state.tree.take().is_some() {
                    state.generation += 1;
                }
                state.record_failure(&err);
                failure_event(&media_type, state.status, &err)
            }
            _ if state.tree.is_none() => {
                tracing::warn!(media_type = %media_type, error = %err, "library rebuild failed");
                state.record_failure(&err);
                failure_event(&media_type, state.status, &err)
            }
            ParserError::InvalidStructure(_) => {
                tracing::error!(media_type = %media_type, error = %err, "parser produced an invalid tree during refresh");
                state.last_error = Some(err.to_string());
                SessionEvent::RefreshFailed {
                    media_type,
                    message: err.to_string(),
                }
            }
            _ => {
                tracing::warn!(media_type = %media_type, error = %err, "refresh failed; keeping previous tree");
                state.last_error = Some(err.to_string());
                SessionEvent::RefreshFailed {
                    media_type,
                    message: err.to_string(),
                }
            }
        }
    }
}
