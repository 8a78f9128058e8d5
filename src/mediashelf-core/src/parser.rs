use crate::node::{LibraryTree, TreeError};
use crate::reconcile::{reconcile, ChangeSet};
use thiserror::Error;
use tokio::sync::mpsc;

/// Categories of parser failures surfaced to browser sessions.
#[derive(Debug, Error)]
pub enum ParserError {
    /// The catalog (or the application owning it) is not installed or cannot
    /// be found. The browser for this media type is hidden.
    #[error("source unavailable: {message}")]
    SourceUnavailable { message: String },
    /// The catalog exists but is malformed or uses an unsupported version.
    #[error("parse error: {message}")]
    Parse { message: String },
    /// The parser tried to build an impossible tree. This is a bug in the
    /// parser, never a runtime condition.
    #[error(transparent)]
    InvalidStructure(#[from] TreeError),
    #[error("{message}")]
    Other { message: String },
}

impl ParserError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}

pub type ParserResult<T> = Result<T, ParserError>;

/// Outcome of [`Parser::refresh_library`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refreshed {
    /// The existing tree was patched in place; surviving nodes kept their ids.
    Patched {
        tree: LibraryTree,
        changes: ChangeSet,
    },
    /// A brand-new tree. Display state tied to node ids is not preserved.
    Replaced(LibraryTree),
}

impl Refreshed {
    /// Reconciles a fresh scan into `existing`, falling back to a replacement
    /// when the scan is rooted somewhere else.
    pub fn patch(mut existing: LibraryTree, scanned: LibraryTree) -> Self {
        match reconcile(&mut existing, &scanned) {
            Some(changes) => Self::Patched {
                tree: existing,
                changes,
            },
            None => Self::Replaced(scanned),
        }
    }

    pub fn tree(&self) -> &LibraryTree {
        match self {
            Self::Patched { tree, .. } | Self::Replaced(tree) => tree,
        }
    }

    pub fn into_tree(self) -> LibraryTree {
        match self {
            Self::Patched { tree, .. } | Self::Replaced(tree) => tree,
        }
    }

    pub fn is_replacement(&self) -> bool {
        matches!(self, Self::Replaced(_))
    }
}

/// Why a session was asked to refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    /// Explicit request from the user or host.
    User,
    /// The parser noticed its source changed.
    SourceChanged,
}

/// What happened to a refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued; it runs once the current refresh (if any) completes.
    Scheduled,
    /// A refresh was already queued; this request folds into it.
    Coalesced,
    /// The session is gone.
    Closed,
}

/// One-way change signal handed to a parser by its session.
///
/// Backed by a single-slot channel: any number of notifications arriving
/// while a refresh is queued collapse into that one refresh.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: mpsc::Sender<RefreshReason>,
}

impl ChangeNotifier {
    /// Creates a notifier and the receiving end the session drains.
    pub fn channel() -> (Self, RefreshRequests) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, RefreshRequests { rx })
    }

    /// Never blocks; safe to call from watcher threads.
    pub fn notify(&self, reason: RefreshReason) -> Delivery {
        match self.tx.try_send(reason) {
            Ok(()) => Delivery::Scheduled,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Coalesced,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    pub fn source_changed(&self) -> Delivery {
        self.notify(RefreshReason::SourceChanged)
    }

    /// True while a refresh is queued but has not started yet.
    ///
    /// Read straight off the slot: its permit only returns once the session
    /// has taken the request.
    pub fn is_dirty(&self) -> bool {
        !self.tx.is_closed() && self.tx.capacity() == 0
    }
}

/// Receiving side of a [`ChangeNotifier`].
#[derive(Debug)]
pub struct RefreshRequests {
    rx: mpsc::Receiver<RefreshReason>,
}

impl RefreshRequests {
    /// Waits for the next queued request, freeing the slot for the next one.
    pub async fn next(&mut self) -> Option<RefreshReason> {
        self.rx.recv().await
    }
}

/// Keeps a parser's change watcher alive; dropping it stops watching.
pub struct WatchGuard(#[allow(dead_code)] Box<dyn Send>);

impl WatchGuard {
    pub fn new<T: Send + 'static>(watcher: T) -> Self {
        Self(Box::new(watcher))
    }
}

impl std::fmt::Debug for WatchGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WatchGuard")
    }
}

/// Parser interface, implemented once per supported media-source format.
///
/// Scans may block on I/O; sessions always call them off the control thread.
pub trait Parser: Send + Sync {
    /// Media type handled by this parser (e.g. "photos"). Must be stable.
    fn media_type(&self) -> &str;

    /// Human-friendly browser name.
    fn name(&self) -> &str;

    /// Full scan of the source into a freshly built tree.
    fn build_library(&self) -> ParserResult<LibraryTree>;

    /// Brings `existing` up to date with the source.
    ///
    /// The default rebuilds from scratch; parsers with stable ids should
    /// rescan and hand both trees to [`Refreshed::patch`].
    fn refresh_library(&self, existing: LibraryTree) -> ParserResult<Refreshed> {
        drop(existing);
        self.build_library().map(Refreshed::Replaced)
    }

    /// Starts watching the source, calling `notifier` on change.
    fn watch(&self, _notifier: ChangeNotifier) -> ParserResult<Option<WatchGuard>> {
        Ok(None)
    }

    /// Called right before the session releases the parser; stop any preview
    /// or playback started on its behalf.
    fn stop(&self) {}
}
