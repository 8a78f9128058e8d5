/// Notifications for the display layer. Every variant names the media type
/// so one receiver can serve several sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The first tree is in place (generation 1).
    Activated { media_type: String, generation: u64 },
    /// A refresh applied changes. `replaced` means node ids were not
    /// preserved and display state should be reset.
    TreeChanged {
        media_type: String,
        generation: u64,
        replaced: bool,
    },
    /// A refresh failed; the previous tree is still shown.
    RefreshFailed { media_type: String, message: String },
    /// The catalog could not be read at all; the browser shows empty.
    Failed { media_type: String, message: String },
    /// The source is not present; the browser should be hidden.
    Unavailable { media_type: String, message: String },
    Deactivated { media_type: String },
}

impl SessionEvent {
    pub fn media_type(&self) -> &str {
        match self {
            SessionEvent::Activated { media_type, .. }
            | SessionEvent::TreeChanged { media_type, .. }
            | SessionEvent::RefreshFailed { media_type, .. }
            | SessionEvent::Failed { media_type, .. }
            | SessionEvent::Unavailable { media_type, .. }
            | SessionEvent::Deactivated { media_type } => media_type,
        }
    }

    /// Generation announced by this event, if it carries one.
    pub fn generation(&self) -> Option<u64> {
        match self {
            SessionEvent::Activated { generation, .. }
            | SessionEvent::TreeChanged { generation, .. } => Some(*generation),
            _ => None,
        }
    }
}
