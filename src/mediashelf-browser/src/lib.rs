//! Browser sessions: one per media type, mediating between a parser and
//! whatever displays its tree.

pub mod events;
pub mod session;
pub mod set;

pub use events::SessionEvent;
pub use session::{BrowserSession, SessionError, SessionStatus, TreeSnapshot};
pub use set::BrowserSet;
