pub mod config;
pub mod export;
pub mod logging;
pub mod node;
pub mod parser;
pub mod parser_contract;
pub mod paths;
pub mod reconcile;
pub mod registry;
pub mod watch;

pub use config::{
    BrowserConfig, Config, ConfigError, LogLevel, LoggingConfig, SourceConfig, SourceKind,
    ValidationError,
};
pub use export::{ExportError, ExportSnapshot, NodeRecord};
pub use logging::{init_logging, LoggingError, LoggingGuard};
pub use node::{LibraryNode, LibraryTree, NodeId, NodeKind, StructureViolation, TreeError};
pub use parser::{
    ChangeNotifier, Delivery, Parser, ParserError, ParserResult, RefreshReason, RefreshRequests,
    Refreshed, WatchGuard,
};
pub use paths::{AppDirs, DirsError};
pub use reconcile::{reconcile, ChangeSet};
pub use registry::{ParserFactory, ParserRegistry, RegistryBuilder, RegistryError};
pub use watch::watch_paths;

pub const APP_NAME: &str = "mediashelf";
pub const APP_AUTHOR: &str = "Mediashelf";
pub const APP_QUALIFIER: &str = "io";
