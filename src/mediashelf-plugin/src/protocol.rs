//! Plugin protocol types for external catalog parsers.
//!
//! Requests and responses are single-line JSON objects exchanged over the
//! plugin's stdin and stdout.

use mediashelf_core::{NodeRecord, ParserError};
use serde::{Deserialize, Serialize};

/// Protocol version for compatibility checking.
pub const PROTOCOL_VERSION: u32 = 1;

/// Request sent from the host to a plugin process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRequest {
    /// Unique request ID for correlation.
    pub id: u64,
    /// The method to invoke on the plugin.
    pub method: PluginMethod,
}

/// Response from a plugin process to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginResponse {
    /// Request ID this response correlates to.
    pub id: u64,
    /// The result of the method invocation.
    pub result: PluginResult,
}

/// Methods that can be invoked on a plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum PluginMethod {
    /// Initialize the plugin and return its metadata.
    Initialize,
    /// Scan the catalog and return the whole tree, root first.
    BuildLibrary,
    /// Shutdown the plugin gracefully.
    Shutdown,
}

/// Result of a plugin method invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum PluginResult {
    /// Successful initialization.
    Initialized(PluginInfo),
    /// The catalog as a nested record.
    Library(NodeRecord),
    /// Shutdown acknowledged.
    ShutdownAck,
    /// Error response.
    Error(PluginError),
}

/// Plugin initialization info returned after Initialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Media type the plugin's catalog provides, e.g. "photos".
    pub media_type: String,
    /// Browser name shown to users.
    pub name: String,
    /// Plugin version (semantic versioning).
    pub version: String,
    /// Protocol version the plugin supports.
    pub protocol_version: u32,
}

/// Error returned by a plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginError {
    pub kind: PluginErrorKind,
    pub message: String,
}

/// Categories of plugin errors, matching [`ParserError`] categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginErrorKind {
    /// The catalog or its owning application is not installed.
    SourceUnavailable,
    /// The catalog exists but could not be read.
    Parse,
    /// Protocol version mismatch.
    ProtocolMismatch,
    /// Internal plugin error.
    Internal,
}

impl From<PluginError> for ParserError {
    fn from(err: PluginError) -> Self {
        match err.kind {
            PluginErrorKind::SourceUnavailable => Self::SourceUnavailable {
                message: err.message,
            },
            PluginErrorKind::Parse => Self::Parse {
                message: err.message,
            },
            PluginErrorKind::ProtocolMismatch | PluginErrorKind::Internal => Self::Other {
                message: err.message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_correctly() {
        let req = PluginRequest {
            id: 1,
            method: PluginMethod::BuildLibrary,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"BuildLibrary\""));
    }

    #[test]
    fn library_response_deserializes() {
        let json = r#"{"id":2,"result":{"status":"Library","id":"photos","name":"Photos","kind":"container","children":[{"id":"p1","name":"Beach","kind":"item","resource_location":"file:///beach.jpg"}]}}"#;
        let resp: PluginResponse = serde_json::from_str(json).unwrap();
        match resp.result {
            PluginResult::Library(record) => {
                assert_eq!(record.name, "Photos");
                assert_eq!(record.children[0].resource_location.as_deref(), Some("file:///beach.jpg"));
            }
            other => panic!("expected Library result, got {other:?}"),
        }
    }

    #[test]
    fn error_converts_to_parser_error() {
        let err = PluginError {
            kind: PluginErrorKind::SourceUnavailable,
            message: "catalog missing".to_string(),
        };
        match ParserError::from(err) {
            ParserError::SourceUnavailable { message } => assert_eq!(message, "catalog missing"),
            other => panic!("expected SourceUnavailable, got {other:?}"),
        }
    }
}
