//! Parser adapter that implements the `Parser` trait for external plugins.

use crate::host::{ExecPluginHost, PluginConfig, PluginHostError};
use crate::protocol::{PluginMethod, PluginResult};
use mediashelf_core::{LibraryTree, Parser, ParserError, ParserResult, Refreshed};

/// A parser backed by an external plugin process.
///
/// The plugin is started and handshaken on construction. Every scan asks the
/// plugin for its whole catalog; refreshes reconcile that against the
/// current tree, so plugins with stable node ids keep display state.
pub struct ExecPluginParser {
    host: ExecPluginHost,
    media_type: String,
    name: String,
}

impl ExecPluginParser {
    /// Starts the plugin and uses the media type it announces.
    pub fn new(config: PluginConfig) -> Result<Self, PluginHostError> {
        let host = ExecPluginHost::new(config);
        let info = host.start()?;
        Ok(Self {
            host,
            media_type: info.media_type,
            name: info.name,
        })
    }

    /// Starts the plugin and checks that it serves `media_type`.
    pub fn for_media_type(config: PluginConfig, media_type: &str) -> ParserResult<Self> {
        let parser = Self::new(config).map_err(map_host_error)?;
        if parser.media_type != media_type {
            let message = format!(
                "plugin serves {} but was configured for {}",
                parser.media_type, media_type
            );
            parser.host.stop();
            return Err(ParserError::Other { message });
        }
        Ok(parser)
    }

    pub fn is_running(&self) -> bool {
        self.host.is_running()
    }
}

pub(crate) fn map_host_error(err: PluginHostError) -> ParserError {
    match err {
        PluginHostError::Plugin(err) => err.into(),
        PluginHostError::Spawn(e) => ParserError::SourceUnavailable {
            message: format!("plugin could not be started: {e}"),
        },
        PluginHostError::Terminated => ParserError::SourceUnavailable {
            message: "plugin process terminated".to_string(),
        },
        PluginHostError::Malformed(e) => ParserError::Parse {
            message: format!("malformed plugin response: {e}"),
        },
        other => ParserError::Other {
            message: other.to_string(),
        },
    }
}

impl Parser for ExecPluginParser {
    fn media_type(&self) -> &str {
        &self.media_type
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn build_library(&self) -> ParserResult<LibraryTree> {
        let result = self
            .host
            .send_request(PluginMethod::BuildLibrary)
            .map_err(map_host_error)?;
        match result {
            PluginResult::Library(record) => {
                if record.id.as_str() != self.media_type {
                    tracing::debug!(
                        media_type = %self.media_type,
                        root = %record.id,
                        "plugin root id differs from its media type"
                    );
                }
                Ok(record.into_tree()?)
            }
            _ => Err(map_host_error(PluginHostError::UnexpectedResponse {
                method: "BuildLibrary",
            })),
        }
    }

    fn refresh_library(&self, existing: LibraryTree) -> ParserResult<Refreshed> {
        Ok(Refreshed::patch(existing, self.build_library()?))
    }

    fn stop(&self) {
        if self.host.stop().is_some() {
            tracing::debug!(media_type = %self.media_type, "plugin asked to shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PluginError, PluginErrorKind};

    #[test]
    fn plugin_errors_keep_their_category() {
        let err = map_host_error(PluginHostError::Plugin(PluginError {
            kind: PluginErrorKind::Parse,
            message: "catalog v9".into(),
        }));
        assert!(matches!(err, ParserError::Parse { message } if message == "catalog v9"));
    }

    #[test]
    fn terminated_plugin_is_unavailable() {
        let err = map_host_error(PluginHostError::Terminated);
        assert!(matches!(err, ParserError::SourceUnavailable { .. }));
    }

    #[cfg(unix)]
    mod exec {
        use super::super::*;
        use crate::host::tests::script_plugin;
        use mediashelf_core::parser_contract::{run_parser_contract, ParserContractExpectations};
        use mediashelf_core::NodeId;

        const LIBRARY: &str = r#"{"status":"Library","id":"catalog","name":"Catalog","kind":"container","children":[{"id":"set-1","name":"Holiday","kind":"container","children":[{"id":"img-1","name":"Beach","kind":"item","resource_location":"file:///tmp/beach.jpg"}]}]}"#;

        #[test]
        fn plugin_parser_satisfies_contract() {
            let script = script_plugin(1, LIBRARY);
            let parser = ExecPluginParser::new(PluginConfig::new(script.to_path_buf())).unwrap();
            assert_eq!(parser.name(), "Test Catalog");
            let tree = run_parser_contract(
                &parser,
                &ParserContractExpectations {
                    media_type: "catalog".into(),
                    top_level: vec!["Holiday".into()],
                    known_node: Some(NodeId::new("img-1")),
                },
            )
            .unwrap();
            assert_eq!(
                tree.get(&NodeId::new("img-1")).unwrap().resource_location(),
                Some("file:///tmp/beach.jpg")
            );

            parser.stop();
            assert!(!parser.is_running());
        }

        #[test]
        fn media_type_must_match_configuration() {
            let script = script_plugin(1, LIBRARY);
            let err = ExecPluginParser::for_media_type(PluginConfig::new(script.to_path_buf()), "photos")
                .err()
                .unwrap();
            assert!(err.to_string().contains("configured for photos"));
        }

        #[test]
        fn duplicate_ids_from_plugin_are_structural_errors() {
            let library = r#"{"status":"Library","id":"catalog","name":"Catalog","kind":"container","children":[{"id":"x","name":"A","kind":"item"},{"id":"x","name":"B","kind":"item"}]}"#;
            let script = script_plugin(1, library);
            let parser = ExecPluginParser::new(PluginConfig::new(script.to_path_buf())).unwrap();
            assert!(matches!(
                parser.build_library(),
                Err(ParserError::InvalidStructure(_))
            ));
        }
    }
}
