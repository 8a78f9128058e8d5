//! External catalog parsers.
//!
//! A plugin is any executable that speaks the line-oriented JSON protocol in
//! [`protocol`] on stdin/stdout. It lets catalogs owned by other
//! applications be browsed without linking their formats into the host.
//!
//! # Plugin Protocol
//!
//! - The host sends one [`PluginRequest`] per line to the plugin's stdin.
//! - The plugin answers each with one [`PluginResponse`] line on stdout.
//!
//! # Example Plugin (pseudocode)
//!
//! ```text
//! while (line = read_stdin()):
//!     request = json_parse(line)
//!     if request.method.type == "Initialize":
//!         result = {"status": "Initialized", "media_type": "photos",
//!                   "name": "Shoebox", "version": "1.0.0", "protocol_version": 1}
//!     elif request.method.type == "BuildLibrary":
//!         result = {"status": "Library", "id": "photos", "name": "Shoebox",
//!                   "kind": "container", "children": [...]}
//!     write_stdout(json_stringify({"id": request.id, "result": result}) + "\n")
//! ```

mod adapter;
mod host;
pub mod protocol;

pub use adapter::ExecPluginParser;
pub use host::{ExecPluginHost, PluginConfig, PluginHostError};
pub use protocol::{
    PluginError, PluginErrorKind, PluginInfo, PluginMethod, PluginRequest, PluginResponse,
    PluginResult, PROTOCOL_VERSION,
};

use mediashelf_core::{Parser, ParserResult};

/// Registry factory that starts a fresh plugin process per activation.
pub fn plugin_factory(
    media_type: impl Into<String>,
    config: PluginConfig,
) -> impl Fn() -> ParserResult<Box<dyn Parser>> + Send + Sync + 'static {
    let media_type = media_type.into();
    move || -> ParserResult<Box<dyn Parser>> {
        let parser = ExecPluginParser::for_media_type(config.clone(), &media_type)?;
        Ok(Box::new(parser))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::host::tests::script_plugin;
    use mediashelf_core::ParserRegistry;

    #[test]
    fn factory_registers_plugin_parser() {
        let script = script_plugin(
            1,
            r#"{"status":"Library","id":"catalog","name":"Catalog","kind":"container"}"#,
        );
        let mut builder = ParserRegistry::builder();
        builder
            .register("catalog", plugin_factory("catalog", PluginConfig::new(script.to_path_buf())))
            .unwrap();
        let registry = builder.freeze();

        let parser = registry.resolve("catalog").unwrap().create().unwrap();
        assert_eq!(parser.media_type(), "catalog");
        assert_eq!(parser.build_library().unwrap().node_count(), 1);
        parser.stop();
    }
}
