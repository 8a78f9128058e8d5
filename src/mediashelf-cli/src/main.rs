use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use folder_parser::{FolderParser, MOVIE_EXTENSIONS, PHOTO_EXTENSIONS};
use mediashelf_browser::{BrowserSession, BrowserSet, SessionEvent, SessionStatus};
use mediashelf_core::{
    init_logging, AppDirs, Config, LibraryTree, NodeId, Parser as MediaParser, ParserRegistry,
    ParserResult, RegistryError, SourceConfig, SourceKind,
};
use mediashelf_plugin::{plugin_factory, PluginConfig};
use music_parser::MusicParser;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Parser)]
#[command(name = "mediashelf", version, about = "Browse media libraries as trees")]
struct Cli {
    /// Disable source watching (overrides config)
    #[arg(long, global = true)]
    no_watch: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List configured media types
    Types,
    /// Print the library tree of one media type
    Tree {
        media_type: String,
        /// Stop descending below this depth (root is depth 0)
        #[arg(long)]
        depth: Option<usize>,
    },
    /// Export selected nodes as JSON
    Export {
        media_type: String,
        #[arg(required = true)]
        ids: Vec<String>,
        /// Print resource locations only, one per line
        #[arg(long)]
        files: bool,
    },
    /// Keep browsers open and report tree changes until interrupted
    Watch { media_type: Option<String> },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("media type '{0}' is not configured")]
    UnknownMediaType(String),
    #[error("{media_type} browser is unavailable: {message}")]
    Unavailable { media_type: String, message: String },
}

/// Registers one parser factory per enabled source, in config key order.
fn build_registry(config: &Config) -> Result<ParserRegistry, RegistryError> {
    let mut builder = ParserRegistry::builder();
    for (media_type, source) in config.enabled_sources() {
        let media_type = media_type.clone();
        let name = source
            .name
            .clone()
            .unwrap_or_else(|| default_display_name(&media_type));
        let roots = source.roots.clone();
        match source.kind {
            SourceKind::Folder => {
                let extensions = folder_extensions(&media_type, source);
                builder.register(media_type.clone(), move || -> ParserResult<Box<dyn MediaParser>> {
                    Ok(Box::new(FolderParser::new(
                        media_type.clone(),
                        name.clone(),
                        roots.clone(),
                        extensions.iter(),
                    )))
                })?;
            }
            SourceKind::Music => {
                builder.register(media_type.clone(), move || -> ParserResult<Box<dyn MediaParser>> {
                    Ok(Box::new(MusicParser::with_identity(
                        media_type.clone(),
                        name.clone(),
                        roots.clone(),
                    )))
                })?;
            }
            SourceKind::Plugin => {
                // Validation guarantees an executable for enabled plugin sources.
                let Some(executable) = source.executable.clone() else {
                    continue;
                };
                let mut plugin = PluginConfig::new(executable);
                plugin.args = source.args.clone();
                builder.register(media_type.clone(), plugin_factory(media_type, plugin))?;
            }
        }
    }
    Ok(builder.freeze())
}

fn folder_extensions(media_type: &str, source: &SourceConfig) -> Vec<String> {
    if !source.extensions.is_empty() {
        return source.extensions.clone();
    }
    let preset: &[&str] = match media_type {
        "photos" => PHOTO_EXTENSIONS,
        "movies" => MOVIE_EXTENSIONS,
        _ => &[],
    };
    preset.iter().map(|s| s.to_string()).collect()
}

fn default_display_name(media_type: &str) -> String {
    let mut chars = media_type.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Indented outline of `tree`, one node per line. Containers deeper than
/// `max_depth` are listed but not expanded.
fn render_tree(tree: &LibraryTree, max_depth: Option<usize>) -> String {
    let mut out = String::new();
    render_node(tree, tree.root_id(), 0, max_depth, &mut out);
    out
}

fn render_node(tree: &LibraryTree, id: &NodeId, depth: usize, max_depth: Option<usize>, out: &mut String) {
    let Some(node) = tree.get(id) else {
        return;
    };
    let indent = "  ".repeat(depth);
    if node.is_container() {
        out.push_str(&format!(
            "{indent}{}/ ({} items) [{}]\n",
            node.name(),
            node.children().len(),
            node.id()
        ));
        if max_depth.map_or(true, |max| depth < max) {
            for child in node.children() {
                render_node(tree, child, depth + 1, max_depth, out);
            }
        }
    } else {
        out.push_str(&format!("{indent}{} [{}]\n", node.name(), node.id()));
    }
}

async fn open_session(
    registry: Arc<ParserRegistry>,
    media_type: &str,
    watch: bool,
) -> Result<BrowserSession> {
    if !registry.contains(media_type) {
        return Err(CliError::UnknownMediaType(media_type.to_string()).into());
    }
    let mut session = BrowserSession::new(media_type, registry).with_source_watching(watch);
    session
        .activate()
        .await
        .with_context(|| format!("activating {media_type} browser"))?;
    match session.status() {
        SessionStatus::Ready => Ok(session),
        _ => Err(CliError::Unavailable {
            media_type: media_type.to_string(),
            message: session
                .last_error()
                .unwrap_or_else(|| "no library".to_string()),
        }
        .into()),
    }
}

fn print_types(config: &Config, registry: &ParserRegistry) {
    if registry.is_empty() {
        println!("No media sources configured. Add sources.<media type> in config.toml.");
        return;
    }
    for media_type in registry.all_types() {
        let Some(source) = config.sources.get(media_type) else {
            continue;
        };
        let kind = match source.kind {
            SourceKind::Folder => "folder",
            SourceKind::Music => "music",
            SourceKind::Plugin => "plugin",
        };
        println!("{media_type} ({kind})");
        for root in &source.roots {
            println!("  - {}", root.display());
        }
        if let Some(executable) = &source.executable {
            println!("  - {}", executable.display());
        }
    }
}

fn describe_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Activated {
            media_type,
            generation,
        } => format!("{media_type}: ready (generation {generation})"),
        SessionEvent::TreeChanged {
            media_type,
            generation,
            replaced,
        } => {
            let how = if *replaced { "replaced" } else { "updated" };
            format!("{media_type}: tree {how} (generation {generation})")
        }
        SessionEvent::RefreshFailed {
            media_type,
            message,
        } => format!("{media_type}: refresh failed: {message}"),
        SessionEvent::Failed {
            media_type,
            message,
        } => format!("{media_type}: failed: {message}"),
        SessionEvent::Unavailable {
            media_type,
            message,
        } => format!("{media_type}: unavailable: {message}"),
        SessionEvent::Deactivated { media_type } => format!("{media_type}: closed"),
    }
}

async fn watch(
    registry: Arc<ParserRegistry>,
    config: &Config,
    only: Option<String>,
    watch_sources: bool,
) -> Result<()> {
    if let Some(media_type) = &only {
        if !registry.contains(media_type) {
            return Err(CliError::UnknownMediaType(media_type.clone()).into());
        }
    }
    let mut set = BrowserSet::with_watch_policy(registry, |media_type| {
        watch_sources && config.sources.get(media_type).map_or(true, |s| s.watch)
    });

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    for session in set.iter() {
        if only.as_deref().map_or(false, |m| m != session.media_type()) {
            continue;
        }
        let mut events = session.subscribe();
        let tx = tx.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event display fell behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
    drop(tx);

    match &only {
        Some(media_type) => {
            if let Some(session) = set.get_mut(media_type) {
                session.activate().await?;
            }
        }
        None => {
            for err in set.activate_all().await {
                eprintln!("{err}");
            }
        }
    }

    loop {
        tokio::select! {
            Some(event) = rx.recv() => println!("{}", describe_event(&event)),
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    set.deactivate_all();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let dirs = AppDirs::discover()?;
    let config = Config::load_or_default(&dirs)?;
    let _logging = init_logging(&config.logging, &dirs)?;

    let registry = Arc::new(build_registry(&config)?);
    let watch_sources = config.browser.watch_sources && !cli.no_watch;

    match cli.command {
        Some(Command::Types) => print_types(&config, &registry),
        Some(Command::Tree { media_type, depth }) => {
            let session = open_session(registry, &media_type, false).await?;
            let Some(snapshot) = session.current_root() else {
                bail!("{media_type} browser has no library");
            };
            print!("{}", render_tree(&snapshot.tree, depth));
        }
        Some(Command::Export {
            media_type,
            ids,
            files,
        }) => {
            let session = open_session(registry, &media_type, false).await?;
            let ids: Vec<NodeId> = ids.into_iter().map(NodeId::from).collect();
            let export = session.export_selection(&ids)?;
            if files {
                for location in export.resource_locations() {
                    println!("{location}");
                }
            } else {
                println!("{}", export.to_json()?);
            }
        }
        Some(Command::Watch { media_type }) => {
            watch(registry, &config, media_type, watch_sources).await?;
        }
        None => {
            tracing::info!(
                types = registry.len(),
                config_dir = %dirs.config_dir().display(),
                "launching mediashelf"
            );
            if config.browser.activate_on_start {
                let mut set = BrowserSet::from_registry(registry, false);
                set.activate_all().await;
                for session in set.visible() {
                    println!("{} ({:?})", session.display_name(), session.status());
                }
                set.deactivate_all();
            } else {
                print_types(&config, &registry);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediashelf_core::LibraryNode;
    use std::fs;

    fn sample_tree() -> LibraryTree {
        let mut tree = LibraryTree::new(LibraryNode::container("photos", "Photos"));
        tree.add_child(&NodeId::new("photos"), LibraryNode::container("a", "Album A"))
            .unwrap();
        tree.add_child(&NodeId::new("a"), LibraryNode::item("a1", "beach.jpg"))
            .unwrap();
        tree
    }

    #[test]
    fn render_tree_indents_children() {
        let out = render_tree(&sample_tree(), None);
        assert_eq!(
            out,
            "Photos/ (1 items) [photos]\n  Album A/ (1 items) [a]\n    beach.jpg [a1]\n"
        );
    }

    #[test]
    fn render_tree_respects_depth() {
        let out = render_tree(&sample_tree(), Some(1));
        assert!(out.contains("Album A/"));
        assert!(!out.contains("beach.jpg"));
    }

    #[test]
    fn display_name_capitalises_media_type() {
        assert_eq!(default_display_name("photos"), "Photos");
        assert_eq!(default_display_name(""), "");
    }

    #[test]
    fn folder_extensions_fall_back_to_presets() {
        let source = SourceConfig::new(SourceKind::Folder);
        assert!(folder_extensions("photos", &source).contains(&"jpg".to_string()));
        assert!(folder_extensions("scans", &source).is_empty());

        let mut custom = SourceConfig::new(SourceKind::Folder);
        custom.extensions = vec!["pdf".into()];
        assert_eq!(folder_extensions("photos", &custom), vec!["pdf"]);
    }

    #[test]
    fn registry_follows_enabled_sources() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.sources.insert(
            "photos".into(),
            SourceConfig::new(SourceKind::Folder).with_roots([dir.path().to_path_buf()]),
        );
        config.sources.insert(
            "music".into(),
            SourceConfig::new(SourceKind::Music).with_roots([dir.path().to_path_buf()]),
        );
        let mut disabled = SourceConfig::new(SourceKind::Folder).with_roots([dir.path().to_path_buf()]);
        disabled.enabled = false;
        config.sources.insert("movies".into(), disabled);

        let registry = build_registry(&config).unwrap();
        assert_eq!(registry.all_types(), ["music".to_string(), "photos".to_string()]);
        let parser = registry.resolve("photos").unwrap().create().unwrap();
        assert_eq!(parser.name(), "Photos");
    }

    #[tokio::test]
    async fn export_prints_selected_album() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("Pictures");
        fs::create_dir_all(root.join("Album A")).unwrap();
        fs::write(root.join("Album A/one.jpg"), b"jpg").unwrap();

        let mut config = Config::default();
        config.sources.insert(
            "photos".into(),
            SourceConfig::new(SourceKind::Folder).with_roots([root.clone()]),
        );
        let registry = Arc::new(build_registry(&config).unwrap());
        let session = open_session(registry.clone(), "photos", false).await.unwrap();

        let album = folder_parser::node_id_for(&root.canonicalize().unwrap().join("Album A"));
        let export = session.export_selection(&[album]).unwrap();
        assert_eq!(export.nodes[0].name, "Album A");
        assert_eq!(export.resource_locations().len(), 1);

        let err = open_session(registry, "podcasts", false).await.unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }
}
