use folder_parser::{node_id_for, FolderParser};
use mediashelf_browser::{BrowserSet, SessionEvent, SessionStatus};
use mediashelf_core::{NodeId, Parser, ParserRegistry, ParserResult, RegistryError};
use music_parser::{MusicParser, ARTISTS_NAME, PLAYLISTS_NAME};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

fn add_album(root: &Path, name: &str) {
    fs::create_dir_all(root.join(name)).unwrap();
    fs::write(root.join(name).join("photo.jpg"), b"jpg").unwrap();
}

fn registry(photos: PathBuf, music: PathBuf) -> Arc<ParserRegistry> {
    let mut builder = ParserRegistry::builder();
    builder
        .register("photos", move || -> ParserResult<Box<dyn Parser>> {
            Ok(Box::new(FolderParser::photos(vec![photos.clone()])))
        })
        .unwrap();
    builder
        .register("music", move || -> ParserResult<Box<dyn Parser>> {
            Ok(Box::new(MusicParser::new(vec![music.clone()])))
        })
        .unwrap();
    Arc::new(builder.freeze())
}

fn album_names(set: &BrowserSet, container: &NodeId) -> Vec<String> {
    let snapshot = set.get("photos").unwrap().current_root().unwrap();
    snapshot
        .tree
        .children(container)
        .map(|n| n.name().to_string())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn photo_album_added_while_browsing() {
    let dir = tempfile::tempdir().unwrap();
    let photos = dir.path().join("Pictures");
    let music = dir.path().join("Music");
    add_album(&photos, "Album A");
    add_album(&photos, "Album B");
    fs::create_dir_all(music.join("Artist/Record")).unwrap();
    fs::write(music.join("Artist/Record/01 Song.mp3"), b"").unwrap();

    let mut set = BrowserSet::from_registry(registry(photos.clone(), music), false);
    assert!(set.activate_all().await.is_empty());

    let music_session = set.get("music").unwrap();
    let music_root = music_session.current_root().unwrap();
    let top: Vec<_> = music_root
        .tree
        .children(music_root.tree.root_id())
        .map(|n| n.name().to_string())
        .collect();
    assert_eq!(top, vec![ARTISTS_NAME, PLAYLISTS_NAME]);

    let session = set.get("photos").unwrap();
    assert_eq!(session.status(), SessionStatus::Ready);
    let before = session.current_root().unwrap();
    assert_eq!(before.generation, 1);

    let canon = photos.canonicalize().unwrap();
    let container = node_id_for(&canon);
    assert_eq!(album_names(&set, &container), vec!["Album A", "Album B"]);
    let album_a = node_id_for(&canon.join("Album A"));
    let album_b = node_id_for(&canon.join("Album B"));

    let mut events = session.subscribe();
    add_album(&photos, "Album C");
    session.notifier().unwrap().source_changed();

    let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("no tree change observed")
        .unwrap();
    assert_eq!(
        event,
        SessionEvent::TreeChanged {
            media_type: "photos".into(),
            generation: 2,
            replaced: false,
        }
    );

    let after = session.current_root().unwrap();
    assert_eq!(after.generation, 2);
    assert_eq!(album_names(&set, &container), vec!["Album A", "Album B", "Album C"]);
    assert_eq!(after.tree.root().children(), before.tree.root().children());
    let children = after.tree.get(&container).unwrap().children();
    assert_eq!(&children[..2], &[album_a, album_b]);

    let export = session.export_selection(&[children[2].clone()]).unwrap();
    assert_eq!(export.generation, 2);
    assert_eq!(export.resource_locations().len(), 1);

    set.deactivate_all();
}

#[test]
fn duplicate_registration_keeps_first_factory() {
    struct Named(&'static str);
    impl Parser for Named {
        fn media_type(&self) -> &str {
            "photos"
        }
        fn name(&self) -> &str {
            self.0
        }
        fn build_library(&self) -> ParserResult<mediashelf_core::LibraryTree> {
            Ok(mediashelf_core::LibraryTree::new(
                mediashelf_core::LibraryNode::container("photos", self.0),
            ))
        }
    }

    let mut builder = ParserRegistry::builder();
    builder
        .register("photos", || -> ParserResult<Box<dyn Parser>> { Ok(Box::new(Named("f1"))) })
        .unwrap();
    let err = builder
        .register("photos", || -> ParserResult<Box<dyn Parser>> { Ok(Box::new(Named("f2"))) })
        .unwrap_err();
    assert_eq!(
        err,
        RegistryError::DuplicateRegistration {
            type_id: "photos".into()
        }
    );

    let registry = builder.freeze();
    let parser = registry.resolve("photos").unwrap().create().unwrap();
    assert_eq!(parser.name(), "f1");
    assert_eq!(registry.all_types(), ["photos".to_string()]);
}
