use crate::{APP_AUTHOR, APP_NAME, APP_QUALIFIER};
use directories::{ProjectDirs, UserDirs};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct AppDirs {
    config_dir: PathBuf,
    data_dir: PathBuf,
    log_dir: PathBuf,
    pictures_dir: Option<PathBuf>,
    music_dir: Option<PathBuf>,
    videos_dir: Option<PathBuf>,
}

impl AppDirs {
    pub fn discover() -> Result<Self, DirsError> {
        let dirs = ProjectDirs::from(APP_QUALIFIER, APP_AUTHOR, APP_NAME)
            .ok_or(DirsError::MissingProjectDirs)?;
        let user = UserDirs::new();
        let media_dir = |pick: fn(&UserDirs) -> Option<&Path>| {
            user.as_ref().and_then(pick).map(Path::to_path_buf)
        };
        Ok(Self {
            config_dir: dirs.config_dir().to_path_buf(),
            data_dir: dirs.data_dir().to_path_buf(),
            log_dir: dirs.data_dir().join("logs"),
            pictures_dir: media_dir(UserDirs::picture_dir),
            music_dir: media_dir(UserDirs::audio_dir),
            videos_dir: media_dir(UserDirs::video_dir),
        })
    }

    /// Everything below `base`; used by tests and portable installs.
    pub fn rooted_at(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            config_dir: base.join("config"),
            data_dir: base.join("data"),
            log_dir: base.join("data").join("logs"),
            pictures_dir: Some(base.join("Pictures")),
            music_dir: Some(base.join("Music")),
            videos_dir: Some(base.join("Movies")),
        }
    }

    pub fn ensure_exists(&self) -> Result<(), DirsError> {
        for dir in [&self.config_dir, &self.data_dir, &self.log_dir] {
            std::fs::create_dir_all(dir).map_err(|source| DirsError::CreateDirectory {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn pictures_dir(&self) -> Option<&Path> {
        self.pictures_dir.as_deref()
    }

    pub fn music_dir(&self) -> Option<&Path> {
        self.music_dir.as_deref()
    }

    pub fn videos_dir(&self) -> Option<&Path> {
        self.videos_dir.as_deref()
    }
}

#[derive(Debug, Error)]
pub enum DirsError {
    #[error("unable to determine project directories for mediashelf")]
    MissingProjectDirs,
    #[error("failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SourceKind};

    #[test]
    fn rooted_dirs_are_created() {
        let base = tempfile::tempdir().unwrap();
        let dirs = AppDirs::rooted_at(base.path());
        dirs.ensure_exists().unwrap();
        assert!(dirs.config_dir().is_dir());
        assert!(dirs.log_dir().ends_with("logs"));
    }

    #[test]
    fn missing_config_falls_back_to_media_folders() {
        let base = tempfile::tempdir().unwrap();
        let dirs = AppDirs::rooted_at(base.path());
        let config = Config::load_or_default(&dirs).unwrap();
        let kinds: Vec<_> = config
            .sources
            .iter()
            .map(|(media_type, source)| (media_type.as_str(), source.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("movies", SourceKind::Folder),
                ("music", SourceKind::Music),
                ("photos", SourceKind::Folder),
            ]
        );
    }
}
