use crate::paths::AppDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

const CURRENT_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_config_version")]
    pub config_version: u32,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    /// Media sources keyed by media type. Registration follows key order.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            logging: LoggingConfig::default(),
            browser: BrowserConfig::default(),
            sources: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,
    #[serde(default = "default_true")]
    pub stdout: bool,
    #[serde(default = "default_true")]
    pub file: bool,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_log_files: default_max_log_files(),
            stdout: true,
            file: true,
            file_name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrowserConfig {
    /// Let parsers watch their sources and trigger refreshes.
    #[serde(default = "default_true")]
    pub watch_sources: bool,
    /// Activate every registered browser at startup.
    #[serde(default = "default_true")]
    pub activate_on_start: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            watch_sources: true,
            activate_on_start: true,
        }
    }
}

/// Which parser implementation reads a source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Plain folder hierarchy filtered by file extension.
    Folder,
    /// Tagged audio files grouped by artist and album.
    Music,
    /// External parser process.
    Plugin,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Browser name; defaults to the media type.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    /// File extensions for folder sources; empty means the parser default.
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub watch: bool,
    /// Plugin executable (plugin sources only).
    #[serde(default)]
    pub executable: Option<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl SourceConfig {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            name: None,
            roots: Vec::new(),
            extensions: Vec::new(),
            enabled: true,
            watch: true,
            executable: None,
            args: Vec::new(),
        }
    }

    pub fn with_roots(mut self, roots: impl IntoIterator<Item = PathBuf>) -> Self {
        self.roots = roots.into_iter().collect();
        self
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("config validation failed: {0}")]
    Validation(ValidationError),
    #[error("failed to prepare configuration directories: {0}")]
    Directories(#[from] crate::paths::DirsError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unsupported config_version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("source '{media_type}' is a plugin but has no executable")]
    MissingExecutable { media_type: String },
    #[error("source '{media_type}' has no roots configured")]
    MissingRoots { media_type: String },
    #[error("source media type must not be empty")]
    EmptyMediaType,
}

impl Config {
    pub fn load_or_default(dirs: &AppDirs) -> Result<Self, ConfigError> {
        dirs.ensure_exists()?;
        let path = Self::config_path(dirs);
        if !path.exists() {
            return Ok(Self::with_default_sources(dirs));
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let mut config = Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        if config.sources.is_empty() {
            config.sources = Self::with_default_sources(dirs).sources;
        }
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn config_path(dirs: &AppDirs) -> PathBuf {
        dirs.config_dir().join("config.toml")
    }

    /// Photos, music and movies from the user's standard media folders.
    pub fn with_default_sources(dirs: &AppDirs) -> Self {
        let mut config = Self::default();
        let defaults = [
            ("photos", SourceKind::Folder, dirs.pictures_dir()),
            ("music", SourceKind::Music, dirs.music_dir()),
            ("movies", SourceKind::Folder, dirs.videos_dir()),
        ];
        for (media_type, kind, root) in defaults {
            if let Some(root) = root {
                config.sources.insert(
                    media_type.to_string(),
                    SourceConfig::new(kind).with_roots([root.to_path_buf()]),
                );
            }
        }
        config
    }

    /// Enabled sources in registration order.
    pub fn enabled_sources(&self) -> impl Iterator<Item = (&String, &SourceConfig)> {
        self.sources.iter().filter(|(_, source)| source.enabled)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.config_version != CURRENT_CONFIG_VERSION {
            return Err(ValidationError::UnsupportedVersion {
                found: self.config_version,
                expected: CURRENT_CONFIG_VERSION,
            });
        }
        for (media_type, source) in self.enabled_sources() {
            if media_type.trim().is_empty() {
                return Err(ValidationError::EmptyMediaType);
            }
            match source.kind {
                SourceKind::Plugin if source.executable.is_none() => {
                    return Err(ValidationError::MissingExecutable {
                        media_type: media_type.clone(),
                    });
                }
                SourceKind::Folder | SourceKind::Music if source.roots.is_empty() => {
                    return Err(ValidationError::MissingRoots {
                        media_type: media_type.clone(),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn default_config_version() -> u32 {
    CURRENT_CONFIG_VERSION
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_max_log_files() -> usize {
    7
}

fn default_true() -> bool {
    true
}
