//! Configuration for the ingestion pipeline.
//!
//! The configuration is a JSON file. Relative paths inside it are resolved
//! against the directory that contains the file.
//!
//! ```json
//! {
//!   "log_level": "info",
//!   "app_log_dir": "logs",
//!   "output_dir": "output",
//!   "projects": [
//!     {
//!       "name": "erp",
//!       "delete_processed": true,
//!       "log_dirs": [{ "path": "/srv/1c/erp/log", "enabled": true }]
//!     }
//!   ]
//! }
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::info;

use crate::error::ConfigError;

/// A directory holding event-log exports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogDir {
    /// Path to the directory.
    pub path: PathBuf,

    /// Whether the directory is scanned and watched.
    pub enabled: bool,
}

/// A named group of log directories sharing one output stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    /// Project name, also the output file stem.
    pub name: String,

    /// Directories belonging to the project.
    pub log_dirs: Vec<LogDir>,

    /// Delete files after they were archived.
    pub delete_processed: bool,
}

impl Project {
    /// Capture what a worker needs to know about this project.
    pub fn context(&self, output_dir: &Path) -> ProjectContext {
        ProjectContext {
            name: self.name.clone(),
            delete_processed: self.delete_processed,
            output_dir: output_dir.to_path_buf(),
        }
    }

    /// Enabled directories of the project.
    pub fn enabled_dirs(&self) -> impl Iterator<Item = &Path> {
        self.log_dirs
            .iter()
            .filter(|dir| dir.enabled)
            .map(|dir| dir.path.as_path())
    }
}

/// The application's configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// One of `debug`, `info`, `warn`, `error`.
    pub log_level: String,

    /// Directory for the application's own log files.
    pub app_log_dir: PathBuf,

    /// Directory receiving the per-project output streams.
    pub output_dir: PathBuf,

    /// Projects in priority order.
    pub projects: Vec<Project>,
}

impl Config {
    /// Read the configuration file at `path` and resolve relative paths.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        config.resolve_paths(base);
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        resolve(base, &mut self.app_log_dir);
        resolve(base, &mut self.output_dir);
        for project in &mut self.projects {
            for dir in &mut project.log_dirs {
                resolve(base, &mut dir.path);
            }
        }
    }

    /// Paths that should be watched: the config file and every enabled
    /// log directory.
    pub fn desired_watch_set(&self, config_path: &Path) -> BTreeSet<PathBuf> {
        let mut paths = BTreeSet::new();
        paths.insert(config_path.to_path_buf());
        for project in &self.projects {
            paths.extend(project.enabled_dirs().map(Path::to_path_buf));
        }
        paths
    }

    /// Find the project owning `path`.
    ///
    /// The first project with a directory whose path is a string prefix of
    /// `path` wins. The `enabled` flag is not consulted, and `/logs/a` also
    /// claims `/logs/ab/x.xml`.
    pub fn project_for(&self, path: &Path) -> Option<ProjectContext> {
        let path = path.to_string_lossy();
        self.projects
            .iter()
            .find(|project| {
                project
                    .log_dirs
                    .iter()
                    .any(|dir| path.starts_with(dir.path.to_string_lossy().as_ref()))
            })
            .map(|project| project.context(&self.output_dir))
    }
}

fn resolve(base: &Path, path: &mut PathBuf) {
    if !path.is_absolute() {
        *path = base.join(&*path);
    }
}

/// Per-file view of a project, captured by value when a worker starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectContext {
    /// Project name.
    pub name: String,

    /// Delete files after they were archived.
    pub delete_processed: bool,

    /// Output root at the time the file was dispatched.
    pub output_dir: PathBuf,
}

/// Shared, atomically replaceable configuration snapshot.
///
/// Readers always see a whole snapshot; a reload swaps in a new one.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    /// Path to the configuration file.
    path: Arc<PathBuf>,

    /// Current snapshot.
    current: Arc<RwLock<Arc<Config>>>,
}

impl ConfigStore {
    /// Create a store around an already loaded configuration.
    pub fn new(path: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            path: Arc::new(path.into()),
            current: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Load the configuration file at `path`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = Config::load(&path)?;
        Ok(Self::new(path, config))
    }

    /// Path to the configuration file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the current snapshot.
    pub async fn snapshot(&self) -> Arc<Config> {
        self.current.read().await.clone()
    }

    /// Hold the read lock, e.g. while reconciling watches.
    pub async fn read(&self) -> RwLockReadGuard<'_, Arc<Config>> {
        self.current.read().await
    }

    /// Re-read the configuration file and swap in the new snapshot.
    ///
    /// The file is read before the write lock is taken, so readers are only
    /// blocked for the swap. On error the previous snapshot stays in place.
    pub async fn reload(&self) -> Result<Arc<Config>, ConfigError> {
        let config = Arc::new(Config::load(self.path.as_path())?);
        *self.current.write().await = config.clone();
        info!("Configuration reloaded: {config:?}");
        Ok(config)
    }
}
