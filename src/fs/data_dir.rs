use crate::config::{Config, ConfigError, CONFIG_FILE_NAME, DEFAULT_TEMPLATE};
use std::fs::{self, DirBuilder};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the data directory created under the home directory by default.
const DEFAULT_DIR_NAME: &str = ".murmur";

#[derive(Debug, Error)]
pub enum DataDirError {
    #[error("failed to create data directory {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write default configuration to {path}: {source}")]
    WriteTemplate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// What [`DataDir::ensure`] found on disk.
#[derive(Debug)]
pub enum Provisioned {
    /// No configuration existed; the default template was written to `config_path`.
    FirstRun { config_path: PathBuf },
    /// The configuration was read and validated.
    Loaded(Config),
}

/// The directory holding the daemon's configuration, keys, store and socket.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
    config_name: PathBuf,
}

impl DataDir {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            config_name: PathBuf::from(CONFIG_FILE_NAME),
        }
    }

    /// Use a different configuration file name, relative to the root.
    pub fn with_config_name<P: AsRef<Path>>(mut self, name: P) -> Self {
        self.config_name = name.as_ref().to_path_buf();
        self
    }

    /// `~/.murmur`, or `None` when no home directory can be determined.
    pub fn default_root() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_DIR_NAME))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(&self.config_name)
    }

    /// Make sure the directory exists and load its configuration.
    ///
    /// Creates the directory (mode 0700) when missing. When no configuration
    /// file exists yet, writes [`DEFAULT_TEMPLATE`] and reports
    /// [`Provisioned::FirstRun`] without reading anything else.
    pub fn ensure(&self) -> Result<Provisioned, DataDirError> {
        if !self.root.exists() {
            DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(&self.root)
                .map_err(|source| DataDirError::Create {
                    path: self.root.clone(),
                    source,
                })?;
        }

        let config_path = self.config_path();
        if !config_path.exists() {
            if let Some(parent) = config_path.parent().filter(|p| !p.exists()) {
                DirBuilder::new()
                    .recursive(true)
                    .mode(0o700)
                    .create(parent)
                    .map_err(|source| DataDirError::Create {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
            fs::write(&config_path, DEFAULT_TEMPLATE).map_err(|source| {
                DataDirError::WriteTemplate {
                    path: config_path.clone(),
                    source,
                }
            })?;
            return Ok(Provisioned::FirstRun { config_path });
        }

        Ok(Provisioned::Loaded(self.load_config()?))
    }

    /// Read the configuration without provisioning anything.
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        Config::load(&self.config_path(), &self.root)
    }
}
