//! Daemon configuration, read once from `config.toml` in the data directory.
//!
//! The loaded [`Config`] is immutable for the lifetime of the process and is
//! handed explicitly to every stage that needs it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default name of the configuration file inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Port used when the configuration does not name one.
pub const DEFAULT_PORT: u16 = 4338;

/// Template written on first run. Operators fill in the identity section and
/// start the daemon again.
pub const DEFAULT_TEMPLATE: &str = r#"# murmur daemon configuration
#
# Fill in [identity] below, then run `murmur start` again.

# Skip certificate validation for outbound connections. Only for testing
# against self-signed peers.
promiscuous = false

# Do not establish any network transport. Messages are only stored locally.
passive = false

[identity]
user_id = ""
# Handed to the session engine. The built-in engine does not encrypt the
# private key with it; the key file is protected only by its 0600 mode.
passphrase = ""

[network]
address = "0.0.0.0"
port = 4338
# Ask the router for a port mapping over UPnP. Falls back to passive
# networking when no gateway answers.
portmap = true

# File names, relative to the data directory.
[files]
public_key = "identity.pub"
private_key = "identity.key"
store = "messages.jsonl"
socket = "murmur.sock"
pid = "murmur.pid"
log = "murmur.log"
"#;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Skip certificate validation for outbound connections.
    pub promiscuous: bool,
    /// Run without any network transport.
    pub passive: bool,
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub files: FileNames,
    /// Data directory the file names are resolved against. Not part of the file.
    #[serde(skip)]
    pub datadir: PathBuf,
}

#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub user_id: String,
    pub passphrase: String,
}

impl fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("user_id", &self.user_id)
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub address: String,
    pub port: u16,
    pub portmap: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            portmap: true,
        }
    }
}

/// Names of the artifacts kept in the data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileNames {
    pub public_key: PathBuf,
    pub private_key: PathBuf,
    pub store: PathBuf,
    pub socket: PathBuf,
    pub pid: PathBuf,
    pub log: PathBuf,
}

impl Default for FileNames {
    fn default() -> Self {
        Self {
            public_key: PathBuf::from("identity.pub"),
            private_key: PathBuf::from("identity.key"),
            store: PathBuf::from("messages.jsonl"),
            socket: PathBuf::from("murmur.sock"),
            pid: PathBuf::from("murmur.pid"),
            log: PathBuf::from("murmur.log"),
        }
    }
}

impl FileNames {
    fn entries(&self) -> [(&'static str, &Path); 6] {
        [
            ("public_key", self.public_key.as_path()),
            ("private_key", self.private_key.as_path()),
            ("store", self.store.as_path()),
            ("socket", self.socket.as_path()),
            ("pid", self.pid.as_path()),
            ("log", self.log.as_path()),
        ]
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            promiscuous: false,
            passive: false,
            identity: IdentityConfig::default(),
            network: NetworkConfig::default(),
            files: FileNames::default(),
            datadir: PathBuf::new(),
        }
    }
}

impl Config {
    /// Read and validate the configuration file at `path`.
    ///
    /// # Arguments
    /// * `path` - Location of the TOML file
    /// * `datadir` - Data directory that relative file names resolve against
    pub fn load(path: &Path, datadir: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, datadir).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse configuration text. Sections left out of the text take their defaults.
    pub fn parse(content: &str, datadir: &Path) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.datadir = datadir.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.user_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "identity.user_id must be set".to_string(),
            ));
        }

        if self.network.port == 0 {
            return Err(ConfigError::Validation(
                "network.port must be greater than 0".to_string(),
            ));
        }

        for (key, name) in self.files.entries() {
            if name.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!("files.{key} must not be empty")));
            }
            if name.is_absolute() {
                return Err(ConfigError::Validation(format!(
                    "files.{key} must be relative to the data directory, got {}",
                    name.display()
                )));
            }
        }

        Ok(())
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.datadir.join(&self.files.public_key)
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.datadir.join(&self.files.private_key)
    }

    pub fn store_path(&self) -> PathBuf {
        self.datadir.join(&self.files.store)
    }

    pub fn socket_path(&self) -> PathBuf {
        self.datadir.join(&self.files.socket)
    }

    pub fn pid_path(&self) -> PathBuf {
        self.datadir.join(&self.files.pid)
    }

    pub fn log_path(&self) -> PathBuf {
        self.datadir.join(&self.files.log)
    }
}
