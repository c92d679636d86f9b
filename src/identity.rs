//! Identity key material: generation on first start and loading afterwards.
//!
//! The key format belongs to the messaging engine. This module only moves
//! the two armored key files between the generator, the disk and the
//! in-memory [`Identity`] handle.

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("key generation failed: {0}")]
    Generation(String),

    #[error("failed to write key file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read key file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("key file {0} is empty")]
    Empty(PathBuf),
}

/// Armored public and private key text, as produced by a [`KeyGenerator`].
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub public: String,
    pub private: String,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("public", &self.public)
            .field("private", &"<redacted>")
            .finish()
    }
}

/// Produces a fresh key pair for a user.
pub trait KeyGenerator: Send + Sync {
    fn generate(&self, user_id: &str, passphrase: &str) -> Result<KeyMaterial, IdentityError>;
}

/// Ed25519 key pairs from the operating system RNG, hex armored.
///
/// The passphrase is not applied: the private key is stored unencrypted and
/// relies on the file mode set by [`IdentityProvisioner`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519KeyGenerator;

impl KeyGenerator for Ed25519KeyGenerator {
    fn generate(&self, _user_id: &str, _passphrase: &str) -> Result<KeyMaterial, IdentityError> {
        let signing_key = SigningKey::generate(&mut OsRng);
        Ok(KeyMaterial {
            public: hex::encode(signing_key.verifying_key().as_bytes()),
            private: hex::encode(signing_key.to_bytes()),
        })
    }
}

/// A user id bound to its key pair.
#[derive(Clone)]
pub struct Identity {
    user_id: String,
    passphrase: String,
    keys: KeyMaterial,
}

impl Identity {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }

    pub fn public_key(&self) -> &str {
        &self.keys.public
    }

    pub fn private_key(&self) -> &str {
        &self.keys.private
    }

    /// Short SHA-256 fingerprint of the public key, for log lines.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.keys.public.as_bytes());
        hex::encode(&digest[..8])
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

pub struct IdentityProvisioner<'a> {
    generator: &'a dyn KeyGenerator,
}

impl<'a> IdentityProvisioner<'a> {
    pub fn new(generator: &'a dyn KeyGenerator) -> Self {
        Self { generator }
    }

    /// Generate key material when the private key file is missing.
    ///
    /// # Returns
    /// `Ok(true)` if keys were generated, `Ok(false)` if a private key already existed
    pub fn ensure(&self, config: &Config) -> Result<bool, IdentityError> {
        let private_path = config.private_key_path();
        if private_path.exists() {
            return Ok(false);
        }

        info!(
            "No private key at {}, generating identity for {}",
            private_path.display(),
            config.identity.user_id
        );
        let identity = self.generate(
            &config.identity.user_id,
            &config.identity.passphrase,
            &config.public_key_path(),
            &private_path,
        )?;
        info!("Generated identity {}", identity.fingerprint());
        Ok(true)
    }

    /// Generate a key pair and persist both halves before returning the identity.
    pub fn generate(
        &self,
        user_id: &str,
        passphrase: &str,
        public_path: &Path,
        private_path: &Path,
    ) -> Result<Identity, IdentityError> {
        let keys = self.generator.generate(user_id, passphrase)?;

        write_key_file(public_path, &keys.public, 0o644)?;
        write_key_file(private_path, &keys.private, 0o600)?;

        Ok(Identity {
            user_id: user_id.to_string(),
            passphrase: passphrase.to_string(),
            keys,
        })
    }

    /// Read both key files and build the identity handle.
    pub fn load(
        public_path: &Path,
        private_path: &Path,
        user_id: &str,
        passphrase: &str,
    ) -> Result<Identity, IdentityError> {
        let public = read_key_file(public_path)?;
        let private = read_key_file(private_path)?;

        Ok(Identity {
            user_id: user_id.to_string(),
            passphrase: passphrase.to_string(),
            keys: KeyMaterial { public, private },
        })
    }
}

fn write_key_file(path: &Path, content: &str, mode: u32) -> Result<(), IdentityError> {
    let to_error = |source| IdentityError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
        .map_err(to_error)?;
    file.write_all(content.as_bytes()).map_err(to_error)?;
    file.write_all(b"\n").map_err(to_error)?;
    file.sync_all().map_err(to_error)
}

fn read_key_file(path: &Path) -> Result<String, IdentityError> {
    let content = fs::read_to_string(path).map_err(|source| IdentityError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(IdentityError::Empty(path.to_path_buf()));
    }
    Ok(trimmed.to_string())
}
