//! Append-only message history, one JSON record per line.
//!
//! Every access takes an `fs2` advisory lock on the file: shared for reads,
//! exclusive for appends and truncation.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::Message;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("message store {path} line {line} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct MessageStore {
    path: PathBuf,
}

impl MessageStore {
    /// Open the store at `path`, creating an empty file if needed.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let store = Self {
            path: path.to_path_buf(),
        };
        store.open_for_append()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn open_for_append(&self) -> Result<File, StoreError> {
        OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))
    }

    pub fn append(&self, message: &Message) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(message).map_err(StoreError::Encode)?;
        line.push('\n');

        let file = self.open_for_append()?;
        file.lock_exclusive().map_err(|e| self.io_error(e))?;
        let mut writer = BufWriter::new(&file);
        writer
            .write_all(line.as_bytes())
            .map_err(|e| self.io_error(e))?;
        writer.flush().map_err(|e| self.io_error(e))
    }

    /// All stored messages, oldest first. A missing file reads as empty.
    pub fn read_all(&self) -> Result<Vec<Message>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        file.lock_shared().map_err(|e| self.io_error(e))?;

        let mut messages = Vec::new();
        for (index, line) in BufReader::new(&file).lines().enumerate() {
            let line = line.map_err(|e| self.io_error(e))?;
            if line.trim().is_empty() {
                continue;
            }
            let message = serde_json::from_str(&line).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                line: index + 1,
                source,
            })?;
            messages.push(message);
        }
        Ok(messages)
    }

    /// Drop all history, keeping the (now empty) file.
    pub fn clear(&self) -> Result<(), StoreError> {
        let file = self.open_for_append()?;
        file.lock_exclusive().map_err(|e| self.io_error(e))?;
        file.set_len(0).map_err(|e| self.io_error(e))
    }
}
