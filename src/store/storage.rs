//! Output storage
//!
//! Handles reading and writing stored outputs to disk. Each output is two
//! files in the store directory:
//! - `<id>.json` - the full record, payload included
//! - `<id>.meta.json` - the small metadata sidecar used for listing
//!
//! Both are written through a temp file and an atomic no-clobber rename, so a
//! concurrent reader sees either nothing or a complete file.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::core::{StoreError, StoreResult};

use super::record::{StoredOutput, StoredOutputMeta};

/// Default directory for output storage
const OUTPUTS_DIR: &str = "tool_outputs";

const PAYLOAD_SUFFIX: &str = ".json";
const META_SUFFIX: &str = ".meta.json";

/// Write-once store for oversized tool results
///
/// Cheap to clone; clones share the same directory.
#[derive(Debug, Clone)]
pub struct OutputStore {
    base_dir: PathBuf,
}

impl OutputStore {
    /// Create a store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: dir.into(),
        }
    }

    /// The default store directory, relative to the working directory
    pub fn default_dir() -> PathBuf {
        PathBuf::from(OUTPUTS_DIR)
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn payload_path(&self, id: &str) -> PathBuf {
        self.base_dir.join(format!("{}{}", id, PAYLOAD_SUFFIX))
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.base_dir.join(format!("{}{}", id, META_SUFFIX))
    }

    fn ensure_dir(&self) -> StoreResult<()> {
        if !self.base_dir.exists() {
            fs::create_dir_all(&self.base_dir)?;
        }
        Ok(())
    }

    /// Persist a new output. Fails if the id was already written.
    pub fn write(&self, output: &StoredOutput) -> StoreResult<()> {
        let id = output.id();
        if !is_valid_id(id) {
            return Err(StoreError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("invalid output id '{}'", id),
            )));
        }
        self.ensure_dir()?;

        // Payload first: once the sidecar is visible the payload is readable.
        self.write_atomic(&self.payload_path(id), id, output)?;
        self.write_atomic(&self.meta_path(id), id, &output.meta)?;

        tracing::info!(
            "[OutputStore] Stored output {} from {} ({} bytes)",
            id,
            output.meta.tool_name,
            output.meta.size_bytes
        );
        Ok(())
    }

    fn write_atomic<T: Serialize>(&self, path: &Path, id: &str, value: &T) -> StoreResult<()> {
        let mut tmp = NamedTempFile::new_in(&self.base_dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, value)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;

        tmp.persist_noclobber(path).map_err(|e| {
            if e.error.kind() == ErrorKind::AlreadyExists {
                StoreError::AlreadyExists(id.to_string())
            } else {
                StoreError::Io(e.error)
            }
        })?;
        Ok(())
    }

    /// Load the full record for `id`
    pub fn read(&self, id: &str) -> StoreResult<StoredOutput> {
        self.read_json(&self.payload_path(id), id)
    }

    /// Load only the metadata for `id`
    pub fn read_meta(&self, id: &str) -> StoreResult<StoredOutputMeta> {
        self.read_json(&self.meta_path(id), id)
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path, id: &str) -> StoreResult<T> {
        if !is_valid_id(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Check if an output exists
    pub fn exists(&self, id: &str) -> bool {
        is_valid_id(id) && self.payload_path(id).exists()
    }

    /// Metadata of every stored output, in no particular order
    ///
    /// Unreadable sidecars are skipped with a warning.
    pub fn list_meta(&self) -> StoreResult<Vec<StoredOutputMeta>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut metas = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(id) = name.strip_suffix(META_SUFFIX) else {
                continue;
            };

            match self.read_meta(id) {
                Ok(meta) => metas.push(meta),
                Err(e) => {
                    tracing::warn!("[OutputStore] Skipping unreadable metadata {:?}: {}", path, e);
                }
            }
        }

        Ok(metas)
    }
}

impl Default for OutputStore {
    fn default() -> Self {
        Self::new(Self::default_dir())
    }
}

/// Ids are used as file names, so only a conservative character set is accepted
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
