//! Declarative state store.
//!
//! The store is a single JSON object on disk recording what valdeploy believes
//! it has provisioned. It may go stale relative to the cloud provider; the
//! reconciler resolves that, not the store.
//!
//! Every write replaces the whole file through a temporary sibling and an
//! atomic rename, so an interrupted run leaves either the old or the new
//! document, never a partial one. Unknown fields are carried through every
//! write untouched.
//!
//! There is no cross-process locking: only one operator may run valdeploy
//! against a given store at a time.

mod artifacts;
mod path;
mod record;

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{DeployError, StateError};

pub use artifacts::remove_local_artifacts;
pub use path::{get_path, remove_path, set_path};
pub use record::{DeploymentRecord, RecordedResource, keys};

/// File-backed declarative state store.
pub struct StateStore {
    dir: Dir,
    dir_path: Utf8PathBuf,
    file_name: String,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("path", &self.path())
            .finish_non_exhaustive()
    }
}

impl StateStore {
    /// Open the store at `path`, creating its parent directory if needed.
    ///
    /// The file itself is not created until the first write.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Io` if the parent directory cannot be created or
    /// opened, or `StateError::InvalidKey` if `path` has no file name.
    pub fn open(path: &Utf8Path) -> Result<Self, DeployError> {
        let file_name = path
            .file_name()
            .ok_or_else(|| StateError::InvalidKey {
                key: path.to_string(),
                reason: String::from("state path must name a file"),
            })?
            .to_owned();
        let dir_path = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_owned(),
            _ => Utf8PathBuf::from("."),
        };

        Dir::create_ambient_dir_all(&dir_path, ambient_authority())
            .map_err(|e| io_error(&dir_path, &e))?;
        let dir = Dir::open_ambient_dir(&dir_path, ambient_authority())
            .map_err(|e| io_error(&dir_path, &e))?;

        Ok(Self {
            dir,
            dir_path,
            file_name,
        })
    }

    /// Full path of the store file.
    #[must_use]
    pub fn path(&self) -> Utf8PathBuf {
        self.dir_path.join(&self.file_name)
    }

    fn temp_name(&self) -> String {
        format!(".{}.tmp", self.file_name)
    }

    /// Whether the store file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.dir.exists(&self.file_name)
    }

    /// Read the raw document; a missing file yields an empty object.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Io` on read failure and `StateError::Corrupt` if
    /// the file is not a JSON object.
    pub fn load_document(&self) -> Result<Value, DeployError> {
        let content = match self.dir.read_to_string(&self.file_name) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Value::Object(Map::new()));
            }
            Err(e) => return Err(io_error(&self.path(), &e).into()),
        };

        if content.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }

        let document: Value = serde_json::from_str(&content).map_err(|e| StateError::Corrupt {
            path: self.path().into_std_path_buf(),
            message: e.to_string(),
        })?;
        if !document.is_object() {
            return Err(StateError::Corrupt {
                path: self.path().into_std_path_buf(),
                message: String::from("top-level value must be an object"),
            }
            .into());
        }
        Ok(document)
    }

    /// Load the typed record. A missing store is an empty record, not an error.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::load_document`] failures.
    pub fn load(&self) -> Result<DeploymentRecord, DeployError> {
        Ok(DeploymentRecord::from_document(&self.load_document()?))
    }

    /// Read one field by dotted key.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::load_document`] failures.
    pub fn get_field(&self, key: &str) -> Result<Option<Value>, DeployError> {
        Ok(get_path(&self.load_document()?, key).cloned())
    }

    /// Read one field by dotted key, falling back to `default` when the key is
    /// missing or holds a value of another type.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::load_document`] failures.
    pub fn get_field_or<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
        default: T,
    ) -> Result<T, DeployError> {
        Ok(self
            .get_field(key)?
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or(default))
    }

    /// Merge a single field without touching its siblings.
    ///
    /// # Errors
    ///
    /// Returns `StateError` on read, key or write failure.
    pub fn set_field(&self, key: &str, value: impl Into<Value>) -> Result<(), DeployError> {
        self.set_fields(vec![(key, value.into())])
    }

    /// Merge several fields in one atomic write.
    ///
    /// # Errors
    ///
    /// Returns `StateError` on read, key or write failure. Nothing is written
    /// if any key is invalid.
    pub fn set_fields<'k>(
        &self,
        updates: impl IntoIterator<Item = (&'k str, Value)>,
    ) -> Result<(), DeployError> {
        let mut document = self.load_document()?;
        for (key, value) in updates {
            debug!(key, "updating state field");
            set_path(&mut document, key, value)?;
        }
        self.write_document(&document)
    }

    /// Remove a field if present.
    ///
    /// # Errors
    ///
    /// Returns `StateError` on read, key or write failure.
    pub fn remove_field(&self, key: &str) -> Result<(), DeployError> {
        let mut document = self.load_document()?;
        if remove_path(&mut document, key)?.is_some() {
            debug!(key, "removing state field");
            self.write_document(&document)?;
        }
        Ok(())
    }

    /// Delete the store file and any leftover temporary file.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Io` if an existing file cannot be removed.
    pub fn clear(&self) -> Result<(), DeployError> {
        for name in [self.file_name.clone(), self.temp_name()] {
            match self.dir.remove_file(&name) {
                Ok(()) => debug!(file = %self.dir_path.join(&name), "removed state file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_error(&self.dir_path.join(&name), &e).into()),
            }
        }
        Ok(())
    }

    /// Replace the file atomically: write and sync a temporary sibling, then
    /// rename it over the store.
    fn write_document(&self, document: &Value) -> Result<(), DeployError> {
        let temp_name = self.temp_name();
        let temp_path = self.dir_path.join(&temp_name);
        let mut content = serde_json::to_vec_pretty(document).map_err(|e| StateError::Corrupt {
            path: self.path().into_std_path_buf(),
            message: e.to_string(),
        })?;
        content.push(b'\n');

        let mut file = self
            .dir
            .create(&temp_name)
            .map_err(|e| io_error(&temp_path, &e))?;
        file.write_all(&content)
            .and_then(|()| file.sync_all())
            .map_err(|e| io_error(&temp_path, &e))?;
        drop(file);

        self.dir
            .rename(&temp_name, &self.dir, &self.file_name)
            .map_err(|e| io_error(&self.path(), &e))?;
        Ok(())
    }
}

fn io_error(path: &Utf8Path, error: &std::io::Error) -> StateError {
    StateError::Io {
        path: path.as_std_path().to_path_buf(),
        message: error.to_string(),
    }
}
