use super::{KeyValueStore, StoredValue};
use crate::error::StorageError;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Key-value store persisted as a JSON document.
///
/// `commit` writes a sibling temp file, syncs it and renames it over the
/// original, so a crash mid-commit leaves the previous document intact.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: BTreeMap<String, StoredValue>,
}

impl FileStore {
    /// Opens `path`, starting empty if it does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| StorageError::ReadFailed(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(StorageError::ReadFailed(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_document(&self) -> std::io::Result<()> {
        let text = serde_json::to_string_pretty(&self.values)?;
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(text.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StorageError> {
        Ok(self.values.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: StoredValue) -> Result<(), StorageError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.write_document()
            .map_err(|e| StorageError::WriteFailed(format!("{}: {}", self.path.display(), e)))
    }
}
