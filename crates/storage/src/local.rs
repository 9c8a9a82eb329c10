use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;

use crate::repository::{LocalStore, StorageError};

/// Local key-value store keeping one `<key>.json` file per key inside a directory.
///
/// Every write goes to its own temporary sibling and is renamed into place, so a
/// reader never sees a half-written value and concurrent writes to one key never
/// share a staging file. The last rename wins.
#[derive(Debug, Clone)]
pub struct FileLocalStore {
    dir: PathBuf,
}

impl FileLocalStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

fn write_atomically(dir: &Path, target: &Path, value: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut staging = NamedTempFile::new_in(dir)?;
    staging.write_all(value)?;
    staging.as_file().sync_all()?;
    staging.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl LocalStore for FileLocalStore {
    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let dir = self.dir.clone();
        let target = self.path_for(key);
        let value = value.to_owned();
        tokio::task::spawn_blocking(move || write_atomically(&dir, &target, value.as_bytes()))
            .await
            .map_err(std::io::Error::other)??;
        Ok(())
    }
}
