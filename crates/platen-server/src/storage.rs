use std::path::{Path, PathBuf};

use platen_core::Error;
use uuid::Uuid;

/// Uploaded g-code on disk. Writes go to a scratch name first and are
/// renamed into place so a crashed upload never leaves a half-written file
/// behind a committed row.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<FileStore, Error> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(FileStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Storage name for a new upload; recorded on the file row.
    pub fn storage_name(&self, file_id: Uuid) -> String {
        format!("{file_id}.gcode")
    }

    pub fn path_of(&self, storage_path: &str) -> PathBuf {
        self.root.join(storage_path)
    }

    /// Write-then-rename: the file only appears under its final name once
    /// fully on disk.
    pub async fn save(&self, storage_path: &str, bytes: &[u8]) -> Result<PathBuf, Error> {
        let final_path = self.path_of(storage_path);
        let scratch = self.root.join(format!(".{storage_path}.partial"));
        tokio::fs::write(&scratch, bytes).await?;
        tokio::fs::rename(&scratch, &final_path).await?;
        Ok(final_path)
    }

    pub async fn read(&self, storage_path: &str) -> Result<Vec<u8>, Error> {
        Ok(tokio::fs::read(self.path_of(storage_path)).await?)
    }

    pub async fn size(&self, storage_path: &str) -> Result<u64, Error> {
        Ok(tokio::fs::metadata(self.path_of(storage_path)).await?.len())
    }

    /// Removing a file that is already gone is not an error; the row is the
    /// source of truth and teardown must be idempotent.
    pub async fn delete(&self, storage_path: &str) -> Result<(), Error> {
        match tokio::fs::remove_file(self.path_of(storage_path)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let name = store.storage_name(Uuid::new_v4());
        store.save(&name, b";PRINT.TIME:1\nG28\n").await.unwrap();
        let got = store.read(&name).await.unwrap();
        assert_eq!(got, b";PRINT.TIME:1\nG28\n");
    }

    #[tokio::test]
    async fn no_partial_file_remains_after_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let name = store.storage_name(Uuid::new_v4());
        store.save(&name, b"data").await.unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec![name]);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let name = store.storage_name(Uuid::new_v4());
        store.save(&name, b"data").await.unwrap();
        store.delete(&name).await.unwrap();
        store.delete(&name).await.unwrap();
    }
}
