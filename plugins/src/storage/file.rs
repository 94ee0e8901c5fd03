use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tuner_core::api::{DurableStorage, StorageError};

/// One `<slot>.json` file per slot under `root`.
///
/// Writes go to a temp file in the same directory and are renamed over the
/// target, so a reader sees the previous or the new document.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn slot_path(&self, slot: &str) -> PathBuf {
        let name: String = slot
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{name}.json"))
    }
}

impl DurableStorage for FileStorage {
    fn name(&self) -> &str {
        "file"
    }

    fn read(&self, slot: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.slot_path(slot)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read {
                slot: slot.to_string(),
                source,
            }),
        }
    }

    fn write(&self, slot: &str, contents: &str) -> Result<(), StorageError> {
        let write_err = |source| StorageError::Write {
            slot: slot.to_string(),
            source,
        };
        fs::create_dir_all(&self.root).map_err(write_err)?;

        let target = self.slot_path(slot);
        let tmp = target.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, contents).map_err(write_err)?;
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(write_err(e));
        }
        tracing::trace!(target: "tuner.storage", slot, path = %target.display(), "slot written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_slot_reads_as_none() {
        let dir = tempdir().unwrap();
        let s = FileStorage::new(dir.path());
        assert!(s.read("optimization-cache").unwrap().is_none());
    }

    #[test]
    fn write_replaces_and_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let s = FileStorage::new(dir.path().join("nested"));
        s.write("optimization-queue", "[1]").unwrap();
        s.write("optimization-queue", "[1,2]").unwrap();
        assert_eq!(s.read("optimization-queue").unwrap().as_deref(), Some("[1,2]"));

        let names: Vec<String> = fs::read_dir(s.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["optimization-queue.json".to_string()]);
    }

    #[test]
    fn slot_names_cannot_escape_the_root() {
        let dir = tempdir().unwrap();
        let s = FileStorage::new(dir.path());
        let p = s.slot_path("../etc/passwd");
        assert_eq!(p.parent(), Some(dir.path()));
    }
}
