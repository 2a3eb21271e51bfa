// Tokenvault - Software-backed key file oracle
//
// Fallback for hosts without a usable platform keystore (headless Linux,
// containers). The key is written to a private temp file and published with
// a hard link, which fails if the key already exists. A crash never leaves a
// truncated key behind, and racing first callers all end up with the key
// that won.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use super::provider::{KeyBacking, KeyHandle, KeyOracle};
use super::EnclaveError;

pub struct FileKeyOracle {
    path: PathBuf,
}

impl FileKeyOracle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Option<KeyHandle>, EnclaveError> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                let bytes = Zeroizing::new(bytes);
                KeyHandle::from_bytes(&bytes, KeyBacking::Software).map(Some)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EnclaveError::KeyFile(e)),
        }
    }

    /// Publish `handle` unless a key is already in place. Returns the key
    /// that ends up stored, which may be another writer's.
    fn publish(&self, handle: KeyHandle) -> Result<KeyHandle, EnclaveError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.temp_path();
        let written = write_owner_only(&tmp, handle.material())
            .and_then(|()| fs::hard_link(&tmp, &self.path));
        let _ = fs::remove_file(&tmp);

        match written {
            Ok(()) => Ok(handle),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::debug!(path = %self.path.display(), "Key file created concurrently, using existing key");
                self.read()?.ok_or(EnclaveError::KeyFile(e))
            }
            Err(e) => Err(EnclaveError::KeyFile(e)),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "key".to_string());
        self.path
            .with_file_name(format!(".{}.{:016x}.tmp", name, rand::random::<u64>()))
    }
}

fn write_owner_only(path: &Path, material: &[u8]) -> std::io::Result<()> {
    let mut file = open_owner_only(path)?;
    file.write_all(material)?;
    file.sync_all()
}

#[cfg(unix)]
fn open_owner_only(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_owner_only(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new().write(true).create_new(true).open(path)
}

impl KeyOracle for FileKeyOracle {
    fn backing(&self) -> KeyBacking {
        KeyBacking::Software
    }

    fn wrap_key(&self) -> Result<KeyHandle, EnclaveError> {
        if let Some(handle) = self.read()? {
            tracing::debug!(path = %self.path.display(), "Loaded master key from key file");
            return Ok(handle);
        }

        tracing::info!(path = %self.path.display(), "No key file found, generating master key");
        self.publish(KeyHandle::generate(KeyBacking::Software))
    }

    fn has_key(&self) -> Result<bool, EnclaveError> {
        Ok(self.read()?.is_some())
    }

    fn delete_key(&self) -> Result<(), EnclaveError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::warn!(path = %self.path.display(), "Key file deleted, stored records are now irrecoverable");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EnclaveError::KeyFile(e)),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_file_is_created_once_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let oracle = FileKeyOracle::new(dir.path().join("vault.key"));

        assert!(!oracle.has_key().unwrap());
        let first = oracle.wrap_key().unwrap();
        assert!(oracle.has_key().unwrap());
        let second = oracle.wrap_key().unwrap();

        assert_eq!(first.material(), second.material());
        assert_eq!(first.backing(), KeyBacking::Software);
    }

    #[test]
    fn test_key_survives_new_oracle_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("vault.key");

        let first = FileKeyOracle::new(&path).wrap_key().unwrap();
        let second = FileKeyOracle::new(&path).wrap_key().unwrap();
        assert_eq!(first.material(), second.material());
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let oracle = FileKeyOracle::new(dir.path().join("vault.key"));
        oracle.wrap_key().unwrap();

        let mode = fs::metadata(oracle.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_truncated_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.key");
        fs::write(&path, [1u8; 10]).unwrap();

        let err = FileKeyOracle::new(&path).wrap_key().unwrap_err();
        assert!(matches!(err, EnclaveError::MalformedKey(10, _)));
    }

    #[test]
    fn test_concurrent_first_wrap_agrees_on_one_key() {
        use std::sync::{Arc, Barrier};

        for _ in 0..50 {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("vault.key");
            let barrier = Arc::new(Barrier::new(2));

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let path = path.clone();
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        FileKeyOracle::new(path).wrap_key().unwrap()
                    })
                })
                .collect();

            let keys: Vec<KeyHandle> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            assert_eq!(keys[0].material(), keys[1].material());

            let stored = FileKeyOracle::new(&path).wrap_key().unwrap();
            assert_eq!(stored.material(), keys[0].material());

            let leftovers = fs::read_dir(dir.path()).unwrap().count();
            assert_eq!(leftovers, 1, "Temp files must be cleaned up");
        }
    }

    #[test]
    fn test_delete_nonexistent_key_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let oracle = FileKeyOracle::new(dir.path().join("missing.key"));
        assert!(oracle.delete_key().is_ok());
    }
}
