use std::fs::{read_to_string, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chat_core::paths;

/// One persistent slot holding the current credential.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str) -> io::Result<()>;
    fn clear(&self) -> io::Result<()>;
}

/// Keeps the credential in a file under the app data directory.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default file name inside `app_data_dir`.
    pub fn in_dir(app_data_dir: &Path) -> Self {
        Self::new(paths::token_path(app_data_dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<String> {
        if !self.path.exists() {
            return None;
        }
        let raw = read_to_string(&self.path).ok()?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    fn save(&self, token: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            paths::ensure_dir(parent)?;
        }
        let mut file = File::create(&self.path)?;
        file.write_all(token.as_bytes())?;
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// In-memory slot, for hosts without a writable data directory and for tests.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            slot: RwLock::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, token: &str) -> io::Result<()> {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempdir().expect("tempdir");
        let store = FileTokenStore::in_dir(dir.path());

        assert_eq!(store.load(), None);
        store.save("token-value").expect("save");
        assert_eq!(store.load().as_deref(), Some("token-value"));

        store.save("newer").expect("overwrite");
        assert_eq!(store.load().as_deref(), Some("newer"));
    }

    #[test]
    fn test_file_store_trims_and_ignores_blank() {
        let dir = tempdir().expect("tempdir");
        let store = FileTokenStore::in_dir(dir.path());

        std::fs::write(store.path(), "  token-value \n").expect("write");
        assert_eq!(store.load().as_deref(), Some("token-value"));

        std::fs::write(store.path(), " \n").expect("write");
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_file_store_clear_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let store = FileTokenStore::new(dir.path().join("nested").join(".chat_token"));

        store.clear().expect("clear missing file");
        store.save("t").expect("save creates parent");
        store.clear().expect("clear");
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryTokenStore::with_token("a");
        assert_eq!(store.load().as_deref(), Some("a"));
        store.clear().expect("clear");
        assert_eq!(store.load(), None);
    }
}
