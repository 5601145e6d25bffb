use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::domain::ports::KeyValueStore;

type Entries = BTreeMap<String, String>;

/// Durable backend: one JSON object of key to raw value.
///
/// Several handles, in one process or many, may share a file. Reads load
/// the file as it is on disk. Writes hold an exclusive lock on a sibling
/// `.lock` file for the whole read-modify-write, so each one applies its
/// own key to the latest contents and never drops keys written by others.
///
/// Writes go to a temporary file in the same directory which then replaces
/// the target, so a crash leaves either the old or the new file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
    // orders writers of this handle; the file lock orders everyone else
    local: Mutex<()>,
}

/// Held OS lock on the store's lock file, released on drop.
struct StoreLock(File);

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.0);
    }
}

impl JsonFileStore {
    /// Open `path`, creating parent directories. A missing file is an
    /// empty store; an unreadable or malformed one is an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create store directory {}", parent.display()))?;
        }

        let mut lock_name = path.file_name().unwrap_or_default().to_os_string();
        lock_name.push(".lock");
        let store = Self {
            lock_path: path.with_file_name(lock_name),
            path,
            local: Mutex::new(()),
        };

        let keys = {
            let _lock = store.lock(false)?;
            store.load()?.len()
        };
        info!(path = %store.path.display(), keys, "Key/value store opened");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self, exclusive: bool) -> Result<StoreLock> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .with_context(|| format!("Failed to open lock file {}", self.lock_path.display()))?;
        let locked = if exclusive {
            FileExt::lock_exclusive(&file)
        } else {
            FileExt::lock_shared(&file)
        };
        locked.with_context(|| format!("Failed to lock {}", self.lock_path.display()))?;
        Ok(StoreLock(file))
    }

    /// Current contents on disk. Callers hold the file lock.
    fn load(&self) -> Result<Entries> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read store file {}", self.path.display()))
            }
        };
        if raw.trim().is_empty() {
            return Ok(Entries::new());
        }
        serde_json::from_str(&raw).with_context(|| {
            format!("Store file {} is not a JSON object of strings", self.path.display())
        })
    }

    fn read(&self) -> Result<Entries> {
        let _lock = self.lock(false)?;
        self.load()
    }

    fn flush(&self, entries: &Entries) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        serde_json::to_writer(&mut tmp, entries).context("Failed to encode store")?;
        tmp.flush().context("Failed to flush store")?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), keys = entries.len(), "Store flushed");
        Ok(())
    }

    /// Apply `change` to the current file contents under the exclusive lock.
    /// `change` returns `false` when nothing changed; the file is then left alone.
    fn mutate(&self, change: impl FnOnce(&mut Entries) -> bool) -> Result<()> {
        let _local = self.local.lock();
        let _lock = self.lock(true)?;
        let mut entries = self.load()?;
        if change(&mut entries) {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.mutate(|m| {
            m.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.mutate(|m| m.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.read()?.into_keys().collect())
    }
}
