//! Durable key-value storage for the identity record

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Byte-valued store with an atomic create-if-absent
///
/// `put_if_absent` must commit at most one value per key even when several
/// processes race on the first write.
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key was never written
    fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>>;

    /// Write `value` only if the key is unset; returns whether it was written
    fn put_if_absent(&self, key: &str, value: &[u8]) -> io::Result<bool>;

    /// Write or atomically replace a value
    fn put(&self, key: &str, value: &[u8]) -> io::Result<()>;

    /// Delete a value; deleting a missing key is not an error
    fn remove(&self, key: &str) -> io::Result<()>;
}

/// One file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

impl FileKeyValueStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> io::Result<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid store key {:?}", key),
            ));
        }
        Ok(self.dir.join(key))
    }

    /// Write `value` to a fresh temp file next to the target and fsync it
    fn write_temp(&self, key: &str, value: &[u8]) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let tmp = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            key,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&tmp)?;
        let written = file.write_all(value).and_then(|_| file.sync_all());
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(tmp)
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn put_if_absent(&self, key: &str, value: &[u8]) -> io::Result<bool> {
        let path = self.path_for(key)?;
        let tmp = self.write_temp(key, value)?;

        // hard_link refuses to replace an existing file, which makes it the commit point
        let result = fs::hard_link(&tmp, &path);
        let _ = fs::remove_file(&tmp);

        match result {
            Ok(()) => {
                debug!("Stored {} in {}", key, self.dir.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> io::Result<()> {
        let path = self.path_for(key)?;
        let tmp = self.write_temp(key, value)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        debug!("Replaced {} in {}", key, self.dir.display());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put_if_absent(&self, key: &str, value: &[u8]) -> io::Result<bool> {
        let mut entries = self.entries.lock();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    fn put(&self, key: &str, value: &[u8]) -> io::Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
