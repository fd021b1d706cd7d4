// Key-addressed byte storage: the trait the record service depends on, a
// directory-backed implementation with advisory locks, and an in-memory one.
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use libc::{EACCES, EPERM};

use crate::core::error::{Error, ErrorKind};

/// Byte-level read/write surface over named blobs.
///
/// `read` returns `Ok(None)` for a key that has never been written. `lock`
/// returns a guard that serializes read-modify-write cycles on one key across
/// processes; stores without such a facility return `Ok(None)`.
pub trait ByteStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), Error>;

    fn lock(&self, _key: &str) -> Result<Option<KeyLock>, Error> {
        Ok(None)
    }
}

/// Directory of blobs, one file per key.
#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|err| {
            Error::new(io_error_kind(&err))
                .with_message("failed to create data directory")
                .with_path(&root)
                .with_source(err)
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> Result<PathBuf, Error> {
        if key.is_empty() || key == "." || key == ".." || key.chars().any(std::path::is_separator)
        {
            return Err(Error::new(ErrorKind::Internal)
                .with_message("store key must be a plain file name")
                .with_key(key));
        }
        Ok(self.root.join(key))
    }
}

impl ByteStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::new(io_error_kind(&err))
                .with_message("failed to read blob")
                .with_key(key)
                .with_path(&path)
                .with_source(err)),
        }
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), Error> {
        let path = self.path_for(key)?;
        let staging = self.root.join(format!(".{key}.tmp"));
        let io_err = |err: io::Error, message: &str, path: &Path| {
            Error::new(io_error_kind(&err))
                .with_message(message.to_string())
                .with_key(key)
                .with_path(path)
                .with_source(err)
        };

        let mut file = File::create(&staging)
            .map_err(|err| io_err(err, "failed to create staging file", &staging))?;
        let written = file.write_all(bytes).and_then(|()| file.sync_all());
        drop(file);
        if let Err(err) = written {
            let _ = fs::remove_file(&staging);
            return Err(io_err(err, "failed to write blob", &staging));
        }

        fs::rename(&staging, &path).map_err(|err| {
            let _ = fs::remove_file(&staging);
            io_err(err, "failed to replace blob", &path)
        })
    }

    fn lock(&self, key: &str) -> Result<Option<KeyLock>, Error> {
        let path = self.path_for(key)?;
        let lock_path = self.root.join(format!(".{key}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|err| {
                Error::new(io_error_kind(&err))
                    .with_message("failed to open lock file")
                    .with_key(key)
                    .with_path(&lock_path)
                    .with_source(err)
            })?;
        file.lock_exclusive().map_err(|err| {
            Error::new(lock_error_kind(&err))
                .with_message("failed to lock blob")
                .with_key(key)
                .with_path(&path)
                .with_source(err)
        })?;
        Ok(Some(KeyLock { file }))
    }
}

/// Exclusive advisory lock on one key; released on drop.
#[derive(Debug)]
pub struct KeyLock {
    file: File,
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Process-local store, mostly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        if let Ok(mut blobs) = self.blobs.lock() {
            blobs.insert(key.into(), bytes.into());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .ok()
            .and_then(|blobs| blobs.get(key).cloned())
    }
}

impl ByteStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let blobs = self.blobs.lock().map_err(|_| {
            Error::new(ErrorKind::Internal)
                .with_message("memory store lock poisoned")
                .with_key(key)
        })?;
        Ok(blobs.get(key).cloned())
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), Error> {
        let mut blobs = self.blobs.lock().map_err(|_| {
            Error::new(ErrorKind::Internal)
                .with_message("memory store lock poisoned")
                .with_key(key)
        })?;
        blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

// An absent blob is `Ok(None)` in `read`; any other missing path means the
// store itself is broken, so ENOENT is never reported as `NotFound`.
fn io_error_kind(err: &io::Error) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    }
}

fn lock_error_kind(err: &io::Error) -> ErrorKind {
    let errno = err.raw_os_error().unwrap_or_default();
    if errno == EACCES || errno == EPERM {
        return ErrorKind::Permission;
    }
    match err.kind() {
        io::ErrorKind::WouldBlock => ErrorKind::Busy,
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    }
}
