//! Filesystem access used by the classifier and the transfer loop.
//!
//! The files themselves are the only persistent state, so everything the
//! engine knows about an item comes through these six calls. `LocalStorage`
//! talks to the real disk; `MemoryStorage` keeps bytes in a map and backs the
//! tests.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};

pub trait Storage: Send + Sync {
    /// Size in bytes, or `None` when nothing exists at `path`.
    fn stat(&self, path: &Utf8Path) -> io::Result<Option<u64>>;
    /// Up to `len` leading bytes.
    fn read_header(&self, path: &Utf8Path, len: usize) -> io::Result<Vec<u8>>;
    /// Up to `len` trailing bytes.
    fn read_tail(&self, path: &Utf8Path, len: u64) -> io::Result<Vec<u8>>;
    /// Opens for appending, creating the file and its parent directories.
    fn open_append(&self, path: &Utf8Path) -> io::Result<Box<dyn Write + '_>>;
    /// Opens truncated, creating the file and its parent directories.
    fn open_overwrite(&self, path: &Utf8Path) -> io::Result<Box<dyn Write + '_>>;
    fn remove(&self, path: &Utf8Path) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

impl LocalStorage {
    pub fn new() -> Self {
        Self
    }

    fn ensure_parent(path: &Utf8Path) -> io::Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => fs::create_dir_all(parent),
            _ => Ok(()),
        }
    }
}

impl Storage for LocalStorage {
    fn stat(&self, path: &Utf8Path) -> io::Result<Option<u64>> {
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Err(io::Error::other(format!("{path} is not a regular file"))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn read_header(&self, path: &Utf8Path, len: usize) -> io::Result<Vec<u8>> {
        let file = File::open(path)?;
        let mut buf = Vec::with_capacity(len);
        file.take(len as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn read_tail(&self, path: &Utf8Path, len: u64) -> io::Result<Vec<u8>> {
        let mut file = File::open(path)?;
        let size = file.metadata()?.len();
        file.seek(SeekFrom::Start(size.saturating_sub(len)))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn open_append(&self, path: &Utf8Path) -> io::Result<Box<dyn Write + '_>> {
        Self::ensure_parent(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Box::new(file))
    }

    fn open_overwrite(&self, path: &Utf8Path) -> io::Result<Box<dyn Write + '_>> {
        Self::ensure_parent(path)?;
        let file = File::create(path)?;
        Ok(Box::new(file))
    }

    fn remove(&self, path: &Utf8Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

type FileMap = BTreeMap<Utf8PathBuf, Vec<u8>>;

/// In-memory backend. Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: Arc<Mutex<FileMap>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<Utf8PathBuf>, content: impl Into<Vec<u8>>) {
        self.lock().insert(path.into(), content.into());
    }

    pub fn contents(&self, path: &Utf8Path) -> Option<Vec<u8>> {
        self.lock().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<Utf8PathBuf> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, FileMap> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn not_found(path: &Utf8Path) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, format!("{path} not found"))
    }
}

impl Storage for MemoryStorage {
    fn stat(&self, path: &Utf8Path) -> io::Result<Option<u64>> {
        Ok(self.lock().get(path).map(|bytes| bytes.len() as u64))
    }

    fn read_header(&self, path: &Utf8Path, len: usize) -> io::Result<Vec<u8>> {
        let files = self.lock();
        let bytes = files.get(path).ok_or_else(|| Self::not_found(path))?;
        Ok(bytes[..len.min(bytes.len())].to_vec())
    }

    fn read_tail(&self, path: &Utf8Path, len: u64) -> io::Result<Vec<u8>> {
        let files = self.lock();
        let bytes = files.get(path).ok_or_else(|| Self::not_found(path))?;
        let start = bytes.len().saturating_sub(usize::try_from(len).unwrap_or(usize::MAX));
        Ok(bytes[start..].to_vec())
    }

    fn open_append(&self, path: &Utf8Path) -> io::Result<Box<dyn Write + '_>> {
        self.lock().entry(path.to_path_buf()).or_default();
        Ok(Box::new(MemoryWriter {
            storage: self,
            path: path.to_path_buf(),
        }))
    }

    fn open_overwrite(&self, path: &Utf8Path) -> io::Result<Box<dyn Write + '_>> {
        self.lock().insert(path.to_path_buf(), Vec::new());
        Ok(Box::new(MemoryWriter {
            storage: self,
            path: path.to_path_buf(),
        }))
    }

    fn remove(&self, path: &Utf8Path) -> io::Result<()> {
        self.lock()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(path))
    }
}

struct MemoryWriter<'a> {
    storage: &'a MemoryStorage,
    path: Utf8PathBuf,
}

impl Write for MemoryWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.storage
            .lock()
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
