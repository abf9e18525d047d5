use camino::Utf8Path;
use serde::Serialize;

use crate::domain::{ResourceKind, TransferState};
use crate::storage::Storage;

pub const PDF_MAGIC: &[u8] = b"%PDF-";
pub const PDF_EOF_MARKER: &[u8] = b"%%EOF";
/// How far back from the end we look for the EOF marker.
pub const PDF_TAIL_WINDOW: u64 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Inspection {
    pub state: TransferState,
    /// Bytes on disk; `None` when the file is missing.
    pub size: Option<u64>,
}

/// Classifies whatever is at `path` for a resource of `kind`.
///
/// Only the size, the first five bytes and the last kilobyte are read, so a
/// whole catalog of large PDFs audits in O(1) per file.
pub fn classify<S: Storage + ?Sized>(
    storage: &S,
    path: &Utf8Path,
    kind: ResourceKind,
) -> TransferState {
    inspect(storage, path, kind).state
}

pub fn inspect<S: Storage + ?Sized>(
    storage: &S,
    path: &Utf8Path,
    kind: ResourceKind,
) -> Inspection {
    let size = match storage.stat(path) {
        Ok(Some(size)) => size,
        Ok(None) | Err(_) => {
            return Inspection {
                state: TransferState::Missing,
                size: None,
            };
        }
    };
    match classify_content(storage, path, kind, size) {
        Ok(state) => Inspection {
            state,
            size: Some(size),
        },
        // Unreadable counts as absent; the next transfer recreates it.
        Err(_) => Inspection {
            state: TransferState::Missing,
            size: None,
        },
    }
}

fn classify_content<S: Storage + ?Sized>(
    storage: &S,
    path: &Utf8Path,
    kind: ResourceKind,
    size: u64,
) -> std::io::Result<TransferState> {
    if size < kind.min_valid_size() {
        return Ok(TransferState::Corrupt);
    }
    match kind {
        ResourceKind::Pdf => {
            let header = storage.read_header(path, PDF_MAGIC.len())?;
            if header != PDF_MAGIC {
                return Ok(TransferState::Corrupt);
            }
            let tail = storage.read_tail(path, PDF_TAIL_WINDOW)?;
            if contains(&tail, PDF_EOF_MARKER) {
                Ok(TransferState::Valid)
            } else {
                Ok(TransferState::Partial)
            }
        }
        // Audio has no structural check: size alone decides, so it is never Partial.
        ResourceKind::Wav | ResourceKind::Mp3 => Ok(TransferState::Valid),
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};

    use camino::Utf8PathBuf;

    use super::*;
    use crate::storage::{LocalStorage, MemoryStorage};

    fn pdf(size: usize, eof: bool) -> Vec<u8> {
        let mut bytes = b"%PDF-1.4\n".to_vec();
        bytes.resize(size - if eof { 6 } else { 0 }, b'x');
        if eof {
            bytes.extend_from_slice(b"%%EOF\n");
        }
        bytes
    }

    #[test]
    fn pdf_states() {
        let storage = MemoryStorage::new();
        let path = Utf8Path::new("doc.pdf");
        assert_eq!(classify(&storage, path, ResourceKind::Pdf), TransferState::Missing);

        storage.insert(path, pdf(50 * 1024 - 1, true));
        assert_eq!(classify(&storage, path, ResourceKind::Pdf), TransferState::Corrupt);

        let mut html = b"<html>".to_vec();
        html.resize(80 * 1024, b' ');
        html.extend_from_slice(b"%%EOF");
        storage.insert(path, html);
        assert_eq!(classify(&storage, path, ResourceKind::Pdf), TransferState::Corrupt);

        storage.insert(path, pdf(60 * 1024, false));
        assert_eq!(classify(&storage, path, ResourceKind::Pdf), TransferState::Partial);

        storage.insert(path, pdf(60 * 1024, true));
        assert_eq!(classify(&storage, path, ResourceKind::Pdf), TransferState::Valid);
    }

    #[test]
    fn eof_outside_tail_window_is_partial() {
        let storage = MemoryStorage::new();
        let path = Utf8Path::new("doc.pdf");
        let mut bytes = pdf(60 * 1024, true);
        bytes.extend(std::iter::repeat_n(b'z', 2048));
        storage.insert(path, bytes);
        assert_eq!(classify(&storage, path, ResourceKind::Pdf), TransferState::Partial);
    }

    #[test]
    fn audio_is_size_only() {
        let storage = MemoryStorage::new();
        let path = Utf8Path::new("track.mp3");
        assert_eq!(classify(&storage, path, ResourceKind::Mp3), TransferState::Missing);

        storage.insert(path, vec![0u8; 1023]);
        assert_eq!(classify(&storage, path, ResourceKind::Mp3), TransferState::Corrupt);

        storage.insert(path, vec![0u8; 1024]);
        assert_eq!(classify(&storage, path, ResourceKind::Wav), TransferState::Valid);
        assert_eq!(classify(&storage, path, ResourceKind::Mp3), TransferState::Valid);
    }

    /// Stats fine, but every read fails.
    struct UnreadableStorage(MemoryStorage);

    impl Storage for UnreadableStorage {
        fn stat(&self, path: &Utf8Path) -> io::Result<Option<u64>> {
            self.0.stat(path)
        }

        fn read_header(&self, _path: &Utf8Path, _len: usize) -> io::Result<Vec<u8>> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }

        fn read_tail(&self, _path: &Utf8Path, _len: u64) -> io::Result<Vec<u8>> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }

        fn open_append(&self, path: &Utf8Path) -> io::Result<Box<dyn Write + '_>> {
            self.0.open_append(path)
        }

        fn open_overwrite(&self, path: &Utf8Path) -> io::Result<Box<dyn Write + '_>> {
            self.0.open_overwrite(path)
        }

        fn remove(&self, path: &Utf8Path) -> io::Result<()> {
            self.0.remove(path)
        }
    }

    #[test]
    fn path_that_cannot_be_statted_is_missing() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = root.join("Unit 1.pdf");
        std::fs::create_dir(&path).unwrap();

        let storage = LocalStorage::new();
        assert!(storage.stat(&path).is_err());
        let inspection = inspect(&storage, &path, ResourceKind::Pdf);
        assert_eq!(inspection.state, TransferState::Missing);
        assert_eq!(inspection.size, None);
    }

    #[test]
    fn unreadable_file_is_missing_without_size() {
        let memory = MemoryStorage::new();
        let path = Utf8Path::new("doc.pdf");
        memory.insert(path, pdf(60 * 1024, true));
        let storage = UnreadableStorage(memory);

        let inspection = inspect(&storage, path, ResourceKind::Pdf);
        assert_eq!(inspection.state, TransferState::Missing);
        assert_eq!(inspection.size, None);

        // Audio never reads content, so size alone still decides.
        assert_eq!(classify(&storage, path, ResourceKind::Mp3), TransferState::Valid);
    }

    #[test]
    fn inspection_reports_size() {
        let storage = MemoryStorage::new();
        let path = Utf8Path::new("a.wav");
        storage.insert(path, vec![1u8; 4096]);
        let inspection = inspect(&storage, path, ResourceKind::Wav);
        assert_eq!(inspection.state, TransferState::Valid);
        assert_eq!(inspection.size, Some(4096));
    }
}
