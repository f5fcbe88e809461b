//! Flat key/blob store used to persist binding tables and gateway settings.
//!
//! The flash file system itself lives outside this crate; drivers only see
//! the [`BlobStore`] / [`BlobFile`] pair. A store hands out at most one open
//! file at a time, so every load or save is a single open-then-close
//! transaction.

use heapless::{String, Vec};

/// Size of a persisted bound id field (36 characters plus NUL terminator)
pub const BOUND_ID_FIELD: usize = 37;

/// Longest blob name accepted by [`MemoryStore`]
pub const MAX_NAME_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// Truncates an existing blob or creates a new one
    Write,
}

/// Storage errors, all recoverable at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// No blob with that name
    NotFound,
    /// Blob could not be opened for writing
    OpenFailed,
    /// Write ran out of space
    Full,
    /// Underlying medium reported a failure
    Io,
    /// Name does not fit the store's naming rules
    InvalidName,
}

/// An open blob
pub trait BlobFile {
    /// Total size of the blob in bytes
    fn size(&self) -> usize;
    /// Read up to `buf.len()` bytes from the current position
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError>;
    /// Append `buf` at the current position
    fn write(&mut self, buf: &[u8]) -> Result<usize, StorageError>;
    /// Flush and release the handle
    fn close(&mut self) -> Result<(), StorageError>;
}

/// A store addressed by blob name
pub trait BlobStore {
    fn open(&mut self, name: &str, mode: OpenMode) -> Result<&mut dyn BlobFile, StorageError>;
}

/// Load a fixed-size blob into `buf`.
///
/// Returns `Ok(false)` when the blob is missing or its size differs from
/// `buf.len()`; a mismatching blob was written by a different build layout
/// and counts as "nothing stored".
pub fn load_blob(store: &mut dyn BlobStore, name: &str, buf: &mut [u8]) -> Result<bool, StorageError> {
    let file = match store.open(name, OpenMode::Read) {
        Ok(file) => file,
        Err(StorageError::NotFound) => return Ok(false),
        Err(e) => return Err(e),
    };

    if file.size() != buf.len() {
        file.close()?;
        return Ok(false);
    }

    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) => {
                let _ = file.close();
                return Err(e);
            }
        }
    }
    file.close()?;
    Ok(filled == buf.len())
}

/// Replace the blob `name` with `data`
pub fn save_blob(store: &mut dyn BlobStore, name: &str, data: &[u8]) -> Result<(), StorageError> {
    let file = store.open(name, OpenMode::Write)?;
    let mut written = 0;
    while written < data.len() {
        match file.write(&data[written..]) {
            Ok(0) => {
                let _ = file.close();
                return Err(StorageError::Full);
            }
            Ok(n) => written += n,
            Err(e) => {
                let _ = file.close();
                return Err(e);
            }
        }
    }
    file.close()
}

/// Copy `text` into a NUL-padded fixed field, truncating if needed
pub fn write_str_field(field: &mut [u8], text: &str) {
    field.fill(0);
    let n = text.len().min(field.len().saturating_sub(1));
    field[..n].copy_from_slice(&text.as_bytes()[..n]);
}

/// Read a NUL-terminated field back into a string slice.
/// Returns `None` if the bytes are not UTF-8.
pub fn read_str_field(field: &[u8]) -> Option<&str> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    core::str::from_utf8(&field[..end]).ok()
}

/// One blob held by [`MemoryStore`]
pub struct MemoryFile<const SIZE: usize> {
    name: String<MAX_NAME_LEN>,
    data: Vec<u8, SIZE>,
    cursor: usize,
}

impl<const SIZE: usize> BlobFile for MemoryFile<SIZE> {
    fn size(&self) -> usize {
        self.data.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        let remaining = &self.data[self.cursor.min(self.data.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.cursor += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, StorageError> {
        let room = SIZE - self.data.len();
        let n = room.min(buf.len());
        // cannot fail, `n` fits the remaining capacity
        let _ = self.data.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn close(&mut self) -> Result<(), StorageError> {
        self.cursor = 0;
        Ok(())
    }
}

/// RAM-backed store with `FILES` blobs of up to `SIZE` bytes each.
///
/// Used by the firmware until a flash file system is attached and by the
/// test suite. `fail_writes` simulates a medium that refuses writes.
pub struct MemoryStore<const FILES: usize, const SIZE: usize> {
    files: Vec<MemoryFile<SIZE>, FILES>,
    pub fail_writes: bool,
}

impl<const FILES: usize, const SIZE: usize> MemoryStore<FILES, SIZE> {
    pub const fn new() -> Self {
        Self {
            files: Vec::new(),
            fail_writes: false,
        }
    }

    /// Raw contents of a blob, if present
    pub fn contents(&self, name: &str) -> Option<&[u8]> {
        self.files
            .iter()
            .find(|f| f.name.as_str() == name)
            .map(|f| f.data.as_slice())
    }
}

impl<const FILES: usize, const SIZE: usize> Default for MemoryStore<FILES, SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const FILES: usize, const SIZE: usize> BlobStore for MemoryStore<FILES, SIZE> {
    fn open(&mut self, name: &str, mode: OpenMode) -> Result<&mut dyn BlobFile, StorageError> {
        let pos = self.files.iter().position(|f| f.name.as_str() == name);

        match mode {
            OpenMode::Read => {
                let pos = pos.ok_or(StorageError::NotFound)?;
                let file = &mut self.files[pos];
                file.cursor = 0;
                Ok(file)
            }
            OpenMode::Write => {
                if self.fail_writes {
                    return Err(StorageError::OpenFailed);
                }
                let pos = match pos {
                    Some(pos) => pos,
                    None => {
                        let mut file_name = String::new();
                        file_name
                            .push_str(name)
                            .map_err(|_| StorageError::InvalidName)?;
                        self.files
                            .push(MemoryFile {
                                name: file_name,
                                data: Vec::new(),
                                cursor: 0,
                            })
                            .map_err(|_| StorageError::Full)?;
                        self.files.len() - 1
                    }
                };
                let file = &mut self.files[pos];
                file.data.clear();
                file.cursor = 0;
                Ok(file)
            }
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StorageError::NotFound => write!(f, "Blob not found"),
            StorageError::OpenFailed => write!(f, "Failed to open blob for writing"),
            StorageError::Full => write!(f, "Storage full"),
            StorageError::Io => write!(f, "Storage I/O error"),
            StorageError::InvalidName => write!(f, "Invalid blob name"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let mut store: MemoryStore<4, 64> = MemoryStore::new();
        save_blob(&mut store, "/dht.config", &[1, 2, 3, 4]).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(load_blob(&mut store, "/dht.config", &mut buf), Ok(true));
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn test_size_mismatch_means_nothing_stored() {
        let mut store: MemoryStore<4, 64> = MemoryStore::new();
        save_blob(&mut store, "/1wire.config", &[9; 10]).unwrap();

        let mut buf = [0u8; 12];
        assert_eq!(load_blob(&mut store, "/1wire.config", &mut buf), Ok(false));
        assert_eq!(buf, [0; 12]);
    }

    #[test]
    fn test_missing_blob() {
        let mut store: MemoryStore<4, 64> = MemoryStore::new();
        let mut buf = [0u8; 4];
        assert_eq!(load_blob(&mut store, "/nope", &mut buf), Ok(false));
    }

    #[test]
    fn test_overwrite_truncates() {
        let mut store: MemoryStore<4, 64> = MemoryStore::new();
        save_blob(&mut store, "/a", &[1; 20]).unwrap();
        save_blob(&mut store, "/a", &[2; 5]).unwrap();
        assert_eq!(store.contents("/a"), Some(&[2u8; 5][..]));
    }

    #[test]
    fn test_blob_too_large() {
        let mut store: MemoryStore<1, 8> = MemoryStore::new();
        assert_eq!(save_blob(&mut store, "/a", &[0; 9]), Err(StorageError::Full));
    }

    #[test]
    fn test_write_refused() {
        let mut store: MemoryStore<1, 8> = MemoryStore::new();
        store.fail_writes = true;
        assert_eq!(save_blob(&mut store, "/a", &[0; 4]), Err(StorageError::OpenFailed));
    }

    #[test]
    fn test_str_fields() {
        let mut field = [0xFFu8; BOUND_ID_FIELD];
        write_str_field(&mut field, "abc");
        assert_eq!(read_str_field(&field), Some("abc"));
        assert_eq!(field[3], 0);
        assert_eq!(field[BOUND_ID_FIELD - 1], 0);
    }
}
