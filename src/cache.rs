use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const PART_SUFFIX: &str = ".part";

/// A finalized cache blob, named by the SHA-256 of its content.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub hash: String,
    pub size: u64,
    pub modified: SystemTime,
}

/// Content-addressed store of downloaded archives. A blob only ever appears
/// under its hash name once the full stream has been consumed and hashed;
/// in-flight writes live in `.part` temp files that are never listed and
/// never survive a failed insert.
pub struct ContentCache {
    root: PathBuf,
}

impl ContentCache {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(ContentCache { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, hash: &str) -> PathBuf {
        self.root.join(hash)
    }

    pub fn lookup(&self, hash: &str) -> Option<PathBuf> {
        let path = self.path_for(hash);
        if path.is_file() { Some(path) } else { None }
    }

    /// Re-hashes a cached blob. A corrupt entry is deleted on the spot, so
    /// the name-proves-content invariant holds for everything that stays.
    pub fn verify(&self, hash: &str) -> Result<bool> {
        let path = match self.lookup(hash) {
            Some(path) => path,
            None => return Ok(false),
        };
        let actual = hash_file(&path)?;
        if actual == hash {
            Ok(true)
        } else {
            tracing::warn!(hash, actual, "corrupt cache entry, evicting");
            fs::remove_file(&path)?;
            Ok(false)
        }
    }

    /// Starts an insert. The caller streams bytes into the returned writer
    /// and finalizes with [`CacheWriter::finish`]; dropping the writer
    /// discards everything.
    pub fn begin(&self) -> Result<CacheWriter> {
        let file = tempfile::Builder::new()
            .prefix("download-")
            .suffix(PART_SUFFIX)
            .tempfile_in(&self.root)?;
        Ok(CacheWriter {
            file,
            hasher: Sha256::new(),
            written: 0,
            root: self.root.clone(),
        })
    }

    /// Enumerates finalized entries. Order follows the filesystem and is not
    /// guaranteed stable. Temp files are never reported.
    pub fn list(&self) -> Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        for dirent in fs::read_dir(&self.root)? {
            let dirent = dirent?;
            let path = dirent.path();
            if !path.is_file() {
                continue;
            }
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };
            if !is_hash_name(name) {
                continue;
            }
            let metadata = dirent.metadata()?;
            entries.push(CacheEntry {
                hash: name.to_string(),
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
        Ok(entries)
    }

    pub fn remove(&self, hash: &str) -> Result<()> {
        let path = self
            .lookup(hash)
            .ok_or_else(|| Error::NotFound(format!("cache entry {}", hash)))?;
        fs::remove_file(&path)?;
        Ok(())
    }

    /// Removes every entry, sweeping leftover temp files along the way.
    /// Returns the number of finalized entries removed.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for dirent in fs::read_dir(&self.root)? {
            let path = dirent?.path();
            if !path.is_file() {
                continue;
            }
            let counts = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(is_hash_name)
                .unwrap_or(false);
            fs::remove_file(&path)?;
            if counts {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// In-flight cache insert: a `.part` temp file plus a running SHA-256 over
/// everything written so far.
pub struct CacheWriter {
    file: tempfile::NamedTempFile,
    hasher: Sha256,
    written: u64,
    root: PathBuf,
}

impl CacheWriter {
    /// Atomically publishes the blob under its hash name. With an expected
    /// hash, a mismatch discards the temp file and nothing becomes visible.
    pub fn finish(mut self, expected: Option<&str>) -> Result<CacheEntry> {
        self.file.flush()?;
        let hash = hex::encode(self.hasher.finalize());
        if let Some(expected) = expected {
            if hash != expected {
                return Err(Error::Integrity {
                    expected: expected.to_string(),
                    actual: hash,
                });
            }
        }
        let path = self.root.join(&hash);
        self.file.persist(&path).map_err(|e| Error::Io(e.error))?;
        let metadata = fs::metadata(&path)?;
        Ok(CacheEntry {
            hash,
            size: self.written,
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        })
    }
}

impl Write for CacheWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn is_hash_name(name: &str) -> bool {
    name.len() == 64 && name.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}
