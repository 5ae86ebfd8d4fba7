//! Content-hash identification of override jars.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use thiserror::Error;
use trellis_project::ArtifactCoordinate;

/// SHA-256 of a file's contents, as lowercase hex.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Self {
        Self(hex::encode(Sha256::digest(bytes.as_ref())))
    }

    pub fn from_reader(mut reader: impl Read) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = [0_u8; 64 * 1024];
        loop {
            let read = reader.read(&mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        Ok(Self(hex::encode(hasher.finalize())))
    }

    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::from_reader(std::fs::File::open(path)?)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("artifact index unavailable: {0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Maps content hashes back to artifact coordinates.
///
/// Remote implementations may block on network I/O; the engine only calls them from its
/// background worker.
pub trait ArtifactIndex: Send + Sync {
    fn lookup_by_content_hash(
        &self,
        file: &Path,
        hash: &ContentHash,
    ) -> Result<Option<ArtifactCoordinate>, IndexError>;
}

/// In-memory hash index consulted synchronously during overlay resolution.
#[derive(Debug, Default)]
pub struct LocalHashIndex {
    entries: RwLock<HashMap<ContentHash, ArtifactCoordinate>>,
}

impl LocalHashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, hash: ContentHash, coordinate: ArtifactCoordinate) {
        self.entries.write().insert(hash, coordinate);
    }

    /// Hash `file` and record it as `coordinate`.
    pub fn insert_file(&self, file: &Path, coordinate: ArtifactCoordinate) -> io::Result<()> {
        self.insert(ContentHash::from_file(file)?, coordinate);
        Ok(())
    }

    pub fn get(&self, hash: &ContentHash) -> Option<ArtifactCoordinate> {
        self.entries.read().get(hash).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ArtifactIndex for LocalHashIndex {
    fn lookup_by_content_hash(
        &self,
        _file: &Path,
        hash: &ContentHash,
    ) -> Result<Option<ArtifactCoordinate>, IndexError> {
        Ok(self.get(hash))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    fn of(path: &Path) -> io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

/// Content hashes memoized by path, length and modification time.
#[derive(Debug, Default)]
pub(crate) struct HashMemo {
    hashes: RwLock<HashMap<PathBuf, (FileStamp, ContentHash)>>,
}

impl HashMemo {
    pub(crate) fn hash(&self, path: &Path) -> io::Result<ContentHash> {
        let stamp = FileStamp::of(path)?;
        if let Some((cached, hash)) = self.hashes.read().get(path) {
            if *cached == stamp {
                return Ok(hash.clone());
            }
        }

        let hash = ContentHash::from_file(path)?;
        self.hashes
            .write()
            .insert(path.to_path_buf(), (stamp, hash.clone()));
        Ok(hash)
    }
}
