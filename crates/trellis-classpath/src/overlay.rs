use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use trellis_project::{is_archive_path, ArtifactCoordinate, PathEntry};

use crate::identify::{ContentHash, HashMemo, LocalHashIndex};

/// One file of the override directory and what it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayEntry {
    /// The file as found in the override directory.
    pub source: PathBuf,
    /// `None` when the file could not be read.
    pub hash: Option<ContentHash>,
    pub coordinate: Option<ArtifactCoordinate>,
    /// The path entry contributed to the boot path.
    pub entry: PathEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayResolution {
    pub entries: Vec<OverlayEntry>,
    /// Files neither the known mappings nor the local index could identify.
    pub unidentified: Vec<(PathBuf, ContentHash)>,
}

impl OverlayResolution {
    pub fn path_entries(&self) -> Vec<PathEntry> {
        self.entries.iter().map(|entry| entry.entry.clone()).collect()
    }
}

/// Override jars dropped into the endorsed directory.
///
/// Each file resolves, in order, through the mappings learned from earlier lookups, the
/// local content-hash index, and finally a content-hash named copy in the scratch
/// directory. Identified files map to their Maven repository location when it exists.
pub struct EndorsedOverlay {
    local_repository: Option<PathBuf>,
    local_index: Arc<LocalHashIndex>,
    known: RwLock<HashMap<ContentHash, ArtifactCoordinate>>,
    hashes: HashMemo,
}

impl EndorsedOverlay {
    pub fn new(local_repository: Option<PathBuf>, local_index: Arc<LocalHashIndex>) -> Self {
        Self {
            local_repository,
            local_index,
            known: RwLock::new(HashMap::new()),
            hashes: HashMemo::default(),
        }
    }

    pub fn local_index(&self) -> &Arc<LocalHashIndex> {
        &self.local_index
    }

    /// Archives directly inside `dir`, sorted by path.
    pub fn list(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|path| is_archive_path(path))
            .collect();
        files.sort();
        files
    }

    pub fn resolve(&self, dir: &Path, scratch: &Path) -> OverlayResolution {
        let mut resolution = OverlayResolution::default();

        for source in Self::list(dir) {
            let hash = match self.hashes.hash(&source) {
                Ok(hash) => hash,
                Err(err) => {
                    tracing::warn!(
                        target = "trellis.classpath",
                        path = %source.display(),
                        error = %err,
                        "failed to hash endorsed override; using it unidentified"
                    );
                    resolution.entries.push(OverlayEntry {
                        entry: PathEntry::from_path(&source),
                        source,
                        hash: None,
                        coordinate: None,
                    });
                    continue;
                }
            };

            let coordinate = self.known(&hash).or_else(|| self.local_index.get(&hash));
            let entry = match &coordinate {
                Some(coordinate) => PathEntry::from_path(self.canonical_file(coordinate, &source)),
                None => {
                    resolution.unidentified.push((source.clone(), hash.clone()));
                    PathEntry::from_path(scratch_copy(&source, &hash, scratch))
                }
            };

            resolution.entries.push(OverlayEntry {
                source,
                hash: Some(hash),
                coordinate,
                entry,
            });
        }

        resolution
    }

    fn canonical_file(&self, coordinate: &ArtifactCoordinate, source: &Path) -> PathBuf {
        self.local_repository
            .as_deref()
            .and_then(|repo| coordinate.repository_path(repo))
            .filter(|path| path.is_file())
            .unwrap_or_else(|| source.to_path_buf())
    }

    /// A mapping learned from an earlier lookup.
    pub fn known(&self, hash: &ContentHash) -> Option<ArtifactCoordinate> {
        self.known.read().get(hash).cloned()
    }

    /// Record a lookup result. Returns `true` if the mapping changed.
    pub fn record(&self, hash: ContentHash, coordinate: ArtifactCoordinate) -> bool {
        let mut known = self.known.write();
        if known.get(&hash) == Some(&coordinate) {
            return false;
        }
        known.insert(hash, coordinate);
        true
    }
}

/// Copy `source` to `<scratch>/<hash>.jar`, reusing an existing copy.
///
/// Falls back to `source` itself when the copy can't be made.
fn scratch_copy(source: &Path, hash: &ContentHash, scratch: &Path) -> PathBuf {
    let target = scratch.join(format!("{hash}.jar"));
    if target.is_file() {
        return target;
    }

    let tmp = scratch.join(format!("{hash}.jar.tmp"));
    let result = std::fs::create_dir_all(scratch)
        .and_then(|()| std::fs::copy(source, &tmp))
        .and_then(|_| std::fs::rename(&tmp, &target));
    match result {
        Ok(()) => target,
        Err(err) => {
            let _ = std::fs::remove_file(&tmp);
            tracing::warn!(
                target = "trellis.classpath",
                path = %source.display(),
                scratch = %scratch.display(),
                error = %err,
                "failed to copy endorsed override to the scratch directory"
            );
            source.to_path_buf()
        }
    }
}
