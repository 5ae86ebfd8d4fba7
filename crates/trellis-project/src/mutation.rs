use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A file-system change observed on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: FileChangeKind,
}

impl FileChange {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileChangeKind::Created,
        }
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileChangeKind::Modified,
        }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileChangeKind::Deleted,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Category of a change to the project state.
///
/// Each category maps to a fixed set of affected views; see the change router in
/// `trellis-classpath`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProjectMutation {
    DependenciesChanged,
    SourceRootsChanged,
    ResourceRootsChanged,
    OutputDirsChanged,
    CompilerConfigChanged,
    ToolchainChanged,
    /// The whole snapshot was reloaded.
    SnapshotReplaced,
    File(FileChange),
}
