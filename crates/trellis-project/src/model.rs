use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ArtifactCoordinate, DependencyScope, ProjectError};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JavaVersion(pub u16);

impl JavaVersion {
    pub const JAVA_8: JavaVersion = JavaVersion(8);
    pub const JAVA_9: JavaVersion = JavaVersion(9);
    pub const JAVA_11: JavaVersion = JavaVersion(11);
    pub const JAVA_17: JavaVersion = JavaVersion(17);
    pub const JAVA_21: JavaVersion = JavaVersion(21);

    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim().trim_matches('"');
        if text.is_empty() {
            return None;
        }

        // Legacy releases are spelled "1.8"; modern ones may carry update suffixes ("17.0.2").
        let normalized = text.strip_prefix("1.").unwrap_or(text);
        let major = normalized
            .split(|c: char| !c.is_ascii_digit())
            .next()
            .unwrap_or_default();
        major.parse::<u16>().ok().map(JavaVersion)
    }

    pub fn supports_modules(self, threshold: JavaVersion) -> bool {
        self >= threshold
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceRootKind {
    Main,
    Test,
}

impl SourceRootKind {
    pub const ALL: [SourceRootKind; 2] = [SourceRootKind::Main, SourceRootKind::Test];
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceRootOrigin {
    /// User-authored sources (e.g. `src/main/java`).
    Source,
    /// Build-generated sources (annotation processors, codegen plugins, etc).
    Generated,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRoot {
    pub kind: SourceRootKind,
    pub origin: SourceRootOrigin,
    pub path: PathBuf,
}

impl SourceRoot {
    pub fn new(kind: SourceRootKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            origin: SourceRootOrigin::Source,
            path: path.into(),
        }
    }

    pub fn generated(kind: SourceRootKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            origin: SourceRootOrigin::Generated,
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRoot {
    pub kind: SourceRootKind,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputDir {
    pub kind: SourceRootKind,
    pub path: PathBuf,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PathEntryKind {
    /// A directory of classes or sources.
    Directory,
    /// An archive (`.jar`, `.zip`, `.jmod`) whose root is the entry.
    Archive,
}

/// One resolvable location on a path.
///
/// Entries are never dropped because the file is missing; missing artifacts are reported
/// through the owning view's completeness flag instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathEntry {
    pub kind: PathEntryKind,
    pub path: PathBuf,
}

impl PathEntry {
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: PathEntryKind::Directory,
            path: path.into(),
        }
    }

    pub fn archive(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: PathEntryKind::Archive,
            path: path.into(),
        }
    }

    /// Classify by file extension; anything that doesn't look like an archive is a directory.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if is_archive_path(&path) {
            Self::archive(path)
        } else {
            Self::directory(path)
        }
    }

    pub fn is_archive(&self) -> bool {
        self.kind == PathEntryKind::Archive
    }
}

pub fn is_archive_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ext.eq_ignore_ascii_case("jar")
                || ext.eq_ignore_ascii_case("zip")
                || ext.eq_ignore_ascii_case("jmod")
        })
}

/// Resolution state of a declared dependency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Resolution {
    Resolved { file: PathBuf },
    Unresolved,
    /// Resolution was attempted and failed (bad pom, checksum mismatch, ...).
    Broken { reason: String },
}

impl Resolution {
    pub fn file(&self) -> Option<&Path> {
        match self {
            Resolution::Resolved { file } => Some(file),
            Resolution::Unresolved | Resolution::Broken { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub coordinate: ArtifactCoordinate,
    #[serde(default)]
    pub scope: DependencyScope,
    pub resolution: Resolution,
}

impl Dependency {
    pub fn resolved(
        coordinate: ArtifactCoordinate,
        scope: DependencyScope,
        file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            coordinate,
            scope,
            resolution: Resolution::Resolved { file: file.into() },
        }
    }

    pub fn unresolved(coordinate: ArtifactCoordinate, scope: DependencyScope) -> Self {
        Self {
            coordinate,
            scope,
            resolution: Resolution::Unresolved,
        }
    }

    pub fn file(&self) -> Option<&Path> {
        self.resolution.file()
    }
}

/// Compiler plugin configuration that influences path construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Source language level; `None` defers to the active toolchain's version.
    pub source: Option<JavaVersion>,
    /// Explicit boot classpath override (platform path-separator list).
    pub boot_classpath: Option<String>,
    /// Annotation processor path declarations.
    pub processor_path: Vec<Dependency>,
}

impl CompilerConfig {
    /// Split the explicit boot classpath override into individual paths.
    pub fn boot_classpath_paths(&self) -> Vec<PathBuf> {
        let Some(text) = self.boot_classpath.as_deref() else {
            return Vec::new();
        };
        if text.trim().is_empty() {
            return Vec::new();
        }
        std::env::split_paths(text)
            .filter(|path| !path.as_os_str().is_empty())
            .collect()
    }
}

/// Immutable project state that every path view is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub root: PathBuf,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub source_roots: Vec<SourceRoot>,
    #[serde(default)]
    pub resource_roots: Vec<ResourceRoot>,
    #[serde(default)]
    pub output_dirs: Vec<OutputDir>,
    #[serde(default)]
    pub compiler: CompilerConfig,
    /// Configured toolchain identifier; `None` selects the default toolchain.
    #[serde(default)]
    pub toolchain: Option<String>,
}

impl ProjectSnapshot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dependencies: Vec::new(),
            source_roots: Vec::new(),
            resource_roots: Vec::new(),
            output_dirs: Vec::new(),
            compiler: CompilerConfig::default(),
            toolchain: None,
        }
    }

    /// A snapshot with the conventional Maven directory layout under `root`.
    pub fn maven_layout(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut snapshot = Self::new(root.clone());
        snapshot.source_roots = vec![
            SourceRoot::new(SourceRootKind::Main, root.join("src/main/java")),
            SourceRoot::new(SourceRootKind::Test, root.join("src/test/java")),
        ];
        snapshot.resource_roots = vec![
            ResourceRoot {
                kind: SourceRootKind::Main,
                path: root.join("src/main/resources"),
            },
            ResourceRoot {
                kind: SourceRootKind::Test,
                path: root.join("src/test/resources"),
            },
        ];
        snapshot.output_dirs = vec![
            OutputDir {
                kind: SourceRootKind::Main,
                path: root.join("target/classes"),
            },
            OutputDir {
                kind: SourceRootKind::Test,
                path: root.join("target/test-classes"),
            },
        ];
        snapshot
    }

    /// Source roots of `kind`, user-authored roots before generated ones.
    pub fn source_roots_of(&self, kind: SourceRootKind) -> Vec<&SourceRoot> {
        let mut roots: Vec<&SourceRoot> = self
            .source_roots
            .iter()
            .filter(|root| root.kind == kind)
            .collect();
        roots.sort_by_key(|root| root.origin);
        roots
    }

    pub fn output_dir(&self, kind: SourceRootKind) -> Option<&Path> {
        self.output_dirs
            .iter()
            .find(|dir| dir.kind == kind)
            .map(|dir| dir.path.as_path())
    }

    pub fn dependency(&self, coordinate: &ArtifactCoordinate) -> Option<&Dependency> {
        self.dependencies
            .iter()
            .find(|dep| &dep.coordinate == coordinate)
    }

    /// Add `dependency`, replacing an existing declaration of the same coordinate in place.
    pub fn with_dependency(&self, dependency: Dependency) -> Self {
        let mut next = self.clone();
        match next
            .dependencies
            .iter_mut()
            .find(|dep| dep.coordinate == dependency.coordinate)
        {
            Some(existing) => *existing = dependency,
            None => next.dependencies.push(dependency),
        }
        next
    }

    pub fn without_dependency(
        &self,
        coordinate: &ArtifactCoordinate,
    ) -> Result<Self, ProjectError> {
        if self.dependency(coordinate).is_none() {
            return Err(ProjectError::UnknownDependency(coordinate.clone()));
        }
        let mut next = self.clone();
        next.dependencies.retain(|dep| &dep.coordinate != coordinate);
        Ok(next)
    }

    pub fn with_toolchain(&self, toolchain: Option<String>) -> Self {
        let mut next = self.clone();
        next.toolchain = toolchain;
        next
    }

    pub fn with_source_roots(&self, roots: Vec<SourceRoot>) -> Self {
        let mut next = self.clone();
        next.source_roots = roots;
        next
    }

    pub fn with_resource_roots(&self, roots: Vec<ResourceRoot>) -> Self {
        let mut next = self.clone();
        next.resource_roots = roots;
        next
    }

    pub fn with_output_dirs(&self, dirs: Vec<OutputDir>) -> Self {
        let mut next = self.clone();
        next.output_dirs = dirs;
        next
    }

    pub fn with_compiler(&self, compiler: CompilerConfig) -> Self {
        let mut next = self.clone();
        next.compiler = compiler;
        next
    }
}
