use std::fmt;
use std::path::Path;

use trellis_project::{PathEntry, SourceRootKind};

/// Every path construct the engine exposes.
///
/// The selector-backed kinds (`Compile`, `Runtime`, `Boot`, `ModulePath`, `ModuleRuntime`)
/// switch between the legacy and module representations depending on whether the source
/// root owns a module descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ViewKind {
    Source,
    LegacyCompile,
    LegacyRuntime,
    LegacyBoot,
    Compile,
    Runtime,
    Boot,
    ModulePath,
    ModuleRuntime,
    ModuleBoot,
    Processor,
    Endorsed,
}

impl ViewKind {
    pub const ALL: [ViewKind; 12] = [
        ViewKind::Source,
        ViewKind::LegacyCompile,
        ViewKind::LegacyRuntime,
        ViewKind::LegacyBoot,
        ViewKind::Compile,
        ViewKind::Runtime,
        ViewKind::Boot,
        ViewKind::ModulePath,
        ViewKind::ModuleRuntime,
        ViewKind::ModuleBoot,
        ViewKind::Processor,
        ViewKind::Endorsed,
    ];

    pub const SELECTOR_BACKED: [ViewKind; 5] = [
        ViewKind::Compile,
        ViewKind::Runtime,
        ViewKind::Boot,
        ViewKind::ModulePath,
        ViewKind::ModuleRuntime,
    ];

    pub fn is_selector_backed(self) -> bool {
        Self::SELECTOR_BACKED.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViewKind::Source => "source",
            ViewKind::LegacyCompile => "legacy-compile",
            ViewKind::LegacyRuntime => "legacy-runtime",
            ViewKind::LegacyBoot => "legacy-boot",
            ViewKind::Compile => "compile",
            ViewKind::Runtime => "runtime",
            ViewKind::Boot => "boot",
            ViewKind::ModulePath => "module-path",
            ViewKind::ModuleRuntime => "module-runtime",
            ViewKind::ModuleBoot => "module-boot",
            ViewKind::Processor => "processor",
            ViewKind::Endorsed => "endorsed",
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache index: one view per kind and source-root kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewKey {
    pub kind: ViewKind,
    pub root: SourceRootKind,
}

impl ViewKey {
    pub const fn new(kind: ViewKind, root: SourceRootKind) -> Self {
        Self { kind, root }
    }

    /// `kind` for both source-root kinds.
    pub fn both(kind: ViewKind) -> [ViewKey; 2] {
        [
            ViewKey::new(kind, SourceRootKind::Main),
            ViewKey::new(kind, SourceRootKind::Test),
        ]
    }

    /// Every key the engine knows about.
    pub fn all() -> impl Iterator<Item = ViewKey> {
        ViewKind::ALL.into_iter().flat_map(ViewKey::both)
    }
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let root = match self.root {
            SourceRootKind::Main => "main",
            SourceRootKind::Test => "test",
        };
        write!(f, "{}/{root}", self.kind)
    }
}

/// An ordered, immutable path plus its health flags.
///
/// Order is precedence order. A view is never mutated once published; invalidation
/// replaces it with a new value carrying a higher generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathView {
    entries: Vec<PathEntry>,
    complete: bool,
    degraded: bool,
    extension_library: Option<PathEntry>,
    generation: u64,
}

impl Default for PathView {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl PathView {
    pub fn new(entries: Vec<PathEntry>) -> Self {
        Self {
            entries,
            complete: true,
            degraded: false,
            extension_library: None,
            generation: 0,
        }
    }

    /// Copy the entries and flags of `other` (but not its generation).
    pub fn derived_from(other: &PathView) -> Self {
        Self {
            generation: 0,
            ..other.clone()
        }
    }

    pub fn with_complete(mut self, complete: bool) -> Self {
        self.complete = complete;
        self
    }

    pub fn with_degraded(mut self, degraded: bool) -> Self {
        self.degraded = degraded;
        self
    }

    pub fn with_extension_library(mut self, entry: Option<PathEntry>) -> Self {
        self.extension_library = entry;
        self
    }

    pub(crate) fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn entries(&self) -> &[PathEntry] {
        &self.entries
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|entry| entry.path.as_path())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `false` when any artifact the view needs failed to resolve.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// `true` when the view was built from a fallback (missing toolchain, module gate
    /// failure, ...).
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// The platform extension library, when the boot path carries one.
    pub fn extension_library(&self) -> Option<&PathEntry> {
        self.extension_library.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.iter().any(|entry| entry.path == path)
    }
}

/// Append `entry` unless an entry with the same path is already present.
pub(crate) fn push_unique(entries: &mut Vec<PathEntry>, entry: PathEntry) {
    if !entries.iter().any(|existing| existing.path == entry.path) {
        entries.push(entry);
    }
}
